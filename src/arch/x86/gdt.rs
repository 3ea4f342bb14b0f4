//! Global Descriptor Table (GDT) e TSS.
//!
//! A GDT tem 256 entradas de 8 bytes. As primeiras são fixas (null,
//! código/dados do kernel, call gate de syscall); o resto é um pool
//! dinâmico usado para os descritores de TSS das tasks e para os
//! segmentos de aplicação (DPL3) criados pelo task manager.
//!
//! Uma entrada está livre quando o byte de acesso (attr) é zero.

use crate::core::config::{GDT_TABLE_SIZE, KERNEL_SELECTOR_CS, KERNEL_SELECTOR_DS, SELECTOR_SYSCALL, SYSCALL_PARAM_COUNT};
use crate::sync::KMutex;
use crate::sys::error::{SysError, SysResult};

// === Atributos de segmento (bits do attr de 16 bits) ===
// O attr também carrega limit[19:16] nos bits 8..11, preenchidos por
// `segment_desc_set`.

pub const SEG_G: u16 = 1 << 15; // granularidade: limit em unidades de 4KB
pub const SEG_D: u16 = 1 << 14; // segmento de 32 bits
pub const SEG_P_PRESENT: u16 = 1 << 7;

pub const SEG_CPL0: u16 = 0 << 0;
pub const SEG_CPL3: u16 = 3 << 0;

pub const SEG_DPL0: u16 = 0 << 5;
pub const SEG_DPL3: u16 = 3 << 5;

pub const SEG_S_SYSTEM: u16 = 0 << 4;
pub const SEG_S_NORMAL: u16 = 1 << 4;

pub const SEG_TYPE_CODE: u16 = 1 << 3;
pub const SEG_TYPE_DATA: u16 = 0 << 3;
pub const SEG_TYPE_TSS: u16 = 9 << 0;
pub const SEG_TYPE_RW: u16 = 1 << 1;

// === Atributos de gate ===

pub const GATE_TYPE_IDT: u16 = 0xE << 8; // interrupt gate de 32 bits
pub const GATE_TYPE_SYSCALL: u16 = 0xC << 8; // call gate de 32 bits
pub const GATE_P_PRESENT: u16 = 1 << 15;
pub const GATE_DPL0: u16 = 0 << 13;
pub const GATE_DPL3: u16 = 3 << 13;

/// Descritor de segmento (8 bytes, layout do hardware).
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct SegmentDesc {
    pub limit15_0: u16,
    pub base15_0: u16,
    pub base23_16: u8,
    pub attr: u16,
    pub base31_24: u8,
}

impl SegmentDesc {
    pub const fn zeroed() -> Self {
        Self {
            limit15_0: 0,
            base15_0: 0,
            base23_16: 0,
            attr: 0,
            base31_24: 0,
        }
    }
}

/// Descritor de gate (call gate na GDT, interrupt gate na IDT).
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct GateDesc {
    pub offset15_0: u16,
    pub selector: u16,
    pub attr: u16,
    pub offset31_16: u16,
}

impl GateDesc {
    pub const fn zeroed() -> Self {
        Self {
            offset15_0: 0,
            selector: 0,
            attr: 0,
            offset31_16: 0,
        }
    }
}

/// Task State Segment de 32 bits.
///
/// O hardware lê e escreve esta estrutura inteira a cada troca de tarefa
/// via far jump para o seletor do TSS (inclui CR3, logo a troca de espaço
/// de endereçamento é automática).
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Tss {
    pub pre_link: u32,
    pub esp0: u32,
    pub ss0: u32,
    pub esp1: u32,
    pub ss1: u32,
    pub esp2: u32,
    pub ss2: u32,
    pub cr3: u32,
    pub eip: u32,
    pub eflags: u32,
    pub eax: u32,
    pub ecx: u32,
    pub edx: u32,
    pub ebx: u32,
    pub esp: u32,
    pub ebp: u32,
    pub esi: u32,
    pub edi: u32,
    pub es: u32,
    pub cs: u32,
    pub ss: u32,
    pub ds: u32,
    pub fs: u32,
    pub gs: u32,
    pub ldt: u32,
    pub iomap: u32,
}

impl Tss {
    pub const fn zeroed() -> Self {
        Self {
            pre_link: 0,
            esp0: 0,
            ss0: 0,
            esp1: 0,
            ss1: 0,
            esp2: 0,
            ss2: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            es: 0,
            cs: 0,
            ss: 0,
            ds: 0,
            fs: 0,
            gs: 0,
            ldt: 0,
            iomap: 0,
        }
    }
}

static mut GDT_TABLE: [SegmentDesc; GDT_TABLE_SIZE] = [SegmentDesc::zeroed(); GDT_TABLE_SIZE];

/// Protege alloc/free de entradas dinâmicas.
static GDT_MUTEX: KMutex = KMutex::new();

fn gdt_table() -> &'static mut [SegmentDesc; GDT_TABLE_SIZE] {
    // SAFETY: mutações concorrentes são serializadas por GDT_MUTEX
    // (alloc/free) ou acontecem no boot, antes de existir concorrência
    unsafe { &mut *core::ptr::addr_of_mut!(GDT_TABLE) }
}

/// Constrói um descritor de segmento na entrada indicada pelo seletor.
///
/// Se `limit` não cabe nos 20 bits, a granularidade vira 4KB e o limite
/// é reescalonado.
pub fn segment_desc_set(selector: u16, base: u32, limit: u32, attr: u16) {
    let desc = &mut gdt_table()[(selector >> 3) as usize];

    let mut attr = attr;
    let mut limit = limit;
    if limit > 0xFFFFF {
        attr |= SEG_G;
        limit /= 0x1000;
    }

    desc.limit15_0 = (limit & 0xFFFF) as u16;
    desc.base15_0 = (base & 0xFFFF) as u16;
    desc.base23_16 = ((base >> 16) & 0xFF) as u8;
    desc.base31_24 = ((base >> 24) & 0xFF) as u8;
    desc.attr = attr | (((limit >> 16) & 0xF) as u16) << 8;
}

/// Constrói um descritor de gate (layout fixo do hardware).
pub fn gate_desc_set(desc: &mut GateDesc, selector: u16, offset: u32, attr: u16) {
    desc.offset15_0 = (offset & 0xFFFF) as u16;
    desc.selector = selector;
    desc.attr = attr;
    desc.offset31_16 = ((offset >> 16) & 0xFFFF) as u16;
}

/// Aloca uma entrada livre da GDT e devolve o seletor (índice * 8).
///
/// A entrada é marcada como presente para reservá-la; o chamador ainda
/// precisa preenchê-la com `segment_desc_set`.
pub fn gdt_alloc_desc() -> SysResult<u16> {
    GDT_MUTEX.lock();

    // Entrada 0 é reservada pela CPU
    let table = gdt_table();
    let mut found = None;
    for i in 1..GDT_TABLE_SIZE {
        if table[i].attr == 0 {
            table[i].attr = SEG_P_PRESENT;
            found = Some(i);
            break;
        }
    }

    GDT_MUTEX.unlock();

    match found {
        Some(i) => Ok((i * core::mem::size_of::<SegmentDesc>()) as u16),
        None => Err(SysError::NoDescriptor),
    }
}

/// Libera a entrada da GDT referenciada pelo seletor (zera o attr).
pub fn gdt_free_sel(selector: u16) {
    GDT_MUTEX.lock();
    gdt_table()[(selector >> 3) as usize].attr = 0;
    GDT_MUTEX.unlock();
}

/// Lê o attr de uma entrada (usado pelos self-tests).
pub fn desc_attr(selector: u16) -> u16 {
    gdt_table()[(selector >> 3) as usize].attr
}

/// Inicializa a GDT: limpa tudo, cria os segmentos fixos do kernel e o
/// call gate de syscall, e recarrega o GDTR.
pub fn init() {
    for i in 0..GDT_TABLE_SIZE {
        segment_desc_set((i << 3) as u16, 0, 0, 0);
    }

    // Código do kernel: flat 4GB, não-conforme, para que o call gate
    // possa elevar o CPL
    segment_desc_set(
        KERNEL_SELECTOR_CS,
        0x00000000,
        0xFFFFFFFF,
        SEG_P_PRESENT | SEG_DPL0 | SEG_S_NORMAL | SEG_TYPE_CODE | SEG_TYPE_RW | SEG_D | SEG_G,
    );

    // Dados do kernel: flat 4GB
    segment_desc_set(
        KERNEL_SELECTOR_DS,
        0x00000000,
        0xFFFFFFFF,
        SEG_P_PRESENT | SEG_DPL0 | SEG_S_NORMAL | SEG_TYPE_DATA | SEG_TYPE_RW | SEG_D | SEG_G,
    );

    // Call gate de syscall: DPL3 (chamável do userspace), 5 parâmetros
    // copiados da pilha do usuário para a pilha do kernel pelo hardware
    let table = gdt_table();
    let gate = unsafe {
        // SAFETY: a entrada do call gate tem o mesmo tamanho/alinhamento
        // de um descritor de segmento; reinterpretamos só esta entrada
        &mut *(core::ptr::addr_of_mut!(table[(SELECTOR_SYSCALL >> 3) as usize]) as *mut GateDesc)
    };
    gate_desc_set(
        gate,
        KERNEL_SELECTOR_CS,
        crate::syscall::exception_handler_syscall as usize as u32,
        GATE_P_PRESENT | GATE_DPL3 | GATE_TYPE_SYSCALL | SYSCALL_PARAM_COUNT as u16,
    );

    // SAFETY: GDT_TABLE é estática, válida para sempre
    unsafe {
        crate::arch::x86::cpu::lgdt(
            core::ptr::addr_of!(GDT_TABLE) as u32,
            core::mem::size_of::<[SegmentDesc; GDT_TABLE_SIZE]>() as u32,
        );
    }
}

/// Troca para a tarefa cujo TSS é `tss_selector` (troca por hardware).
///
/// # Safety
/// O seletor precisa apontar para um descritor de TSS válido e presente.
pub unsafe fn switch_to_tss(tss_selector: u16) {
    crate::arch::x86::cpu::far_jump(tss_selector, 0);
}
