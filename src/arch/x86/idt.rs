//! IDT, trampolins de exceção e política de tratamento.
//!
//! Todo vetor passa por um stub naked que completa a pilha no layout
//! fixo de `ExceptionFrame` (empurra error code falso quando o hardware
//! não fornece, depois o número do vetor) e salta para o trampolim
//! comum, que salva registradores e chama o handler tipado registrado
//! na tabela.
//!
//! Política default: loga o frame e
//! - CS de kernel => bug de kernel, trava a CPU para sempre;
//! - CS de usuário => mata a task faltosa com `sys_exit(error_code)`.

use crate::arch::x86::cpu;
use crate::arch::x86::gdt::{
    gate_desc_set, GateDesc, GATE_DPL0, GATE_DPL3, GATE_P_PRESENT, GATE_TYPE_IDT,
};
use crate::core::config::KERNEL_SELECTOR_CS;
use crate::sys::error::{SysError, SysResult};

/// Quantidade de vetores da IDT.
pub const IDT_TABLE_NR: usize = 256;

// Vetores de exceção da CPU
pub const IRQ0_DE: usize = 0; // Divide Error
pub const IRQ1_DB: usize = 1; // Debug
pub const IRQ2_NMI: usize = 2;
pub const IRQ3_BP: usize = 3; // Breakpoint
pub const IRQ4_OF: usize = 4; // Overflow
pub const IRQ5_BR: usize = 5; // BOUND Range
pub const IRQ6_UD: usize = 6; // Invalid Opcode
pub const IRQ7_NM: usize = 7; // Device Not Available
pub const IRQ8_DF: usize = 8; // Double Fault
pub const IRQ10_TS: usize = 10; // Invalid TSS
pub const IRQ11_NP: usize = 11; // Segment Not Present
pub const IRQ12_SS: usize = 12; // Stack-Segment Fault
pub const IRQ13_GP: usize = 13; // General Protection
pub const IRQ14_PF: usize = 14; // Page Fault
pub const IRQ16_MF: usize = 16; // x87 FPU Error
pub const IRQ17_AC: usize = 17; // Alignment Check
pub const IRQ18_MC: usize = 18; // Machine Check
pub const IRQ19_XM: usize = 19; // SIMD FP Exception
pub const IRQ20_VE: usize = 20; // Virtualization Exception

// Vetores de hardware (depois do remapeamento do PIC)
pub const IRQ0_TIMER: usize = 0x20;
pub const IRQ1_KEYBOARD: usize = 0x21;

/// Vetor da syscall por interrupção de software.
pub const IRQ80_SYSCALL: usize = 0x80;

// Bits do error code de #GP
pub const ERR_EXT: u32 = 1 << 0;
pub const ERR_IDT: u32 = 1 << 1;

// Bits do error code de #PF
pub const ERR_PAGE_P: u32 = 1 << 0;
pub const ERR_PAGE_WR: u32 = 1 << 1;
pub const ERR_PAGE_US: u32 = 1 << 2;

/// Frame que os handlers tipados enxergam (endereço baixo primeiro).
///
/// `esp3`/`ss3` só são válidos quando a falha veio de CPL3 (o hardware
/// só os empilha na troca de privilégio).
#[repr(C)]
pub struct ExceptionFrame {
    // empilhados pelo trampolim comum
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,
    // pushad
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    // empilhados pelo stub do vetor
    pub num: u32,
    pub error_code: u32,
    // empilhados pelo hardware
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub esp3: u32,
    pub ss3: u32,
}

impl ExceptionFrame {
    /// A falha veio de código rodando em CPL3?
    #[inline]
    pub fn from_user(&self) -> bool {
        (self.cs & 0x3) != 0
    }
}

/// Handler tipado de um vetor.
pub type IrqHandler = fn(&mut ExceptionFrame);

/// Stub naked de entrada de um vetor (vai na IDT).
pub type IrqEntry = unsafe extern "C" fn();

static mut IDT_TABLE: [GateDesc; IDT_TABLE_NR] = [GateDesc::zeroed(); IDT_TABLE_NR];
static mut HANDLER_TABLE: [Option<IrqHandler>; IDT_TABLE_NR] = [None; IDT_TABLE_NR];

fn idt_table() -> &'static mut [GateDesc; IDT_TABLE_NR] {
    // SAFETY: mutações só no boot e em irq_install (com interrupções
    // ainda mascaradas para o vetor em questão)
    unsafe { &mut *core::ptr::addr_of_mut!(IDT_TABLE) }
}

fn handler_table() -> &'static mut [Option<IrqHandler>; IDT_TABLE_NR] {
    // SAFETY: idem IDT_TABLE
    unsafe { &mut *core::ptr::addr_of_mut!(HANDLER_TABLE) }
}

// ============================================================================
// Trampolins
// ============================================================================

/// Trampolim comum: completa o `ExceptionFrame`, troca para os
/// segmentos de dados do kernel, chama o dispatcher e restaura tudo.
#[naked]
unsafe extern "C" fn exception_common() {
    core::arch::asm!(
        "pushad",
        "push ds",
        "push es",
        "push fs",
        "push gs",
        "mov ax, {kds}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "mov eax, esp",
        "push eax",
        "call {dispatch}",
        "add esp, 4",
        "pop gs",
        "pop fs",
        "pop es",
        "pop ds",
        "popad",
        "add esp, 8", // descarta num + error_code
        "iretd",
        kds = const crate::core::config::KERNEL_SELECTOR_DS,
        dispatch = sym dispatch_exception,
        options(noreturn)
    );
}

/// Gera o stub naked de um vetor. A variante `err` é para os vetores em
/// que o próprio hardware empilha o error code.
macro_rules! exception_entry {
    ($name:ident, $vector:expr) => {
        #[naked]
        pub unsafe extern "C" fn $name() {
            core::arch::asm!(
                "push 0", // error code falso
                "push {vec}",
                "jmp {common}",
                vec = const $vector,
                common = sym exception_common,
                options(noreturn)
            );
        }
    };
    ($name:ident, $vector:expr, err) => {
        #[naked]
        pub unsafe extern "C" fn $name() {
            core::arch::asm!(
                "push {vec}",
                "jmp {common}",
                vec = const $vector,
                common = sym exception_common,
                options(noreturn)
            );
        }
    };
}

exception_entry!(entry_unknown, -1);
exception_entry!(entry_divider, 0);
exception_entry!(entry_debug, 1);
exception_entry!(entry_nmi, 2);
exception_entry!(entry_breakpoint, 3);
exception_entry!(entry_overflow, 4);
exception_entry!(entry_bound_range, 5);
exception_entry!(entry_invalid_opcode, 6);
exception_entry!(entry_device_unavailable, 7);
exception_entry!(entry_double_fault, 8, err);
exception_entry!(entry_invalid_tss, 10, err);
exception_entry!(entry_segment_not_present, 11, err);
exception_entry!(entry_stack_segment_fault, 12, err);
exception_entry!(entry_general_protection, 13, err);
exception_entry!(entry_page_fault, 14, err);
exception_entry!(entry_fpu_error, 16);
exception_entry!(entry_alignment_check, 17, err);
exception_entry!(entry_machine_check, 18);
exception_entry!(entry_simd_exception, 19);
exception_entry!(entry_virtual_exception, 20);
exception_entry!(entry_timer, 0x20);
exception_entry!(entry_keyboard, 0x21);
exception_entry!(entry_syscall, 0x80);

/// Dispatcher chamado pelo trampolim com o ponteiro do frame.
extern "C" fn dispatch_exception(frame: *mut ExceptionFrame) {
    // SAFETY: o trampolim acabou de montar o frame nesta pilha
    let frame = unsafe { &mut *frame };

    let handler = if (frame.num as usize) < IDT_TABLE_NR {
        handler_table()[frame.num as usize]
    } else {
        None
    };

    match handler {
        Some(handler) => handler(frame),
        None => do_handler_unknown(frame),
    }
}

// ============================================================================
// Handlers de exceção
// ============================================================================

fn dump_core_regs(frame: &ExceptionFrame) {
    use crate::core::debug::klog::{log_fmt, LogLevel};

    let (ss, esp) = if frame.from_user() {
        (frame.ss3, frame.esp3)
    } else {
        (frame.ds, frame.esp)
    };

    log_fmt(
        LogLevel::Error,
        format_args!("IRQ: {}, error code: {:#x}", frame.num as i32, frame.error_code),
    );
    log_fmt(
        LogLevel::Error,
        format_args!(
            "CS: {:#x} DS: {:#x} ES: {:#x} SS: {:#x} FS: {:#x} GS: {:#x}",
            frame.cs, frame.ds, frame.es, ss, frame.fs, frame.gs
        ),
    );
    log_fmt(
        LogLevel::Error,
        format_args!(
            "EAX: {:#010x} EBX: {:#010x} ECX: {:#010x} EDX: {:#010x}",
            frame.eax, frame.ebx, frame.ecx, frame.edx
        ),
    );
    log_fmt(
        LogLevel::Error,
        format_args!(
            "EDI: {:#010x} ESI: {:#010x} EBP: {:#010x} ESP: {:#010x}",
            frame.edi, frame.esi, frame.ebp, esp
        ),
    );
    log_fmt(
        LogLevel::Error,
        format_args!("EIP: {:#010x} EFLAGS: {:#010x}", frame.eip, frame.eflags),
    );
}

/// Política terminal: kernel trava, usuário morre com o error code.
fn fail_or_exit(frame: &ExceptionFrame) -> ! {
    if frame.from_user() {
        crate::sched::process::sys_exit(frame.error_code as i32);
    }

    // Exceção em modo kernel é bug de kernel; nada a recuperar
    loop {
        cpu::hlt();
    }
}

fn do_default_handler(frame: &mut ExceptionFrame, message: &str) {
    crate::kerror!("--------------------------------");
    crate::kerror!("exceção:");
    crate::kerror!(message);
    dump_core_regs(frame);
    crate::kerror!("--------------------------------");

    fail_or_exit(frame);
}

fn do_handler_unknown(frame: &mut ExceptionFrame) {
    do_default_handler(frame, "Unknown exception");
}

fn do_handler_divider(frame: &mut ExceptionFrame) {
    do_default_handler(frame, "Divide Error");
}

fn do_handler_debug(frame: &mut ExceptionFrame) {
    do_default_handler(frame, "Debug Exception");
}

fn do_handler_nmi(frame: &mut ExceptionFrame) {
    do_default_handler(frame, "NMI Interrupt");
}

fn do_handler_breakpoint(frame: &mut ExceptionFrame) {
    do_default_handler(frame, "Breakpoint");
}

fn do_handler_overflow(frame: &mut ExceptionFrame) {
    do_default_handler(frame, "Overflow");
}

fn do_handler_bound_range(frame: &mut ExceptionFrame) {
    do_default_handler(frame, "BOUND Range Exceeded");
}

fn do_handler_invalid_opcode(frame: &mut ExceptionFrame) {
    do_default_handler(frame, "Invalid Opcode");
}

fn do_handler_device_unavailable(frame: &mut ExceptionFrame) {
    do_default_handler(frame, "Device Not Available");
}

fn do_handler_double_fault(frame: &mut ExceptionFrame) {
    do_default_handler(frame, "Double Fault");
}

fn do_handler_invalid_tss(frame: &mut ExceptionFrame) {
    do_default_handler(frame, "Invalid TSS");
}

fn do_handler_segment_not_present(frame: &mut ExceptionFrame) {
    do_default_handler(frame, "Segment Not Present");
}

fn do_handler_stack_segment_fault(frame: &mut ExceptionFrame) {
    do_default_handler(frame, "Stack-Segment Fault");
}

/// #GP com decodificação do error code: origem (externa ou software) e
/// a tabela do seletor envolvido.
fn do_handler_general_protection(frame: &mut ExceptionFrame) {
    crate::kerror!("--------------------------------");
    crate::kerror!("exceção: General Protection");

    if frame.error_code & ERR_EXT != 0 {
        crate::kerror!("origem: evento externo (interrupt ou exceção anterior)");
    } else {
        crate::kerror!("origem: interrupção de software (INT n / INT3 / INTO)");
    }

    if frame.error_code & ERR_IDT != 0 {
        crate::kerror!("o índice do error code refere um gate da IDT");
    } else {
        crate::kerror!("o índice refere um descritor da GDT");
    }

    crate::kerror!("índice do seletor:", (frame.error_code & 0xFFF8) as u64);

    dump_core_regs(frame);
    fail_or_exit(frame);
}

/// #PF com CR2 e os bits do error code. Sem demand paging nem COW,
/// todo page fault é terminal.
fn do_handler_page_fault(frame: &mut ExceptionFrame) {
    crate::kerror!("--------------------------------");
    crate::kerror!("exceção: Page Fault");

    let fault_addr = cpu::read_cr2();

    if frame.error_code & ERR_PAGE_P != 0 {
        crate::kerror!("violação de proteção de página em:", fault_addr as u64);
    } else {
        crate::kerror!("página não presente em:", fault_addr as u64);
    }

    if frame.error_code & ERR_PAGE_WR != 0 {
        crate::kerror!("acesso de escrita");
    } else {
        crate::kerror!("acesso de leitura/execução");
    }

    if frame.error_code & ERR_PAGE_US != 0 {
        crate::kerror!("acesso em modo usuário");
    } else {
        crate::kerror!("acesso em modo supervisor");
    }

    dump_core_regs(frame);
    fail_or_exit(frame);
}

fn do_handler_fpu_error(frame: &mut ExceptionFrame) {
    do_default_handler(frame, "x87 FPU Floating Point Error");
}

fn do_handler_alignment_check(frame: &mut ExceptionFrame) {
    do_default_handler(frame, "Alignment Check");
}

fn do_handler_machine_check(frame: &mut ExceptionFrame) {
    do_default_handler(frame, "Machine Check");
}

fn do_handler_simd_exception(frame: &mut ExceptionFrame) {
    do_default_handler(frame, "SIMD Floating Point Exception");
}

fn do_handler_virtual_exception(frame: &mut ExceptionFrame) {
    do_default_handler(frame, "Virtualization Exception");
}

// ============================================================================
// Instalação
// ============================================================================

fn set_gate(vector: usize, entry: IrqEntry, attr: u16) {
    gate_desc_set(
        &mut idt_table()[vector],
        KERNEL_SELECTOR_CS,
        entry as usize as u32,
        attr,
    );
}

/// Registra um vetor: gate na IDT (DPL0) + handler tipado.
pub fn irq_install(vector: usize, entry: IrqEntry, handler: IrqHandler) -> SysResult<()> {
    if vector >= IDT_TABLE_NR {
        return Err(SysError::InvalidArgument);
    }

    handler_table()[vector] = Some(handler);
    set_gate(vector, entry, GATE_P_PRESENT | GATE_DPL0 | GATE_TYPE_IDT);
    Ok(())
}

/// Monta a IDT inteira: default em tudo, handlers específicos nas
/// exceções, int 0x80 com DPL3, e carrega o IDTR.
pub fn init() {
    for vector in 0..IDT_TABLE_NR {
        set_gate(
            vector,
            entry_unknown,
            GATE_P_PRESENT | GATE_DPL0 | GATE_TYPE_IDT,
        );
    }

    let _ = irq_install(IRQ0_DE, entry_divider, do_handler_divider);
    let _ = irq_install(IRQ1_DB, entry_debug, do_handler_debug);
    let _ = irq_install(IRQ2_NMI, entry_nmi, do_handler_nmi);
    let _ = irq_install(IRQ3_BP, entry_breakpoint, do_handler_breakpoint);
    let _ = irq_install(IRQ4_OF, entry_overflow, do_handler_overflow);
    let _ = irq_install(IRQ5_BR, entry_bound_range, do_handler_bound_range);
    let _ = irq_install(IRQ6_UD, entry_invalid_opcode, do_handler_invalid_opcode);
    let _ = irq_install(IRQ7_NM, entry_device_unavailable, do_handler_device_unavailable);
    let _ = irq_install(IRQ8_DF, entry_double_fault, do_handler_double_fault);
    let _ = irq_install(IRQ10_TS, entry_invalid_tss, do_handler_invalid_tss);
    let _ = irq_install(IRQ11_NP, entry_segment_not_present, do_handler_segment_not_present);
    let _ = irq_install(IRQ12_SS, entry_stack_segment_fault, do_handler_stack_segment_fault);
    let _ = irq_install(IRQ13_GP, entry_general_protection, do_handler_general_protection);
    let _ = irq_install(IRQ14_PF, entry_page_fault, do_handler_page_fault);
    let _ = irq_install(IRQ16_MF, entry_fpu_error, do_handler_fpu_error);
    let _ = irq_install(IRQ17_AC, entry_alignment_check, do_handler_alignment_check);
    let _ = irq_install(IRQ18_MC, entry_machine_check, do_handler_machine_check);
    let _ = irq_install(IRQ19_XM, entry_simd_exception, do_handler_simd_exception);
    let _ = irq_install(IRQ20_VE, entry_virtual_exception, do_handler_virtual_exception);

    // int 0x80 precisa de DPL3 para ser invocável do userspace
    handler_table()[IRQ80_SYSCALL] = Some(crate::syscall::do_handler_syscall_irq);
    set_gate(
        IRQ80_SYSCALL,
        entry_syscall,
        GATE_P_PRESENT | GATE_DPL3 | GATE_TYPE_IDT,
    );

    // SAFETY: IDT_TABLE é estática, válida para sempre
    unsafe {
        cpu::lidt(
            core::ptr::addr_of!(IDT_TABLE) as u32,
            core::mem::size_of::<[GateDesc; IDT_TABLE_NR]>() as u32,
        );
    }
}
