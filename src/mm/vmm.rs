//! Tabelas de página e espaços de endereçamento por processo.
//!
//! O kernel ocupa a metade baixa do espaço virtual e é espelhado no
//! diretório de todo processo (cópia direta das entradas de primeiro
//! nível), então traps continuam válidos em qualquer CR3. Como a RAM
//! estendida (1MB..128MB) é identidade-mapeada, endereços físicos de
//! tabelas e páginas podem ser dereferenciados diretamente pelo kernel.

use crate::arch::x86::mmu::{
    pde_index, pte_index, Pde, Pte, PDE_CNT, PTE_CNT, PTE_P, PTE_U, PTE_W,
};
use crate::klib::{align_down, align_up};
use crate::mm::config::{
    CONSOLE_DISP_END, CONSOLE_VIDEO_BASE, MEMORY_TASK_BASE, MEM_EBDA_START, MEM_EXT_END,
    MEM_EXT_START, MEM_PAGE_SIZE,
};
use crate::mm::pmm;
use crate::sched::manager;
use crate::sys::error::{SysError, SysResult};

/// Diretório de páginas do kernel, estático e alinhado em página.
#[repr(C, align(4096))]
struct PageDirStorage([Pde; PDE_CNT]);

static mut KERNEL_PAGE_DIR: PageDirStorage = PageDirStorage([Pde(0); PDE_CNT]);

fn kernel_page_dir() -> &'static mut [Pde; PDE_CNT] {
    // SAFETY: só é mutado durante o init, single-threaded
    unsafe { &mut (*core::ptr::addr_of_mut!(KERNEL_PAGE_DIR)).0 }
}

/// Uma linha da tabela de mapeamento do kernel.
struct MemoryMap {
    vstart: u32,
    vend: u32,
    pstart: u32,
    perm: u32,
}

/// Diretório da task corrente (CR3 dela).
fn current_page_dir() -> u32 {
    manager::current_id()
        .map(|id| manager::task(id).tss.cr3)
        .unwrap_or_else(|| core::ptr::addr_of!(KERNEL_PAGE_DIR) as u32)
}

/// Acha (ou cria, se `alloc`) a PTE de `vaddr` no diretório dado.
fn find_pte(page_dir: u32, vaddr: u32, alloc: bool) -> Option<*mut Pte> {
    // SAFETY: page_dir é físico identidade-mapeado; índice < 1024
    let pde = unsafe { &mut *(page_dir as *mut Pde).add(pde_index(vaddr)) };

    let pte_table = if pde.present() {
        pde.paddr() as *mut Pte
    } else {
        if !alloc {
            return None;
        }

        // Tabela de segundo nível nova (1024 entradas numa página)
        let table_paddr = pmm::alloc_page();
        if table_paddr == 0 {
            return None;
        }

        pde.0 = table_paddr | PTE_P | PTE_W | PTE_U;

        // SAFETY: página recém alocada, identidade-mapeada
        unsafe {
            core::ptr::write_bytes(table_paddr as *mut u8, 0, MEM_PAGE_SIZE);
        }
        table_paddr as *mut Pte
    };

    // SAFETY: tabela válida; índice < 1024
    Some(unsafe { pte_table.add(pte_index(vaddr)) })
}

/// Mapeia `count` páginas consecutivas a partir de (vaddr, paddr).
fn memory_create_map(page_dir: u32, vaddr: u32, paddr: u32, count: usize, perm: u32) -> SysResult<()> {
    let mut vaddr = vaddr;
    let mut paddr = paddr;

    for _ in 0..count {
        let pte = find_pte(page_dir, vaddr, true).ok_or(SysError::OutOfMemory)?;

        // SAFETY: find_pte devolve ponteiro válido dentro da tabela
        unsafe {
            // A entrada não pode existir ainda; se existe, a tabela
            // está corrompida
            debug_assert!(!(*pte).present());
            *pte = Pte(paddr | perm | PTE_P);
        }

        vaddr += MEM_PAGE_SIZE as u32;
        paddr += MEM_PAGE_SIZE as u32;
    }

    Ok(())
}

/// Constrói a tabela de páginas do kernel a partir do mapa estático:
/// pilha de boot, texto (só leitura), dados, VGA e a RAM estendida
/// identidade-mapeada.
fn create_kernel_table() {
    extern "C" {
        static kernel_base: u8;
        static s_text: u8;
        static e_text: u8;
        static s_data: u8;
    }

    // SAFETY: símbolos de layout definidos no linker script
    let (kbase, stext, etext, sdata) = unsafe {
        (
            core::ptr::addr_of!(kernel_base) as u32,
            core::ptr::addr_of!(s_text) as u32,
            core::ptr::addr_of!(e_text) as u32,
            core::ptr::addr_of!(s_data) as u32,
        )
    };

    let kernel_map = [
        // Área baixa (pilha de boot e estruturas do loader)
        MemoryMap {
            vstart: kbase,
            vend: stext,
            pstart: 0,
            perm: PTE_W,
        },
        // Texto do kernel: só leitura
        MemoryMap {
            vstart: stext,
            vend: etext,
            pstart: stext,
            perm: 0,
        },
        // Dados e bss do kernel, até a EBDA
        MemoryMap {
            vstart: sdata,
            vend: MEM_EBDA_START - 1,
            pstart: sdata,
            perm: PTE_W,
        },
        // Memória de vídeo (console de texto)
        MemoryMap {
            vstart: CONSOLE_VIDEO_BASE,
            vend: CONSOLE_DISP_END - 1,
            pstart: CONSOLE_VIDEO_BASE,
            perm: PTE_W,
        },
        // RAM estendida identidade-mapeada (1MB..128MB)
        MemoryMap {
            vstart: MEM_EXT_START,
            vend: MEM_EXT_END,
            pstart: MEM_EXT_START,
            perm: PTE_W,
        },
    ];

    let dir = core::ptr::addr_of!(KERNEL_PAGE_DIR) as u32;
    for map in &kernel_map {
        let vstart = align_down(map.vstart as usize, MEM_PAGE_SIZE) as u32;
        let vend = align_up(map.vend as usize, MEM_PAGE_SIZE) as u32;
        let pstart = align_down(map.pstart as usize, MEM_PAGE_SIZE) as u32;
        let page_count = ((vend - vstart) as usize) / MEM_PAGE_SIZE;

        memory_create_map(dir, vstart, pstart, page_count, map.perm)
            .expect("sem memória para a tabela do kernel");
    }
}

/// Inicializa o VMM: tabela do kernel no lugar da do loader.
pub fn init() {
    for pde in kernel_page_dir().iter_mut() {
        *pde = Pde(0);
    }

    create_kernel_table();

    // SAFETY: a tabela recém construída mapeia o kernel inteiro
    unsafe {
        crate::arch::x86::mmu::set_page_dir(core::ptr::addr_of!(KERNEL_PAGE_DIR) as u32);
    }
}

/// Cria o espaço de endereçamento inicial de um processo: um diretório
/// novo com a metade do kernel copiada (compartilhada com todos).
/// Devolve o endereço físico do diretório, ou 0 sem memória.
pub fn memory_create_uvm() -> u32 {
    let page_dir = pmm::alloc_page();
    if page_dir == 0 {
        return 0;
    }

    // SAFETY: página recém alocada, identidade-mapeada
    unsafe {
        core::ptr::write_bytes(page_dir as *mut u8, 0, MEM_PAGE_SIZE);
    }

    let user_pde_start = pde_index(MEMORY_TASK_BASE);
    let kernel_dir = kernel_page_dir();
    for i in 0..user_pde_start {
        // SAFETY: diretório novo identidade-mapeado; i < 1024
        unsafe {
            *(page_dir as *mut Pde).add(i) = kernel_dir[i];
        }
    }

    page_dir
}

/// Destrói o espaço de usuário de um processo: páginas folha, tabelas
/// de segundo nível e o diretório. A metade do kernel é compartilhada
/// e fica intacta.
pub fn memory_destroy_uvm(page_dir: u32) {
    debug_assert!(page_dir != 0);

    let user_pde_start = pde_index(MEMORY_TASK_BASE);
    for i in user_pde_start..PDE_CNT {
        // SAFETY: diretório válido identidade-mapeado
        let pde = unsafe { &*(page_dir as *const Pde).add(i) };
        if !pde.present() {
            continue;
        }

        for j in 0..PTE_CNT {
            // SAFETY: tabela apontada por PDE presente
            let pte = unsafe { &*(pde.paddr() as *const Pte).add(j) };
            if pte.present() {
                pmm::free_page(pte.paddr());
            }
        }

        pmm::free_page(pde.paddr());
    }

    pmm::free_page(page_dir);
}

/// Clona o espaço de usuário inteiro (fork): para cada página presente,
/// aloca uma página nova, copia os 4KB e instala o mapeamento com as
/// mesmas permissões no mesmo endereço virtual. Cópia ansiosa: não há
/// copy-on-write. Devolve o diretório novo, ou 0 em falha (já desfeito).
pub fn memory_copy_uvm(page_dir: u32) -> u32 {
    let to_page_dir = memory_create_uvm();
    if to_page_dir == 0 {
        return 0;
    }

    let user_pde_start = pde_index(MEMORY_TASK_BASE);
    for i in user_pde_start..PDE_CNT {
        // SAFETY: diretório de origem válido identidade-mapeado
        let pde = unsafe { &*(page_dir as *const Pde).add(i) };
        if !pde.present() {
            continue;
        }

        for j in 0..PTE_CNT {
            // SAFETY: tabela apontada por PDE presente
            let pte = unsafe { &*(pde.paddr() as *const Pte).add(j) };
            if !pte.present() {
                continue;
            }

            let page = pmm::alloc_page();
            if page == 0 {
                memory_destroy_uvm(to_page_dir);
                return 0;
            }

            let vaddr = ((i as u32) << 22) | ((j as u32) << 12);
            if memory_create_map(to_page_dir, vaddr, page, 1, pte.perm()).is_err() {
                pmm::free_page(page);
                memory_destroy_uvm(to_page_dir);
                return 0;
            }

            // O diretório de origem está ativo, então o conteúdo é
            // legível pelo endereço virtual; o destino, pelo físico
            // SAFETY: origem mapeada no CR3 corrente, destino recém
            // alocado e identidade-mapeado
            unsafe {
                core::ptr::copy_nonoverlapping(
                    vaddr as *const u8,
                    page as *mut u8,
                    MEM_PAGE_SIZE,
                );
            }
        }
    }

    to_page_dir
}

/// Traduz `vaddr` no diretório dado; 0 se não estiver mapeado.
pub fn memory_get_paddr(page_dir: u32, vaddr: u32) -> u32 {
    match find_pte(page_dir, vaddr, false) {
        // SAFETY: ponteiro devolvido por find_pte é válido
        Some(pte) => unsafe {
            if (*pte).present() {
                (*pte).paddr() + (vaddr & (MEM_PAGE_SIZE as u32 - 1))
            } else {
                0
            }
        },
        None => 0,
    }
}

/// Copia dados do espaço corrente para outro espaço de endereçamento.
///
/// `to` é um endereço virtual em `page_dir` (que NÃO é o corrente);
/// `from` é um endereço legível no espaço corrente. A cópia é feita
/// traduzindo cada página destino para o físico, respeitando as
/// fronteiras de página.
pub fn memory_copy_uvm_data(to: u32, page_dir: u32, from: u32, size: u32) -> SysResult<()> {
    let mut to = to;
    let mut from = from;
    let mut size = size;

    while size > 0 {
        let to_paddr = memory_get_paddr(page_dir, to);
        if to_paddr == 0 {
            return Err(SysError::BadAddress);
        }

        let offset_in_page = to_paddr & (MEM_PAGE_SIZE as u32 - 1);
        let mut curr_size = MEM_PAGE_SIZE as u32 - offset_in_page;
        if curr_size > size {
            curr_size = size;
        }

        // SAFETY: to_paddr identidade-mapeado; from legível no espaço
        // corrente; tamanho limitado à página
        unsafe {
            core::ptr::copy_nonoverlapping(
                from as *const u8,
                to_paddr as *mut u8,
                curr_size as usize,
            );
        }

        size -= curr_size;
        to += curr_size;
        from += curr_size;
    }

    Ok(())
}

/// Aloca e mapeia páginas novas para [vaddr, vaddr+size) no diretório
/// dado. Em falha, desfaz o que já tinha sido mapeado por esta chamada.
pub fn memory_alloc_for_page_dir(page_dir: u32, vaddr: u32, size: u32, perm: u32) -> SysResult<()> {
    let vaddr = align_down(vaddr as usize, MEM_PAGE_SIZE) as u32;
    let page_count = align_up(size as usize, MEM_PAGE_SIZE) / MEM_PAGE_SIZE;

    let mut curr_vaddr = vaddr;
    for i in 0..page_count {
        let paddr = pmm::alloc_page();
        if paddr == 0 {
            unwind_mapped_range(page_dir, vaddr, i);
            return Err(SysError::OutOfMemory);
        }

        if memory_create_map(page_dir, curr_vaddr, paddr, 1, perm).is_err() {
            pmm::free_page(paddr);
            unwind_mapped_range(page_dir, vaddr, i);
            return Err(SysError::OutOfMemory);
        }

        curr_vaddr += MEM_PAGE_SIZE as u32;
    }

    Ok(())
}

/// Desfaz os `count` primeiros mapeamentos de uma alocação parcial.
fn unwind_mapped_range(page_dir: u32, vaddr: u32, count: usize) {
    let mut curr = vaddr;
    for _ in 0..count {
        if let Some(pte) = find_pte(page_dir, curr, false) {
            // SAFETY: ponteiro devolvido por find_pte é válido
            unsafe {
                if (*pte).present() {
                    pmm::free_page((*pte).paddr());
                    *pte = Pte(0);
                }
            }
        }
        curr += MEM_PAGE_SIZE as u32;
    }
}

/// Aloca páginas no espaço do processo corrente.
pub fn memory_alloc_page_for(vaddr: u32, size: u32, perm: u32) -> SysResult<()> {
    memory_alloc_for_page_dir(current_page_dir(), vaddr, size, perm)
}

/// Libera uma página: no espaço do kernel direto no alocador; no espaço
/// do processo também limpa a PTE.
pub fn memory_free_page(addr: u32) {
    if addr < MEMORY_TASK_BASE {
        pmm::free_page(addr);
    } else {
        let pte = find_pte(current_page_dir(), addr, false);
        debug_assert!(pte.is_some());
        if let Some(pte) = pte {
            // SAFETY: ponteiro devolvido por find_pte é válido
            unsafe {
                if (*pte).present() {
                    pmm::free_page((*pte).paddr());
                    *pte = Pte(0);
                }
            }
        }
    }
}

/// `sbrk`: estende o heap do processo corrente em `incr` bytes.
///
/// Devolve o heap_end ANTERIOR. `incr == 0` só consulta. As páginas
/// novas só são alocadas quando o incremento cruza fronteira de página.
/// Encolher o heap (incr negativo) fica de fora.
pub fn sys_sbrk(incr: i32) -> SysResult<u32> {
    let curr = manager::current_id().ok_or(SysError::InvalidArgument)?;
    let task = manager::task(curr);
    let pre_heap_end = task.heap_end;

    if incr < 0 {
        return Err(SysError::InvalidArgument);
    }
    if incr == 0 {
        return Ok(pre_heap_end);
    }

    let mut incr = incr as u32;
    let mut start = task.heap_end;
    let end = start + incr;

    let start_offset = start % MEM_PAGE_SIZE as u32;
    if start_offset != 0 {
        if start_offset + incr <= MEM_PAGE_SIZE as u32 {
            // Ainda cabe na página corrente: só move a fronteira
            task.heap_end = end;
            return Ok(pre_heap_end);
        } else {
            // Completa a página corrente e trata o resto abaixo
            let curr_size = MEM_PAGE_SIZE as u32 - start_offset;
            start += curr_size;
            incr -= curr_size;
        }
    }

    if incr > 0 {
        memory_alloc_page_for(start, end - start, PTE_P | PTE_U | PTE_W)?;
    }

    task.heap_end = end;
    Ok(pre_heap_end)
}
