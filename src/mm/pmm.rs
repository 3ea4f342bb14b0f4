//! Alocador físico por bitmap.
//!
//! Um bit por página de 4KB, cobrindo da memória estendida (1MB) até o
//! fim da RAM utilizável. O storage do bitmap fica na área livre após o
//! .bss do kernel (símbolo `mem_free_start` do linker script), ainda
//! dentro do 1MB baixo: 4GB precisariam de só 128KB de bitmap.
//!
//! Não há estrutura de coalescência: o bitmap é a verdade.

use crate::core::boot::BootInfo;
use crate::klib::bitmap::{self, Bitmap};
use crate::klib::align_down;
use crate::mm::config::{MEM_EBDA_START, MEM_EXT_START, MEM_PAGE_SIZE};
use crate::sync::KMutex;

/// Alocador de endereços físicos.
pub struct AddrAlloc {
    mutex: KMutex,
    start: u32,
    size: u32,
    page_size: u32,
    bitmap: Option<Bitmap<'static>>,
}

impl AddrAlloc {
    const fn empty() -> Self {
        Self {
            mutex: KMutex::new(),
            start: 0,
            size: 0,
            page_size: MEM_PAGE_SIZE as u32,
            bitmap: None,
        }
    }

    /// Aloca `count` páginas contíguas; devolve o endereço físico da
    /// primeira, ou 0 se não houver.
    fn alloc_pages(&mut self, count: usize) -> u32 {
        let mut addr = 0;

        self.mutex.lock();
        if let Some(bitmap) = self.bitmap.as_mut() {
            if let Some(index) = bitmap.alloc_nbits(count) {
                addr = self.start + (index as u32) * self.page_size;
            }
        }
        self.mutex.unlock();

        addr
    }

    /// Devolve `count` páginas a partir de `addr`.
    fn free_pages(&mut self, addr: u32, count: usize) {
        self.mutex.lock();
        if let Some(bitmap) = self.bitmap.as_mut() {
            let index = ((addr - self.start) / self.page_size) as usize;
            bitmap.set_range(index, count, false);
        }
        self.mutex.unlock();
    }
}

static mut PADDR_ALLOC: AddrAlloc = AddrAlloc::empty();

fn paddr_alloc() -> &'static mut AddrAlloc {
    // SAFETY: o AddrAlloc serializa o acesso internamente com o mutex
    unsafe { &mut *core::ptr::addr_of_mut!(PADDR_ALLOC) }
}

/// Aloca `count` páginas físicas contíguas (0 = sem memória).
pub fn alloc_pages(count: usize) -> u32 {
    paddr_alloc().alloc_pages(count)
}

/// Aloca uma página física.
pub fn alloc_page() -> u32 {
    alloc_pages(1)
}

/// Libera `count` páginas a partir de `addr`.
pub fn free_pages(addr: u32, count: usize) {
    paddr_alloc().free_pages(addr, count)
}

/// Libera uma página.
pub fn free_page(addr: u32) {
    free_pages(addr, 1)
}

/// Quantas páginas o bitmap rastreia (para diagnósticos e testes).
pub fn total_pages() -> usize {
    let alloc = paddr_alloc();
    (alloc.size / alloc.page_size) as usize
}

fn show_mem_info(boot_info: &BootInfo) {
    crate::kinfo!("regiões de RAM:", boot_info.ram_region_count as u64);
    for i in 0..boot_info.ram_region_count as usize {
        let region = &boot_info.ram_region_cfg[i];
        crate::kinfo!("  início:", region.start as u64);
        crate::kinfo!("  tamanho:", region.size as u64);
    }
}

/// Inicializa o alocador físico a partir do mapa de RAM do loader.
pub fn init(boot_info: &BootInfo) {
    extern "C" {
        static mut mem_free_start: u8;
    }

    show_mem_info(boot_info);

    // Memória livre acima de 1MB, alinhada para baixo na página
    let up1mb_free = align_down(
        (boot_info.total_ram_size() - MEM_EXT_START) as usize,
        MEM_PAGE_SIZE,
    ) as u32;
    crate::kinfo!("memória livre a partir de 1MB:", up1mb_free as u64);

    let pages = (up1mb_free / MEM_PAGE_SIZE as u32) as usize;
    let words = bitmap::word_count(pages);

    // SAFETY: mem_free_start..EBDA é reservado pelo linker script para
    // o bitmap; words cabe em 128KB por construção
    let storage = unsafe {
        let base = core::ptr::addr_of_mut!(mem_free_start) as *mut u32;
        assert!((base as u32) + ((words * 4) as u32) < MEM_EBDA_START);
        core::slice::from_raw_parts_mut(base, words)
    };

    let alloc = paddr_alloc();
    alloc.start = MEM_EXT_START;
    alloc.size = up1mb_free;
    alloc.page_size = MEM_PAGE_SIZE as u32;
    alloc.bitmap = Some(Bitmap::new(storage, pages));

    crate::kinfo!("(Pmm) páginas rastreadas:", total_pages() as u64);
}
