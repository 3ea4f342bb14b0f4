//! Testes do subsistema de memória.
//!
//! Rodam depois do mm::init, com o alocador físico vivo de verdade:
//! os round-trips abaixo provam que alocar e liberar devolve o bitmap
//! ao estado anterior.

use crate::arch::x86::mmu::{pde_index, pte_index, Pte, PTE_P, PTE_U, PTE_W};
use crate::klib::test_framework::{run_test_suite, TestCase, TestResult};
use crate::mm::config::{MEMORY_TASK_BASE, MEM_PAGE_SIZE};
use crate::mm::{pmm, vmm};
use crate::{kassert, kassert_eq};

const MM_TESTS: &[TestCase] = &[
    TestCase::new("page_alloc_roundtrip", test_page_alloc_roundtrip),
    TestCase::new("page_alloc_contiguous", test_page_alloc_contiguous),
    TestCase::new("mmu_index_math", test_mmu_index_math),
    TestCase::new("uvm_create_destroy", test_uvm_create_destroy),
];

pub fn run_memory_tests() {
    run_test_suite("Memória", MM_TESTS);
}

/// Liberar uma página a recoloca como a menor livre.
fn test_page_alloc_roundtrip() -> TestResult {
    let first = pmm::alloc_page();
    kassert!(first != 0);
    kassert_eq!(first as usize % MEM_PAGE_SIZE, 0);

    pmm::free_page(first);

    let second = pmm::alloc_page();
    kassert_eq!(second, first);
    pmm::free_page(second);

    TestResult::Pass
}

fn test_page_alloc_contiguous() -> TestResult {
    let base = pmm::alloc_pages(4);
    kassert!(base != 0);

    // As quatro páginas saem em sequência; uma alocação avulsa não
    // pode cair dentro do bloco
    let single = pmm::alloc_page();
    kassert!(single >= base + (4 * MEM_PAGE_SIZE) as u32 || single < base);

    pmm::free_page(single);
    pmm::free_pages(base, 4);

    TestResult::Pass
}

fn test_mmu_index_math() -> TestResult {
    kassert_eq!(pde_index(0x8000_0000), 512);
    kassert_eq!(pte_index(0x8000_0000), 0);
    kassert_eq!(pde_index(0x0040_3000), 1);
    kassert_eq!(pte_index(0x0040_3000), 3);

    let pte = Pte(0x0012_3000 | PTE_P | PTE_W | PTE_U);
    kassert!(pte.present());
    kassert_eq!(pte.paddr(), 0x0012_3000);
    kassert_eq!(pte.perm(), PTE_P | PTE_W | PTE_U);

    TestResult::Pass
}

/// Criar um espaço de usuário, mapear páginas e destruir devolve TODAS
/// as páginas ao alocador.
fn test_uvm_create_destroy() -> TestResult {
    // Marca d'água: a menor página livre antes de tudo
    let watermark = pmm::alloc_page();
    kassert!(watermark != 0);
    pmm::free_page(watermark);

    let dir = vmm::memory_create_uvm();
    kassert!(dir != 0);

    // A metade do kernel veio junto: o console é visível pelo espaço
    // novo, no mesmo endereço
    let console = crate::mm::config::CONSOLE_VIDEO_BASE;
    kassert_eq!(vmm::memory_get_paddr(dir, console), console);

    // Duas páginas de usuário
    kassert!(vmm::memory_alloc_for_page_dir(
        dir,
        MEMORY_TASK_BASE,
        (2 * MEM_PAGE_SIZE) as u32,
        PTE_P | PTE_U | PTE_W
    )
    .is_ok());
    kassert!(vmm::memory_get_paddr(dir, MEMORY_TASK_BASE) != 0);
    kassert!(vmm::memory_get_paddr(dir, MEMORY_TASK_BASE + MEM_PAGE_SIZE as u32) != 0);

    // Endereço nunca mapeado continua sem tradução
    kassert_eq!(vmm::memory_get_paddr(dir, MEMORY_TASK_BASE + 0x0100_0000), 0);

    vmm::memory_destroy_uvm(dir);

    // Tudo voltou: a marca d'água é de novo a menor página livre
    let after = pmm::alloc_page();
    kassert_eq!(after, watermark);
    pmm::free_page(after);

    TestResult::Pass
}
