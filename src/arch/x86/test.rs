//! Testes da camada de arquitetura.

use crate::arch::x86::cpu;
use crate::arch::x86::gdt::{self, SEG_G, SEG_P_PRESENT};
use crate::klib::test_framework::{run_test_suite, TestCase, TestResult};
use crate::{kassert, kassert_eq};

const ARCH_TESTS: &[TestCase] = &[
    TestCase::new("gdt_slot_roundtrip", test_gdt_slot_roundtrip),
    TestCase::new("segment_desc_granularity", test_segment_desc_granularity),
    TestCase::new("irq_protection_restores", test_irq_protection_restores),
];

pub fn run_arch_tests() {
    run_test_suite("Arch", ARCH_TESTS);
}

/// Alocar marca a entrada como presente; liberar zera o attr e deixa a
/// entrada reutilizável.
fn test_gdt_slot_roundtrip() -> TestResult {
    let sel = gdt::gdt_alloc_desc();
    kassert!(sel.is_ok());
    let sel = sel.unwrap_or(0);

    kassert!(sel % 8 == 0);
    kassert_eq!(gdt::desc_attr(sel), SEG_P_PRESENT);

    gdt::gdt_free_sel(sel);
    kassert_eq!(gdt::desc_attr(sel), 0);

    // A mesma entrada volta a ser a primeira livre
    let again = gdt::gdt_alloc_desc().unwrap_or(0);
    kassert_eq!(again, sel);
    gdt::gdt_free_sel(again);

    TestResult::Pass
}

/// Limites acima de 20 bits viram granularidade de 4KB.
fn test_segment_desc_granularity() -> TestResult {
    let sel = gdt::gdt_alloc_desc().unwrap_or(0);
    kassert!(sel != 0);

    gdt::segment_desc_set(sel, 0, 0xFFFF_FFFF, SEG_P_PRESENT);
    let attr = gdt::desc_attr(sel);
    kassert!(attr & SEG_G != 0);
    // limit[19:16] = 0xF nos bits 8..11 do attr
    kassert_eq!((attr >> 8) & 0xF, 0xF);

    gdt::gdt_free_sel(sel);

    TestResult::Pass
}

/// enter/leave de proteção restaura EFLAGS exatamente como estava.
fn test_irq_protection_restores() -> TestResult {
    let before = cpu::read_eflags();

    let state = cpu::enter_protection();
    kassert!(cpu::read_eflags() & cpu::EFLAGS_IF == 0);

    // Aninhamento: a seção interna não religa nada ao sair
    let inner = cpu::enter_protection();
    cpu::leave_protection(inner);
    kassert!(cpu::read_eflags() & cpu::EFLAGS_IF == 0);

    cpu::leave_protection(state);
    kassert_eq!(cpu::read_eflags() & cpu::EFLAGS_IF, before & cpu::EFLAGS_IF);

    TestResult::Pass
}
