//! Testes das definições de sistema.

use crate::klib::test_framework::{run_test_suite, TestCase, TestResult};
use crate::sys::elf::{Elf32Header, ElfType, ELF_MAGIC, EM_386};
use crate::sys::error::{result_to_isize, SysError};
use crate::{kassert, kassert_eq};

const SYS_TESTS: &[TestCase] = &[
    TestCase::new("elf_header_valid", test_elf_header_valid),
    TestCase::new("elf_header_rejects", test_elf_header_rejects),
    TestCase::new("error_encoding", test_error_encoding),
];

pub fn run_sys_tests() {
    run_test_suite("Sys", SYS_TESTS);
}

fn sample_header() -> Elf32Header {
    let mut hdr = Elf32Header::zeroed();
    hdr.magic = ELF_MAGIC;
    hdr.class = 1; // ELF32
    hdr.endian = 1; // little-endian
    hdr.elf_type = ElfType::Executable as u16;
    hdr.machine = EM_386;
    hdr.entry = 0x8000_0000;
    hdr.phoff = 52;
    hdr.phentsize = 32;
    hdr.phnum = 1;
    hdr
}

fn test_elf_header_valid() -> TestResult {
    kassert!(sample_header().is_valid());
    TestResult::Pass
}

fn test_elf_header_rejects() -> TestResult {
    let mut hdr = sample_header();
    hdr.magic[0] = 0x7E;
    kassert!(!hdr.is_valid());

    let mut hdr = sample_header();
    hdr.class = 2; // ELF64 não serve
    kassert!(!hdr.is_valid());

    let mut hdr = sample_header();
    hdr.machine = 0x3E; // x86_64 não serve
    kassert!(!hdr.is_valid());

    let mut hdr = sample_header();
    hdr.entry = 0;
    kassert!(!hdr.is_valid());

    let mut hdr = sample_header();
    hdr.elf_type = ElfType::Relocatable as u16;
    kassert!(!hdr.is_valid());

    TestResult::Pass
}

fn test_error_encoding() -> TestResult {
    // Erros saem negativos; sucesso passa o valor bit a bit
    kassert!(SysError::NotFound.as_isize() < 0);
    kassert_eq!(SysError::NotFound.as_isize(), -2);
    kassert_eq!(result_to_isize(Ok(7)), 7);
    kassert_eq!(result_to_isize(Err(SysError::InvalidArgument)), -4);

    TestResult::Pass
}
