//! Testes da camada de arquivos.

use crate::fs::file::{file_alloc, file_free, file_inc_ref, file_ref_count};
use crate::fs::image;
use crate::klib::test_framework::{run_test_suite, TestCase, TestResult};
use crate::{kassert, kassert_eq};

const FS_TESTS: &[TestCase] = &[
    TestCase::new("file_refcount", test_file_refcount),
    TestCase::new("image_registry", test_image_registry),
    TestCase::new("read_path", test_read_path),
    TestCase::new("open_needs_task", test_open_needs_task),
];

pub fn run_fs_tests() {
    run_test_suite("Fs", FS_TESTS);
}

fn test_file_refcount() -> TestResult {
    let id = file_alloc();
    kassert!(id.is_some());
    let id = id.unwrap();

    kassert_eq!(file_ref_count(id), 1);
    file_inc_ref(id);
    kassert_eq!(file_ref_count(id), 2);
    file_free(id);
    kassert_eq!(file_ref_count(id), 1);
    file_free(id);
    kassert_eq!(file_ref_count(id), 0);

    // Entrada livre volta a ser alocável
    let again = file_alloc().unwrap();
    kassert_eq!(again.index() as u64, id.index() as u64);
    file_free(again);

    TestResult::Pass
}

fn test_image_registry() -> TestResult {
    static PAYLOAD: [u8; 4] = [0x7F, b'E', b'L', b'F'];

    kassert!(image::find("inexistente.elf").is_none());

    kassert!(image::register("selftest.elf", &PAYLOAD).is_ok());
    let data = image::find("selftest.elf");
    kassert!(data.is_some());
    kassert_eq!(data.unwrap_or(&[]).len(), 4);

    TestResult::Pass
}

fn test_read_path() -> TestResult {
    let source = b"/dev/tty0\0";
    let mut buf = [0u8; 16];
    let path = crate::fs::read_path(source.as_ptr() as u32, &mut buf);

    kassert!(path.is_ok());
    kassert_eq!(path.unwrap_or("").len(), 9);

    kassert!(crate::fs::read_path(0, &mut buf).is_err());

    TestResult::Pass
}

/// Sem task corrente não há tabela de fds: o open falha limpo e
/// desfaz a entrada global que tinha reservado.
fn test_open_needs_task() -> TestResult {
    static PAYLOAD: [u8; 1] = [0];
    let _ = image::register("orfao.bin", &PAYLOAD);

    kassert!(crate::fs::sys_open("orfao.bin", 0).is_err());

    // A entrada da tabela global não ficou presa
    let probe = file_alloc().unwrap();
    kassert_eq!(probe.index() as u64, 0);
    file_free(probe);

    TestResult::Pass
}
