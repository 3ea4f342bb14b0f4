//! Testes dos drivers (as partes exercitáveis sem hardware de verdade).

use crate::drivers::keyboard;
use crate::drivers::tty::TtyFifo;
use crate::klib::test_framework::{run_test_suite, TestCase, TestResult};
use crate::{kassert, kassert_eq};

const DRIVER_TESTS: &[TestCase] = &[
    TestCase::new("tty_fifo_roundtrip", test_tty_fifo_roundtrip),
    TestCase::new("tty_fifo_capacity", test_tty_fifo_capacity),
    TestCase::new("keyboard_decode", test_keyboard_decode),
];

pub fn run_driver_tests() {
    run_test_suite("Drivers", DRIVER_TESTS);
}

/// Escrever N bytes e ler de volta devolve os mesmos bytes, na ordem.
fn test_tty_fifo_roundtrip() -> TestResult {
    let mut fifo = TtyFifo::new();

    for b in b"bigorna" {
        kassert!(fifo.put(*b).is_ok());
    }
    for b in b"bigorna" {
        kassert_eq!(fifo.get().unwrap_or(0), *b);
    }
    kassert!(fifo.get().is_none());

    TestResult::Pass
}

fn test_tty_fifo_capacity() -> TestResult {
    let mut fifo = TtyFifo::new();

    let mut stored = 0usize;
    while fifo.put(b'x').is_ok() {
        stored += 1;
        kassert!(stored <= 4096);
    }
    kassert_eq!(stored, crate::core::config::TTY_OBUF_SIZE);

    // Cheio rejeita; esvaziar devolve exatamente o que entrou
    kassert!(fifo.put(b'y').is_err());
    let mut drained = 0usize;
    while fifo.get().is_some() {
        drained += 1;
    }
    kassert_eq!(drained, stored);

    TestResult::Pass
}

/// Decodificação de scancodes: minúscula, shift, caps e Enter como CR.
fn test_keyboard_decode() -> TestResult {
    kassert_eq!(keyboard::process_scancode(0x10).unwrap_or(0), b'q');
    kassert!(keyboard::process_scancode(0x90).is_none()); // break do q

    // Com shift pressionado
    kassert!(keyboard::process_scancode(0x2A).is_none());
    kassert_eq!(keyboard::process_scancode(0x10).unwrap_or(0), b'Q');
    kassert_eq!(keyboard::process_scancode(0x03).unwrap_or(0), b'@');
    kassert!(keyboard::process_scancode(0xAA).is_none()); // solta o shift
    kassert_eq!(keyboard::process_scancode(0x10).unwrap_or(0), b'q');

    // Enter entrega CR; a disciplina do tty é quem converte
    kassert_eq!(keyboard::process_scancode(0x1C).unwrap_or(0), b'\r');

    // Prefixo E0 engole o próximo make code
    kassert!(keyboard::process_scancode(0xE0).is_none());
    kassert!(keyboard::process_scancode(0x48).is_none());

    TestResult::Pass
}
