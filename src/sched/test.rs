//! Testes do scheduler.
//!
//! Rodam com o task manager inicializado mas sem task corrente: dá
//! para exercitar arena, init/uninit de TCB e as filas sem disparar
//! troca de contexto.

use crate::arch::x86::cpu;
use crate::core::config::TASK_TIME_SLICE_DEFAULT;
use crate::klib::test_framework::{run_test_suite, TestCase, TestResult};
use crate::sched::manager;
use crate::sched::task::{Task, TaskFlags, TaskState};
use crate::{kassert, kassert_eq};

const SCHED_TESTS: &[TestCase] = &[
    TestCase::new("task_name_truncation", test_task_name_truncation),
    TestCase::new("task_arena_roundtrip", test_task_arena_roundtrip),
    TestCase::new("task_init_uninit", test_task_init_uninit),
    TestCase::new("ready_queue_discipline", test_ready_queue_discipline),
];

pub fn run_sched_tests() {
    run_test_suite("Scheduler", SCHED_TESTS);
}

fn test_task_name_truncation() -> TestResult {
    let mut task = Task::new();

    task.set_name("curto");
    kassert_eq!(task.name().len(), 5);

    // Nome maior que o campo é truncado com NUL garantido
    task.set_name("um nome exageradamente comprido para um tcb");
    kassert_eq!(task.name().len(), 31);
    kassert_eq!(task.name[31], 0);

    TestResult::Pass
}

fn test_task_arena_roundtrip() -> TestResult {
    let a = manager::alloc_task();
    kassert!(a.is_some());
    let a = a.unwrap();
    kassert!(manager::task(a).in_use);

    let b = manager::alloc_task();
    kassert!(b.is_some());
    let b = b.unwrap();
    kassert!(a != b);

    manager::free_task(a);
    kassert!(!manager::task(a).in_use);

    // Slot liberado é reusado (menor índice primeiro)
    let c = manager::alloc_task().unwrap();
    kassert_eq!(c.index() as u64, a.index() as u64);

    manager::free_task(b);
    manager::free_task(c);

    TestResult::Pass
}

extern "C" fn dummy_entry() -> ! {
    loop {
        cpu::hlt();
    }
}

/// task_init monta um TCB completo: TSS com pilha de kernel e espaço
/// de endereçamento próprios; task_uninit devolve tudo.
fn test_task_init_uninit() -> TestResult {
    let id = manager::alloc_task().unwrap();

    kassert!(manager::task_init(
        id,
        "task de teste",
        TaskFlags::SYSTEM,
        dummy_entry as usize as u32,
        0
    )
    .is_ok());

    let task = manager::task(id);
    kassert!(task.pid != 0);
    kassert_eq!(task.slice_ticks, TASK_TIME_SLICE_DEFAULT);
    kassert!(task.state == TaskState::Created);
    kassert!(task.tss_sel != 0);
    kassert!(task.tss.esp0 != 0);
    kassert!(task.tss.cr3 != 0);
    // Task de kernel roda em CPL0
    kassert_eq!(task.tss.cs, crate::core::config::KERNEL_SELECTOR_CS as u32);

    manager::task_uninit(id);
    manager::free_task(id);

    TestResult::Pass
}

/// Filas de prontas preservam ordem de chegada; block tira sem efeito
/// colateral.
fn test_ready_queue_discipline() -> TestResult {
    let a = manager::alloc_task().unwrap();
    let b = manager::alloc_task().unwrap();

    let state = cpu::enter_protection();

    manager::task_set_ready(a);
    manager::task_set_ready(b);
    kassert!(manager::task(a).state == TaskState::Ready);
    kassert!(manager::task(b).state == TaskState::Ready);

    // Inserir de novo não duplica
    manager::task_set_ready(a);

    manager::task_set_block(a);
    manager::set_state(a, TaskState::Blocked);
    manager::task_set_block(b);
    manager::set_state(b, TaskState::Blocked);

    cpu::leave_protection(state);

    manager::free_task(a);
    manager::free_task(b);

    TestResult::Pass
}
