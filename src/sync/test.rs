//! Testes das primitivas de sincronização.
//!
//! Rodam no boot, antes da primeira task: os caminhos que bloqueiam
//! não são exercitáveis aqui, mas os contadores e a disciplina de
//! aquisição sim.

use crate::klib::test_framework::{run_test_suite, TestCase, TestResult};
use crate::sync::{AtomicCounter, AtomicInt, KMutex, Semaphore, Spinlock};
use crate::{kassert, kassert_eq};

const SYNC_TESTS: &[TestCase] = &[
    TestCase::new("semaphore_counter", test_semaphore_counter),
    TestCase::new("mutex_boot_counting", test_mutex_boot_counting),
    TestCase::new("spinlock_guard", test_spinlock_guard),
    TestCase::new("atomic_ops", test_atomic_ops),
];

pub fn run_sync_tests() {
    run_test_suite("Sync", SYNC_TESTS);
}

/// Sem ninguém esperando, um par wait/notify deixa o contador como
/// estava.
fn test_semaphore_counter() -> TestResult {
    let sem = Semaphore::new(2);

    kassert_eq!(sem.count(), 2);
    sem.wait();
    kassert_eq!(sem.count(), 1);
    sem.wait();
    kassert_eq!(sem.count(), 0);
    sem.notify();
    sem.notify();
    kassert_eq!(sem.count(), 2);

    sem.init(5);
    kassert_eq!(sem.count(), 5);

    TestResult::Pass
}

/// Antes de existir task corrente o mutex degrada para contagem, sem
/// dono e sem bloqueio.
fn test_mutex_boot_counting() -> TestResult {
    let mutex = KMutex::new();

    kassert!(mutex.owner().is_none());
    mutex.lock();
    mutex.lock();
    kassert!(mutex.owner().is_none());
    mutex.unlock();
    mutex.unlock();

    TestResult::Pass
}

fn test_spinlock_guard() -> TestResult {
    let lock = Spinlock::new(41u32);

    {
        let mut guard = lock.lock();
        *guard += 1;
    }

    kassert_eq!(*lock.lock(), 42);

    TestResult::Pass
}

fn test_atomic_ops() -> TestResult {
    let value = AtomicInt::new(10);
    value.add(5);
    value.dec();
    kassert_eq!(value.read(), 14);
    value.write(-3);
    kassert_eq!(value.read(), -3);

    let counter = AtomicCounter::new(7);
    kassert_eq!(counter.inc(), 7);
    kassert_eq!(counter.get(), 8);

    TestResult::Pass
}
