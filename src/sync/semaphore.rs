//! Semáforo de contagem, com fila de espera FIFO.
//!
//! Diferente de um spinlock, quem espera aqui DORME: a task sai da fila
//! de prontas, entra na fila de espera do semáforo e o scheduler escolhe
//! outra. `notify` acorda sempre o primeiro da fila (ordem de chegada).
//!
//! Toda a mutação acontece com interrupções desabilitadas; num kernel
//! de uma CPU isso basta (o timer não pode interromper no meio).

use core::cell::UnsafeCell;

use crate::arch::x86::cpu;
use crate::klib::list::IndexList;
use crate::sched::manager;

struct SemInner {
    count: u32,
    wait_list: IndexList,
}

pub struct Semaphore {
    inner: UnsafeCell<SemInner>,
}

// SAFETY: o acesso a `inner` só acontece com interrupções desabilitadas
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    pub const fn new(initial: u32) -> Self {
        Self {
            inner: UnsafeCell::new(SemInner {
                count: initial,
                wait_list: IndexList::new(),
            }),
        }
    }

    /// Rearma o semáforo com um valor novo (a fila precisa estar vazia;
    /// usado pelos opens de driver, que reiniciam o dispositivo).
    pub fn init(&self, count: u32) {
        let state = cpu::enter_protection();
        // SAFETY: seção crítica
        unsafe { (*self.inner.get()).count = count };
        cpu::leave_protection(state);
    }

    /// Operação P: consome uma unidade, bloqueando se não houver.
    pub fn wait(&self) {
        let state = cpu::enter_protection();

        // SAFETY: seção crítica; única referência viva a inner
        let inner = unsafe { &mut *self.inner.get() };

        if inner.count > 0 {
            inner.count -= 1;
        } else if let Some(curr) = manager::current_id() {
            manager::task_set_block(curr);
            manager::set_state(curr, crate::sched::task::TaskState::Blocked);
            manager::wait_queue_push(&mut inner.wait_list, curr);
            manager::dispatch();
        }
        // Sem task corrente (boot) não há o que bloquear.

        cpu::leave_protection(state);
    }

    /// Operação V: se alguém espera, acorda o primeiro; senão acumula.
    pub fn notify(&self) {
        let state = cpu::enter_protection();

        // SAFETY: seção crítica; única referência viva a inner
        let inner = unsafe { &mut *self.inner.get() };

        if let Some(task) = manager::wait_queue_pop(&mut inner.wait_list) {
            manager::task_set_ready(task);
            manager::dispatch();
        } else {
            inner.count += 1;
        }

        cpu::leave_protection(state);
    }

    /// Valor corrente do contador.
    pub fn count(&self) -> u32 {
        let state = cpu::enter_protection();
        // SAFETY: seção crítica
        let count = unsafe { (*self.inner.get()).count };
        cpu::leave_protection(state);
        count
    }
}
