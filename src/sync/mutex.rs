//! Mutex de kernel: recursivo, com dono e fila de espera FIFO.
//!
//! O dono pode readquirir sem bloquear (só incrementa o contador).
//! No unlock final, se houver fila, a posse passa direto para o
//! primeiro da fila: já marcado como dono ANTES de acordar, para que
//! ninguém fure a fila entre o wake e o retorno do escalonador.
//!
//! Antes do task manager subir não existe task corrente; lock/unlock
//! degradam para contagem simples, então os caminhos de init que
//! protegem a GDT e o bitmap físico nunca bloqueiam no boot.

use core::cell::UnsafeCell;

use crate::arch::x86::cpu;
use crate::klib::list::IndexList;
use crate::sched::manager;
use crate::sched::task::{TaskId, TaskState};

struct KMutexInner {
    locked_count: u32,
    owner: Option<TaskId>,
    wait_list: IndexList,
}

pub struct KMutex {
    inner: UnsafeCell<KMutexInner>,
}

// SAFETY: o acesso a `inner` só acontece com interrupções desabilitadas
unsafe impl Send for KMutex {}
unsafe impl Sync for KMutex {}

impl KMutex {
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(KMutexInner {
                locked_count: 0,
                owner: None,
                wait_list: IndexList::new(),
            }),
        }
    }

    pub fn lock(&self) {
        let state = cpu::enter_protection();

        // SAFETY: seção crítica; única referência viva a inner
        let inner = unsafe { &mut *self.inner.get() };

        match manager::current_id() {
            None => inner.locked_count += 1,
            Some(curr) => {
                if inner.locked_count == 0 {
                    // Livre: o chamador vira o dono
                    inner.locked_count = 1;
                    inner.owner = Some(curr);
                } else if inner.owner == Some(curr) {
                    // Reentrada do próprio dono
                    inner.locked_count += 1;
                } else {
                    // Ocupado por outro: dormir na fila
                    manager::task_set_block(curr);
                    manager::set_state(curr, TaskState::Blocked);
                    manager::wait_queue_push(&mut inner.wait_list, curr);
                    manager::dispatch();
                    // Ao voltar aqui, o unlock de quem liberou já nos fez donos.
                }
            }
        }

        cpu::leave_protection(state);
    }

    pub fn unlock(&self) {
        let state = cpu::enter_protection();

        // SAFETY: seção crítica; única referência viva a inner
        let inner = unsafe { &mut *self.inner.get() };

        match manager::current_id() {
            None => {
                if inner.locked_count > 0 {
                    inner.locked_count -= 1;
                }
            }
            Some(curr) => {
                // Só o dono pode liberar
                if inner.owner == Some(curr) {
                    inner.locked_count -= 1;
                    if inner.locked_count == 0 {
                        inner.owner = None;

                        if let Some(next) = manager::wait_queue_pop(&mut inner.wait_list) {
                            // Posse transferida aqui, não quando a task
                            // acordar: senão ela poderia perder a disputa.
                            inner.locked_count = 1;
                            inner.owner = Some(next);
                            manager::task_set_ready(next);
                            manager::dispatch();
                        }
                    }
                }
            }
        }

        cpu::leave_protection(state);
    }

    /// Dono atual (para os self-tests).
    pub fn owner(&self) -> Option<TaskId> {
        let state = cpu::enter_protection();
        // SAFETY: seção crítica
        let owner = unsafe { (*self.inner.get()).owner };
        cpu::leave_protection(state);
        owner
    }
}
