//! Primitivas de Sincronização.
//!
//! Três famílias, para três situações:
//! - `Spinlock<T>`: busy-wait com interrupções desabilitadas. Seções
//!   curtíssimas, inclusive dentro de handlers de interrupção.
//! - `Semaphore` / `KMutex`: dormem no scheduler. Seções longas ou
//!   espera por recurso (FIFO nas filas de espera).
//! - `AtomicInt` / `AtomicCounter`: contadores lock-free.

pub mod atomic;
pub mod mutex;
pub mod semaphore;
pub mod spinlock;

#[cfg(feature = "self_test")]
pub mod test;

pub use atomic::{AtomicCounter, AtomicInt};
pub use mutex::KMutex;
pub use semaphore::Semaphore;
pub use spinlock::Spinlock;
