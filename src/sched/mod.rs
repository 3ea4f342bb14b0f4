//! Scheduler e ciclo de vida de processos.
//!
//! - `task`: o TCB (Task Control Block) e seus estados.
//! - `manager`: arena fixa de tasks, filas de prontas/dormindo,
//!   round-robin, tick e troca de contexto por TSS.
//! - `process`: fork, execve, wait, exit, getpid.
//! - `exec`: loader de imagem ELF32 para o execve.

pub mod exec;
pub mod manager;
pub mod process;
pub mod task;

#[cfg(feature = "self_test")]
pub mod test;
