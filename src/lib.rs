//! Bigorna Kernel Library.
//!
//! Ponto central de exportação dos módulos do kernel.
//! Define a estrutura hierárquica do sistema operacional.

#![no_std]
#![feature(naked_functions)]
#![feature(const_mut_refs)]
#![feature(asm_const)]

mod panic;

// --- Módulos de Baixo Nível (Hardware) ---
pub mod arch; // HAL (CPU, GDT, IDT, MMU)
pub mod drivers; // Drivers (Serial, Console, Teclado, PIC, PIT, TTY)

// --- Módulos Centrais (Lógica do Kernel) ---
pub mod core; // Boot, Entry, Config, Logging
pub mod klib; // Utilitários internos (Bitmap, Listas, Testes)
pub mod mm; // Gerenciamento de Memória (PMM, VMM, sbrk)
pub mod sync; // Primitivas de Sincronização (Spinlock, Semáforo, Mutex)
pub mod sys; // Definições de Sistema (Erros, ELF)

// --- Subsistemas ---
pub mod fs; // Camada de arquivos (tabela global + fds por task)
pub mod sched; // Scheduler, tasks, fork/execve/wait/exit
pub mod syscall; // Interface com userspace (call gate + int 0x80)

// Re-exportar BootInfo para acesso fácil no binário
pub use crate::core::boot::BootInfo;
