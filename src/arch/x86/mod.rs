//! Suporte à arquitetura x86 (IA-32, modo protegido).

pub mod cpu;
pub mod gdt;
pub mod idt;
pub mod mmu;
pub mod ports;

#[cfg(feature = "self_test")]
pub mod test;
