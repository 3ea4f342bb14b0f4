//! Definições de sistema: erros e formatos binários.

pub mod elf;
pub mod error;

#[cfg(feature = "self_test")]
pub mod test;
