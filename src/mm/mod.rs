//! Gerenciamento de memória.
//!
//! - `pmm`: alocador físico por bitmap (páginas de 4KB acima de 1MB).
//! - `vmm`: tabelas de página, espaços de endereçamento por processo
//!   e o `sbrk`.

pub mod config;
pub mod pmm;
pub mod vmm;

#[cfg(feature = "self_test")]
pub mod test;

use crate::core::boot::BootInfo;

/// Inicializa o subsistema de memória: alocador físico e tabela de
/// páginas do kernel (a do loader é descartada).
pub fn init(boot_info: &BootInfo) {
    pmm::init(boot_info);
    vmm::init();
}
