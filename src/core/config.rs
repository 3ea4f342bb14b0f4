//! Configuração global do kernel.
//!
//! Constantes de layout e de política ficam todas aqui; os módulos não
//! devem ter números mágicos próprios.

/// Versão do kernel.
pub const OS_VERSION: &str = "0.3.0";

/// Intervalo do tick do sistema, em milissegundos.
pub const OS_TICK_MS: u32 = 10;

/// Tamanho da pilha de boot do kernel.
pub const KERNEL_STACK_SIZE: usize = 8 * 1024;

// === GDT / seletores fixos ===

/// Número total de entradas da GDT.
pub const GDT_TABLE_SIZE: usize = 256;

/// Seletor do segmento de código do kernel.
pub const KERNEL_SELECTOR_CS: u16 = 1 * 8;
/// Seletor do segmento de dados do kernel.
pub const KERNEL_SELECTOR_DS: u16 = 2 * 8;
/// Seletor do call gate de syscall.
pub const SELECTOR_SYSCALL: u16 = 3 * 8;

// === Tasks ===

/// Quantidade máxima de tasks no pool.
pub const TASK_NR: usize = 128;
/// Tamanho máximo do nome de uma task (incluindo o NUL).
pub const TASK_NAME_SIZE: usize = 32;
/// Fatia de tempo default, em ticks (10 ticks = 100ms).
pub const TASK_TIME_SLICE_DEFAULT: u32 = 10;
/// Máximo de arquivos abertos por task.
pub const TASK_OFILE_NR: usize = 128;

// === Syscalls ===

/// Quantidade de palavras que o call gate copia da pilha de usuário
/// (id da chamada + 4 argumentos).
pub const SYSCALL_PARAM_COUNT: usize = 5;

// === TTY ===

/// Quantidade de terminais virtuais.
pub const TTY_NR: usize = 8;
/// Tamanho do FIFO de saída de cada tty.
pub const TTY_OBUF_SIZE: usize = 512;
/// Tamanho do FIFO de entrada de cada tty.
pub const TTY_IBUF_SIZE: usize = 512;
