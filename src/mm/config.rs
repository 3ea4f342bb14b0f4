//! Layout de memória do sistema.
//!
//! Visão por processo (4GB virtuais):
//!
//! ```text
//! 0xFFFFFFFF ─┐
//!             │  (livre)
//! 0xE0000000 ─┤  topo da pilha de usuário (args logo abaixo)
//!             │  pilha ↓ ... heap ↑
//! 0x80000000 ─┤  base do espaço de usuário (código do processo)
//!             │  kernel, idêntico em todos os processos
//! 0x00000000 ─┘
//! ```

/// Tamanho de página.
pub const MEM_PAGE_SIZE: usize = 4096;

/// Início da memória estendida (1MB); o bitmap físico cobre daqui
/// para cima.
pub const MEM_EXT_START: u32 = 0x0010_0000;

/// Fim da região identidade-mapeada pelo kernel (128MB).
pub const MEM_EXT_END: u32 = 128 * 1024 * 1024;

/// Início da EBDA: o bitmap físico precisa terminar antes daqui.
pub const MEM_EBDA_START: u32 = 0x0008_0000;

/// Base do espaço de usuário. Tudo abaixo é kernel, espelhado em todos
/// os diretórios de página.
pub const MEMORY_TASK_BASE: u32 = 0x8000_0000;

/// Topo fixo da pilha de usuário.
pub const MEM_TASK_STACK_TOP: u32 = 0xE000_0000;

/// Tamanho da pilha de usuário criada pelo execve.
pub const MEM_TASK_STACK_SIZE: u32 = 500 * MEM_PAGE_SIZE as u32;

/// Área reservada para argc/argv, logo abaixo do topo da pilha.
pub const MEM_TASK_ARG_SIZE: u32 = 4 * MEM_PAGE_SIZE as u32;

/// Região de texto da VGA (console).
pub const CONSOLE_VIDEO_BASE: u32 = 0x000B_8000;
pub const CONSOLE_DISP_END: u32 = CONSOLE_VIDEO_BASE + 32 * 1024;
