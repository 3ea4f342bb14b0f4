//! Sistema de erros unificado do kernel.
//!
//! Um único enum cobre todos os módulos. Os valores são agrupados por
//! subsistema para facilitar identificação, e cabem num registrador:
//! syscalls devolvem o valor negado em EAX.

/// Enum de erros do sistema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SysError {
    // === Erros Gerais (1-15) ===
    /// Operação não permitida
    PermissionDenied = 1,
    /// Objeto não encontrado
    NotFound = 2,
    /// Objeto já existe
    AlreadyExists = 3,
    /// Argumento inválido
    InvalidArgument = 4,
    /// Recurso ocupado
    Busy = 8,

    // === Erros de Arquivo (16-31) ===
    /// Descritor de arquivo inválido ou fechado
    BadFile = 16,
    /// Tabela de arquivos (global ou da task) cheia
    FileTableFull = 17,
    /// Operação de terminal sobre algo que não é tty
    NotATty = 18,

    // === Erros de Memória (32-47) ===
    /// Sem página física disponível
    OutOfMemory = 32,
    /// Endereço inválido ou não mapeado
    BadAddress = 33,

    // === Erros de IO (48-63) ===
    /// Erro genérico de IO
    IoError = 48,
    /// Fim de arquivo
    EndOfFile = 49,

    // === Erros de Processo (80-95) ===
    /// Pool de tasks esgotado
    NoTask = 80,
    /// Nenhum filho para esperar
    NoChild = 81,
    /// Imagem executável inválida
    BadExecutable = 82,

    // === Erros de CPU (96-111) ===
    /// GDT sem entrada livre
    NoDescriptor = 96,

    // === Erros de Sistema (240-255) ===
    /// Syscall não implementada
    NotImplemented = 254,
    /// Erro desconhecido
    Unknown = 255,
}

impl SysError {
    /// Converte para isize negativo (formato de retorno da syscall)
    #[inline]
    pub fn as_isize(self) -> isize {
        -(self as i32 as isize)
    }
}

/// Resultado de operação do kernel: Ok(valor) ou Err(SysError)
pub type SysResult<T> = Result<T, SysError>;

/// Converte SysResult<usize> em isize para retorno de syscall.
///
/// O valor de sucesso é passado bit a bit: ponteiros de userspace
/// (>= 0x80000000) saem "negativos" em EAX de propósito, como no sbrk.
pub fn result_to_isize(result: SysResult<usize>) -> isize {
    match result {
        Ok(val) => val as isize,
        Err(e) => e.as_isize(),
    }
}
