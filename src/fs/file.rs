//! Tabela global de arquivos abertos.
//!
//! Os fds das tasks apontam para entradas daqui; um mesmo arquivo pode
//! ser compartilhado (dup, fork) com contagem de referência. A tabela
//! é protegida por um mutex de kernel.

use crate::drivers::device::DevId;
use crate::sync::KMutex;

/// Capacidade da tabela global.
pub const FILE_TABLE_SIZE: usize = 256;

/// Handle estável de um arquivo aberto (índice na tabela).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileId(u16);

impl FileId {
    pub const fn from_index(idx: usize) -> Self {
        Self(idx as u16)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Tipo do arquivo aberto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Terminal (vai para a tabela de dispositivos)
    Tty,
    /// Imagem regular somente leitura (registro de programas)
    Regular,
}

/// Uma entrada da tabela. `ref_count == 0` marca entrada livre.
#[derive(Clone, Copy)]
pub struct File {
    pub kind: FileKind,
    pub ref_count: u32,
    /// Dispositivo aberto (kind Tty)
    pub dev: Option<DevId>,
    /// Dados da imagem (kind Regular): ponteiro + tamanho
    pub data: u32,
    pub size: u32,
    /// Posição corrente de leitura
    pub pos: u32,
}

impl File {
    const fn empty() -> Self {
        Self {
            kind: FileKind::Regular,
            ref_count: 0,
            dev: None,
            data: 0,
            size: 0,
            pos: 0,
        }
    }
}

const EMPTY_FILE: File = File::empty();
static mut FILE_TABLE: [File; FILE_TABLE_SIZE] = [EMPTY_FILE; FILE_TABLE_SIZE];

static FILE_ALLOC_MUTEX: KMutex = KMutex::new();

fn file_table() -> &'static mut [File; FILE_TABLE_SIZE] {
    // SAFETY: alloc/free/ref são serializados pelo FILE_ALLOC_MUTEX;
    // cada entrada viva pertence a quem a abriu
    unsafe { &mut *core::ptr::addr_of_mut!(FILE_TABLE) }
}

/// Acesso a uma entrada pelo handle.
pub fn file(id: FileId) -> &'static mut File {
    &mut file_table()[id.index()]
}

/// Reserva uma entrada livre (ref_count = 1).
pub fn file_alloc() -> Option<FileId> {
    let mut found = None;

    FILE_ALLOC_MUTEX.lock();
    let table = file_table();
    for i in 0..FILE_TABLE_SIZE {
        if table[i].ref_count == 0 {
            table[i] = File::empty();
            table[i].ref_count = 1;
            found = Some(FileId::from_index(i));
            break;
        }
    }
    FILE_ALLOC_MUTEX.unlock();

    found
}

/// Solta uma referência; a entrada fica livre quando zerar.
pub fn file_free(id: FileId) {
    FILE_ALLOC_MUTEX.lock();
    let file = &mut file_table()[id.index()];
    if file.ref_count > 0 {
        file.ref_count -= 1;
    }
    FILE_ALLOC_MUTEX.unlock();
}

/// Mais uma referência ao arquivo (dup, fork).
pub fn file_inc_ref(id: FileId) {
    FILE_ALLOC_MUTEX.lock();
    file_table()[id.index()].ref_count += 1;
    FILE_ALLOC_MUTEX.unlock();
}

/// Referências vivas de um arquivo (diagnóstico e testes).
pub fn file_ref_count(id: FileId) -> u32 {
    FILE_ALLOC_MUTEX.lock();
    let count = file_table()[id.index()].ref_count;
    FILE_ALLOC_MUTEX.unlock();
    count
}

/// Zera a tabela.
pub fn file_table_init() {
    for file in file_table().iter_mut() {
        *file = File::empty();
    }
}
