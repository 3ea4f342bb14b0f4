//! Task Control Block.
//!
//! Uma task é a unidade de escalonamento e de posse de espaço de
//! endereçamento (um processo = uma thread neste kernel). As tasks
//! vivem numa arena fixa e são referenciadas por `TaskId`, um índice
//! estável: nunca por ponteiro (pai/filho formam ciclos).

use bitflags::bitflags;

use crate::arch::x86::gdt::Tss;
use crate::core::config::{TASK_NAME_SIZE, TASK_OFILE_NR};
use crate::fs::file::FileId;

/// Handle estável de uma task (índice na arena).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskId(u16);

impl TaskId {
    pub const fn from_index(idx: usize) -> Self {
        Self(idx as u16)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Estado de ciclo de vida.
///
/// `Waiting` é o bloqueio específico do `sys_wait` (sem fila de objeto);
/// `Blocked` é bloqueio em fila de semáforo/mutex. O exit de um filho só
/// acorda o pai se ele estiver `Waiting`: um pai bloqueado num mutex
/// não pode ser arrancado da fila do mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    Sleeping,
    Ready,
    Waiting,
    Blocked,
    Zombie,
}

bitflags! {
    /// Flags de criação de task.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TaskFlags: u32 {
        /// Task de kernel (roda em CPL0 com os seletores do kernel).
        const SYSTEM = 1 << 0;
    }
}

/// Task Control Block.
///
/// O TSS fica embutido aqui: o descritor na GDT aponta para este campo,
/// e o hardware salva/carrega o estado completo (incluindo CR3) a cada
/// troca de tarefa.
pub struct Task {
    /// Slot ocupado na arena
    pub in_use: bool,
    /// Estado atual
    pub state: TaskState,
    /// Nome (terminado em NUL)
    pub name: [u8; TASK_NAME_SIZE],
    /// Pid único, estável durante a vida da task
    pub pid: u32,
    /// Quem criou esta task; a raiz não tem pai
    pub parent: Option<TaskId>,
    /// Início do heap do processo
    pub heap_start: u32,
    /// Fim do heap; igual ao início quer dizer heap vazio
    pub heap_end: u32,
    /// Status capturado no exit, colhido pelo wait do pai
    pub status: i32,
    /// Ticks restantes de sono (estado Sleeping)
    pub sleep_ticks: u32,
    /// Fatia de tempo configurada
    pub time_slice: u32,
    /// Contagem regressiva da fatia corrente
    pub slice_ticks: u32,
    /// Arquivos abertos da task
    pub file_table: [Option<FileId>; TASK_OFILE_NR],
    /// Estado de hardware da task
    pub tss: Tss,
    /// Seletor do TSS na GDT
    pub tss_sel: u16,
}

impl Task {
    pub const fn new() -> Self {
        Self {
            in_use: false,
            state: TaskState::Created,
            name: [0; TASK_NAME_SIZE],
            pid: 0,
            parent: None,
            heap_start: 0,
            heap_end: 0,
            status: 0,
            sleep_ticks: 0,
            time_slice: 0,
            slice_ticks: 0,
            file_table: [None; TASK_OFILE_NR],
            tss: Tss::zeroed(),
            tss_sel: 0,
        }
    }

    /// Copia o nome, truncando e garantindo o NUL final.
    pub fn set_name(&mut self, name: &str) {
        self.name = [0; TASK_NAME_SIZE];
        let bytes = name.as_bytes();
        let len = bytes.len().min(TASK_NAME_SIZE - 1);
        self.name[..len].copy_from_slice(&bytes[..len]);
    }

    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).unwrap_or("?")
    }
}
