//! Gerenciador de tasks: arena, filas e round-robin.
//!
//! O estado inteiro do scheduler (arena + filas) é um único global
//! mutável. Não há lock: todas as funções aqui só podem ser chamadas
//! com interrupções desabilitadas (via `enter_protection`) ou de dentro
//! de um handler de interrupção. Numa máquina de uma CPU isso é
//! exatamente a disciplina necessária e suficiente.
//!
//! Disciplina de filas (estado diz a fila):
//! - `Ready`    => na ready_list
//! - `Sleeping` => na sleep_list
//! - `Blocked`  => na fila de espera de algum semáforo/mutex
//! - `Running` / `Waiting` / `Zombie` => em lista nenhuma
//!
//! A task idle nunca entra na ready_list; `task_next_run` cai nela
//! quando não há mais ninguém.

use crate::arch::x86::cpu;
use crate::arch::x86::gdt::{
    self, Tss, SEG_CPL0, SEG_CPL3, SEG_D, SEG_DPL0, SEG_DPL3, SEG_P_PRESENT, SEG_S_NORMAL,
    SEG_TYPE_CODE, SEG_TYPE_DATA, SEG_TYPE_RW, SEG_TYPE_TSS,
};
use crate::core::config::{
    KERNEL_SELECTOR_CS, KERNEL_SELECTOR_DS, OS_TICK_MS, TASK_NR, TASK_OFILE_NR,
    TASK_TIME_SLICE_DEFAULT,
};
use crate::fs::file::FileId;
use crate::klib::list::{IndexList, ListNode};
use crate::mm::config::{MEMORY_TASK_BASE, MEM_PAGE_SIZE};
use crate::mm::{pmm, vmm};
use crate::sched::task::{Task, TaskFlags, TaskId, TaskState};
use crate::sync::{AtomicCounter, KMutex};
use crate::sys::error::{SysError, SysResult};

pub struct TaskManager {
    /// Arena fixa de TCBs
    tasks: [Task; TASK_NR],
    /// Nós de enfileiramento ready/sleep (uma task usa no máximo um)
    run_nodes: [ListNode; TASK_NR],
    /// Nós de fila de espera de semáforo/mutex
    wait_nodes: [ListNode; TASK_NR],
    /// Nós da lista de todas as tasks vivas
    all_nodes: [ListNode; TASK_NR],

    /// Task corrente (a única em estado Running)
    curr: Option<TaskId>,

    ready_list: IndexList,
    sleep_list: IndexList,
    task_list: IndexList,

    first_task: Option<TaskId>,
    idle_task: Option<TaskId>,

    /// Seletores de código/dados das aplicações (DPL3), criados no init
    pub app_code_sel: u16,
    pub app_data_sel: u16,
}

const EMPTY_TASK: Task = Task::new();
const EMPTY_NODE: ListNode = ListNode::new();

static mut TASK_MANAGER: TaskManager = TaskManager {
    tasks: [EMPTY_TASK; TASK_NR],
    run_nodes: [EMPTY_NODE; TASK_NR],
    wait_nodes: [EMPTY_NODE; TASK_NR],
    all_nodes: [EMPTY_NODE; TASK_NR],
    curr: None,
    ready_list: IndexList::new(),
    sleep_list: IndexList::new(),
    task_list: IndexList::new(),
    first_task: None,
    idle_task: None,
    app_code_sel: 0,
    app_data_sel: 0,
};

/// Serializa alloc/free de slots da arena (fork e wait concorrem).
static TASK_TABLE_MUTEX: KMutex = KMutex::new();

/// Gerador de pids; nunca reusa valores.
static NEXT_PID: AtomicCounter = AtomicCounter::new(1);

fn manager() -> &'static mut TaskManager {
    // SAFETY: chamadores estão em seção crítica (interrupções
    // desabilitadas) ou no boot single-threaded
    unsafe { &mut *core::ptr::addr_of_mut!(TASK_MANAGER) }
}

/// Acesso a um TCB pelo handle.
pub fn task(id: TaskId) -> &'static mut Task {
    &mut manager().tasks[id.index()]
}

/// Task corrente (a que está em Running).
pub fn current_id() -> Option<TaskId> {
    manager().curr
}

/// Handle da primeira task (init).
pub fn first_task_id() -> Option<TaskId> {
    manager().first_task
}

// ============================================================================
// Filas
// ============================================================================

/// Insere a task no fim da fila de prontas.
pub fn task_set_ready(id: TaskId) {
    let m = manager();
    if Some(id) == m.idle_task || m.tasks[id.index()].state == TaskState::Ready {
        return;
    }
    m.ready_list.push_back(&mut m.run_nodes, id.index());
    m.tasks[id.index()].state = TaskState::Ready;
}

/// Tira a task da fila de prontas, se estiver nela.
/// O novo estado fica a cargo de quem chamou.
pub fn task_set_block(id: TaskId) {
    let m = manager();
    if Some(id) == m.idle_task {
        return;
    }
    if m.tasks[id.index()].state == TaskState::Ready {
        m.ready_list.remove(&mut m.run_nodes, id.index());
    }
}

/// Coloca a task na fila de dormindo por `ticks` ticks.
pub fn task_set_sleep(id: TaskId, ticks: u32) {
    if ticks == 0 {
        return;
    }
    let m = manager();
    m.tasks[id.index()].sleep_ticks = ticks;
    m.tasks[id.index()].state = TaskState::Sleeping;
    m.sleep_list.push_back(&mut m.run_nodes, id.index());
}

/// Tira a task da fila de dormindo.
pub fn task_set_wakeup(id: TaskId) {
    let m = manager();
    m.sleep_list.remove(&mut m.run_nodes, id.index());
}

/// Ajusta só o estado (semáforo/mutex marcam Blocked por aqui).
pub fn set_state(id: TaskId, state: TaskState) {
    manager().tasks[id.index()].state = state;
}

/// Empilha a task numa fila de espera de objeto de sincronização.
pub fn wait_queue_push(list: &mut IndexList, id: TaskId) {
    list.push_back(&mut manager().wait_nodes, id.index());
}

/// Desempilha o primeiro da fila de espera.
pub fn wait_queue_pop(list: &mut IndexList) -> Option<TaskId> {
    list.pop_front(&mut manager().wait_nodes)
        .map(TaskId::from_index)
}

// ============================================================================
// Escalonamento
// ============================================================================

/// Próxima task a rodar: cabeça das prontas, ou a idle.
fn task_next_run() -> Option<TaskId> {
    let m = manager();
    m.ready_list
        .first()
        .map(TaskId::from_index)
        .or(m.idle_task)
}

/// Troca de contexto via hardware: far jump para o TSS destino salva o
/// estado atual (inclusive CR3 e EFLAGS) e carrega o do destino.
fn switch_context(_from: Option<TaskId>, to: TaskId) {
    // SAFETY: o seletor foi criado por tss_init e aponta para o TSS
    // embutido no TCB de `to`
    unsafe {
        gdt::switch_to_tss(manager().tasks[to.index()].tss_sel);
    }
}

/// Uma rodada de escalonamento.
///
/// Só troca quando a task corrente deixou de estar Running (bloqueou,
/// dormiu, virou zumbi ou foi rodada para o fim das prontas). Um
/// notify que só acordou alguém não tira a CPU de quem está rodando:
/// o acordado espera sua vez na FIFO.
pub fn dispatch() {
    let state = cpu::enter_protection();

    let m = manager();
    if let Some(to) = task_next_run() {
        if Some(to) != m.curr {
            // A idle nunca segura a CPU; qualquer outra task só é
            // trocada quando deixou de estar Running
            let still_running = m
                .curr
                .map(|c| Some(c) != m.idle_task && m.tasks[c.index()].state == TaskState::Running)
                .unwrap_or(false);

            if !still_running {
                if let Some(c) = m.curr {
                    if Some(c) == m.idle_task {
                        // Idle volta ao estado de espera (fora das filas)
                        m.tasks[c.index()].state = TaskState::Created;
                    }
                }

                if Some(to) != m.idle_task {
                    m.ready_list.remove(&mut m.run_nodes, to.index());
                }
                let from = m.curr;
                m.curr = Some(to);
                m.tasks[to.index()].state = TaskState::Running;
                switch_context(from, to);
                // Quando esta task voltar a ser escolhida, a execução
                // continua exatamente aqui.
            }
        }
    }

    cpu::leave_protection(state);
}

/// Contabilidade do tick de 10ms (chamada pelo handler do PIT).
pub fn task_time_tick() {
    let state = cpu::enter_protection();

    let m = manager();
    if let Some(curr) = m.curr {
        // 1. Fatia de tempo da task corrente
        let task = &mut m.tasks[curr.index()];
        task.slice_ticks = task.slice_ticks.saturating_sub(1);
        if task.slice_ticks == 0 {
            task.slice_ticks = task.time_slice;
            // Só há o que rodar quando existe outra task pronta;
            // sozinha, a corrente apenas ganha uma fatia nova
            if !m.ready_list.is_empty() {
                task_set_block(curr);
                task_set_ready(curr);
            }
        }

        // 2. Fila de dormindo: quem zerou volta para o fim das prontas
        let mut cursor = m.sleep_list.first();
        while let Some(idx) = cursor {
            cursor = m.sleep_list.next(&m.run_nodes, idx);

            let id = TaskId::from_index(idx);
            let task = &mut m.tasks[idx];
            task.sleep_ticks -= 1;
            if task.sleep_ticks == 0 {
                task_set_wakeup(id);
                task_set_ready(id);
            }
        }

        dispatch();
    }

    cpu::leave_protection(state);
}

/// A task corrente abre mão do resto da fatia.
pub fn sys_yield() -> SysResult<usize> {
    let state = cpu::enter_protection();

    let m = manager();
    if let (Some(curr), false) = (m.curr, m.ready_list.is_empty()) {
        // Roda a corrente para o fim da fila e escolhe outra
        task_set_block(curr);
        task_set_ready(curr);
        dispatch();
    }

    cpu::leave_protection(state);
    Ok(0)
}

/// Dorme pelo menos `ms` milissegundos (arredonda para cima em ticks;
/// nunca menos que um tick).
pub fn sys_msleep(ms: u32) -> SysResult<usize> {
    let ms = ms.max(OS_TICK_MS);

    let state = cpu::enter_protection();

    if let Some(curr) = manager().curr {
        task_set_block(curr);
        task_set_sleep(curr, (ms + OS_TICK_MS - 1) / OS_TICK_MS);
        dispatch();
    }

    cpu::leave_protection(state);
    Ok(0)
}

// ============================================================================
// Arena
// ============================================================================

/// Reserva um slot livre da arena.
pub fn alloc_task() -> Option<TaskId> {
    let mut found = None;

    TASK_TABLE_MUTEX.lock();
    let m = manager();
    for i in 0..TASK_NR {
        if !m.tasks[i].in_use {
            m.tasks[i] = Task::new();
            m.tasks[i].in_use = true;
            found = Some(TaskId::from_index(i));
            break;
        }
    }
    TASK_TABLE_MUTEX.unlock();

    found
}

/// Devolve um slot à arena.
pub fn free_task(id: TaskId) {
    TASK_TABLE_MUTEX.lock();
    manager().tasks[id.index()] = Task::new();
    TASK_TABLE_MUTEX.unlock();
}

/// Percorre a arena com o mutex da tabela (usado por wait/exit).
pub fn with_task_table<R>(f: impl FnOnce(&mut [Task; TASK_NR]) -> R) -> R {
    TASK_TABLE_MUTEX.lock();
    let result = f(&mut manager().tasks);
    TASK_TABLE_MUTEX.unlock();
    result
}

/// Releitura rápida da arena: existe filho zumbi de `parent`?
///
/// Só pode ser chamada com interrupções desabilitadas: nessa condição
/// a leitura direta (sem o mutex da tabela) é segura numa CPU só.
pub fn any_zombie_child(parent: TaskId) -> bool {
    let m = manager();
    for i in 0..TASK_NR {
        let t = &m.tasks[i];
        if t.in_use && t.parent == Some(parent) && t.state == TaskState::Zombie {
            return true;
        }
    }
    false
}

// ============================================================================
// Criação de tasks
// ============================================================================

/// Prepara o TSS de uma task nova: descritor na GDT, pilha de kernel,
/// seletores conforme o privilégio e um espaço de endereçamento novo.
fn tss_init(id: TaskId, flags: TaskFlags, entry: u32, esp: u32) -> SysResult<()> {
    let tss_sel = gdt::gdt_alloc_desc()?;

    let task = task(id);
    gdt::segment_desc_set(
        tss_sel,
        core::ptr::addr_of!(task.tss) as u32,
        core::mem::size_of::<Tss>() as u32,
        SEG_P_PRESENT | SEG_DPL0 | SEG_TYPE_TSS,
    );

    task.tss = Tss::zeroed();

    // Pilha de kernel da task: uma página, usada nas entradas em CPL0
    // (exceções, interrupções e syscalls)
    let kernel_stack = pmm::alloc_page();
    if kernel_stack == 0 {
        gdt::gdt_free_sel(tss_sel);
        return Err(SysError::OutOfMemory);
    }

    let (code_sel, data_sel) = if flags.contains(TaskFlags::SYSTEM) {
        (
            KERNEL_SELECTOR_CS | SEG_CPL0,
            KERNEL_SELECTOR_DS | SEG_CPL0,
        )
    } else {
        // Sem o RPL3 aqui o load de segmento gera falha de proteção
        (
            manager().app_code_sel | SEG_CPL3,
            manager().app_data_sel | SEG_CPL3,
        )
    };

    task.tss.eip = entry;
    task.tss.esp = if esp != 0 {
        esp
    } else {
        kernel_stack + MEM_PAGE_SIZE as u32
    };
    task.tss.esp0 = kernel_stack + MEM_PAGE_SIZE as u32;
    task.tss.ss0 = KERNEL_SELECTOR_DS as u32;
    // Se IF não voltar ligado no TSS, o timer morre junto com a troca
    task.tss.eflags = cpu::EFLAGS_DEFAULT | cpu::EFLAGS_IF;
    task.tss.cs = code_sel as u32;
    task.tss.es = data_sel as u32;
    task.tss.ss = data_sel as u32;
    task.tss.ds = data_sel as u32;
    task.tss.fs = data_sel as u32;
    task.tss.gs = data_sel as u32;
    task.tss.iomap = 0;

    let page_dir = vmm::memory_create_uvm();
    if page_dir == 0 {
        gdt::gdt_free_sel(tss_sel);
        pmm::free_page(kernel_stack);
        return Err(SysError::OutOfMemory);
    }
    task.tss.cr3 = page_dir;

    task.tss_sel = tss_sel;
    Ok(())
}

/// Inicializa um TCB recém alocado e o insere na lista de todas.
pub fn task_init(id: TaskId, name: &str, flags: TaskFlags, entry: u32, esp: u32) -> SysResult<()> {
    tss_init(id, flags, entry, esp)?;

    let t = task(id);
    t.set_name(name);
    t.state = TaskState::Created;
    t.sleep_ticks = 0;
    t.time_slice = TASK_TIME_SLICE_DEFAULT;
    t.slice_ticks = t.time_slice;
    t.parent = None;
    t.heap_start = 0;
    t.heap_end = 0;
    t.file_table = [None; TASK_OFILE_NR];

    let state = cpu::enter_protection();
    t.pid = NEXT_PID.inc();
    let m = manager();
    m.task_list.push_back(&mut m.all_nodes, id.index());
    cpu::leave_protection(state);

    Ok(())
}

/// Libera os recursos de uma task que terminou: seletor de TSS, pilha
/// de kernel e espaço de endereçamento. O slot continua do chamador.
pub fn task_uninit(id: TaskId) {
    let t = task(id);

    if t.tss_sel != 0 {
        gdt::gdt_free_sel(t.tss_sel);
    }

    if t.tss.esp0 != 0 {
        // A pilha cresce para baixo: a página fica uma página abaixo do topo
        vmm::memory_free_page(t.tss.esp0 - MEM_PAGE_SIZE as u32);
    }

    if t.tss.cr3 != 0 {
        vmm::memory_destroy_uvm(t.tss.cr3);
    }

    let state = cpu::enter_protection();
    let m = manager();
    m.task_list.remove(&mut m.all_nodes, id.index());
    cpu::leave_protection(state);

    *t = Task::new();
}

/// Deixa a task elegível para rodar.
pub fn task_start(id: TaskId) {
    let state = cpu::enter_protection();
    task_set_ready(id);
    cpu::leave_protection(state);
}

// ============================================================================
// Init do módulo
// ============================================================================

/// Corpo da task idle: só devolve a CPU ao mundo até a próxima
/// interrupção.
extern "C" fn idle_entry() -> ! {
    loop {
        cpu::hlt();
    }
}

/// Sobe o gerenciador: segmentos de aplicação (DPL3) e task idle.
pub fn task_manager_init() {
    // Todo código/dado de aplicação usa dois segmentos flat DPL3
    let data_sel = gdt::gdt_alloc_desc().expect("gdt cheia no boot");
    gdt::segment_desc_set(
        data_sel,
        0x00000000,
        0xFFFFFFFF,
        SEG_P_PRESENT | SEG_DPL3 | SEG_S_NORMAL | SEG_TYPE_DATA | SEG_TYPE_RW | SEG_D,
    );

    let code_sel = gdt::gdt_alloc_desc().expect("gdt cheia no boot");
    gdt::segment_desc_set(
        code_sel,
        0x00000000,
        0xFFFFFFFF,
        SEG_P_PRESENT | SEG_DPL3 | SEG_S_NORMAL | SEG_TYPE_CODE | SEG_TYPE_RW | SEG_D,
    );

    let m = manager();
    m.app_data_sel = data_sel;
    m.app_code_sel = code_sel;
    m.curr = None;

    let idle = alloc_task().expect("arena vazia no boot");
    task_init(
        idle,
        "idle task",
        TaskFlags::SYSTEM,
        idle_entry as usize as u32,
        0, // roda em CPL0, usa a própria pilha de kernel
    )
    .expect("init da idle falhou");
    m.idle_task = Some(idle);
    task_start(idle);

    crate::kinfo!("(Task) gerenciador pronto, idle pid:", task(idle).pid as u64);
}

/// Cria a primeira task de usuário a partir da imagem embutida no
/// kernel (seção `.first_task`) e a torna corrente.
///
/// A imagem é linkada junto com o kernel mas roda em `0x80000000`:
/// alocamos as páginas de usuário no espaço novo, copiamos o binário e
/// deixamos o TR apontando para o TSS dela. O salto final para CPL3 é
/// do `move_to_first_task`.
pub fn task_first_init() {
    extern "C" {
        static s_first_task: u8;
        static e_first_task: u8;
    }

    // SAFETY: símbolos do linker script delimitando a imagem embutida
    let (image_start, image_end) = unsafe {
        (
            core::ptr::addr_of!(s_first_task) as u32,
            core::ptr::addr_of!(e_first_task) as u32,
        )
    };

    let copy_size = image_end - image_start;
    let alloc_size = 10 * MEM_PAGE_SIZE as u32; // sobra vira pilha
    assert!(copy_size < alloc_size);

    let entry = MEMORY_TASK_BASE;

    let first = alloc_task().expect("arena vazia no boot");
    task_init(
        first,
        "first task",
        TaskFlags::empty(),
        entry,
        entry + alloc_size,
    )
    .expect("init da primeira task falhou");

    let t = task(first);
    t.heap_start = entry + copy_size;
    t.heap_end = t.heap_start;

    // A primeira task não passa pela fila de prontas: ela JÁ é a
    // corrente: o salto para CPL3 acontece logo em seguida
    t.state = TaskState::Running;

    let m = manager();
    m.first_task = Some(first);
    m.curr = Some(first);

    // Daqui em diante enxergamos o espaço da primeira task
    let cr3 = task(first).tss.cr3;
    // SAFETY: diretório recém criado por tss_init, metade do kernel mapeada
    unsafe { crate::arch::x86::mmu::set_page_dir(cr3) };

    vmm::memory_alloc_page_for(
        entry,
        alloc_size,
        crate::arch::x86::mmu::PTE_P | crate::arch::x86::mmu::PTE_W | crate::arch::x86::mmu::PTE_U,
    )
    .expect("sem memória para a primeira task");

    // SAFETY: origem é a imagem no kernel, destino acabou de ser mapeado
    unsafe {
        core::ptr::copy_nonoverlapping(
            image_start as *const u8,
            entry as *mut u8,
            copy_size as usize,
        );
    }

    // SAFETY: seletor válido criado por tss_init
    unsafe { cpu::write_tr(task(first).tss_sel) };
}

// ============================================================================
// Arquivos da task
// ============================================================================

/// Arquivo `fd` da task corrente.
pub fn task_file(fd: usize) -> Option<FileId> {
    if fd >= TASK_OFILE_NR {
        return None;
    }
    let curr = current_id()?;
    task(curr).file_table[fd]
}

/// Associa `file` ao menor fd livre da task corrente.
pub fn task_alloc_fd(file: FileId) -> SysResult<usize> {
    let curr = current_id().ok_or(SysError::BadFile)?;
    let table = &mut task(curr).file_table;

    for (fd, slot) in table.iter_mut().enumerate() {
        if slot.is_none() {
            *slot = Some(file);
            return Ok(fd);
        }
    }

    Err(SysError::FileTableFull)
}

/// Libera o fd da task corrente.
pub fn task_remove_fd(fd: usize) {
    if fd >= TASK_OFILE_NR {
        return;
    }
    if let Some(curr) = current_id() {
        task(curr).file_table[fd] = None;
    }
}
