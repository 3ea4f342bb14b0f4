//! Ciclo de vida de processos: fork, execve, wait, exit.
//!
//! fork e execve mexem no frame de syscall salvo na pilha de kernel da
//! task (o hardware e o stub de entrada empilham tudo em cima de esp0,
//! então o frame fica sempre em `esp0 - sizeof(frame)`).

use crate::arch::x86::cpu;
use crate::arch::x86::mmu;
use crate::core::config::{SYSCALL_PARAM_COUNT, TASK_NR, TASK_OFILE_NR};
use crate::fs;
use crate::mm::config::{MEM_TASK_ARG_SIZE, MEM_TASK_STACK_SIZE, MEM_TASK_STACK_TOP};
use crate::mm::vmm;
use crate::sched::exec;
use crate::sched::manager::{self, task};
use crate::sched::task::{TaskFlags, TaskId, TaskState};
use crate::syscall::frame::SyscallFrame;
use crate::sys::error::{SysError, SysResult};

/// Frame de syscall salvo na pilha de kernel da task.
fn syscall_frame_of(id: TaskId) -> *mut SyscallFrame {
    let esp0 = task(id).tss.esp0;
    (esp0 as usize - core::mem::size_of::<SyscallFrame>()) as *mut SyscallFrame
}

/// Pid da task corrente.
pub fn sys_getpid() -> SysResult<usize> {
    let curr = manager::current_id().ok_or(SysError::NoTask)?;
    Ok(task(curr).pid as usize)
}

/// Duplica os arquivos abertos do pai no filho (mesmos arquivos,
/// contagem de referência incrementada).
fn copy_opened_files(parent: TaskId, child: TaskId) {
    for fd in 0..TASK_OFILE_NR {
        if let Some(file) = task(parent).file_table[fd] {
            fs::file::file_inc_ref(file);
            task(child).file_table[fd] = Some(file);
        }
    }
}

/// Cria uma cópia do processo corrente.
///
/// O pai recebe o pid do filho; o filho retorna 0 da MESMA chamada,
/// porque o frame de syscall do pai vira o estado inicial do filho
/// (com eax zerado).
pub fn sys_fork() -> SysResult<usize> {
    let parent = manager::current_id().ok_or(SysError::NoTask)?;
    let child = manager::alloc_task().ok_or(SysError::NoTask)?;

    // SAFETY: o pai está dentro de uma syscall, o frame existe
    let frame = unsafe { &*syscall_frame_of(parent) };

    // O filho nasce no retorno do fork do pai. O esp salta o espaço dos
    // cinco argumentos do call gate: o filho volta por `ret` comum, sem
    // o `retf N` que descartaria os parâmetros.
    let name_buf: [u8; crate::core::config::TASK_NAME_SIZE] = task(parent).name;
    let name_len = name_buf.iter().position(|&b| b == 0).unwrap_or(name_buf.len());
    let result = manager::task_init(
        child,
        core::str::from_utf8(&name_buf[..name_len]).unwrap_or("?"),
        TaskFlags::empty(),
        frame.eip,
        frame.esp + (core::mem::size_of::<u32>() * SYSCALL_PARAM_COUNT) as u32,
    );
    if result.is_err() {
        manager::free_task(child);
        return Err(SysError::NoTask);
    }

    copy_opened_files(parent, child);

    // Estado de registradores do pai no momento da syscall vira o
    // estado inicial do filho; eax = 0 é o valor de retorno dele
    let child_task = task(child);
    child_task.tss.eax = 0;
    child_task.tss.ebx = frame.ebx;
    child_task.tss.ecx = frame.ecx;
    child_task.tss.edx = frame.edx;
    child_task.tss.esi = frame.esi;
    child_task.tss.edi = frame.edi;
    child_task.tss.ebp = frame.ebp;

    child_task.tss.cs = frame.cs;
    child_task.tss.ds = frame.ds;
    child_task.tss.es = frame.es;
    child_task.tss.fs = frame.fs;
    child_task.tss.gs = frame.gs;
    child_task.tss.eflags = frame.eflags;

    child_task.parent = Some(parent);
    child_task.heap_start = task(parent).heap_start;
    child_task.heap_end = task(parent).heap_end;

    // Cópia ansiosa do espaço do pai. O diretório vazio que o task_init
    // criou é descartado para não vazar a página dele.
    let initial_dir = task(child).tss.cr3;
    let copied_dir = vmm::memory_copy_uvm(task(parent).tss.cr3);
    if copied_dir == 0 {
        manager::task_uninit(child);
        manager::free_task(child);
        return Err(SysError::OutOfMemory);
    }
    vmm::memory_destroy_uvm(initial_dir);
    task(child).tss.cr3 = copied_dir;

    manager::task_start(child);
    Ok(task(child).pid as usize)
}

/// Lê uma C-string do espaço do usuário para um buffer do kernel.
fn read_user_cstr(ptr: u32, buf: &mut [u8]) -> SysResult<&str> {
    if ptr == 0 {
        return Err(SysError::BadAddress);
    }

    let mut len = 0;
    while len < buf.len() - 1 {
        // SAFETY: leitura byte a byte do espaço corrente; um endereço
        // ruim vira page fault e mata a task, como qualquer acesso ruim
        let b = unsafe { *((ptr as usize + len) as *const u8) };
        if b == 0 {
            break;
        }
        buf[len] = b;
        len += 1;
    }

    core::str::from_utf8(&buf[..len]).map_err(|_| SysError::InvalidArgument)
}

/// Nome base de um caminho ("/bin/shell.elf" -> "shell.elf").
fn file_basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Substitui a imagem do processo corrente pelo executável `name`.
///
/// A carga toda acontece num espaço de endereçamento novo; o antigo só
/// é destruído depois que tudo deu certo. Se qualquer passo falhar, o
/// processo sobrevive intacto no espaço antigo.
pub fn sys_execve(name_ptr: u32, argv_ptr: u32, _env_ptr: u32) -> SysResult<usize> {
    let curr = manager::current_id().ok_or(SysError::NoTask)?;

    // Tudo que vem do espaço do usuário é lido antes de qualquer troca
    let mut name_buf = [0u8; 64];
    let path = read_user_cstr(name_ptr, &mut name_buf)?;

    let new_page_dir = vmm::memory_create_uvm();
    if new_page_dir == 0 {
        return Err(SysError::OutOfMemory);
    }

    let result = (|| -> SysResult<u32> {
        // Carrega os segmentos do ELF no espaço novo
        let entry = exec::load_elf_file(curr, path, new_page_dir)?;

        // Pilha de usuário, com a área de argumentos reservada no topo
        let stack_top = MEM_TASK_STACK_TOP - MEM_TASK_ARG_SIZE;
        vmm::memory_alloc_for_page_dir(
            new_page_dir,
            MEM_TASK_STACK_TOP - MEM_TASK_STACK_SIZE,
            MEM_TASK_STACK_SIZE,
            mmu::PTE_P | mmu::PTE_U | mmu::PTE_W,
        )?;

        let argc = exec::strings_count(argv_ptr);
        exec::copy_args(stack_top, new_page_dir, argc, argv_ptr)?;

        // Reescreve o frame de syscall: quando esta chamada retornar, a
        // task já estará executando a entrada do programa novo
        // SAFETY: estamos dentro da syscall, o frame existe
        let frame = unsafe { &mut *syscall_frame_of(curr) };
        frame.eip = entry;
        frame.eax = 0;
        frame.ebx = 0;
        frame.ecx = 0;
        frame.edx = 0;
        frame.esi = 0;
        frame.edi = 0;
        frame.ebp = 0;
        frame.eflags = cpu::EFLAGS_DEFAULT | cpu::EFLAGS_IF;
        // O retf da syscall descarta os 5 argumentos; compensa aqui
        frame.esp = stack_top - (core::mem::size_of::<u32>() * SYSCALL_PARAM_COUNT) as u32;

        Ok(entry)
    })();

    match result {
        Ok(_) => {
            let task = task(curr);
            task.set_name(file_basename(path));

            // Ponto de commit: troca para o espaço novo e destrói o
            // antigo (a pilha de kernel não é mapeada lá, então seguimos
            // executando sem sobressalto)
            let old_page_dir = task.tss.cr3;
            task.tss.cr3 = new_page_dir;
            // SAFETY: o espaço novo tem a metade do kernel mapeada
            unsafe { mmu::set_page_dir(new_page_dir) };
            vmm::memory_destroy_uvm(old_page_dir);

            Ok(0)
        }
        Err(err) => {
            vmm::memory_destroy_uvm(new_page_dir);
            Err(err)
        }
    }
}

/// Espera um filho terminar e o colhe.
///
/// Procura na arena por um filho zumbi; achando, captura o status,
/// libera todos os recursos dele e devolve o pid. Não achando, bloqueia
/// em estado Waiting: o exit de um filho nos acorda.
pub fn sys_wait(status_ptr: u32) -> SysResult<usize> {
    let curr = manager::current_id().ok_or(SysError::NoTask)?;

    loop {
        let mut has_child = false;
        let zombie = manager::with_task_table(|tasks| {
            for i in 0..TASK_NR {
                let t = &tasks[i];
                if !t.in_use || t.parent != Some(curr) {
                    continue;
                }
                has_child = true;
                if t.state == TaskState::Zombie {
                    return Some(TaskId::from_index(i));
                }
            }
            None
        });

        if let Some(child) = zombie {
            let pid = task(child).pid;
            let status = task(child).status;

            if status_ptr != 0 {
                // SAFETY: ponteiro do chamador no espaço corrente; um
                // endereço ruim vira page fault do processo
                unsafe { *(status_ptr as *mut i32) = status };
            }

            manager::task_uninit(child);
            manager::free_task(child);
            return Ok(pid as usize);
        }

        if !has_child {
            return Err(SysError::NoChild);
        }

        // Nenhum zumbi ainda: dorme até um filho sair
        let state = cpu::enter_protection();
        manager::task_set_block(curr);
        manager::set_state(curr, TaskState::Waiting);

        // Releitura com interrupções fechadas: um exit que aconteceu
        // entre o scan acima e o bloqueio seria um wakeup perdido
        if manager::any_zombie_child(curr) {
            manager::set_state(curr, TaskState::Running);
        } else {
            manager::dispatch();
        }

        cpu::leave_protection(state);
    }
}

/// Termina o processo corrente. Nunca retorna.
///
/// Fecha os arquivos, re-parenteia os filhos para a primeira task
/// (acordando-a se herdou zumbi), acorda o pai se ele espera, grava o
/// status e vira zumbi até o wait do pai.
pub fn sys_exit(status: i32) -> ! {
    if let Some(curr) = manager::current_id() {
        // Fecha tudo que ainda está aberto
        for fd in 0..TASK_OFILE_NR {
            if task(curr).file_table[fd].is_some() {
                let _ = fs::sys_close(fd);
                task(curr).file_table[fd] = None;
            }
        }

        let first = manager::first_task_id();
        let mut moved_zombie = false;

        // Os filhos passam para a primeira task; zumbis herdados são
        // responsabilidade dela agora
        manager::with_task_table(|tasks| {
            for i in 0..TASK_NR {
                let t = &mut tasks[i];
                if t.in_use && t.parent == Some(curr) {
                    t.parent = first;
                    if t.state == TaskState::Zombie {
                        moved_zombie = true;
                    }
                }
            }
        });

        let state = cpu::enter_protection();

        let parent = task(curr).parent;

        // A primeira task precisa acordar para colher os zumbis que
        // acabou de herdar (se ela for o nosso pai, o acorde de pai
        // logo abaixo já resolve)
        if moved_zombie && parent != first {
            if let Some(first) = first {
                if task(first).state == TaskState::Waiting {
                    manager::task_set_ready(first);
                }
            }
        }

        if let Some(parent) = parent {
            if task(parent).state == TaskState::Waiting {
                manager::task_set_ready(parent);
            }
        }

        task(curr).status = status;
        task(curr).state = TaskState::Zombie;
        manager::dispatch();

        cpu::leave_protection(state);
    }

    // Zumbis não voltam a ser escolhidos; se chegou aqui é bug
    loop {
        cpu::hlt();
    }
}

/// printmsg: log simples para programas de usuário (id 100).
///
/// Formata no máximo uma substituição de `%d` com o argumento.
pub fn sys_printmsg(fmt_ptr: u32, arg: i32) -> SysResult<usize> {
    let mut buf = [0u8; 128];
    let fmt = read_user_cstr(fmt_ptr, &mut buf)?;

    if let Some(pos) = fmt.find("%d") {
        crate::core::debug::klog::log_fmt(
            crate::core::debug::klog::LogLevel::Info,
            format_args!("{}{}{}", &fmt[..pos], arg, &fmt[pos + 2..]),
        );
    } else {
        crate::kinfo!(fmt);
    }

    Ok(0)
}
