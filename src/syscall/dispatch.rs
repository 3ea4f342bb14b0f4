//! Tabela de dispatch de syscalls.
//!
//! Tabela estática indexada pelo número da chamada; `None` quer dizer
//! não implementada (retorno negativo para o chamador). Os wrappers
//! fazem só a conversão de ABI (u32 crus -> tipos dos módulos).

use super::frame::SyscallArgs;
use super::numbers::*;
use crate::fs;
use crate::mm::vmm;
use crate::sched::{manager, process};
use crate::sys::error::{result_to_isize, SysError, SysResult};

/// Tipo de handler de syscall.
pub type SyscallHandler = fn(&SyscallArgs) -> SysResult<usize>;

/// Tamanho da tabela (256 syscalls possíveis).
pub const TABLE_SIZE: usize = 256;

/// Tabela de syscalls, preenchida estaticamente.
pub static SYSCALL_TABLE: [Option<SyscallHandler>; TABLE_SIZE] = {
    let mut table: [Option<SyscallHandler>; TABLE_SIZE] = [None; TABLE_SIZE];

    // === Processos (0-6) ===
    table[SYS_MSLEEP] = Some(sys_msleep_wrapper);
    table[SYS_GETPID] = Some(sys_getpid_wrapper);
    table[SYS_FORK] = Some(sys_fork_wrapper);
    table[SYS_EXECVE] = Some(sys_execve_wrapper);
    table[SYS_YIELD] = Some(sys_yield_wrapper);
    table[SYS_EXIT] = Some(sys_exit_wrapper);
    table[SYS_WAIT] = Some(sys_wait_wrapper);

    // === Arquivos (50-59) ===
    table[SYS_OPEN] = Some(sys_open_wrapper);
    table[SYS_READ] = Some(sys_read_wrapper);
    table[SYS_WRITE] = Some(sys_write_wrapper);
    table[SYS_CLOSE] = Some(sys_close_wrapper);
    table[SYS_LSEEK] = Some(sys_lseek_wrapper);
    table[SYS_ISATTY] = Some(sys_isatty_wrapper);
    table[SYS_SBRK] = Some(sys_sbrk_wrapper);
    table[SYS_FSTAT] = Some(sys_fstat_wrapper);
    table[SYS_DUP] = Some(sys_dup_wrapper);
    table[SYS_IOCTL] = Some(sys_ioctl_wrapper);

    // === Diretórios (60-63) ===
    table[SYS_OPENDIR] = Some(sys_opendir_wrapper);
    table[SYS_READDIR] = Some(sys_readdir_wrapper);
    table[SYS_CLOSEDIR] = Some(sys_closedir_wrapper);
    table[SYS_UNLINK] = Some(sys_unlink_wrapper);

    // === Diversos ===
    table[SYS_PRINTMSG] = Some(sys_printmsg_wrapper);

    table
};

/// Resolve e executa uma syscall; o retorno é o valor cru para EAX.
pub fn do_syscall(args: &SyscallArgs) -> isize {
    let result = match SYSCALL_TABLE.get(args.id).copied().flatten() {
        Some(handler) => handler(args),
        None => {
            crate::kwarn!("(Syscall) id desconhecido:", args.id as u64);
            Err(SysError::NotImplemented)
        }
    };

    result_to_isize(result)
}

// === Processos ===

fn sys_msleep_wrapper(args: &SyscallArgs) -> SysResult<usize> {
    manager::sys_msleep(args.arg0)
}

fn sys_getpid_wrapper(_args: &SyscallArgs) -> SysResult<usize> {
    process::sys_getpid()
}

fn sys_fork_wrapper(_args: &SyscallArgs) -> SysResult<usize> {
    process::sys_fork()
}

fn sys_execve_wrapper(args: &SyscallArgs) -> SysResult<usize> {
    process::sys_execve(args.arg0, args.arg1, args.arg2)
}

fn sys_yield_wrapper(_args: &SyscallArgs) -> SysResult<usize> {
    manager::sys_yield()
}

fn sys_exit_wrapper(args: &SyscallArgs) -> SysResult<usize> {
    process::sys_exit(args.arg0 as i32)
}

fn sys_wait_wrapper(args: &SyscallArgs) -> SysResult<usize> {
    process::sys_wait(args.arg0)
}

// === Arquivos ===

fn sys_open_wrapper(args: &SyscallArgs) -> SysResult<usize> {
    let mut name_buf = [0u8; 64];
    let name = fs::read_path(args.arg0, &mut name_buf)?;
    fs::sys_open(name, args.arg1)
}

fn sys_read_wrapper(args: &SyscallArgs) -> SysResult<usize> {
    fs::sys_read(args.arg0 as usize, args.arg1 as *mut u8, args.arg2 as usize)
}

fn sys_write_wrapper(args: &SyscallArgs) -> SysResult<usize> {
    fs::sys_write(args.arg0 as usize, args.arg1 as *const u8, args.arg2 as usize)
}

fn sys_close_wrapper(args: &SyscallArgs) -> SysResult<usize> {
    fs::sys_close(args.arg0 as usize)
}

fn sys_lseek_wrapper(args: &SyscallArgs) -> SysResult<usize> {
    fs::sys_lseek(args.arg0 as usize, args.arg1 as i32, args.arg2 as i32)
}

fn sys_isatty_wrapper(args: &SyscallArgs) -> SysResult<usize> {
    fs::sys_isatty(args.arg0 as usize)
}

fn sys_sbrk_wrapper(args: &SyscallArgs) -> SysResult<usize> {
    // Contrato do sbrk: falha é o sentinela -1, não um errno
    match vmm::sys_sbrk(args.arg0 as i32) {
        Ok(prev) => Ok(prev as usize),
        Err(_) => Ok(usize::MAX),
    }
}

fn sys_fstat_wrapper(args: &SyscallArgs) -> SysResult<usize> {
    fs::sys_fstat(args.arg0 as usize, args.arg1)
}

fn sys_dup_wrapper(args: &SyscallArgs) -> SysResult<usize> {
    fs::sys_dup(args.arg0 as usize)
}

fn sys_ioctl_wrapper(args: &SyscallArgs) -> SysResult<usize> {
    fs::sys_ioctl(args.arg0 as usize, args.arg1 as i32, args.arg2, args.arg3)
}

// === Diretórios: a implementação mora no filesystem externo ===

fn sys_opendir_wrapper(_args: &SyscallArgs) -> SysResult<usize> {
    Err(SysError::NotImplemented)
}

fn sys_readdir_wrapper(_args: &SyscallArgs) -> SysResult<usize> {
    Err(SysError::NotImplemented)
}

fn sys_closedir_wrapper(_args: &SyscallArgs) -> SysResult<usize> {
    Err(SysError::NotImplemented)
}

fn sys_unlink_wrapper(_args: &SyscallArgs) -> SysResult<usize> {
    Err(SysError::NotImplemented)
}

// === Diversos ===

fn sys_printmsg_wrapper(args: &SyscallArgs) -> SysResult<usize> {
    process::sys_printmsg(args.arg0, args.arg1 as i32)
}
