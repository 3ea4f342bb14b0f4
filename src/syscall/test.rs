//! Testes da superfície de syscalls.

use crate::klib::test_framework::{run_test_suite, TestCase, TestResult};
use crate::syscall::dispatch::{do_syscall, SYSCALL_TABLE};
use crate::syscall::frame::SyscallArgs;
use crate::syscall::numbers::*;
use crate::{kassert, kassert_eq};

const SYSCALL_TESTS: &[TestCase] = &[
    TestCase::new("table_shape", test_table_shape),
    TestCase::new("unknown_id_rejected", test_unknown_id_rejected),
    TestCase::new("frame_layout", test_frame_layout),
];

pub fn run_syscall_tests() {
    run_test_suite("Syscall", SYSCALL_TESTS);
}

/// Os ids do contrato estão todos na tabela; o resto está vazio.
fn test_table_shape() -> TestResult {
    let known = [
        SYS_MSLEEP, SYS_GETPID, SYS_FORK, SYS_EXECVE, SYS_YIELD, SYS_EXIT, SYS_WAIT, SYS_OPEN,
        SYS_READ, SYS_WRITE, SYS_CLOSE, SYS_LSEEK, SYS_ISATTY, SYS_SBRK, SYS_FSTAT, SYS_DUP,
        SYS_IOCTL, SYS_OPENDIR, SYS_READDIR, SYS_CLOSEDIR, SYS_UNLINK, SYS_PRINTMSG,
    ];

    for id in known {
        kassert!(SYSCALL_TABLE[id].is_some());
    }

    let mut populated = 0;
    for entry in SYSCALL_TABLE.iter() {
        if entry.is_some() {
            populated += 1;
        }
    }
    kassert_eq!(populated, known.len());

    TestResult::Pass
}

fn args(id: usize) -> SyscallArgs {
    SyscallArgs {
        id,
        arg0: 0,
        arg1: 0,
        arg2: 0,
        arg3: 0,
    }
}

fn test_unknown_id_rejected() -> TestResult {
    // Buraco da tabela e id fora do range: retorno negativo
    kassert!(do_syscall(&args(7)) < 0);
    kassert!(do_syscall(&args(99)) < 0);
    kassert!(do_syscall(&args(4096)) < 0);

    // Sem task corrente, getpid também falha de forma limpa
    kassert!(do_syscall(&args(SYS_GETPID)) < 0);

    TestResult::Pass
}

/// O layout do frame é contrato com os stubs em assembly.
fn test_frame_layout() -> TestResult {
    use crate::syscall::frame::SyscallFrame;
    use core::mem::{offset_of, size_of};

    // eflags + 4 segs + 8 do pushad + eip/cs + id + 4 args + esp/ss
    kassert_eq!(size_of::<SyscallFrame>(), 22 * 4);
    kassert_eq!(offset_of!(SyscallFrame, eflags), 0);
    kassert_eq!(offset_of!(SyscallFrame, edi), 5 * 4);
    kassert_eq!(offset_of!(SyscallFrame, eax), 12 * 4);
    kassert_eq!(offset_of!(SyscallFrame, eip), 13 * 4);
    kassert_eq!(offset_of!(SyscallFrame, func_id), 15 * 4);
    kassert_eq!(offset_of!(SyscallFrame, ss), 21 * 4);

    TestResult::Pass
}
