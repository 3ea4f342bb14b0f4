//! Interface de syscalls com o userspace.
//!
//! Dois caminhos de entrada equivalentes desembocam no mesmo dispatch:
//!
//! 1. **Call gate** (seletor 0x18, DPL3, 5 parâmetros): o hardware
//!    copia id + 4 argumentos da pilha do usuário para a pilha de
//!    kernel. O stub abaixo completa o frame e chama o dispatcher.
//! 2. **int 0x80** (DPL3): id e argumentos viajam em registradores
//!    (eax, ebx, ecx, edx, esi); o handler mora no caminho comum de
//!    exceções (`arch::x86::idt`).

pub mod dispatch;
pub mod frame;
pub mod numbers;

#[cfg(feature = "self_test")]
pub mod test;

use crate::core::config::{KERNEL_SELECTOR_DS, SYSCALL_PARAM_COUNT};
use frame::{SyscallArgs, SyscallFrame};

/// Entrada da syscall via call gate.
///
/// Na chegada, o hardware já empilhou ss, esp, os 5 parâmetros, cs e
/// eip. O stub salva o resto do estado no mesmo layout de
/// `SyscallFrame`, troca os segmentos de dados para os do kernel e
/// chama o dispatcher com um ponteiro para o frame. A volta é por
/// `retf 20`, que descarta os parâmetros copiados.
#[naked]
pub unsafe extern "C" fn exception_handler_syscall() {
    core::arch::asm!(
        "pushad",
        "push ds",
        "push es",
        "push fs",
        "push gs",
        "pushfd",
        "mov ax, {kds}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "mov eax, esp",
        "push eax",
        "call {handler}",
        "add esp, 4",
        "popfd",
        "pop gs",
        "pop fs",
        "pop es",
        "pop ds",
        "popad",
        "retf {param_bytes}",
        kds = const KERNEL_SELECTOR_DS,
        handler = sym do_handler_syscall,
        param_bytes = const (SYSCALL_PARAM_COUNT * 4),
        options(noreturn)
    );
}

/// Dispatcher do caminho do call gate: o retorno vai no eax salvo do
/// frame, que o `popad` entrega de volta ao usuário.
extern "C" fn do_handler_syscall(frame: *mut SyscallFrame) {
    // SAFETY: o stub acabou de construir o frame nesta pilha
    let frame = unsafe { &mut *frame };

    let args = SyscallArgs {
        id: frame.func_id as usize,
        arg0: frame.arg0,
        arg1: frame.arg1,
        arg2: frame.arg2,
        arg3: frame.arg3,
    };

    let ret = dispatch::do_syscall(&args);
    frame.eax = ret as u32;
}

/// Caminho alternativo via `int 0x80`: id em eax, argumentos em
/// ebx/ecx/edx/esi (quatro no máximo por esta via). Registrado no
/// caminho comum de exceções pelo init da IDT.
pub fn do_handler_syscall_irq(frame: &mut crate::arch::x86::idt::ExceptionFrame) {
    let args = SyscallArgs {
        id: frame.eax as usize,
        arg0: frame.ebx,
        arg1: frame.ecx,
        arg2: frame.edx,
        arg3: frame.esi,
    };

    frame.eax = dispatch::do_syscall(&args) as u32;
}
