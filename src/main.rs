//! Kernel Bigorna: Binário Principal.
//!
//! Responsabilidade:
//! 1. Configurar o ambiente de execução "naked" (Assembly).
//! 2. Inicializar a Stack do kernel.
//! 3. Saltar para `core::entry::kernel_main` (da biblioteca `bigorna`).

#![no_std]
#![no_main]
#![feature(naked_functions)]
#![feature(asm_const)]

use bigorna::core as kernel_core;

// Stack de boot do kernel (8 KB). Mutável para morar no .bss: o
// kernel mapeia o próprio texto/rodata como só-leitura.
#[repr(align(16))]
struct KernelStack([u8; bigorna::core::config::KERNEL_STACK_SIZE]);

#[no_mangle]
static mut KERNEL_STACK: KernelStack =
    KernelStack([0; bigorna::core::config::KERNEL_STACK_SIZE]);

/// Ponto de entrada Naked.
///
/// O loader entra aqui com um ponteiro para `boot_info` na pilha
/// (convenção cdecl de 32 bits). Configuramos ESP e chamamos o
/// `kernel_main` repassando o argumento.
#[naked]
#[no_mangle]
#[link_section = ".text._start"]
pub unsafe extern "C" fn _start() -> ! {
    ::core::arch::asm!(
        // 1. Salvar argumento (boot_info) vindo do loader
        "mov eax, [esp + 4]",

        // 2. Configurar Stack Pointer (ESP)
        "lea esp, [{stack} + {stack_size}]",

        // 3. Zerar EBP (Frame Pointer)
        "xor ebp, ebp",

        // 4. Repassar boot_info e chamar kernel_main (cdecl)
        "push eax",
        "call {kernel_main}",

        // 5. Trap (nunca deve voltar)
        "2:",
        "cli",
        "hlt",
        "jmp 2b",

        stack = sym KERNEL_STACK,
        stack_size = const bigorna::core::config::KERNEL_STACK_SIZE,
        kernel_main = sym kernel_core::entry::kernel_main,
        options(noreturn)
    );
}
