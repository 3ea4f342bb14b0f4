//! Entry point lógico do kernel.
//!
//! O `_start` em assembly só arma a pilha e cai aqui. A ordem dos inits
//! é estrita: GDT e IDT antes de qualquer coisa que possa faltar,
//! memória antes de quem aloca, e o task manager por último: a partir
//! dele existe task corrente.

use crate::arch::x86::{gdt, idt};
use crate::core::boot::BootInfo;
use crate::core::config::OS_VERSION;
use crate::sched::manager;

/// Função principal do kernel (nunca retorna).
///
/// `boot_info` chega do loader com o mapa de RAM; sem nenhuma região
/// utilizável não há o que fazer além de travar.
#[no_mangle]
pub extern "C" fn kernel_main(boot_info: &'static BootInfo) -> ! {
    if boot_info.ram_region_count == 0 {
        crate::arch::Cpu::hang();
    }

    // GDT do kernel no lugar da provisória do loader
    gdt::init();

    // IDT completa + política de exceções
    idt::init();

    // Log primeiro: os inits seguintes já podem reclamar pela serial
    crate::core::debug::klog::init();
    crate::kinfo!("==============================");
    crate::kinfo!("Bigorna kernel");
    crate::kinfo!(OS_VERSION);
    crate::kinfo!("==============================");

    // Memória antes de todo mundo que aloca página
    crate::mm::init(boot_info);

    // Camada de arquivos
    crate::fs::init();

    // PIC remapeado e PIT batendo
    crate::drivers::pic::init();
    crate::drivers::timer::init();

    // Task manager: idle task e segmentos de aplicação
    manager::task_manager_init();

    // Self-tests: depois de tudo inicializado, antes da primeira task
    #[cfg(feature = "self_test")]
    run_self_tests();

    init_main();
}

#[cfg(feature = "self_test")]
fn run_self_tests() {
    crate::kinfo!("=== SELF-TEST ===");

    crate::arch::x86::test::run_arch_tests();
    crate::klib::test::run_klib_tests();
    crate::sys::test::run_sys_tests();
    crate::sync::test::run_sync_tests();
    crate::mm::test::run_memory_tests();
    crate::sched::test::run_sched_tests();
    crate::syscall::test::run_syscall_tests();
    crate::drivers::test::run_driver_tests();
    crate::fs::test::run_fs_tests();

    crate::kinfo!("=== SELF-TEST OK ===");
}

/// Cria a primeira task e entrega a CPU a ela.
fn init_main() -> ! {
    crate::kinfo!("kernel de pé, ticks até aqui:", crate::drivers::timer::ticks() as u64);
    crate::kinfo!("criando a primeira task...");

    manager::task_first_init();
    move_to_first_task();
}

/// Salta para a primeira task em CPL3.
///
/// Não dá para usar um far jump direto: estamos em CPL0 e o destino é
/// menos privilegiado. O caminho legal é simular um retorno de
/// interrupção: empilha SS/ESP/EFLAGS/CS/EIP da task e executa `iret`.
/// Os registradores de segmento de dados são carregados pelo próprio
/// código de usuário (crt0) a partir do SS.
fn move_to_first_task() -> ! {
    let first = manager::current_id().expect("primeira task não criada");
    let tss = &manager::task(first).tss;

    // SAFETY: o TSS da primeira task foi preenchido por task_first_init
    // com seletores DPL3 válidos e a pilha/entry mapeados
    unsafe {
        core::arch::asm!(
            "push {ss}",
            "push {esp}",
            "push {eflags}",
            "push {cs}",
            "push {eip}",
            "iretd",
            ss = in(reg) tss.ss,
            esp = in(reg) tss.esp,
            eflags = in(reg) tss.eflags,
            cs = in(reg) tss.cs,
            eip = in(reg) tss.eip,
            options(noreturn)
        );
    }
}
