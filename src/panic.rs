//! Handler de panic do kernel.
//!
//! Um panic aqui é sempre bug de kernel: loga o que der e trava a CPU.

use core::panic::PanicInfo;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    crate::kerror!("*** KERNEL PANIC ***");

    if let Some(location) = info.location() {
        crate::kerror!(location.file());
        crate::kerror!("linha:", location.line() as u64);
    }

    crate::core::debug::klog::log_fmt(
        crate::core::debug::klog::LogLevel::Error,
        format_args!("{}", info.message()),
    );

    loop {
        crate::arch::x86::cpu::cli();
        crate::arch::x86::cpu::hlt();
    }
}
