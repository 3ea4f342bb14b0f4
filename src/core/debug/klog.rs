//! Sistema de logging do kernel.
//!
//! Toda saída vai para a serial COM1 (polled). Os macros `kinfo!` etc.
//! aceitam uma mensagem e, opcionalmente, um valor que é impresso em hexa.

use core::fmt::Write;

use crate::drivers::serial;

/// Nível de log
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

fn prefix(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "[DEBUG] ",
        LogLevel::Info => "[INFO]  ",
        LogLevel::Warn => "[WARN]  ",
        LogLevel::Error => "[ERROR] ",
    }
}

/// Inicializa o backend de log (UART COM1).
pub fn init() {
    serial::init();
}

/// Emite uma linha de log
pub fn log(level: LogLevel, message: &str) {
    let mut out = serial::SERIAL1.lock();
    let _ = out.write_str(prefix(level));
    let _ = out.write_str(message);
    let _ = out.write_str("\n");
}

/// Emite log com valor hexadecimal
pub fn log_hex(level: LogLevel, message: &str, value: u64) {
    let mut out = serial::SERIAL1.lock();
    let _ = out.write_str(prefix(level));
    let _ = out.write_str(message);
    let _ = write!(out, " 0x{:x}", value);
    let _ = out.write_str("\n");
}

/// Emite log formatado (usado pelos dumps de exceção e pelo panic).
pub fn log_fmt(level: LogLevel, args: core::fmt::Arguments) {
    let mut out = serial::SERIAL1.lock();
    let _ = out.write_str(prefix(level));
    let _ = out.write_fmt(args);
    let _ = out.write_str("\n");
}

// Macros de conveniência

#[macro_export]
macro_rules! kinfo {
    ($msg:expr) => {
        $crate::core::debug::klog::log($crate::core::debug::klog::LogLevel::Info, $msg)
    };
    ($msg:expr, $val:expr) => {
        $crate::core::debug::klog::log_hex(
            $crate::core::debug::klog::LogLevel::Info,
            $msg,
            $val as u64,
        )
    };
}

#[macro_export]
macro_rules! kwarn {
    ($msg:expr) => {
        $crate::core::debug::klog::log($crate::core::debug::klog::LogLevel::Warn, $msg)
    };
    ($msg:expr, $val:expr) => {
        $crate::core::debug::klog::log_hex(
            $crate::core::debug::klog::LogLevel::Warn,
            $msg,
            $val as u64,
        )
    };
}

#[macro_export]
macro_rules! kerror {
    ($msg:expr) => {
        $crate::core::debug::klog::log($crate::core::debug::klog::LogLevel::Error, $msg)
    };
    ($msg:expr, $val:expr) => {
        $crate::core::debug::klog::log_hex(
            $crate::core::debug::klog::LogLevel::Error,
            $msg,
            $val as u64,
        )
    };
}

#[macro_export]
macro_rules! kdebug {
    ($msg:expr) => {
        #[cfg(debug_assertions)]
        $crate::core::debug::klog::log($crate::core::debug::klog::LogLevel::Debug, $msg)
    };
    ($msg:expr, $val:expr) => {
        #[cfg(debug_assertions)]
        $crate::core::debug::klog::log_hex(
            $crate::core::debug::klog::LogLevel::Debug,
            $msg,
            $val as u64,
        )
    };
}
