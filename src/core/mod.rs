//! Núcleo do kernel: boot, configuração, entry point e logging.

pub mod boot;
pub mod config;
pub mod debug;
pub mod entry;
