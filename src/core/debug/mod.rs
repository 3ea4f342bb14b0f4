//! Ferramentas de diagnóstico do kernel.

pub mod klog;
