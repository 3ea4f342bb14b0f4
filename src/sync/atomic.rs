//! Inteiros atômicos.
//!
//! Encapsulam `core::sync::atomic` com a interface que o resto do
//! kernel usa: um inteiro com leitura/escrita/aritmética atômicas
//! (read-modify-write com lock de barramento no x86).

use core::sync::atomic::{AtomicI32, AtomicU32, Ordering};

/// Inteiro atômico com sinal.
pub struct AtomicInt {
    value: AtomicI32,
}

impl AtomicInt {
    pub const fn new(initial: i32) -> Self {
        Self {
            value: AtomicI32::new(initial),
        }
    }

    #[inline]
    pub fn read(&self) -> i32 {
        self.value.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn write(&self, v: i32) {
        self.value.store(v, Ordering::SeqCst)
    }

    #[inline]
    pub fn add(&self, v: i32) {
        self.value.fetch_add(v, Ordering::SeqCst);
    }

    #[inline]
    pub fn sub(&self, v: i32) {
        self.value.fetch_sub(v, Ordering::SeqCst);
    }

    #[inline]
    pub fn inc(&self) {
        self.add(1)
    }

    #[inline]
    pub fn dec(&self) {
        self.sub(1)
    }
}

/// Contador monotônico sem sinal (pids, ticks).
pub struct AtomicCounter {
    value: AtomicU32,
}

impl AtomicCounter {
    pub const fn new(initial: u32) -> Self {
        Self {
            value: AtomicU32::new(initial),
        }
    }

    /// Incrementa e devolve o valor ANTERIOR.
    #[inline]
    pub fn inc(&self) -> u32 {
        self.value.fetch_add(1, Ordering::SeqCst)
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.value.load(Ordering::SeqCst)
    }
}
