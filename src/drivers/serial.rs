//! Driver de Porta Serial (COM1).
//!
//! Usado como saída primária de logs para debug (host/QEMU).

use core::fmt;
use spin::Mutex;

use crate::arch::x86::ports::{inb, outb};

const COM1_PORT: u16 = 0x3F8;

/// Driver Serial protegido por Mutex global.
pub static SERIAL1: Mutex<SerialPort> = Mutex::new(SerialPort::new(COM1_PORT));

/// Estrutura do Driver Serial (sem lock interno).
pub struct SerialPort {
    base: u16,
}

impl SerialPort {
    pub const fn new(base: u16) -> Self {
        Self { base }
    }

    /// Inicializa a UART 16550: 115200 baud, 8N1, FIFO ligado.
    pub fn init(&mut self) {
        outb(self.base + 1, 0x00); // desliga interrupções da UART
        outb(self.base + 3, 0x80); // DLAB=1 para programar o divisor
        outb(self.base, 0x01); // divisor = 1 (115200 baud), byte baixo
        outb(self.base + 1, 0x00); //                         byte alto
        outb(self.base + 3, 0x03); // 8 bits, sem paridade, 1 stop bit
        outb(self.base + 2, 0xC7); // FIFO ligado e limpo, threshold 14
        outb(self.base + 4, 0x0B); // RTS/DSR
    }

    /// Envia um byte pela serial (polling no Line Status).
    pub fn send(&mut self, data: u8) {
        // Bit 5 do Line Status: transmit buffer vazio
        while (inb(self.base + 5) & 0x20) == 0 {}
        outb(self.base, data);
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.send(byte);
        }
        Ok(())
    }
}

/// Inicializa a COM1.
pub fn init() {
    SERIAL1.lock().init();
}
