//! Programmable Interval Timer (8254): o coração do sistema.
//!
//! Canal 0 em modo 3 (onda quadrada), um tick a cada `OS_TICK_MS`.
//! O handler incrementa o contador global, manda o EOI ANTES da
//! contabilidade do scheduler (uma troca de tarefa lá dentro deixaria
//! a linha do timer pendurada sem EOI até a task voltar) e então roda o
//! time tick das tasks.

use crate::arch::x86::idt::{self, ExceptionFrame, IRQ0_TIMER};
use crate::arch::x86::ports::outb;
use crate::core::config::OS_TICK_MS;
use crate::drivers::pic;
use crate::sched::manager;
use crate::sync::AtomicCounter;

/// Frequência base do PIT (Hz).
const PIT_OSC_FREQ: u32 = 1193182;

const PIT_CHANNEL0_DATA_PORT: u16 = 0x40;
const PIT_COMMAND_MODE_PORT: u16 = 0x43;

const PIT_CHANNEL0: u8 = 0 << 6;
const PIT_LOAD_LOHI: u8 = 3 << 4; // byte baixo, depois alto
const PIT_MODE3: u8 = 3 << 1; // onda quadrada

/// Ticks desde o boot.
static SYS_TICK: AtomicCounter = AtomicCounter::new(0);

/// Contador global de ticks.
pub fn ticks() -> u32 {
    SYS_TICK.get()
}

fn pit_init() {
    let reload_count = PIT_OSC_FREQ / (1000 / OS_TICK_MS);

    outb(PIT_COMMAND_MODE_PORT, PIT_CHANNEL0 | PIT_LOAD_LOHI | PIT_MODE3);
    outb(PIT_CHANNEL0_DATA_PORT, (reload_count & 0xFF) as u8);
    outb(PIT_CHANNEL0_DATA_PORT, ((reload_count >> 8) & 0xFF) as u8);
}

/// Handler do tick.
fn do_handler_timer(_frame: &mut ExceptionFrame) {
    SYS_TICK.inc();

    // EOI primeiro: o task_time_tick pode trocar de tarefa e só voltar
    // aqui muito depois
    pic::send_eoi(IRQ0_TIMER);

    manager::task_time_tick();
}

/// Programa o PIT e liga a linha de IRQ do timer.
pub fn init() {
    pit_init();

    idt::irq_install(IRQ0_TIMER, idt::entry_timer, do_handler_timer)
        .expect("vetor do timer inválido");
    pic::irq_enable(IRQ0_TIMER);

    crate::kinfo!("(PIT) tick configurado, ms:", OS_TICK_MS as u64);
}
