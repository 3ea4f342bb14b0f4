//! TTY: disciplina de linha em modo cooked.
//!
//! Cada tty tem um FIFO de entrada e um de saída. Os ponteiros dos
//! FIFOs são atualizados em seções curtíssimas com interrupções
//! desabilitadas; o fluxo é regulado por semáforos: o de entrada conta
//! bytes disponíveis para ler, o de saída conta vagas livres para
//! escrever.
//!
//! Escrita (cooked): para cada byte, espera vaga, converte `\n` em
//! `\r\n` quando OCRLF está ligado e pede ao console para drenar.
//! Leitura (cooked): espera byte, aplica apagar com DEL, converte CR
//! em NL quando INLCR está ligado, expande NL em CRNL, ecoa quando
//! IECHO está ligado e encerra a linha em CR ou LF.

use bitflags::bitflags;

use crate::arch::x86::cpu;
use crate::core::config::{TTY_IBUF_SIZE, TTY_NR, TTY_OBUF_SIZE};
use crate::drivers::console;
use crate::drivers::device::{DevDesc, DevOps, DEV_TTY};
use crate::sync::Semaphore;
use crate::sys::error::{SysError, SysResult};

/// Apagar (tecla backspace chega como DEL).
pub const ASCII_DEL: u8 = 0x7F;

// Comandos do tty_control
pub const TTY_CMD_ECHO: i32 = 1;
pub const TTY_CMD_IN_COUNT: i32 = 2;

bitflags! {
    /// Flags de entrada.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TtyInFlags: u32 {
        /// Converte CR digitado em NL (e expande NL recebido em CRNL)
        const INLCR = 1 << 0;
        /// Eco local do que foi digitado
        const IECHO = 1 << 1;
    }
}

bitflags! {
    /// Flags de saída.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TtyOutFlags: u32 {
        /// `\n` vira `\r\n` na saída
        const OCRLF = 1 << 0;
    }
}

/// FIFO circular de bytes. Os acessos aos ponteiros são protegidos por
/// desabilitar interrupções (o teclado escreve de dentro do IRQ).
pub struct TtyFifo {
    buf: [u8; TTY_OBUF_SIZE],
    read: usize,
    write: usize,
    count: usize,
}

impl TtyFifo {
    pub const fn new() -> Self {
        Self {
            buf: [0; TTY_OBUF_SIZE],
            read: 0,
            write: 0,
            count: 0,
        }
    }

    /// Enfileira um byte; erro se cheio.
    pub fn put(&mut self, c: u8) -> SysResult<()> {
        let state = cpu::enter_protection();

        if self.count >= self.buf.len() {
            cpu::leave_protection(state);
            return Err(SysError::Busy);
        }

        self.buf[self.write] = c;
        self.write += 1;
        if self.write >= self.buf.len() {
            self.write = 0;
        }
        self.count += 1;

        cpu::leave_protection(state);
        Ok(())
    }

    /// Desenfileira um byte, se houver.
    pub fn get(&mut self) -> Option<u8> {
        let state = cpu::enter_protection();

        if self.count == 0 {
            cpu::leave_protection(state);
            return None;
        }

        let c = self.buf[self.read];
        self.read += 1;
        if self.read >= self.buf.len() {
            self.read = 0;
        }
        self.count -= 1;

        cpu::leave_protection(state);
        Some(c)
    }
}

/// Um terminal virtual.
pub struct Tty {
    pub ofifo: TtyFifo,
    pub ififo: TtyFifo,
    /// Vagas livres no FIFO de saída
    pub osem: Semaphore,
    /// Bytes disponíveis no FIFO de entrada
    pub isem: Semaphore,
    pub iflags: TtyInFlags,
    pub oflags: TtyOutFlags,
    pub console_idx: usize,
}

impl Tty {
    const fn new() -> Self {
        Self {
            ofifo: TtyFifo::new(),
            ififo: TtyFifo::new(),
            osem: Semaphore::new(0),
            isem: Semaphore::new(0),
            iflags: TtyInFlags::empty(),
            oflags: TtyOutFlags::empty(),
            console_idx: 0,
        }
    }
}

const EMPTY_TTY: Tty = Tty::new();
static mut TTY_DEVS: [Tty; TTY_NR] = [EMPTY_TTY; TTY_NR];

/// TTY com o foco do teclado.
static mut CURR_TTY: usize = 0;

fn tty(minor: usize) -> &'static mut Tty {
    // SAFETY: minor já validado; FIFOs e semáforos sincronizam por
    // dentro (interrupções desabilitadas)
    unsafe { &mut (*core::ptr::addr_of_mut!(TTY_DEVS))[minor] }
}

fn check_minor(minor: usize) -> SysResult<()> {
    if minor < TTY_NR {
        Ok(())
    } else {
        crate::kwarn!("(Tty) minor inválido:", minor as u64);
        Err(SysError::InvalidArgument)
    }
}

/// Abre (e reinicia) um tty: FIFOs zerados, semáforos no estado
/// inicial, modo cooked com eco ligado.
fn tty_open(minor: usize) -> SysResult<()> {
    check_minor(minor)?;

    let tty = tty(minor);
    tty.ofifo = TtyFifo::new();
    tty.osem.init(TTY_OBUF_SIZE as u32);
    tty.ififo = TtyFifo::new();
    tty.isem.init(0);

    tty.console_idx = minor;
    tty.iflags = TtyInFlags::INLCR | TtyInFlags::IECHO;
    tty.oflags = TtyOutFlags::OCRLF;

    crate::drivers::keyboard::init();
    console::init(minor);
    Ok(())
}

/// Escreve `size` bytes em modo cooked e drena pelo console.
fn tty_write(minor: usize, buf: *const u8, size: usize) -> SysResult<usize> {
    check_minor(minor)?;
    let tty = tty(minor);

    let mut len = 0usize;
    for i in 0..size {
        // SAFETY: buffer do chamador; acesso ruim gera page fault dele
        let c = unsafe { *buf.add(i) };

        if c == b'\n' && tty.oflags.contains(TtyOutFlags::OCRLF) {
            tty.osem.wait();
            if tty.ofifo.put(b'\r').is_err() {
                break;
            }
        }

        tty.osem.wait();
        if tty.ofifo.put(c).is_err() {
            break;
        }

        len += 1;

        // A saída é drenada já: o console escreve direto, sem IRQ
        console::write(minor);
    }

    Ok(len)
}

/// Lê uma linha em modo cooked.
fn tty_read(minor: usize, buf: *mut u8, size: usize) -> SysResult<usize> {
    check_minor(minor)?;
    let tty = tty(minor);

    let mut len = 0usize;
    while len < size {
        // Bloqueia até o teclado entregar um byte
        tty.isem.wait();

        let Some(mut ch) = tty.ififo.get() else {
            continue;
        };

        match ch {
            ASCII_DEL => {
                if len == 0 {
                    continue;
                }
                len -= 1;
            }
            b'\r' => {
                // Enter chega como CR; em modo cooked vira NL
                if tty.iflags.contains(TtyInFlags::INLCR) {
                    ch = b'\n';
                }
                // SAFETY: len < size, dentro do buffer do chamador
                unsafe { *buf.add(len) = ch };
                len += 1;
            }
            b'\n' => {
                // NL recebido expande para CRNL, se couber
                if tty.iflags.contains(TtyInFlags::INLCR) && len < size - 1 {
                    // SAFETY: len < size - 1
                    unsafe { *buf.add(len) = b'\r' };
                    len += 1;
                }
                // SAFETY: len < size
                unsafe { *buf.add(len) = b'\n' };
                len += 1;
            }
            _ => {
                // SAFETY: len < size
                unsafe { *buf.add(len) = ch };
                len += 1;
            }
        }

        if tty.iflags.contains(TtyInFlags::IECHO) {
            tty_write(minor, &ch as *const u8, 1)?;
        }

        // Fim de linha encerra a leitura
        if ch == b'\r' || ch == b'\n' {
            break;
        }
    }

    Ok(len)
}

/// Comandos de controle.
fn tty_control(minor: usize, cmd: i32, arg0: u32, arg1: u32) -> SysResult<usize> {
    check_minor(minor)?;
    let tty = tty(minor);
    let _ = arg1;

    match cmd {
        TTY_CMD_ECHO => {
            if arg0 != 0 {
                tty.iflags |= TtyInFlags::IECHO;
                console::set_cursor_visible(tty.console_idx, true);
            } else {
                tty.iflags &= !TtyInFlags::IECHO;
                console::set_cursor_visible(tty.console_idx, false);
            }
            Ok(0)
        }
        TTY_CMD_IN_COUNT => {
            if arg0 != 0 {
                // SAFETY: ponteiro do chamador no espaço corrente
                unsafe { *(arg0 as *mut u32) = tty.isem.count() };
            }
            Ok(0)
        }
        _ => Ok(0),
    }
}

/// Entrada vinda do teclado: vai para o tty com foco.
pub fn tty_in(ch: u8) {
    // SAFETY: leitura de um usize; o foco só muda pelo próprio teclado
    let minor = unsafe { CURR_TTY };
    let tty = tty(minor);

    // Sem vaga, o byte é descartado (o usuário digitou rápido demais)
    if tty.isem.count() >= TTY_IBUF_SIZE as u32 {
        return;
    }

    if tty.ififo.put(ch).is_ok() {
        tty.isem.notify();
    }
}

/// Troca o tty com foco (F1..F8 no teclado).
pub fn tty_select(minor: usize) {
    if minor >= TTY_NR {
        return;
    }

    // SAFETY: escrito só daqui (contexto do IRQ do teclado)
    unsafe {
        if CURR_TTY != minor {
            console::select(minor);
            CURR_TTY = minor;
        }
    }
}

/// Drena um byte do FIFO de saída (chamado pelo console), devolvendo a
/// vaga ao semáforo de escrita.
pub fn fifo_get_output(minor: usize) -> Option<u8> {
    let tty = tty(minor);
    let c = tty.ofifo.get()?;
    tty.osem.notify();
    Some(c)
}

// === Registro na tabela de dispositivos ===

struct TtyDev;

impl DevOps for TtyDev {
    fn open(&self, minor: usize) -> SysResult<()> {
        tty_open(minor)
    }

    fn read(&self, minor: usize, _addr: u32, buf: *mut u8, size: usize) -> SysResult<usize> {
        tty_read(minor, buf, size)
    }

    fn write(&self, minor: usize, _addr: u32, buf: *const u8, size: usize) -> SysResult<usize> {
        tty_write(minor, buf, size)
    }

    fn control(&self, minor: usize, cmd: i32, arg0: u32, arg1: u32) -> SysResult<usize> {
        tty_control(minor, cmd, arg0, arg1)
    }

    fn close(&self, _minor: usize) {}
}

static TTY_DEV: TtyDev = TtyDev;

pub static DEV_TTY_DESC: DevDesc = DevDesc {
    name: "tty",
    major: DEV_TTY,
    ops: &TTY_DEV,
};
