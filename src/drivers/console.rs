//! Console de texto VGA (backend dos ttys).
//!
//! A memória de vídeo (32KB em 0xB8000) é repartida em oito telas de
//! 80x25; o registrador de start address do CRTC escolhe qual aparece.
//! Cada tty desenha na sua tela, visível ou não.

use crate::arch::x86::ports::outb;
use crate::core::config::TTY_NR;
use crate::mm::config::CONSOLE_VIDEO_BASE;
use crate::sync::Spinlock;

const ROWS: usize = 25;
const COLS: usize = 80;
const CELLS: usize = ROWS * COLS;

/// Atributo default: cinza sobre preto.
const ATTR_DEFAULT: u8 = 0x07;

// Registradores do CRTC
const CRTC_ADDR: u16 = 0x3D4;
const CRTC_DATA: u16 = 0x3D5;
const CRTC_CURSOR_START: u8 = 0x0A;
const CRTC_START_ADDR_HI: u8 = 0x0C;
const CRTC_START_ADDR_LO: u8 = 0x0D;
const CRTC_CURSOR_HI: u8 = 0x0E;
const CRTC_CURSOR_LO: u8 = 0x0F;

struct Console {
    row: usize,
    col: usize,
}

const EMPTY_CONSOLE: Console = Console { row: 0, col: 0 };

/// Estado dos cursores; compartilhado entre tasks e o IRQ do teclado
/// (troca de foco), então spinlock.
static CONSOLES: Spinlock<[Console; TTY_NR]> = Spinlock::new([EMPTY_CONSOLE; TTY_NR]);

/// Console atualmente exibido.
static DISPLAYED: Spinlock<usize> = Spinlock::new(0);

/// Célula (idx, row, col) na memória de vídeo.
fn cell_ptr(idx: usize, row: usize, col: usize) -> *mut u16 {
    let offset = idx * CELLS + row * COLS + col;
    (CONSOLE_VIDEO_BASE as usize + offset * 2) as *mut u16
}

fn write_crtc(reg: u8, value: u8) {
    outb(CRTC_ADDR, reg);
    outb(CRTC_DATA, value);
}

/// Reposiciona o cursor de hardware, se esta tela está visível.
fn update_hw_cursor(idx: usize, row: usize, col: usize) {
    if *DISPLAYED.lock() != idx {
        return;
    }

    let pos = idx * CELLS + row * COLS + col;
    write_crtc(CRTC_CURSOR_HI, (pos >> 8) as u8);
    write_crtc(CRTC_CURSOR_LO, pos as u8);
}

/// Limpa a tela do console `idx` e zera o cursor.
pub fn init(idx: usize) {
    if idx >= TTY_NR {
        return;
    }

    {
        let mut consoles = CONSOLES.lock();
        consoles[idx].row = 0;
        consoles[idx].col = 0;

        for row in 0..ROWS {
            for col in 0..COLS {
                // SAFETY: célula dentro da janela de 32KB mapeada
                unsafe {
                    *cell_ptr(idx, row, col) = (ATTR_DEFAULT as u16) << 8 | b' ' as u16;
                }
            }
        }
    }

    update_hw_cursor(idx, 0, 0);
}

/// Sobe todo o conteúdo uma linha e limpa a última.
fn scroll_up(idx: usize) {
    // SAFETY: regiões fonte e destino dentro da tela do console
    unsafe {
        core::ptr::copy(
            cell_ptr(idx, 1, 0),
            cell_ptr(idx, 0, 0),
            (ROWS - 1) * COLS,
        );
        for col in 0..COLS {
            *cell_ptr(idx, ROWS - 1, col) = (ATTR_DEFAULT as u16) << 8 | b' ' as u16;
        }
    }
}

fn put_char(idx: usize, consoles: &mut [Console; TTY_NR], ch: u8) {
    let console = &mut consoles[idx];

    match ch {
        b'\r' => console.col = 0,
        b'\n' => {
            console.row += 1;
        }
        ASCII_DEL_BYTE => {
            // Eco de apagar: volta uma célula e escreve espaço
            if console.col > 0 {
                console.col -= 1;
            } else if console.row > 0 {
                console.row -= 1;
                console.col = COLS - 1;
            }
            // SAFETY: posição válida na tela
            unsafe {
                *cell_ptr(idx, console.row, console.col) =
                    (ATTR_DEFAULT as u16) << 8 | b' ' as u16;
            }
        }
        _ => {
            // SAFETY: posição válida na tela
            unsafe {
                *cell_ptr(idx, console.row, console.col) =
                    (ATTR_DEFAULT as u16) << 8 | ch as u16;
            }
            console.col += 1;
            if console.col >= COLS {
                console.col = 0;
                console.row += 1;
            }
        }
    }

    if console.row >= ROWS {
        scroll_up(idx);
        console.row = ROWS - 1;
    }
}

const ASCII_DEL_BYTE: u8 = 0x7F;

/// Drena o FIFO de saída do tty `minor` para a tela dele.
pub fn write(minor: usize) -> usize {
    let mut len = 0;

    loop {
        let Some(ch) = crate::drivers::tty::fifo_get_output(minor) else {
            break;
        };

        let (row, col) = {
            let mut consoles = CONSOLES.lock();
            put_char(minor, &mut consoles, ch);
            (consoles[minor].row, consoles[minor].col)
        };
        update_hw_cursor(minor, row, col);

        len += 1;
    }

    len
}

/// Mostra/esconde o cursor de hardware da tela `idx`.
pub fn set_cursor_visible(idx: usize, visible: bool) {
    if *DISPLAYED.lock() != idx {
        return;
    }

    if visible {
        write_crtc(CRTC_CURSOR_START, 0x0E); // scanlines 14-15
    } else {
        write_crtc(CRTC_CURSOR_START, 0x20); // bit 5 desliga
    }
}

/// Troca a tela visível para o console `idx`.
pub fn select(idx: usize) {
    if idx >= TTY_NR {
        return;
    }

    let (row, col) = {
        let mut displayed = DISPLAYED.lock();
        *displayed = idx;
        let consoles = CONSOLES.lock();
        (consoles[idx].row, consoles[idx].col)
    };

    let start = idx * CELLS;
    write_crtc(CRTC_START_ADDR_HI, (start >> 8) as u8);
    write_crtc(CRTC_START_ADDR_LO, start as u8);

    update_hw_cursor(idx, row, col);
}
