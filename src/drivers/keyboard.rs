//! Teclado PS/2 (scancode set 1).
//!
//! O handler de IRQ decodifica o scancode e entrega cada byte pronto ao
//! tty com foco via `tty_in`. F1..F8 trocam o foco entre os terminais.

use spin::Mutex;

use crate::arch::x86::idt::{self, ExceptionFrame, IRQ1_KEYBOARD};
use crate::arch::x86::ports::inb;
use crate::drivers::pic;
use crate::drivers::tty;
use crate::sync::AtomicInt;

const KBD_DATA_PORT: u16 = 0x60;

// Make codes dos modificadores
const SC_LSHIFT: u8 = 0x2A;
const SC_RSHIFT: u8 = 0x36;
const SC_CAPS: u8 = 0x3A;
const SC_E0_PREFIX: u8 = 0xE0;

// F1..F8 trocam o terminal com foco
const SC_F1: u8 = 0x3B;
const SC_F8: u8 = 0x42;

/// Mapa de make code -> ASCII, sem shift. 0 = tecla sem caractere.
/// Enter entrega CR (`\r`); a disciplina cooked converte para NL.
#[rustfmt::skip]
static NORMAL_MAP: [u8; 0x3B] = [
    0, 0x1B, b'1', b'2', b'3', b'4', b'5', b'6',        // 0x00-0x07
    b'7', b'8', b'9', b'0', b'-', b'=', 0x7F, b'\t',    // 0x08-0x0F
    b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i',     // 0x10-0x17
    b'o', b'p', b'[', b']', b'\r', 0, b'a', b's',       // 0x18-0x1F
    b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';',     // 0x20-0x27
    b'\'', b'`', 0, b'\\', b'z', b'x', b'c', b'v',      // 0x28-0x2F
    b'b', b'n', b'm', b',', b'.', b'/', 0, b'*',        // 0x30-0x37
    0, b' ', 0,                                         // 0x38-0x3A
];

/// Mapa com shift pressionado.
#[rustfmt::skip]
static SHIFT_MAP: [u8; 0x3B] = [
    0, 0x1B, b'!', b'@', b'#', b'$', b'%', b'^',        // 0x00-0x07
    b'&', b'*', b'(', b')', b'_', b'+', 0x7F, b'\t',    // 0x08-0x0F
    b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I',     // 0x10-0x17
    b'O', b'P', b'{', b'}', b'\r', 0, b'A', b'S',       // 0x18-0x1F
    b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':',     // 0x20-0x27
    b'"', b'~', 0, b'|', b'Z', b'X', b'C', b'V',        // 0x28-0x2F
    b'B', b'N', b'M', b'<', b'>', b'?', 0, b'*',        // 0x30-0x37
    0, b' ', 0,                                         // 0x38-0x3A
];

struct KbdState {
    lshift: bool,
    rshift: bool,
    caps_lock: bool,
    /// Próximo scancode vem com prefixo 0xE0
    extended: bool,
}

impl KbdState {
    const fn new() -> Self {
        Self {
            lshift: false,
            rshift: false,
            caps_lock: false,
            extended: false,
        }
    }

    fn shifted(&self) -> bool {
        self.lshift || self.rshift
    }

    /// Processa um scancode; devolve o ASCII decodificado, se houver.
    fn process(&mut self, code: u8) -> Option<u8> {
        if code == SC_E0_PREFIX {
            self.extended = true;
            return None;
        }

        if self.extended {
            // Setas e afins: fora do escopo deste teclado
            self.extended = false;
            return None;
        }

        if code & 0x80 != 0 {
            // Break code: só os shifts importam ao soltar
            match code & 0x7F {
                SC_LSHIFT => self.lshift = false,
                SC_RSHIFT => self.rshift = false,
                _ => {}
            }
            return None;
        }

        match code {
            SC_LSHIFT => {
                self.lshift = true;
                None
            }
            SC_RSHIFT => {
                self.rshift = true;
                None
            }
            SC_CAPS => {
                self.caps_lock = !self.caps_lock;
                None
            }
            _ => {
                let map = if self.shifted() {
                    &SHIFT_MAP
                } else {
                    &NORMAL_MAP
                };
                let mut ch = *map.get(code as usize).unwrap_or(&0);
                if ch == 0 {
                    return None;
                }

                // Caps inverte só as letras
                if ch.is_ascii_alphabetic() && self.caps_lock {
                    ch = if self.shifted() {
                        ch.to_ascii_lowercase()
                    } else {
                        ch.to_ascii_uppercase()
                    };
                }

                Some(ch)
            }
        }
    }
}

static KBD_STATE: Mutex<KbdState> = Mutex::new(KbdState::new());

/// Evita registrar o IRQ duas vezes (cada tty_open chama init).
static KBD_INITED: AtomicInt = AtomicInt::new(0);

/// Decodifica um scancode no estado global; ASCII pronto, se houver.
pub fn process_scancode(code: u8) -> Option<u8> {
    KBD_STATE.lock().process(code)
}

/// Handler do IRQ 0x21.
fn do_handler_kbd(_frame: &mut ExceptionFrame) {
    let code = inb(KBD_DATA_PORT);

    // F1..F8: troca de terminal
    if (SC_F1..=SC_F8).contains(&code) {
        tty::tty_select((code - SC_F1) as usize);
    } else if let Some(ch) = process_scancode(code) {
        tty::tty_in(ch);
    }

    pic::send_eoi(IRQ1_KEYBOARD);
}

/// Registra o handler e desmascara a linha do teclado (idempotente).
pub fn init() {
    if KBD_INITED.read() != 0 {
        return;
    }
    KBD_INITED.write(1);

    idt::irq_install(IRQ1_KEYBOARD, idt::entry_keyboard, do_handler_kbd)
        .expect("vetor do teclado inválido");
    pic::irq_enable(IRQ1_KEYBOARD);
}
