//! Registro de imagens de programa.
//!
//! É a costura com o filesystem externo: o boot (ou um teste) registra
//! pares nome -> bytes, e o `sys_open` serve esses nomes como arquivos
//! regulares somente leitura. O execve carrega shells e afins daqui.

use crate::sync::KMutex;
use crate::sys::error::{SysError, SysResult};

const IMAGE_TABLE_SIZE: usize = 8;

#[derive(Clone, Copy)]
struct ImageEntry {
    name: &'static str,
    data: &'static [u8],
}

static mut IMAGES: [Option<ImageEntry>; IMAGE_TABLE_SIZE] = [None; IMAGE_TABLE_SIZE];
static IMAGES_MUTEX: KMutex = KMutex::new();

fn images() -> &'static mut [Option<ImageEntry>; IMAGE_TABLE_SIZE] {
    // SAFETY: serializado por IMAGES_MUTEX
    unsafe { &mut *core::ptr::addr_of_mut!(IMAGES) }
}

/// Registra uma imagem executável sob `name`.
pub fn register(name: &'static str, data: &'static [u8]) -> SysResult<()> {
    let mut result = Err(SysError::Busy);

    IMAGES_MUTEX.lock();
    for slot in images().iter_mut() {
        if slot.is_none() {
            *slot = Some(ImageEntry { name, data });
            result = Ok(());
            break;
        }
    }
    IMAGES_MUTEX.unlock();

    result
}

/// Procura uma imagem pelo nome.
pub fn find(name: &str) -> Option<&'static [u8]> {
    let mut found = None;

    IMAGES_MUTEX.lock();
    for slot in images().iter() {
        if let Some(entry) = slot {
            if entry.name == name {
                found = Some(entry.data);
                break;
            }
        }
    }
    IMAGES_MUTEX.unlock();

    found
}
