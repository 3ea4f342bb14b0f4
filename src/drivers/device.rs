//! Abstração de dispositivo: tabela major/minor.
//!
//! Cada driver registra um descritor com sua tupla de operações; a
//! camada de arquivos chega aqui pelo número major e o minor escolhe a
//! instância dentro do driver. Aberturas repetidas do mesmo (major,
//! minor) compartilham a entrada, com contagem de uso.

use crate::sync::Spinlock;
use crate::sys::error::{SysError, SysResult};

/// Majors conhecidos.
pub const DEV_TTY: u32 = 1;

/// Operações de um driver. `addr` é a posição do acesso, para drivers
/// endereçáveis (o tty ignora).
pub trait DevOps: Sync {
    fn open(&self, minor: usize) -> SysResult<()>;
    fn read(&self, minor: usize, addr: u32, buf: *mut u8, size: usize) -> SysResult<usize>;
    fn write(&self, minor: usize, addr: u32, buf: *const u8, size: usize) -> SysResult<usize>;
    fn control(&self, minor: usize, cmd: i32, arg0: u32, arg1: u32) -> SysResult<usize>;
    fn close(&self, minor: usize);
}

/// Descritor de um driver registrado.
pub struct DevDesc {
    pub name: &'static str,
    pub major: u32,
    pub ops: &'static dyn DevOps,
}

/// Drivers conhecidos do kernel.
static DEV_DESC_TABLE: &[&DevDesc] = &[&crate::drivers::tty::DEV_TTY_DESC];

/// Handle de um dispositivo aberto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevId(usize);

#[derive(Clone, Copy)]
struct DeviceEntry {
    major: u32,
    minor: usize,
    open_count: u32,
}

const DEV_TABLE_SIZE: usize = 16;

const FREE_ENTRY: DeviceEntry = DeviceEntry {
    major: 0,
    minor: 0,
    open_count: 0,
};

static DEVICES: Spinlock<[DeviceEntry; DEV_TABLE_SIZE]> = Spinlock::new([FREE_ENTRY; DEV_TABLE_SIZE]);

fn desc_for(major: u32) -> SysResult<&'static DevDesc> {
    DEV_DESC_TABLE
        .iter()
        .find(|desc| desc.major == major)
        .copied()
        .ok_or(SysError::NotFound)
}

/// Resolve um DevId aberto para (driver, minor).
fn resolve(dev: DevId) -> SysResult<(&'static DevDesc, usize)> {
    let entry = {
        let devices = DEVICES.lock();
        if dev.0 >= DEV_TABLE_SIZE || devices[dev.0].open_count == 0 {
            return Err(SysError::BadFile);
        }
        devices[dev.0]
    };

    Ok((desc_for(entry.major)?, entry.minor))
}

/// Abre (major, minor); instâncias já abertas só ganham referência.
pub fn dev_open(major: u32, minor: usize) -> SysResult<DevId> {
    let desc = desc_for(major)?;

    let (id, first_open) = {
        let mut devices = DEVICES.lock();

        let existing = devices
            .iter()
            .position(|e| e.open_count > 0 && e.major == major && e.minor == minor);

        match existing {
            Some(i) => {
                devices[i].open_count += 1;
                (i, false)
            }
            None => {
                let free = devices
                    .iter()
                    .position(|e| e.open_count == 0)
                    .ok_or(SysError::Busy)?;
                devices[free] = DeviceEntry {
                    major,
                    minor,
                    open_count: 1,
                };
                (free, true)
            }
        }
    };

    if first_open {
        // O open do driver roda fora do lock: pode demorar
        if let Err(err) = desc.ops.open(minor) {
            DEVICES.lock()[id].open_count = 0;
            return Err(err);
        }
    }

    Ok(DevId(id))
}

/// Lê do dispositivo. Pode bloquear no driver (tty espera entrada).
pub fn dev_read(dev: DevId, addr: u32, buf: *mut u8, size: usize) -> SysResult<usize> {
    let (desc, minor) = resolve(dev)?;
    desc.ops.read(minor, addr, buf, size)
}

/// Escreve no dispositivo.
pub fn dev_write(dev: DevId, addr: u32, buf: *const u8, size: usize) -> SysResult<usize> {
    let (desc, minor) = resolve(dev)?;
    desc.ops.write(minor, addr, buf, size)
}

/// Comando de controle do driver.
pub fn dev_control(dev: DevId, cmd: i32, arg0: u32, arg1: u32) -> SysResult<usize> {
    let (desc, minor) = resolve(dev)?;
    desc.ops.control(minor, cmd, arg0, arg1)
}

/// Solta uma referência; a última fecha o driver.
pub fn dev_close(dev: DevId) {
    let closed = {
        let mut devices = DEVICES.lock();
        if dev.0 >= DEV_TABLE_SIZE || devices[dev.0].open_count == 0 {
            return;
        }
        devices[dev.0].open_count -= 1;
        if devices[dev.0].open_count == 0 {
            Some((devices[dev.0].major, devices[dev.0].minor))
        } else {
            None
        }
    };

    if let Some((major, minor)) = closed {
        if let Ok(desc) = desc_for(major) {
            desc.ops.close(minor);
        }
    }
}
