//! Camada de arquivos: a superfície de syscalls sobre fds.
//!
//! O filesystem de verdade é colaborador externo; aqui mora o que o
//! núcleo precisa dele: a tabela global de arquivos, os fds por task,
//! o roteamento de `/dev/ttyN` para o driver de tty e o registro de
//! imagens de programa que alimenta o execve.

pub mod file;
pub mod image;

#[cfg(feature = "self_test")]
pub mod test;

use crate::drivers::device::{self, DEV_TTY};
use crate::sched::manager;
use crate::sys::error::{SysError, SysResult};
use file::{file, file_alloc, file_free, file_inc_ref, FileId, FileKind};

/// Metadados mínimos devolvidos pelo fstat.
#[repr(C)]
pub struct Stat {
    pub st_mode: u32,
    pub st_size: u32,
}

/// Inicializa a camada de arquivos.
pub fn init() {
    file::file_table_init();
    crate::kinfo!("(Fs) camada de arquivos pronta");
}

/// Lê um caminho do espaço do usuário (helper dos wrappers de syscall).
pub fn read_path(ptr: u32, buf: &mut [u8]) -> SysResult<&str> {
    if ptr == 0 {
        return Err(SysError::BadAddress);
    }

    let mut len = 0;
    while len < buf.len() - 1 {
        // SAFETY: leitura do espaço corrente; endereço ruim gera page
        // fault do processo chamador
        let b = unsafe { *((ptr as usize + len) as *const u8) };
        if b == 0 {
            break;
        }
        buf[len] = b;
        len += 1;
    }

    core::str::from_utf8(&buf[..len]).map_err(|_| SysError::InvalidArgument)
}

/// Resolve o fd na task corrente.
fn fd_to_file(fd: usize) -> SysResult<FileId> {
    manager::task_file(fd).ok_or(SysError::BadFile)
}

/// Abre um arquivo pelo nome.
///
/// `/dev/ttyN` vai para o driver de tty; qualquer outro nome é
/// procurado no registro de imagens (somente leitura).
pub fn sys_open(name: &str, _flags: u32) -> SysResult<usize> {
    let id = file_alloc().ok_or(SysError::FileTableFull)?;

    let setup = (|| -> SysResult<()> {
        if let Some(rest) = name.strip_prefix("/dev/tty") {
            let minor = rest.parse::<usize>().map_err(|_| SysError::NotFound)?;
            let dev = device::dev_open(DEV_TTY, minor)?;

            let f = file(id);
            f.kind = FileKind::Tty;
            f.dev = Some(dev);
        } else {
            let data = image::find(name).ok_or(SysError::NotFound)?;

            let f = file(id);
            f.kind = FileKind::Regular;
            f.data = data.as_ptr() as u32;
            f.size = data.len() as u32;
            f.pos = 0;
        }
        Ok(())
    })();

    if let Err(err) = setup {
        file_free(id);
        return Err(err);
    }

    match manager::task_alloc_fd(id) {
        Ok(fd) => Ok(fd),
        Err(err) => {
            if let Some(dev) = file(id).dev {
                device::dev_close(dev);
            }
            file_free(id);
            Err(err)
        }
    }
}

/// Lê do fd para o buffer do chamador.
pub fn sys_read(fd: usize, buf: *mut u8, len: usize) -> SysResult<usize> {
    if buf.is_null() {
        return Err(SysError::BadAddress);
    }

    let id = fd_to_file(fd)?;
    let f = file(id);

    match f.kind {
        FileKind::Tty => {
            let dev = f.dev.ok_or(SysError::BadFile)?;
            device::dev_read(dev, 0, buf, len)
        }
        FileKind::Regular => {
            let remaining = f.size.saturating_sub(f.pos) as usize;
            let count = len.min(remaining);

            // SAFETY: a imagem registrada é estática; destino é o
            // buffer do chamador
            unsafe {
                core::ptr::copy_nonoverlapping(
                    (f.data + f.pos) as *const u8,
                    buf,
                    count,
                );
            }

            f.pos += count as u32;
            Ok(count)
        }
    }
}

/// Escreve o buffer do chamador no fd.
pub fn sys_write(fd: usize, buf: *const u8, len: usize) -> SysResult<usize> {
    if buf.is_null() {
        return Err(SysError::BadAddress);
    }

    let id = fd_to_file(fd)?;
    let f = file(id);

    match f.kind {
        FileKind::Tty => {
            let dev = f.dev.ok_or(SysError::BadFile)?;
            device::dev_write(dev, 0, buf, len)
        }
        // Imagens são somente leitura
        FileKind::Regular => Err(SysError::PermissionDenied),
    }
}

/// Reposiciona a leitura de um arquivo regular.
pub fn sys_lseek(fd: usize, offset: i32, whence: i32) -> SysResult<usize> {
    let id = fd_to_file(fd)?;
    let f = file(id);

    if f.kind != FileKind::Regular {
        return Err(SysError::InvalidArgument);
    }

    let base = match whence {
        0 => 0i64,
        1 => f.pos as i64,
        2 => f.size as i64,
        _ => return Err(SysError::InvalidArgument),
    };

    let new_pos = base + offset as i64;
    if new_pos < 0 || new_pos > f.size as i64 {
        return Err(SysError::InvalidArgument);
    }

    f.pos = new_pos as u32;
    Ok(f.pos as usize)
}

/// Fecha o fd: solta o dispositivo (se for o último uso) e a entrada.
pub fn sys_close(fd: usize) -> SysResult<usize> {
    let id = fd_to_file(fd)?;

    let f = file(id);
    if f.ref_count == 1 {
        if let Some(dev) = f.dev {
            device::dev_close(dev);
        }
    }

    file_free(id);
    manager::task_remove_fd(fd);
    Ok(0)
}

/// 1 se o fd é um terminal, 0 se não.
pub fn sys_isatty(fd: usize) -> SysResult<usize> {
    let id = fd_to_file(fd)?;
    Ok((file(id).kind == FileKind::Tty) as usize)
}

/// Preenche o `Stat` do chamador (modo é opaco, tamanho é real).
pub fn sys_fstat(fd: usize, stat_ptr: u32) -> SysResult<usize> {
    let id = fd_to_file(fd)?;
    if stat_ptr == 0 {
        return Err(SysError::BadAddress);
    }

    let f = file(id);
    // SAFETY: ponteiro do chamador no espaço corrente
    unsafe {
        *(stat_ptr as *mut Stat) = Stat {
            st_mode: 0,
            st_size: f.size,
        };
    }

    Ok(0)
}

/// Duplica o fd no menor slot livre (mesmo arquivo, mais uma ref).
pub fn sys_dup(fd: usize) -> SysResult<usize> {
    let id = fd_to_file(fd)?;

    let new_fd = manager::task_alloc_fd(id)?;
    file_inc_ref(id);
    Ok(new_fd)
}

/// Comando de controle do dispositivo por trás do fd.
pub fn sys_ioctl(fd: usize, cmd: i32, arg0: u32, arg1: u32) -> SysResult<usize> {
    let id = fd_to_file(fd)?;
    let f = file(id);

    match f.kind {
        FileKind::Tty => {
            let dev = f.dev.ok_or(SysError::BadFile)?;
            device::dev_control(dev, cmd, arg0, arg1)
        }
        FileKind::Regular => Err(SysError::NotATty),
    }
}
