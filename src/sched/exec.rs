//! Loader de imagem ELF32 para o execve.
//!
//! Lê pelo contrato open/lseek/read/close da camada de arquivos e
//! escreve nos endereços físicos das páginas do espaço NOVO (obtidos
//! por tradução), já que o espaço corrente ainda é o antigo durante a
//! carga inteira.

use crate::fs;
use crate::mm::config::{MEMORY_TASK_BASE, MEM_PAGE_SIZE, MEM_TASK_ARG_SIZE};
use crate::mm::vmm;
use crate::arch::x86::mmu;
use crate::sched::manager;
use crate::sched::task::TaskId;
use crate::sys::elf::{Elf32Header, Elf32Phdr, PT_LOAD};
use crate::sys::error::{SysError, SysResult};

/// Layout do topo da área de argumentos, lido pelo crt0 do programa.
#[repr(C)]
struct TaskArgs {
    /// Slot de endereço de retorno (o crt0 enxerga argc/argv como
    /// parâmetros de função)
    ret_addr: u32,
    argc: u32,
    argv: u32,
}

/// Lê `size_of::<T>()` bytes do arquivo para uma estrutura.
fn read_struct<T>(file: usize, out: &mut T) -> SysResult<()> {
    let size = core::mem::size_of::<T>();
    let read = fs::sys_read(file, out as *mut T as *mut u8, size)?;
    if read < size {
        return Err(SysError::BadExecutable);
    }
    Ok(())
}

/// Carrega um PT_LOAD: aloca as páginas no espaço novo e copia os
/// `p_filesz` bytes do arquivo, página a página. O rabo
/// `[filesz, memsz)` fica para o crt0 zerar.
fn load_phdr(file: usize, phdr: &Elf32Phdr, page_dir: u32) -> SysResult<()> {
    // O linker das aplicações garante segmentos alinhados em página
    if phdr.p_vaddr as usize & (MEM_PAGE_SIZE - 1) != 0 {
        return Err(SysError::BadExecutable);
    }

    // Permissão grossa: tudo user+write (afinar pelo p_flags seria uma
    // melhoria aceitável)
    vmm::memory_alloc_for_page_dir(
        page_dir,
        phdr.p_vaddr,
        phdr.p_memsz,
        mmu::PTE_P | mmu::PTE_U | mmu::PTE_W,
    )?;

    fs::sys_lseek(file, phdr.p_offset as i32, 0)?;

    let mut vaddr = phdr.p_vaddr;
    let mut size = phdr.p_filesz;
    while size > 0 {
        let curr_size = size.min(MEM_PAGE_SIZE as u32);

        let paddr = vmm::memory_get_paddr(page_dir, vaddr);
        if paddr == 0 {
            return Err(SysError::BadAddress);
        }

        // O destino é o endereço físico (identidade-mapeado); a tabela
        // corrente ainda é a antiga
        let read = fs::sys_read(file, paddr as *mut u8, curr_size as usize)?;
        if read < curr_size as usize {
            return Err(SysError::BadExecutable);
        }

        size -= curr_size;
        vaddr += curr_size;
    }

    Ok(())
}

/// Carrega o executável `name` no espaço `page_dir` e devolve o entry.
///
/// Aceita ELF32 little-endian, executável, i386, com entry e pelo menos
/// um PT_LOAD no espaço de usuário. Os demais segmentos são ignorados.
pub fn load_elf_file(task_id: TaskId, name: &str, page_dir: u32) -> SysResult<u32> {
    let file = fs::sys_open(name, 0)?;

    let result = (|| -> SysResult<u32> {
        let mut elf_hdr = Elf32Header::zeroed();
        read_struct(file, &mut elf_hdr)?;

        if !elf_hdr.is_valid() {
            crate::kwarn!("(Exec) imagem rejeitada: header inválido");
            return Err(SysError::BadExecutable);
        }

        let mut loaded = 0usize;
        let mut e_phoff = elf_hdr.phoff;
        for _ in 0..elf_hdr.phnum {
            fs::sys_lseek(file, e_phoff as i32, 0)?;

            let mut phdr = Elf32Phdr::zeroed();
            read_struct(file, &mut phdr)?;
            e_phoff += elf_hdr.phentsize as u32;

            // Só interessam segmentos carregáveis no espaço de usuário
            if phdr.p_type != PT_LOAD || phdr.p_vaddr < MEMORY_TASK_BASE {
                continue;
            }

            load_phdr(file, &phdr, page_dir)?;
            loaded += 1;

            // O heap começa logo após o último segmento carregado
            let task = manager::task(task_id);
            task.heap_start = phdr.p_vaddr + phdr.p_memsz;
            task.heap_end = task.heap_start;
        }

        if loaded == 0 {
            return Err(SysError::BadExecutable);
        }

        Ok(elf_hdr.entry)
    })();

    let _ = fs::sys_close(file);
    result
}

/// Conta os ponteiros de um vetor argv terminado em NULL.
pub fn strings_count(argv: u32) -> usize {
    if argv == 0 {
        return 0;
    }

    let mut count = 0;
    // Limite de sanidade para não varrer memória sem fim
    while count < 64 {
        // SAFETY: leitura do espaço corrente; ponteiro ruim gera page
        // fault do processo chamador
        let entry = unsafe { *(argv as *const u32).add(count) };
        if entry == 0 {
            break;
        }
        count += 1;
    }
    count
}

/// Comprimento (com o NUL) de uma string do usuário, limitado à área
/// de argumentos.
fn user_strlen(ptr: u32) -> u32 {
    let mut len = 0u32;
    while len < MEM_TASK_ARG_SIZE {
        // SAFETY: leitura do espaço corrente
        let b = unsafe { *((ptr + len) as *const u8) };
        if b == 0 {
            break;
        }
        len += 1;
    }
    len + 1
}

/// Copia os argumentos do processo para a área reservada no topo da
/// pilha nova: `{argc, argv, tabela de ponteiros, strings}`.
///
/// `argv` aponta para o espaço CORRENTE; `to` é um endereço virtual do
/// espaço novo, então tudo atravessa por cópia traduzida.
pub fn copy_args(to: u32, page_dir: u32, argc: usize, argv: u32) -> SysResult<()> {
    let args_size = core::mem::size_of::<TaskArgs>() as u32;

    let task_args = TaskArgs {
        ret_addr: 0,
        argc: argc as u32,
        argv: to + args_size,
    };

    // Strings começam depois da tabela de ponteiros (com o NULL final)
    let mut dest_arg = to + args_size + (core::mem::size_of::<u32>() * (argc + 1)) as u32;

    // A tabela de ponteiros é escrita direto pelo endereço físico
    let dest_argv_tb = vmm::memory_get_paddr(page_dir, to + args_size) as *mut u32;
    if dest_argv_tb.is_null() {
        return Err(SysError::BadAddress);
    }

    for i in 0..argc {
        // SAFETY: argv validado por strings_count no espaço corrente
        let from = unsafe { *(argv as *const u32).add(i) };
        let len = user_strlen(from);

        vmm::memory_copy_uvm_data(dest_arg, page_dir, from, len)?;

        // SAFETY: tabela dentro da área de argumentos recém alocada
        unsafe { *dest_argv_tb.add(i) = dest_arg };
        dest_arg += len;
    }

    if argc > 0 {
        // SAFETY: slot reservado para o terminador
        unsafe { *dest_argv_tb.add(argc) = 0 };
    }

    vmm::memory_copy_uvm_data(
        to,
        page_dir,
        &task_args as *const TaskArgs as u32,
        args_size,
    )
}
