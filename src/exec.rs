//! Loads a FAT32-resident ELF image into a fresh address space.

use alloc::string::String;
use core::fmt;
use core::slice;

use crate::fs::{Dirent, FsError, Path};
use crate::param::{MAXARG, USERSTACK};
use crate::proc::current_proc;
use crate::riscv::{PGSIZE, PTE_W, PTE_X, pg_round_up};
use crate::vm::{Uvm, VA, VmError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    Alloc,
    Elf,
    Header,
    Read,
    Memory,
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecError::Alloc => "allocation error",
            ExecError::Elf => "invalid elf file",
            ExecError::Header => "invalid program header",
            ExecError::Read => "read error",
            ExecError::Memory => "memory error",
        };
        f.write_str(s)
    }
}

impl From<FsError> for ExecError {
    fn from(_: FsError) -> Self {
        ExecError::Read
    }
}

impl From<VmError> for ExecError {
    fn from(_: VmError) -> Self {
        ExecError::Memory
    }
}

const ELF_MAGIC: u32 = 0x464C457F; // "\x7FELF" in little endian

#[repr(C)]
#[derive(Debug)]
struct ElfHeader {
    magic: u32,
    elf: [u8; 12],
    r#type: u16,
    machine: u16,
    version: u32,
    entry: u64,
    phoff: u64,
    shoff: u64,
    flags: u32,
    ehsize: u16,
    phentsize: u16,
    phnum: u16,
    shentsize: u16,
    shnum: u16,
    shstrndx: u16,
}

impl ElfHeader {
    const SIZE: usize = size_of::<Self>();

    fn from_bytes(bytes: &[u8]) -> Self {
        assert!(bytes.len() >= Self::SIZE);
        unsafe { core::ptr::read_unaligned(bytes.as_ptr() as *const Self) }
    }
}

#[repr(C)]
#[derive(Debug)]
struct ProgramHeader {
    r#type: u32,
    flags: u32,
    offset: u64,
    vaddr: u64,
    paddr: u64,
    filesz: u64,
    memsz: u64,
    align: u64,
}

impl ProgramHeader {
    const SIZE: usize = size_of::<Self>();
    const ELF_PROG_LOAD: u32 = 1;

    fn from_bytes(bytes: &[u8]) -> Self {
        assert!(bytes.len() >= Self::SIZE);
        unsafe { core::ptr::read_unaligned(bytes.as_ptr() as *const Self) }
    }

    fn perms(&self) -> usize {
        let mut perm = 0;
        if self.flags & 0x1 != 0 {
            perm = PTE_X;
        }
        if self.flags & 0x2 != 0 {
            perm |= PTE_W;
        }
        perm
    }
}

/// Loads `path` as the current process's new image, replacing its address
/// space and trapframe entry point. On success, returns `argc` for `a0`.
pub fn exec(path: &Path, argv: &[&str]) -> Result<usize, ExecError> {
    let proc = current_proc();
    let mut size = 0usize;

    let cwd = unsafe { proc.data_mut() }.cwd.unwrap();
    let file = path.resolve(cwd)?;

    let mut header_buf = [0u8; ElfHeader::SIZE];
    if file.read(0, &mut header_buf)? != header_buf.len() {
        file.put();
        return Err(ExecError::Read);
    }

    let elf = ElfHeader::from_bytes(&header_buf);
    if elf.magic != ELF_MAGIC {
        file.put();
        return Err(ExecError::Elf);
    }

    let mut pagetable = match Uvm::try_new(unsafe { proc.data_mut() }.trapframe.as_deref().unwrap())
    {
        Ok(pt) => pt,
        Err(_) => {
            file.put();
            return Err(ExecError::Alloc);
        }
    };

    let mut ph_buf = [0u8; ProgramHeader::SIZE];
    let mut offset = elf.phoff;

    for _ in 0..elf.phnum {
        if file.read(offset as u32, &mut ph_buf)? != ph_buf.len() {
            pagetable.proc_free(size);
            file.put();
            return Err(ExecError::Memory);
        }

        let ph = ProgramHeader::from_bytes(&ph_buf);
        offset += ProgramHeader::SIZE as u64;

        if ph.r#type != ProgramHeader::ELF_PROG_LOAD {
            continue;
        }

        if ph.memsz < ph.filesz
            || ph.vaddr.checked_add(ph.memsz).is_none()
            || !ph.vaddr.is_multiple_of(PGSIZE as u64)
        {
            pagetable.proc_free(size);
            file.put();
            return Err(ExecError::Header);
        }

        size = match pagetable.alloc(size, (ph.vaddr + ph.memsz) as usize, ph.perms()) {
            Ok(new_size) => new_size,
            Err(_) => {
                pagetable.proc_free(size);
                file.put();
                return Err(ExecError::Alloc);
            }
        };

        if load_segment(
            &mut pagetable,
            &file,
            VA(ph.vaddr as usize),
            ph.offset as u32,
            ph.filesz as usize,
        )
        .is_err()
        {
            pagetable.proc_free(size);
            file.put();
            return Err(ExecError::Memory);
        }
    }

    file.put();

    let old_size = unsafe { proc.data_mut() }.size;

    // Page-align, leave a guard page, then the user stack.
    size = pg_round_up(size);
    size = match pagetable.alloc(size, size + (USERSTACK + 1) * PGSIZE, PTE_W) {
        Ok(new_size) => new_size,
        Err(_) => {
            pagetable.proc_free(size);
            return Err(ExecError::Alloc);
        }
    };

    let mut sp = size;
    let stackbase = sp - USERSTACK * PGSIZE;

    let mut ustack = [0u64; MAXARG];
    let mut argc = 0;

    for &arg in argv.iter() {
        if argc >= MAXARG {
            pagetable.proc_free(size);
            return Err(ExecError::Memory);
        }

        sp -= arg.len() + 1; // +1 for the null terminator
        sp -= sp % 16; // riscv sp must be 16-byte aligned

        if sp < stackbase {
            pagetable.proc_free(size);
            return Err(ExecError::Memory);
        }

        if pagetable.copy_out(VA(sp), arg.as_bytes()).is_err()
            || pagetable.copy_out(VA(sp + arg.len()), &[0u8]).is_err()
        {
            pagetable.proc_free(size);
            return Err(ExecError::Memory);
        }

        ustack[argc] = sp as u64;
        argc += 1;
    }
    ustack[argc] = 0;

    sp -= (argc + 1) * size_of::<u64>();
    sp -= sp % 16;

    let ustack_bytes = unsafe {
        slice::from_raw_parts(ustack.as_ptr() as *const u8, (argc + 1) * size_of::<u64>())
    };

    if sp < stackbase || pagetable.copy_out(VA(sp), ustack_bytes).is_err() {
        pagetable.proc_free(size);
        return Err(ExecError::Memory);
    }

    let data = unsafe { proc.data_mut() };

    data.name = String::from(
        path.as_str()
            .rsplit_once('/')
            .map_or(path.as_str(), |(_, name)| name),
    );

    let old_pagetable = data.pagetable.replace(pagetable).unwrap();
    data.size = size;

    let trapframe = data.trapframe.as_mut().unwrap();
    trapframe.a1 = sp;
    trapframe.epc = elf.entry as usize;
    trapframe.sp = sp;

    old_pagetable.proc_free(old_size);

    Ok(argc) // ends up in a0, the first argument to main(argc, argv)
}

/// Reads `file_sz` bytes from `file` at `file_off` into the user mapping at
/// `va`, one page at a time (a segment need not be page-aligned in length
/// or start address).
fn load_segment(
    pagetable: &mut Uvm,
    file: &Dirent,
    va: VA,
    file_off: u32,
    file_sz: usize,
) -> Result<(), ExecError> {
    let mut i = 0usize;
    while i < file_sz {
        let dst_va = va.0 + i;
        let page_va = dst_va - (dst_va % PGSIZE);
        let within = dst_va - page_va;
        let pa = pagetable.walk_user_pa(VA(page_va))?;
        let n = (PGSIZE - within).min(file_sz - i);

        let buf = unsafe { slice::from_raw_parts_mut((pa + within) as *mut u8, n) };
        if file.read(file_off + i as u32, buf)? != n {
            return Err(ExecError::Read);
        }

        i += n;
    }
    Ok(())
}
