//! Syscall dispatch: reads the number from `a7`, indexes a fixed table,
//! and collapses the result into `a0` as a raw value or a negated
//! `SysError` code.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::SysError;
use crate::file::{File, FileType};
use crate::fs::{Dirent, InodeType};
use crate::param::NOFILE;
use crate::println;
use crate::proc::{Proc, TrapFrame, current_proc};
use crate::sysfile::*;
use crate::sysproc::*;
use crate::vm::VA;
use crate::{err, log, try_log};

/// `dirfd` value meaning "resolve relative to the calling process's cwd".
pub const AT_FDCWD: isize = -100;

/// Wrapper for extracting typed syscall arguments from the trapframe.
pub struct SyscallArgs<'a> {
    trapframe: &'a TrapFrame,
    proc: &'static Proc,
}

impl<'a> SyscallArgs<'a> {
    fn new(trapframe: &'a TrapFrame, proc: &'static Proc) -> Self {
        Self { trapframe, proc }
    }

    pub fn proc(&self) -> &Proc {
        self.proc
    }

    /// Returns the argument at the given index as a usize.
    pub fn get_raw(&self, index: usize) -> usize {
        match index {
            0 => self.trapframe.a0,
            1 => self.trapframe.a1,
            2 => self.trapframe.a2,
            3 => self.trapframe.a3,
            4 => self.trapframe.a4,
            5 => self.trapframe.a5,
            _ => panic!("invalid syscall argument index {}", index),
        }
    }

    /// Returns the argument at the given index as an isize.
    pub fn get_int(&self, index: usize) -> isize {
        self.get_raw(index) as isize
    }

    /// Returns the argument at the given index as a virtual address.
    ///
    /// Does not check for legality, since `copyin`/`copyout` will do that.
    pub fn get_addr(&self, index: usize) -> VA {
        VA::from(self.get_raw(index))
    }

    /// Fetches the file descriptor at `index` and the `File` it refers to.
    pub fn get_file(&self, index: usize) -> Result<(usize, File), SysError> {
        let fd: usize = try_log!(
            self.get_int(index)
                .try_into()
                .or(Err(SysError::BadFileDescriptor))
        );

        if fd >= NOFILE {
            err!(SysError::BadFileDescriptor);
        }

        if let Some(file) = &unsafe { self.proc.data_mut() }.open_files[fd] {
            return Ok((fd, file.clone()));
        }

        err!(SysError::BadFileDescriptor);
    }

    /// Fetches a null-terminated string from user space.
    pub fn get_string(&self, index: usize, max: usize) -> Result<String, SysError> {
        self.fetch_string(self.get_addr(index), max)
    }

    /// Fetches a null-terminated string starting at an arbitrary user
    /// address (used for paths read out of a directory entry rather than
    /// a register).
    pub fn fetch_string(&self, addr: VA, max: usize) -> Result<String, SysError> {
        let mut result = String::with_capacity(max);
        let mut buf = [0u8; 1];

        for i in 0..max {
            crate::proc::copy_from_user(VA(addr.0 + i), &mut buf).map_err(SysError::from)?;

            if buf[0] == 0 {
                return Ok(result);
            }

            result.push(buf[0] as char);
        }

        err!(SysError::NameTooLong);
    }

    /// Fetches a byte array from user space.
    pub fn get_bytes(&self, index: usize, len: usize) -> Result<Vec<u8>, SysError> {
        let mut buf = alloc::vec![0u8; len];
        crate::proc::copy_from_user(self.get_addr(index), &mut buf).map_err(SysError::from)?;
        Ok(buf)
    }

    /// Resolves the base directory for an `*at` syscall: `dirfd` is either
    /// `AT_FDCWD` (use the calling process's cwd) or an open directory fd.
    pub fn get_dirfd_base(&self, index: usize) -> Result<Dirent, SysError> {
        let raw = self.get_int(index);
        if raw == AT_FDCWD {
            return Ok(unsafe { self.proc.data_mut() }.cwd.as_ref().unwrap().dup());
        }

        let (_, file) = self.get_file(index)?;
        let inner = crate::file::FILE_TABLE.inner[file.id].lock();
        match &inner.r#type {
            FileType::Dirent { dirent } if matches!(dirent.stat().r#type, InodeType::Directory) => {
                Ok(dirent.dup())
            }
            FileType::Dirent { .. } => Err(SysError::NotDirectory),
            _ => Err(SysError::NotDirectory),
        }
    }
}

/// System call numbers.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Fork = 1,
    Exit = 2,
    Wait = 3,
    Pipe = 4,
    Read = 5,
    Kill = 6,
    Exec = 7,
    Fstat = 8,
    Chdir = 9,
    Dup = 10,
    Getpid = 11,
    Sbrk = 12,
    Sleep = 13,
    Uptime = 14,
    Open = 15,
    Write = 16,
    Mkdir = 17,
    Close = 18,
    Readdir = 19,
    Getcwd = 20,
    Remove = 21,
    Trace = 22,
    Rename = 23,
    Uname = 24,
    Openat = 25,
    Dup3 = 26,
    Pipe2 = 27,
    Getdents64 = 28,
    Mkdirat = 29,
    Unlinkat = 30,
    Clone = 31,
    Brk = 32,
    Mmap = 33,
    Times = 34,
    Sysinfo = 35,
    Shutdown = 36,
    Dev = 37,
}

impl TryFrom<usize> for Syscall {
    type Error = SysError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Syscall::Fork),
            2 => Ok(Syscall::Exit),
            3 => Ok(Syscall::Wait),
            4 => Ok(Syscall::Pipe),
            5 => Ok(Syscall::Read),
            6 => Ok(Syscall::Kill),
            7 => Ok(Syscall::Exec),
            8 => Ok(Syscall::Fstat),
            9 => Ok(Syscall::Chdir),
            10 => Ok(Syscall::Dup),
            11 => Ok(Syscall::Getpid),
            12 => Ok(Syscall::Sbrk),
            13 => Ok(Syscall::Sleep),
            14 => Ok(Syscall::Uptime),
            15 => Ok(Syscall::Open),
            16 => Ok(Syscall::Write),
            17 => Ok(Syscall::Mkdir),
            18 => Ok(Syscall::Close),
            19 => Ok(Syscall::Readdir),
            20 => Ok(Syscall::Getcwd),
            21 => Ok(Syscall::Remove),
            22 => Ok(Syscall::Trace),
            23 => Ok(Syscall::Rename),
            24 => Ok(Syscall::Uname),
            25 => Ok(Syscall::Openat),
            26 => Ok(Syscall::Dup3),
            27 => Ok(Syscall::Pipe2),
            28 => Ok(Syscall::Getdents64),
            29 => Ok(Syscall::Mkdirat),
            30 => Ok(Syscall::Unlinkat),
            31 => Ok(Syscall::Clone),
            32 => Ok(Syscall::Brk),
            33 => Ok(Syscall::Mmap),
            34 => Ok(Syscall::Times),
            35 => Ok(Syscall::Sysinfo),
            36 => Ok(Syscall::Shutdown),
            37 => Ok(Syscall::Dev),
            _ => Err(SysError::InvalidArgument),
        }
    }
}

/// Handle a system call.
///
/// # Safety
/// Called from `usertrap` in `trap.rs`.
pub unsafe fn syscall(trapframe: &mut TrapFrame) {
    let proc = current_proc();
    let args = SyscallArgs::new(trapframe, proc);
    let num = trapframe.a7;

    let result = match Syscall::try_from(num) {
        Ok(syscall) => match syscall {
            Syscall::Fork => sys_fork(&args),
            Syscall::Exit => sys_exit(&args),
            Syscall::Wait => sys_wait(&args),
            Syscall::Pipe => sys_pipe(&args),
            Syscall::Read => sys_read(&args),
            Syscall::Kill => sys_kill(&args),
            Syscall::Exec => sys_exec(&args),
            Syscall::Fstat => sys_fstat(&args),
            Syscall::Chdir => sys_chdir(&args),
            Syscall::Dup => sys_dup(&args),
            Syscall::Getpid => sys_getpid(&args),
            Syscall::Sbrk => sys_sbrk(&args),
            Syscall::Sleep => sys_sleep(&args),
            Syscall::Uptime => sys_uptime(&args),
            Syscall::Open => sys_open(&args),
            Syscall::Write => sys_write(&args),
            Syscall::Mkdir => sys_mkdir(&args),
            Syscall::Close => sys_close(&args),
            Syscall::Readdir => sys_readdir(&args),
            Syscall::Getcwd => sys_getcwd(&args),
            Syscall::Remove => sys_remove(&args),
            Syscall::Trace => sys_trace(&args),
            Syscall::Rename => sys_rename(&args),
            Syscall::Uname => sys_uname(&args),
            Syscall::Openat => sys_openat(&args),
            Syscall::Dup3 => sys_dup3(&args),
            Syscall::Pipe2 => sys_pipe2(&args),
            Syscall::Getdents64 => sys_getdents64(&args),
            Syscall::Mkdirat => sys_mkdirat(&args),
            Syscall::Unlinkat => sys_unlinkat(&args),
            Syscall::Clone => sys_clone(&args),
            Syscall::Brk => sys_brk(&args),
            Syscall::Mmap => sys_mmap(&args),
            Syscall::Times => sys_times(&args),
            Syscall::Sysinfo => sys_sysinfo(&args),
            Syscall::Shutdown => sys_shutdown(&args),
            Syscall::Dev => sys_dev(&args),
        },
        Err(e) => Err(e),
    };

    let traced = unsafe { proc.data_mut() }.trace_mask & (1 << (num % 32)) != 0;

    trapframe.a0 = match log!(result) {
        Ok(v) => {
            if traced {
                println!("{}: syscall {} -> {}", proc.inner.lock().pid.0, num, v);
            }
            v
        }
        Err(error) => {
            if traced {
                println!(
                    "{}: syscall {} -> -{} ({error})",
                    proc.inner.lock().pid.0,
                    num,
                    error.as_code()
                );
            }
            (-error.as_code()) as usize
        }
    };
}
