//! Kernel-wide error type and the macros that propagate it uniformly.

use core::fmt;

use crate::fs::FsError;
use crate::vm::VmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    Alloc,
    InvalidArgument,
    OutOfProc,
    TooManyOpenFiles,
    Vm(VmError),
    Fs(FsError),
    Exec,
    Block,
}

impl From<core::alloc::AllocError> for KernelError {
    fn from(_: core::alloc::AllocError) -> Self {
        KernelError::Alloc
    }
}

impl From<VmError> for KernelError {
    fn from(e: VmError) -> Self {
        KernelError::Vm(e)
    }
}

impl From<FsError> for KernelError {
    fn from(e: FsError) -> Self {
        KernelError::Fs(e)
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Alloc => write!(f, "out of memory"),
            KernelError::InvalidArgument => write!(f, "invalid argument"),
            KernelError::OutOfProc => write!(f, "out of process slots"),
            KernelError::TooManyOpenFiles => write!(f, "too many open files"),
            KernelError::Vm(e) => write!(f, "vm error: {e}"),
            KernelError::Fs(e) => write!(f, "fs error: {e}"),
            KernelError::Exec => write!(f, "exec failed"),
            KernelError::Block => write!(f, "block device error"),
        }
    }
}

/// Numeric error surface handed back to user space as a negated `a0`.
/// Values follow the usual POSIX errno numbering so user-space code that
/// expects that convention keeps working.
#[repr(isize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysError {
    NotPermitted = 1,
    NoSuchEntry = 2,
    NoSuchProcess = 3,
    IoError = 5,
    BadFileDescriptor = 9,
    OutOfMemory = 12,
    Access = 13,
    Exists = 17,
    NotDirectory = 20,
    IsDirectory = 21,
    InvalidArgument = 22,
    TooManyOpenFiles = 24,
    NoSpace = 28,
    NotEmpty = 39,
    NameTooLong = 36,
}

impl SysError {
    pub fn as_code(self) -> isize {
        self as isize
    }
}

impl fmt::Display for SysError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<KernelError> for SysError {
    fn from(e: KernelError) -> Self {
        match e {
            KernelError::Alloc | KernelError::Block => SysError::OutOfMemory,
            KernelError::InvalidArgument => SysError::InvalidArgument,
            KernelError::OutOfProc => SysError::NoSuchProcess,
            KernelError::TooManyOpenFiles => SysError::TooManyOpenFiles,
            KernelError::Vm(_) => SysError::Access,
            KernelError::Exec => SysError::NoSuchEntry,
            KernelError::Fs(fe) => SysError::from(fe),
        }
    }
}

impl From<FsError> for SysError {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound => SysError::NoSuchEntry,
            FsError::NotDirectory => SysError::NotDirectory,
            FsError::IsDirectory => SysError::IsDirectory,
            FsError::Exists => SysError::Exists,
            FsError::NotEmpty => SysError::NotEmpty,
            FsError::NameTooLong => SysError::NameTooLong,
            FsError::CacheFull => SysError::TooManyOpenFiles,
            FsError::NoSpace => SysError::NoSpace,
            FsError::Io => SysError::IoError,
            FsError::InvalidRename => SysError::InvalidArgument,
        }
    }
}

/// Returns early from the current function with `Err($err)`, logging the
/// call site in debug builds.
#[macro_export]
macro_rules! err {
    ($err:expr) => {{
        #[cfg(debug_assertions)]
        $crate::println!("[err] {}:{}: {}", file!(), line!(), $err);
        return Err($err.into());
    }};
}

/// Logs a `Result`'s error case (if any) at the call site and passes the
/// result through unchanged. Useful at the syscall dispatch boundary where
/// the error is about to be collapsed into a bare integer.
#[macro_export]
macro_rules! log {
    ($result:expr) => {{
        match $result {
            Ok(v) => Ok(v),
            Err(e) => {
                #[cfg(debug_assertions)]
                $crate::println!("[log] {}:{}: {}", file!(), line!(), e);
                Err(e)
            }
        }
    }};
}

/// Like `?`, but logs the error at the call site before propagating it.
#[macro_export]
macro_rules! try_log {
    ($result:expr) => {
        match $crate::log!($result) {
            Ok(v) => v,
            Err(e) => return Err(e.into()),
        }
    };
}
