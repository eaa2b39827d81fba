use core::mem::{self, MaybeUninit};

use alloc::sync::Arc;

use crate::console;
use crate::error::{KernelError, SysError};
use crate::fs::Stat;
use crate::fs::dirent::Dirent;
use crate::param::{NDEV, NFILE};
use crate::pipe::Pipe;
use crate::proc;
use crate::sleeplock::SleepLock;
use crate::spinlock::SpinLock;
use crate::vm::VA;

#[derive(Debug, Clone)]
pub enum FileType {
    None,
    Pipe { pipe: Arc<Pipe> },
    Dirent { dirent: Dirent },
    Device { dirent: Dirent, major: u16 },
}

/// File metadata protected by table-wide spinlock
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub ref_count: usize,
}

/// Per-file mutable state protected by per-file sleeplock
#[derive(Debug, Clone)]
pub struct FileInner {
    /// Index into the file table.
    pub readable: bool,
    pub writeable: bool,
    pub r#type: FileType,
    pub offset: u32,
}

pub static FILE_TABLE: FileTable = FileTable::new();

/// Global file table
#[derive(Debug)]
pub struct FileTable {
    /// Protects allocation and reference counts
    pub meta: SpinLock<[FileMeta; NFILE]>,
    /// Per-file locks for concurrent access to different files
    pub inner: [SleepLock<FileInner>; NFILE],
}

impl FileTable {
    const fn new() -> Self {
        let meta = {
            let mut array: [MaybeUninit<FileMeta>; NFILE] =
                unsafe { MaybeUninit::uninit().assume_init() };

            let mut i = 0;
            while i < NFILE {
                array[i] = MaybeUninit::new(FileMeta { ref_count: 0 });
                i += 1;
            }

            SpinLock::new(
                unsafe {
                    mem::transmute::<[MaybeUninit<FileMeta>; NFILE], [FileMeta; NFILE]>(array)
                },
                "filetable",
            )
        };

        let inner = {
            let mut array: [MaybeUninit<SleepLock<FileInner>>; NFILE] =
                unsafe { MaybeUninit::uninit().assume_init() };

            let mut i = 0;
            while i < NFILE {
                array[i] = MaybeUninit::new(SleepLock::new(
                    FileInner {
                        readable: false,
                        writeable: false,
                        r#type: FileType::None,
                        offset: 0,
                    },
                    "file",
                ));
                i += 1;
            }

            unsafe {
                mem::transmute::<
                    [MaybeUninit<SleepLock<FileInner>>; NFILE],
                    [SleepLock<FileInner>; NFILE],
                >(array)
            }
        };

        Self { meta, inner }
    }
}

/// File handle, just an index into the `FileTable`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub id: usize,
}

impl File {
    /// Allocates a file structure.
    pub fn alloc() -> Result<Self, KernelError> {
        let mut meta = FILE_TABLE.meta.lock();

        for (i, meta) in meta.iter_mut().enumerate() {
            if meta.ref_count == 0 {
                meta.ref_count = 1;

                return Ok(Self { id: i });
            }
        }

        Err(KernelError::TooManyOpenFiles)
    }

    /// Incremets the reference count for the file.
    pub fn dup(&mut self) -> Self {
        let meta = &mut FILE_TABLE.meta.lock()[self.id];

        assert!(meta.ref_count >= 1, "filedup");

        meta.ref_count += 1;

        self.clone()
    }

    /// Decrements the reference count and closes the file if it reaches 0.
    pub fn close(&mut self) {
        let mut meta_guard = FILE_TABLE.meta.lock();
        let meta = &mut meta_guard[self.id];

        assert!(meta.ref_count >= 1, "fileclose");

        meta.ref_count -= 1;
        if meta.ref_count > 0 {
            return;
        }

        let inner_copy = {
            let mut inner = FILE_TABLE.inner[self.id].lock();
            // copy inner before resetting fields
            let copy = inner.clone();

            meta.ref_count = 0;
            inner.r#type = FileType::None;

            drop(meta_guard);
            copy
        }; // drop both inner and meta locks

        match inner_copy.r#type {
            FileType::None => {}
            FileType::Pipe { pipe } => {
                pipe.close(inner_copy.writeable);
            }
            FileType::Dirent { dirent } | FileType::Device { dirent, .. } => {
                dirent.put();
            }
        }
    }

    /// Gets metadata about the underlying dirent.
    pub fn stat(&self) -> Result<Stat, SysError> {
        let file_inner = FILE_TABLE.inner[self.id].lock();

        match &file_inner.r#type {
            FileType::Dirent { dirent } | FileType::Device { dirent, .. } => Ok(dirent.stat()),
            _ => Err(SysError::BadFileDescriptor),
        }
    }

    /// Reads from the file into a user-space buffer.
    pub fn read(&self, addr: VA, n: usize) -> Result<usize, SysError> {
        let mut file_inner = FILE_TABLE.inner[self.id].lock();

        if !file_inner.readable {
            return Err(SysError::BadFileDescriptor);
        }

        if let FileType::Pipe { pipe } = &file_inner.r#type {
            let pipe = Arc::clone(pipe);
            drop(file_inner);
            return pipe.read(addr, n);
        }

        match &mut file_inner.r#type {
            FileType::None => panic!("fileread"),
            FileType::Pipe { .. } => unreachable!(),
            FileType::Dirent { dirent } => {
                let mut buf = alloc::vec![0u8; n];
                let read = dirent.read(file_inner.offset, &mut buf).map_err(SysError::from)?;

                unsafe { proc::copy_to_user(&buf[..read], addr) }.map_err(SysError::from)?;
                file_inner.offset += read as u32;

                Ok(read)
            }
            FileType::Device { dirent: _, major } => match &DEVICES[*major as usize] {
                Some(dev) => (dev.read)(addr, n),
                None => Err(SysError::BadFileDescriptor),
            },
        }
    }

    /// Writes a user-space buffer to the file.
    pub fn write(&mut self, addr: VA, n: usize) -> Result<usize, SysError> {
        let mut file_inner = FILE_TABLE.inner[self.id].lock();

        if !file_inner.writeable {
            return Err(SysError::BadFileDescriptor);
        }

        if let FileType::Pipe { pipe } = &file_inner.r#type {
            let pipe = Arc::clone(pipe);
            drop(file_inner);
            return pipe.write(addr, n);
        }

        match &mut file_inner.r#type {
            FileType::None => panic!("filewrite"),

            FileType::Pipe { .. } => unreachable!(),

            FileType::Dirent { dirent } => {
                let mut buf = alloc::vec![0u8; n];
                proc::copy_from_user(addr, &mut buf).map_err(SysError::from)?;

                let written = dirent.write(file_inner.offset, &buf).map_err(SysError::from)?;
                file_inner.offset += written as u32;

                Ok(written)
            }

            FileType::Device { dirent: _, major } => match &DEVICES[*major as usize] {
                Some(dev) => (dev.write)(addr, n),
                None => Err(SysError::BadFileDescriptor),
            },
        }
    }

    /// Open file flags
    pub const O_RDONLY: i32 = 0x000;
    pub const O_WRONLY: i32 = 0x001;
    pub const O_RDWR: i32 = 0x002;
    pub const O_CREATE: i32 = 0x200;
    pub const O_TRUNC: i32 = 0x400;
}

/// Device interface
#[derive(Debug, Clone, Copy)]
pub struct Device {
    pub read: fn(addr: VA, n: usize) -> Result<usize, SysError>,
    pub write: fn(addr: VA, n: usize) -> Result<usize, SysError>,
}

/// Console device major number
pub const CONSOLE: usize = 1;

/// Device table
pub static DEVICES: [Option<Device>; NDEV] = {
    let mut devices = [None; NDEV];
    devices[CONSOLE] = Some(Device {
        read: console::read,
        write: console::write,
    });
    devices
};

/// Wires up fd 0/1/2 to the console device for a freshly created process.
pub fn setup_console_fds(proc: &crate::proc::Proc) {
    let data = unsafe { proc.data_mut() };

    let mut file = File::alloc().unwrap();
    {
        let mut inner = FILE_TABLE.inner[file.id].lock();
        inner.readable = true;
        inner.writeable = true;
        inner.r#type = FileType::Device {
            dirent: crate::fs::dirent::root().dup(),
            major: CONSOLE as u16,
        };
    }

    data.open_files[1] = Some(file.dup());
    data.open_files[2] = Some(file.dup());
    data.open_files[0] = Some(file);
}
