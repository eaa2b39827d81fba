//! FAT32 filesystem: on-disk cluster/name logic, the dirent cache that
//! synthesizes filesystem identity from (parent, offset), and the path
//! resolver built on top of it.

pub mod dirent;
pub mod fat32;
pub mod path;

pub use dirent::Dirent;
pub use path::Path;

/// Length of the "short name" region of a FAT32 directory record (8.3,
/// without the separating dot).
pub const DIRSIZE: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotFound,
    NotDirectory,
    IsDirectory,
    Exists,
    NotEmpty,
    NameTooLong,
    CacheFull,
    NoSpace,
    Io,
    InvalidRename,
}

impl core::fmt::Display for FsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            FsError::NotFound => "no such file or directory",
            FsError::NotDirectory => "not a directory",
            FsError::IsDirectory => "is a directory",
            FsError::Exists => "file exists",
            FsError::NotEmpty => "directory not empty",
            FsError::NameTooLong => "filename too long",
            FsError::CacheFull => "dirent cache exhausted",
            FsError::NoSpace => "no space left on device",
            FsError::Io => "i/o error",
            FsError::InvalidRename => "invalid rename",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    File,
    Directory,
    Device,
}

/// `stat(2)`-equivalent metadata. `ino` has no persistent meaning across a
/// remount: FAT32 has no inode numbers, so it is synthesized from the live
/// dirent's cache slot and is only guaranteed stable for the entry's
/// lifetime in memory.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub dev: u32,
    pub ino: u32,
    pub r#type: InodeType,
    pub nlink: u16,
    pub size: u64,
}

/// Mounts `dev` and makes the root directory available.
///
/// # Safety
/// Must be called exactly once, after the block cache is usable and
/// before any path resolution is attempted.
pub unsafe fn init(dev: usize) {
    fat32::mount(dev);
    dirent::init_root(dev);
}
