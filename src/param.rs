//! Compile-time kernel configuration constants.

/// maximum number of CPUs
pub const NCPU: usize = 8;
/// maximum number of processes
pub const NPROC: usize = 64;
/// open files per process
pub const NOFILE: usize = 16;
/// open files system-wide
pub const NFILE: usize = 100;
/// size of one memory page
pub const PGSIZE: usize = 4096;
/// kernel stack pages per process (extra guard room in debug builds)
#[cfg(debug_assertions)]
pub const NKSTACK_PAGES: usize = 8;
#[cfg(not(debug_assertions))]
pub const NKSTACK_PAGES: usize = 1;
/// number of guard/stack pages reserved at the top of user memory
pub const USERSTACK: usize = 1;
/// max exec arguments
pub const MAXARG: usize = 32;
/// max bytes in a path
pub const MAXPATH: usize = 128;
/// only disk backing this kernel understands
pub const ROOTDEV: usize = 1;
/// number of device slots (console, etc.)
pub const NDEV: usize = 10;

/// size of one disk sector / FAT32 logical block
pub const BSIZE: usize = 512;
/// size of the block cache
pub const NBUF: usize = 64;

/// bound on the live dirent cache; matches the on-disk identity table size
pub const ENTRY_CACHE_NUM: usize = 50;
/// longest filename this kernel round-trips (FAT32's own cap is 255)
pub const FAT32_MAX_FILENAME: usize = 255;
