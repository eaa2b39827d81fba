//! File- and filesystem-facing syscalls: fds, directories, paths.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::SysError;
use crate::exec::exec;
use crate::file::{FILE_TABLE, File, FileType};
use crate::fs::Path;
use crate::fs::dirent::{self, Dirent};
use crate::param::{MAXARG, MAXPATH};
use crate::proc::current_proc;
use crate::syscall::SyscallArgs;
use crate::{err, try_log};

/// Allocates a file descriptor for the given file. Takes over the caller's
/// reference on success.
fn fd_alloc(file: File) -> Result<usize, SysError> {
    let data = unsafe { current_proc().data_mut() };

    for (fd, open_file) in data.open_files.iter_mut().enumerate() {
        if open_file.is_none() {
            *open_file = Some(file);
            return Ok(fd);
        }
    }

    Err(SysError::TooManyOpenFiles)
}

pub fn sys_dup(args: &SyscallArgs) -> Result<usize, SysError> {
    let (_, mut file) = args.get_file(0)?;
    let fd = try_log!(fd_alloc(file.clone()));
    file.dup();
    Ok(fd)
}

pub fn sys_dup3(args: &SyscallArgs) -> Result<usize, SysError> {
    let (_, mut file) = args.get_file(0)?;
    let newfd = args.get_int(1);
    let newfd: usize = try_log!(newfd.try_into().or(Err(SysError::BadFileDescriptor)));

    if newfd >= crate::param::NOFILE {
        err!(SysError::BadFileDescriptor);
    }

    let data = unsafe { current_proc().data_mut() };
    if let Some(mut old) = data.open_files[newfd].take() {
        old.close();
    }
    data.open_files[newfd] = Some(file.dup());

    Ok(newfd)
}

pub fn sys_read(args: &SyscallArgs) -> Result<usize, SysError> {
    let addr = args.get_addr(1);
    let n = args.get_int(2);
    let (_, file) = args.get_file(0)?;
    file.read(addr, n as usize)
}

pub fn sys_write(args: &SyscallArgs) -> Result<usize, SysError> {
    let addr = args.get_addr(1);
    let n = args.get_int(2);
    let (_, mut file) = args.get_file(0)?;
    file.write(addr, n as usize)
}

pub fn sys_close(args: &SyscallArgs) -> Result<usize, SysError> {
    let (fd, mut file) = args.get_file(0)?;

    let data = unsafe { current_proc().data_mut() };
    data.open_files[fd] = None;
    file.close();

    Ok(0)
}

pub fn sys_fstat(args: &SyscallArgs) -> Result<usize, SysError> {
    let addr = args.get_addr(1);
    let (_, file) = args.get_file(0)?;
    let stat = file.stat()?;

    let bytes = unsafe {
        core::slice::from_raw_parts(
            &stat as *const _ as *const u8,
            core::mem::size_of_val(&stat),
        )
    };
    unsafe { crate::proc::copy_to_user(bytes, addr) }.map_err(SysError::from)?;

    Ok(0)
}

pub fn sys_remove(args: &SyscallArgs) -> Result<usize, SysError> {
    let path = args.get_string(0, MAXPATH)?;
    let cwd = unsafe { current_proc().data_mut() }.cwd.as_ref().unwrap().dup();

    let entry = try_log!(Path::new(&path).resolve(cwd));

    if entry.is_root() {
        entry.put();
        err!(SysError::Access);
    }

    if entry.lock().is_dir() {
        // only an empty directory may be removed
        if dirent::enext(&entry, 64).is_some() {
            entry.put();
            err!(SysError::NotEmpty);
        }
    }

    entry.remove();
    entry.put();

    Ok(0)
}

pub fn sys_rename(args: &SyscallArgs) -> Result<usize, SysError> {
    let old = args.get_string(0, MAXPATH)?;
    let new = args.get_string(1, MAXPATH)?;

    let cwd = unsafe { current_proc().data_mut() }.cwd.as_ref().unwrap().dup();
    let entry = try_log!(Path::new(&old).resolve(cwd.dup()));
    let (new_parent, new_name) = try_log!(Path::new(&new).resolve_parent(cwd));

    let result = dirent::erename(entry, new_parent, &new_name);
    entry.put();
    new_parent.put();

    try_log!(result);
    Ok(0)
}

pub fn sys_open(args: &SyscallArgs) -> Result<usize, SysError> {
    let o_mode = args.get_int(1) as i32;
    let path = args.get_string(0, MAXPATH)?;

    open_impl(
        unsafe { current_proc().data_mut() }.cwd.as_ref().unwrap().dup(),
        &path,
        o_mode,
    )
}

pub fn sys_openat(args: &SyscallArgs) -> Result<usize, SysError> {
    let base = args.get_dirfd_base(0)?;
    let path = args.get_string(1, MAXPATH)?;
    let o_mode = args.get_int(2) as i32;

    open_impl(base, &path, o_mode)
}

fn open_impl(base: Dirent, path: &str, o_mode: i32) -> Result<usize, SysError> {
    let entry = if (o_mode & File::O_CREATE) != 0 {
        let (parent, name) = try_log!(Path::new(path).resolve_parent(base));
        let created = dirent::ealloc(&parent, &name, 0);
        parent.put();
        try_log!(created)
    } else {
        try_log!(Path::new(path).resolve(base))
    };

    let is_dir = entry.lock().is_dir();
    if is_dir && o_mode != File::O_RDONLY {
        entry.put();
        err!(SysError::IsDirectory);
    }

    let mut file = match File::alloc() {
        Ok(f) => f,
        Err(e) => {
            entry.put();
            err!(SysError::from(e));
        }
    };

    let fd = match fd_alloc(file.clone()) {
        Ok(fd) => fd,
        Err(e) => {
            file.close();
            entry.put();
            err!(e);
        }
    };

    {
        let mut inner = FILE_TABLE.inner[file.id].lock();
        inner.r#type = FileType::Dirent { dirent: entry };
        inner.offset = 0;
        inner.readable = (o_mode & File::O_WRONLY) == 0;
        inner.writeable = (o_mode & File::O_WRONLY) != 0 || (o_mode & File::O_RDWR) != 0;
    }

    if (o_mode & File::O_TRUNC) != 0 && !is_dir {
        if let FileType::Dirent { dirent } = &FILE_TABLE.inner[file.id].lock().r#type {
            dirent.trunc();
        }
    }

    Ok(fd)
}

pub fn sys_mkdir(args: &SyscallArgs) -> Result<usize, SysError> {
    let path = args.get_string(0, MAXPATH)?;
    let cwd = unsafe { current_proc().data_mut() }.cwd.as_ref().unwrap().dup();
    mkdir_impl(cwd, &path)
}

pub fn sys_mkdirat(args: &SyscallArgs) -> Result<usize, SysError> {
    let base = args.get_dirfd_base(0)?;
    let path = args.get_string(1, MAXPATH)?;
    mkdir_impl(base, &path)
}

fn mkdir_impl(base: Dirent, path: &str) -> Result<usize, SysError> {
    let (parent, name) = try_log!(Path::new(path).resolve_parent(base));
    let created = dirent::ealloc(&parent, &name, crate::fs::fat32::ATTR_DIRECTORY);
    parent.put();
    try_log!(created).put();
    Ok(0)
}

pub fn sys_unlinkat(args: &SyscallArgs) -> Result<usize, SysError> {
    let base = args.get_dirfd_base(0)?;
    let path = args.get_string(1, MAXPATH)?;
    let entry = try_log!(Path::new(&path).resolve(base));

    if entry.is_root() {
        entry.put();
        err!(SysError::Access);
    }
    if entry.lock().is_dir() && dirent::enext(&entry, 64).is_some() {
        entry.put();
        err!(SysError::NotEmpty);
    }

    entry.remove();
    entry.put();
    Ok(0)
}

pub fn sys_chdir(args: &SyscallArgs) -> Result<usize, SysError> {
    let path = args.get_string(0, MAXPATH)?;
    let cwd = unsafe { current_proc().data_mut() }.cwd.as_ref().unwrap().dup();

    let entry = try_log!(Path::new(&path).resolve(cwd));

    if !entry.lock().is_dir() {
        entry.put();
        err!(SysError::NotDirectory);
    }

    let data = unsafe { current_proc().data_mut() };
    let old_cwd = data.cwd.replace(entry).unwrap();
    old_cwd.put();

    Ok(0)
}

/// Reads the next directory entry at the file's current offset into a
/// user-space name buffer. Returns the name length, or 0 at the end of the
/// directory.
pub fn sys_readdir(args: &SyscallArgs) -> Result<usize, SysError> {
    let addr = args.get_addr(1);
    let max = args.get_int(2) as usize;
    let (_, file) = args.get_file(0)?;

    let mut inner = FILE_TABLE.inner[file.id].lock();
    let FileType::Dirent { dirent } = &inner.r#type else {
        err!(SysError::NotDirectory);
    };
    if !dirent.lock().is_dir() {
        err!(SysError::NotDirectory);
    }

    match dirent::enext(dirent, inner.offset) {
        Some((name, _record_off, consumed)) => {
            inner.offset += consumed;
            let n = name.len().min(max);
            unsafe { crate::proc::copy_to_user(&name.as_bytes()[..n], addr) }
                .map_err(SysError::from)?;
            Ok(n)
        }
        None => Ok(0),
    }
}

/// Batch form of `readdir`, filling `dst` with `(name_len: u32, name bytes)`
/// records back to back until the buffer or the directory is exhausted.
pub fn sys_getdents64(args: &SyscallArgs) -> Result<usize, SysError> {
    let addr = args.get_addr(1);
    let max = args.get_int(2) as usize;
    let (_, file) = args.get_file(0)?;

    let mut inner = FILE_TABLE.inner[file.id].lock();
    let FileType::Dirent { dirent } = &inner.r#type else {
        err!(SysError::NotDirectory);
    };

    let mut out = Vec::new();
    while out.len() + 4 < max {
        match dirent::enext(dirent, inner.offset) {
            Some((name, _record_off, consumed)) => {
                if out.len() + 4 + name.len() > max {
                    break;
                }
                out.extend_from_slice(&(name.len() as u32).to_le_bytes());
                out.extend_from_slice(name.as_bytes());
                inner.offset += consumed;
            }
            None => break,
        }
    }

    unsafe { crate::proc::copy_to_user(&out, addr) }.map_err(SysError::from)?;
    Ok(out.len())
}

/// Writes the absolute path of the calling process's cwd into a user
/// buffer, built by walking the dirent cache's parent chain up to the
/// root.
pub fn sys_getcwd(args: &SyscallArgs) -> Result<usize, SysError> {
    let addr = args.get_addr(0);
    let max = args.get_int(1) as usize;

    let cwd = unsafe { current_proc().data_mut() }.cwd.as_ref().unwrap().dup();

    let mut components: Vec<String> = Vec::new();
    let mut cur = cwd;
    loop {
        if cur.is_root() {
            cur.put();
            break;
        }
        let name = cur.lock().filename.clone();
        components.push(name);
        let parent = cur.parent().unwrap().dup();
        cur.put();
        cur = parent;
    }

    let mut path = String::from("/");
    for comp in components.iter().rev() {
        path.push_str(comp);
        path.push('/');
    }
    if path.len() > 1 {
        path.pop();
    }

    if path.len() + 1 > max {
        err!(SysError::NameTooLong);
    }

    let mut bytes = path.into_bytes();
    bytes.push(0);
    unsafe { crate::proc::copy_to_user(&bytes, addr) }.map_err(SysError::from)?;

    Ok(bytes.len() - 1)
}

pub fn sys_exec(args: &SyscallArgs) -> Result<usize, SysError> {
    let path = args.get_string(0, MAXPATH)?;
    let argv_addr = args.get_addr(1);

    let mut argv_ptrs = [0usize; MAXARG];
    let mut argc = 0;
    for (i, slot) in argv_ptrs.iter_mut().enumerate() {
        let mut buf = [0u8; core::mem::size_of::<usize>()];
        crate::proc::copy_from_user(crate::vm::VA(argv_addr.0 + i * buf.len()), &mut buf)
            .map_err(SysError::from)?;
        let ptr = usize::from_le_bytes(buf);
        if ptr == 0 {
            argc = i;
            break;
        }
        *slot = ptr;
    }

    let mut argv = Vec::with_capacity(argc);
    let mut strings = Vec::with_capacity(argc);
    for &ptr in &argv_ptrs[..argc] {
        strings.push(try_log!(
            args.fetch_string(crate::vm::VA(ptr), MAXPATH)
        ));
    }
    for s in &strings {
        argv.push(s.as_str());
    }

    let argc = try_log!(exec(&Path::new(&path), &argv).map_err(|_| SysError::NoSuchEntry));
    Ok(argc)
}

/// Allocates a pipe and writes its `[read_fd, write_fd]` pair to user space
/// at the given address.
fn pipe_alloc_to(args: &SyscallArgs, index: usize) -> Result<usize, SysError> {
    let (read_file, mut write_file) = try_log!(crate::pipe::Pipe::alloc());

    let read_fd = match fd_alloc(read_file) {
        Ok(fd) => fd,
        Err(e) => {
            write_file.close();
            err!(e);
        }
    };
    let write_fd = match fd_alloc(write_file) {
        Ok(fd) => fd,
        Err(e) => {
            let data = unsafe { current_proc().data_mut() };
            if let Some(mut f) = data.open_files[read_fd].take() {
                f.close();
            }
            err!(e);
        }
    };

    let fds = [read_fd, write_fd];
    let bytes = unsafe {
        core::slice::from_raw_parts(fds.as_ptr() as *const u8, core::mem::size_of_val(&fds))
    };
    unsafe { crate::proc::copy_to_user(bytes, args.get_addr(index)) }.map_err(SysError::from)?;

    Ok(0)
}

/// Opens a file descriptor bound directly to a device major number, since
/// there is no device-special-file mechanism on FAT32 to `open` one by path.
pub fn sys_dev(args: &SyscallArgs) -> Result<usize, SysError> {
    let major = args.get_int(0);
    let major: u16 = try_log!(major.try_into().or(Err(SysError::InvalidArgument)));

    if (major as usize) >= crate::param::NDEV || crate::file::DEVICES[major as usize].is_none() {
        err!(SysError::InvalidArgument);
    }

    let file = try_log!(File::alloc());
    {
        let mut inner = FILE_TABLE.inner[file.id].lock();
        inner.readable = true;
        inner.writeable = true;
        inner.r#type = FileType::Device {
            dirent: dirent::root().dup(),
            major,
        };
    }

    fd_alloc(file)
}

pub fn sys_pipe(args: &SyscallArgs) -> Result<usize, SysError> {
    pipe_alloc_to(args, 0)
}

pub fn sys_pipe2(args: &SyscallArgs) -> Result<usize, SysError> {
    pipe_alloc_to(args, 0)
}
