//! Process-facing syscalls: lifecycle, scheduling, and memory growth.

use crate::error::SysError;
use crate::proc::{self, Channel, PID, current_proc};
use crate::syscall::SyscallArgs;
use crate::trap::TICKS_LOCK;

pub fn sys_exit(args: &SyscallArgs) -> ! {
    let n = args.get_int(0);
    proc::exit(n);
}

pub fn sys_getpid(args: &SyscallArgs) -> Result<usize, SysError> {
    let pid = args.proc().inner.lock().pid;
    Ok(pid.0)
}

pub fn sys_fork(_args: &SyscallArgs) -> Result<usize, SysError> {
    match proc::clone(None) {
        Ok(pid) => Ok(pid.0),
        Err(_) => Err(SysError::OutOfMemory),
    }
}

/// Creates a new thread sharing the caller's address space, with its own
/// stack provided by the caller (non-zero `stack` argument).
pub fn sys_clone(args: &SyscallArgs) -> Result<usize, SysError> {
    let stack = args.get_raw(0);
    let stack = if stack == 0 { None } else { Some(stack) };

    match proc::clone(stack) {
        Ok(pid) => Ok(pid.0),
        Err(_) => Err(SysError::OutOfMemory),
    }
}

pub fn sys_wait(args: &SyscallArgs) -> Result<usize, SysError> {
    let addr = args.get_addr(0);
    match proc::waitpid(Some(addr), -1) {
        Ok(pid) => Ok(pid.0),
        Err(e) => Err(SysError::from(e)),
    }
}

pub fn sys_sbrk(args: &SyscallArgs) -> Result<usize, SysError> {
    let size = args.get_int(0);
    let addr = unsafe { args.proc().data_mut() }.size;

    match unsafe { proc::grow(size) } {
        Ok(_) => Ok(addr),
        Err(e) => Err(SysError::from(e)),
    }
}

/// `brk(0)` reports the current break; `brk(addr)` grows or shrinks to it.
pub fn sys_brk(args: &SyscallArgs) -> Result<usize, SysError> {
    let target = args.get_raw(0);
    let size = unsafe { args.proc().data_mut() }.size;

    if target == 0 {
        return Ok(size);
    }

    let delta = target as isize - size as isize;
    unsafe { proc::grow(delta) }.map_err(SysError::from)?;
    Ok(target)
}

/// A file-into-newly-grown-memory read: grows the break and reads the fd's
/// contents into the new region. Not a general page-mapping facility.
pub fn sys_mmap(args: &SyscallArgs) -> Result<usize, SysError> {
    let len = args.get_int(1).max(0) as usize;
    let (_, file) = args.get_file(4)?;

    let base = unsafe { args.proc().data_mut() }.size;
    unsafe { proc::grow(len as isize) }.map_err(SysError::from)?;

    file.read(crate::vm::VA(base), len)?;
    Ok(base)
}

pub fn sys_sleep(args: &SyscallArgs) -> Result<usize, SysError> {
    let duration = args.get_int(0).max(0) as usize;

    let mut ticks = TICKS_LOCK.lock();
    let ticks0 = *ticks;

    while *ticks - ticks0 < duration {
        if current_proc().is_killed() {
            return Err(SysError::IoError);
        }

        ticks = proc::sleep(Channel::Ticks, ticks);
    }

    Ok(0)
}

pub fn sys_kill(args: &SyscallArgs) -> Result<usize, SysError> {
    let pid = args.get_int(0).max(0) as usize;
    Ok(proc::kill(PID(pid)) as usize)
}

pub fn sys_uptime(_args: &SyscallArgs) -> Result<usize, SysError> {
    let ticks = *TICKS_LOCK.lock();
    Ok(ticks)
}

/// Sets or reports the per-process syscall trace bitmask. A negative
/// argument reports the current mask instead of replacing it.
pub fn sys_trace(args: &SyscallArgs) -> Result<usize, SysError> {
    let mask = args.get_int(0);
    let data = unsafe { args.proc().data_mut() };

    if mask < 0 {
        return Ok(data.trace_mask as usize);
    }

    data.trace_mask = mask as u32;
    Ok(0)
}

/// Fixed identification string; there is only one kernel build, so `uname`
/// has nothing to distinguish.
pub fn sys_uname(args: &SyscallArgs) -> Result<usize, SysError> {
    const NAME: &[u8] = b"tarnkernel\0";
    let addr = args.get_addr(0);
    unsafe { crate::proc::copy_to_user(NAME, addr) }.map_err(SysError::from)?;
    Ok(0)
}

/// Per-process CPU time accounting, in ticks: (utime, stime, cutime, cstime).
pub fn sys_times(args: &SyscallArgs) -> Result<usize, SysError> {
    let addr = args.get_addr(0);
    let inner = args.proc().inner.lock();
    let times = [inner.utime, inner.stime, inner.cutime, inner.cstime];
    drop(inner);

    let bytes = unsafe {
        core::slice::from_raw_parts(times.as_ptr() as *const u8, core::mem::size_of_val(&times))
    };
    unsafe { crate::proc::copy_to_user(bytes, addr) }.map_err(SysError::from)?;

    Ok(0)
}

/// Reports coarse system load: number of live processes and ticks since
/// boot.
pub fn sys_sysinfo(args: &SyscallArgs) -> Result<usize, SysError> {
    let addr = args.get_addr(0);
    let uptime = *TICKS_LOCK.lock();
    let nproc = proc::live_count();

    let info = [uptime as u64, nproc as u64];
    let bytes = unsafe {
        core::slice::from_raw_parts(info.as_ptr() as *const u8, core::mem::size_of_val(&info))
    };
    unsafe { crate::proc::copy_to_user(bytes, addr) }.map_err(SysError::from)?;

    Ok(0)
}

/// Kills every other process and halts. Only `init` (pid 1) may call this.
pub fn sys_shutdown(args: &SyscallArgs) -> Result<usize, SysError> {
    if args.proc().inner.lock().pid.0 != 1 {
        return Err(SysError::NotPermitted);
    }

    proc::shutdown();
}
