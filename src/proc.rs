//! Process table, scheduler, and process lifecycle (fork/clone/exit/wait).

use alloc::boxed::Box;
use alloc::string::String;
use core::cell::UnsafeCell;
use core::mem::{transmute, MaybeUninit};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::KernelError;
use crate::file::File;
use crate::fs::dirent::Dirent;
use crate::param::{NCPU, NOFILE, NPROC};
use crate::riscv::interrupts;
use crate::riscv::registers::tp;
use crate::riscv::PTE_W;
use crate::spinlock::{SpinLock, SpinLockGuard};
use crate::vm::{Uvm, VA};

pub static CPU_POOL: CpuPool = CpuPool::new();
pub static PROC_TABLE: ProcTable = ProcTable::new();

/// One hardware thread's scheduler-local state.
pub struct Cpu {
    pub proc: Option<usize>,
    pub context: Context,
    pub num_off: isize,
    pub interrupt_enabled: bool,
}

impl Cpu {
    const fn new() -> Self {
        Self {
            proc: None,
            context: Context::new(),
            num_off: 0,
            interrupt_enabled: false,
        }
    }

    fn push(&mut self, old_state: bool) -> InterruptLock {
        if self.num_off == 0 {
            self.interrupt_enabled = old_state;
        }
        self.num_off += 1;
        InterruptLock {}
    }

    fn pop(&mut self) {
        assert!(!interrupts::get(), "cpu pop - interruptible");
        assert!(self.num_off >= 1, "cpu pop - not held");

        self.num_off -= 1;
        if self.num_off == 0 && self.interrupt_enabled {
            interrupts::enable();
        }
    }
}

pub struct CpuPool([UnsafeCell<Cpu>; NCPU]);
unsafe impl Sync for CpuPool {}

impl CpuPool {
    const fn new() -> Self {
        let mut array: [MaybeUninit<_>; NCPU] = unsafe { MaybeUninit::uninit().assume_init() };
        let mut i = 0;
        while i < NCPU {
            array[i] = MaybeUninit::new(UnsafeCell::new(Cpu::new()));
            i += 1;
        }
        unsafe { transmute(array) }
    }

    /// # Safety
    /// Must be called with interrupts disabled.
    #[inline]
    pub unsafe fn current_id() -> usize {
        tp::read()
    }

    /// # Safety
    /// Must be called with interrupts disabled, to avoid the process
    /// migrating to a different hart mid-access.
    pub unsafe fn mycpu() -> *mut Cpu {
        assert!(!interrupts::get(), "mycpu - interrupts enabled");
        let id = unsafe { Self::current_id() };
        self::CPU_POOL.0[id].get()
    }

    /// Disables interrupts on this hart and returns a guard releasing them
    /// (or leaving them off, if already nested) on drop.
    pub fn lock_mycpu() -> InterruptLock {
        let old_state = interrupts::get();
        interrupts::disable();

        unsafe { (*Self::mycpu()).push(old_state) }
    }

    /// Returns the id of the process currently running on this hart, if any.
    pub fn current_proc(&self) -> Option<usize> {
        let _lock = Self::lock_mycpu();
        unsafe { (*Self::mycpu()).proc }
    }
}

pub struct InterruptLock {}

impl Drop for InterruptLock {
    fn drop(&mut self) {
        unsafe { (*CpuPool::mycpu()).pop() }
    }
}

/// Saved callee-saved registers for a cooperative context switch.
#[repr(C)]
pub struct Context {
    pub ra: usize,
    pub sp: usize,
    pub s0: usize,
    pub s1: usize,
    pub s2: usize,
    pub s3: usize,
    pub s4: usize,
    pub s5: usize,
    pub s6: usize,
    pub s7: usize,
    pub s8: usize,
    pub s9: usize,
    pub s10: usize,
    pub s11: usize,
}

impl Context {
    pub const fn new() -> Self {
        Self {
            ra: 0,
            sp: 0,
            s0: 0,
            s1: 0,
            s2: 0,
            s3: 0,
            s4: 0,
            s5: 0,
            s6: 0,
            s7: 0,
            s8: 0,
            s9: 0,
            s10: 0,
            s11: 0,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-process trap save area. Mapped at a fixed user virtual address just
/// below the trampoline page; laid out so uservec/userret in the trampoline
/// can save/restore it without a Rust-side ABI.
#[repr(C, align(4096))]
pub struct TrapFrame {
    /*   0 */ pub kernel_satp: usize,
    /*   8 */ pub kernel_sp: usize,
    /*  16 */ pub kernel_trap: usize,
    /*  24 */ pub epc: usize,
    /*  32 */ pub kernel_hartid: usize,
    /*  40 */ pub ra: usize,
    /*  48 */ pub sp: usize,
    /*  56 */ pub gp: usize,
    /*  64 */ pub tp: usize,
    /*  72 */ pub t0: usize,
    /*  80 */ pub t1: usize,
    /*  88 */ pub t2: usize,
    /*  96 */ pub s0: usize,
    /* 104 */ pub s1: usize,
    /* 112 */ pub a0: usize,
    /* 120 */ pub a1: usize,
    /* 128 */ pub a2: usize,
    /* 136 */ pub a3: usize,
    /* 144 */ pub a4: usize,
    /* 152 */ pub a5: usize,
    /* 160 */ pub a6: usize,
    /* 168 */ pub a7: usize,
    /* 176 */ pub s2: usize,
    /* 184 */ pub s3: usize,
    /* 192 */ pub s4: usize,
    /* 200 */ pub s5: usize,
    /* 208 */ pub s6: usize,
    /* 216 */ pub s7: usize,
    /* 224 */ pub s8: usize,
    /* 232 */ pub s9: usize,
    /* 240 */ pub s10: usize,
    /* 248 */ pub s11: usize,
    /* 256 */ pub t3: usize,
    /* 264 */ pub t4: usize,
    /* 272 */ pub t5: usize,
    /* 280 */ pub t6: usize,
}

impl TrapFrame {
    pub fn zeroed() -> Box<Self> {
        unsafe {
            let layout = core::alloc::Layout::new::<Self>();
            let ptr = alloc::alloc::alloc_zeroed(layout) as *mut Self;
            assert!(!ptr.is_null(), "trapframe alloc failed");
            Box::from_raw(ptr)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PID(pub usize);

impl PID {
    fn alloc() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(1);
        PID(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Opaque rendezvous token for sleep/wakeup. Compared only for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Proc(usize),
    Ticks,
    Dirent(usize),
    Lock(usize),
    PipeRead(usize),
    PipeWrite(usize),
    Buffer(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

/// One process table slot.
pub struct Proc {
    pub id: usize,
    pub inner: SpinLock<ProcInner>,
    data: UnsafeCell<ProcData>,
}

unsafe impl Sync for Proc {}

pub struct ProcInner {
    pub state: ProcState,
    pub chan: Option<Channel>,
    pub killed: bool,
    pub xstate: isize,
    pub pid: PID,
    pub utime: usize,
    pub stime: usize,
    pub cutime: usize,
    pub cstime: usize,
}

impl ProcInner {
    const fn new() -> Self {
        Self {
            state: ProcState::Unused,
            chan: None,
            killed: false,
            xstate: 0,
            pid: PID(0),
            utime: 0,
            stime: 0,
            cutime: 0,
            cstime: 0,
        }
    }
}

pub struct ProcData {
    pub kstack: usize,
    pub size: usize,
    pub pagetable: Option<Uvm>,
    pub trapframe: Option<Box<TrapFrame>>,
    pub context: Context,
    pub open_files: [Option<File>; NOFILE],
    pub cwd: Option<Dirent>,
    pub name: String,
    pub trace_mask: u32,
}

impl ProcData {
    const fn new() -> Self {
        Self {
            kstack: 0,
            size: 0,
            pagetable: None,
            trapframe: None,
            context: Context::new(),
            open_files: [const { None }; NOFILE],
            cwd: None,
            name: String::new(),
            trace_mask: 0,
        }
    }
}

impl Proc {
    /// # Safety
    /// Caller must not hold `self.inner`'s lock and must not alias this
    /// reference while another mutable reference to the data is live.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn data_mut(&self) -> &mut ProcData {
        unsafe { &mut *self.data.get() }
    }

    pub fn is_killed(&self) -> bool {
        self.inner.lock().killed
    }
}

pub struct ProcTable {
    table: [UnsafeCell<Proc>; NPROC],
    pub init: SpinLock<Option<usize>>,
    /// Child slot index -> parent slot index. Kept as its own side table,
    /// not a field on `ProcInner`, so `wait` can hold one lock across both
    /// the "scan for a zombie child" phase and the transition to sleep
    /// without taking every child's own lock to read its parent. This is
    /// also what lets `waitpid` hold the lock for the whole call, closing
    /// the lost-wakeup race against a concurrent `exit`.
    parents: SpinLock<[Option<usize>; NPROC]>,
}

unsafe impl Sync for ProcTable {}

impl ProcTable {
    const fn new() -> Self {
        let mut array: [MaybeUninit<UnsafeCell<Proc>>; NPROC] =
            unsafe { MaybeUninit::uninit().assume_init() };
        let mut i = 0;
        while i < NPROC {
            array[i] = MaybeUninit::new(UnsafeCell::new(Proc {
                id: i,
                inner: SpinLock::new(ProcInner::new(), "proc"),
                data: UnsafeCell::new(ProcData::new()),
            }));
            i += 1;
        }
        Self {
            table: unsafe { transmute(array) },
            init: SpinLock::new(None, "init_proc"),
            parents: SpinLock::new([None; NPROC], "parents"),
        }
    }

    pub fn get(&self, id: usize) -> &Proc {
        unsafe { &*self.table[id].get() }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Proc> {
        (0..NPROC).map(move |i| self.get(i))
    }

    /// Finds an UNUSED slot, claims it with a fresh PID, and returns it
    /// still locked so the caller can finish initialization atomically.
    pub fn alloc(&self) -> Result<(&Proc, SpinLockGuard<'_, ProcInner>), KernelError> {
        for p in self.iter() {
            let mut inner = p.inner.lock();
            if inner.state != ProcState::Unused {
                continue;
            }

            inner.pid = PID::alloc();
            inner.killed = false;
            inner.xstate = 0;
            inner.utime = 0;
            inner.stime = 0;
            inner.cutime = 0;
            inner.cstime = 0;

            let data = unsafe { p.data_mut() };
            data.trapframe = Some(TrapFrame::zeroed());
            data.pagetable = match Uvm::try_new(data.trapframe.as_deref().unwrap()) {
                Ok(pt) => Some(pt),
                Err(e) => {
                    data.trapframe = None;
                    inner.state = ProcState::Unused;
                    return Err(e.into());
                }
            };
            data.size = 0;
            data.context = Context::new();
            data.context.ra = fork_ret as usize;
            data.context.sp = data.kstack + crate::param::PGSIZE * crate::param::NKSTACK_PAGES;

            // Left in whatever state the caller sets once it finishes
            // filling in ProcData; callers always set Runnable before
            // releasing the returned guard.
            return Ok((p, inner));
        }
        Err(KernelError::OutOfProc)
    }
}

/// Frees a process slot. Caller must hold `inner`'s lock.
fn free_proc(p: &Proc, inner: &mut ProcInner) {
    let data = unsafe { p.data_mut() };
    data.trapframe = None;
    if let Some(pt) = data.pagetable.take() {
        pt.proc_free(data.size);
    }
    data.size = 0;
    data.name.clear();

    inner.pid = PID(0);
    inner.chan = None;
    inner.killed = false;
    inner.xstate = 0;
    inner.state = ProcState::Unused;
}

/// Sets up the first user process and makes it runnable.
pub fn user_init() {
    let (p, mut inner) = PROC_TABLE.alloc().expect("user_init: no free proc");
    *PROC_TABLE.init.lock() = Some(p.id);

    let data = unsafe { p.data_mut() };
    data.name = String::from("initcode");
    data.cwd = Some(crate::fs::dirent::root());

    let tf = data.trapframe.as_mut().unwrap();
    tf.epc = 0;
    tf.sp = crate::param::USERSTACK * crate::param::PGSIZE;

    inner.state = ProcState::Runnable;
    drop(inner);

    // Console fd setup locks the (sleep-locked) file table, which records
    // the locking process's pid. Stand in as "current" on this hart for
    // the duration, since the scheduler hasn't picked anything yet.
    unsafe {
        let _lock = CpuPool::lock_mycpu();
        (*CpuPool::mycpu()).proc = Some(p.id);
    }

    crate::file::setup_console_fds(p);

    unsafe {
        let _lock = CpuPool::lock_mycpu();
        (*CpuPool::mycpu()).proc = None;
    }
}

/// Grows or shrinks the calling process's user memory by `n` bytes.
///
/// # Safety
/// Must be called on the current hart's running process.
pub unsafe fn grow(n: isize) -> Result<usize, KernelError> {
    let p = current_proc();
    let data = unsafe { p.data_mut() };
    let old_size = data.size;

    let pt = data.pagetable.as_mut().unwrap();
    let new_size = if n > 0 {
        pt.alloc(old_size, old_size + n as usize, PTE_W)?
    } else if n < 0 {
        pt.dealloc(old_size, old_size - (-n) as usize)
    } else {
        old_size
    };

    data.size = new_size;
    Ok(old_size)
}

/// Duplicates the calling process into a fresh child. If `stack` is given,
/// the child's user stack pointer register is overwritten with it
/// (implements `clone`; `fork` calls this with `stack = None`).
pub fn clone(stack: Option<usize>) -> Result<PID, KernelError> {
    let p = current_proc();
    let pdata = unsafe { p.data_mut() };

    let (child, mut child_inner) = PROC_TABLE.alloc()?;
    let cdata = unsafe { child.data_mut() };

    if let Err(e) = pdata
        .pagetable
        .as_mut()
        .unwrap()
        .copy_to(cdata.pagetable.as_mut().unwrap(), pdata.size)
    {
        free_proc(child, &mut child_inner);
        return Err(e.into());
    }
    cdata.size = pdata.size;

    *cdata.trapframe.as_mut().unwrap() = clone_trapframe(pdata.trapframe.as_ref().unwrap());
    cdata.trapframe.as_mut().unwrap().a0 = 0;
    if let Some(sp) = stack {
        cdata.trapframe.as_mut().unwrap().sp = sp;
    }

    for i in 0..NOFILE {
        if let Some(f) = &mut pdata.open_files[i] {
            cdata.open_files[i] = Some(f.dup());
        }
    }
    cdata.cwd = pdata.cwd.as_ref().map(Dirent::dup);
    cdata.name = pdata.name.clone();

    let pid = child_inner.pid;
    let child_id = child.id;
    drop(child_inner);

    PROC_TABLE.parents.lock()[child_id] = Some(p.id);

    child.inner.lock().state = ProcState::Runnable;

    Ok(pid)
}

fn clone_trapframe(src: &TrapFrame) -> TrapFrame {
    TrapFrame {
        kernel_satp: src.kernel_satp,
        kernel_sp: src.kernel_sp,
        kernel_trap: src.kernel_trap,
        epc: src.epc,
        kernel_hartid: src.kernel_hartid,
        ra: src.ra,
        sp: src.sp,
        gp: src.gp,
        tp: src.tp,
        t0: src.t0,
        t1: src.t1,
        t2: src.t2,
        s0: src.s0,
        s1: src.s1,
        a0: src.a0,
        a1: src.a1,
        a2: src.a2,
        a3: src.a3,
        a4: src.a4,
        a5: src.a5,
        a6: src.a6,
        a7: src.a7,
        s2: src.s2,
        s3: src.s3,
        s4: src.s4,
        s5: src.s5,
        s6: src.s6,
        s7: src.s7,
        s8: src.s8,
        s9: src.s9,
        s10: src.s10,
        s11: src.s11,
        t3: src.t3,
        t4: src.t4,
        t5: src.t5,
        t6: src.t6,
    }
}

/// Reassigns every child of `from` to the init process. Caller already
/// holds the parents table lock for the duration of this call, so this
/// touches no process's own `inner` lock at all.
fn reparent(from: usize, parents: &mut SpinLockGuard<'_, [Option<usize>; NPROC]>) {
    let init_id = PROC_TABLE.init.lock().expect("no init proc");
    for parent in parents.iter_mut() {
        if *parent == Some(from) {
            *parent = Some(init_id);
            wakeup(Channel::Proc(init_id));
        }
    }
}

/// Terminates the calling process with `status`. Never returns.
pub fn exit(status: isize) -> ! {
    let p = current_proc();
    assert!(
        PROC_TABLE.init.lock().map(|id| id != p.id).unwrap_or(true),
        "init exiting"
    );

    let data = unsafe { p.data_mut() };
    for f in data.open_files.iter_mut() {
        *f = None;
    }
    if let Some(cwd) = data.cwd.take() {
        cwd.put();
    }

    // Held across reparenting and the transition to Zombie so a parent
    // mid-scan in `waitpid` cannot miss this process's wakeup.
    let mut parents = PROC_TABLE.parents.lock();

    reparent(p.id, &mut parents);

    let parent_id = parents[p.id].expect("exit no parent");
    wakeup(Channel::Proc(parent_id));

    let (utime, stime) = {
        let inner = p.inner.lock();
        (inner.utime, inner.stime)
    };
    let parent = PROC_TABLE.get(parent_id);
    let mut pinner = parent.inner.lock();
    pinner.cutime += utime;
    pinner.cstime += stime;
    drop(pinner);

    let mut inner = p.inner.lock();
    inner.xstate = status << 8;
    inner.state = ProcState::Zombie;

    drop(parents);

    sched(inner);
    unreachable!("zombie process rescheduled");
}

/// Waits for a child (or, if `pid != -1`, a specific child) to exit.
///
/// Holds the parents table lock for the whole call, including across the
/// sleep, so the "scan for a zombie child" phase and the transition to
/// Sleeping are atomic with respect to a concurrent `exit`'s wakeup.
pub fn waitpid(addr: Option<VA>, pid_filter: isize) -> Result<PID, KernelError> {
    let p = current_proc();

    let mut parents = PROC_TABLE.parents.lock();

    loop {
        let mut have_child = false;

        for child in PROC_TABLE.iter() {
            if parents[child.id] != Some(p.id) {
                continue;
            }

            let mut cinner = child.inner.lock();
            if pid_filter != -1 && pid_filter as usize != cinner.pid.0 {
                continue;
            }
            have_child = true;

            if cinner.state == ProcState::Zombie {
                let cpid = cinner.pid;
                let xstate = cinner.xstate;
                if let Some(addr) = addr {
                    if unsafe { copy_to_user(&xstate.to_ne_bytes(), addr).is_err() } {
                        return Err(KernelError::InvalidArgument);
                    }
                }
                parents[child.id] = None;
                free_proc(child, &mut cinner);
                return Ok(cpid);
            }
        }

        if !have_child || p.is_killed() {
            return Err(KernelError::OutOfProc);
        }

        parents = sleep(Channel::Proc(p.id), parents);
    }
}

/// Marks `pid` for termination; wakes it if sleeping.
pub fn kill(pid: PID) -> bool {
    for p in PROC_TABLE.iter() {
        let mut inner = p.inner.lock();
        if inner.pid == pid {
            inner.killed = true;
            if inner.state == ProcState::Sleeping {
                inner.state = ProcState::Runnable;
            }
            return true;
        }
    }
    false
}

/// Counts processes not in the `Unused` state.
pub fn live_count() -> usize {
    PROC_TABLE.iter().filter(|p| p.inner.lock().state != ProcState::Unused).count()
}

/// Halts the machine via the SBI system-reset call.
pub fn shutdown() -> ! {
    interrupts::disable();
    crate::println!("system halted");
    crate::sbi::shutdown();
}

/// Returns the `Proc` currently running on this hart. Panics off a hart
/// with no current process (the idle scheduler context never calls this).
pub fn current_proc() -> &'static Proc {
    let id = CPU_POOL.current_proc().expect("no current process");
    PROC_TABLE.get(id)
}

/// Per-CPU scheduler loop. Never returns.
pub fn scheduler() -> ! {
    loop {
        interrupts::enable();

        let mut ran = false;
        for p in PROC_TABLE.iter() {
            let mut inner = p.inner.lock();
            if inner.state != ProcState::Runnable {
                continue;
            }

            inner.state = ProcState::Running;
            unsafe {
                (*CpuPool::mycpu()).proc = Some(p.id);
            }

            let cpu_ctx = unsafe { &mut (*CpuPool::mycpu()).context };
            let proc_ctx = unsafe { &mut p.data_mut().context };
            drop(inner);

            unsafe { swtch(cpu_ctx, proc_ctx) };

            unsafe {
                (*CpuPool::mycpu()).proc = None;
            }
            ran = true;
        }

        if !ran {
            interrupts::enable();
            unsafe { core::arch::asm!("wfi") };
        }
    }
}

/// Switches from the calling process back into the per-CPU scheduler
/// context. Caller must hold exactly `inner`'s lock with interrupts off.
pub fn sched(mut inner: SpinLockGuard<'_, ProcInner>) -> SpinLockGuard<'_, ProcInner> {
    assert!(inner.state != ProcState::Running, "sched: still running");
    assert!(!interrupts::get(), "sched: interruptible");

    let intena = unsafe { (*CpuPool::mycpu()).interrupt_enabled };

    let p = current_proc();
    let proc_ctx = unsafe { &mut p.data_mut().context };
    let cpu_ctx = unsafe { &mut (*CpuPool::mycpu()).context };

    unsafe { swtch(proc_ctx, cpu_ctx) };

    unsafe {
        (*CpuPool::mycpu()).interrupt_enabled = intena;
    }

    inner
}

pub fn r#yield() {
    let p = current_proc();
    let mut inner = p.inner.lock();
    inner.state = ProcState::Runnable;
    let inner = sched(inner);
    drop(inner);
}

/// Blocks the calling process on `chan`, atomically releasing `lock`.
/// Re-acquires `lock` before returning, closing the lost-wakeup race by
/// taking the process's own lock before dropping the caller's.
pub fn sleep<'a, T>(chan: Channel, lock: SpinLockGuard<'a, T>) -> SpinLockGuard<'a, T> {
    let p = current_proc();

    let mut inner = p.inner.lock();
    let held = lock.into_lock();

    inner.chan = Some(chan);
    inner.state = ProcState::Sleeping;

    let inner = sched(inner);
    drop(inner);

    p.inner.lock().chan = None;

    held.lock()
}

/// Wakes every process sleeping on `chan`. Must not be called while
/// holding any process's lock.
pub fn wakeup(chan: Channel) {
    let me = CPU_POOL.current_proc();
    for p in PROC_TABLE.iter() {
        if Some(p.id) == me {
            continue;
        }
        let mut inner = p.inner.lock();
        if inner.state == ProcState::Sleeping && inner.chan == Some(chan) {
            inner.state = ProcState::Runnable;
        }
    }
}

/// First return path for a freshly scheduled process (its saved `ra`).
///
/// # Safety
/// Only valid as the `ra` target of a process's initial `Context`.
pub unsafe extern "C" fn fork_ret() -> ! {
    static FIRST: AtomicBool = AtomicBool::new(true);

    if FIRST.swap(false, Ordering::SeqCst) {
        unsafe { crate::fs::init(crate::param::ROOTDEV) };
    }

    crate::trap::usertrapret();
}

/// Copies `src` into the current process's address space at `dst`.
///
/// # Safety
/// `dst` must be a valid, mapped user virtual address for `src.len()` bytes.
pub unsafe fn copy_to_user(src: &[u8], dst: VA) -> Result<(), KernelError> {
    let p = current_proc();
    let pt = unsafe { p.data_mut() }.pagetable.as_mut().unwrap();
    pt.copy_out(dst, src).map_err(KernelError::from)
}

/// Copies from the current process's address space at `src` into `dst`.
pub fn copy_from_user(src: VA, dst: &mut [u8]) -> Result<(), KernelError> {
    let p = current_proc();
    let pt = unsafe { p.data_mut() }.pagetable.as_ref().unwrap();
    pt.copy_in(dst, src).map_err(KernelError::from)
}

use crate::swtch::swtch;

/// Early kernel-boot initialization of the process subsystem.
///
/// # Safety
/// Must be called exactly once, before any process is scheduled.
pub unsafe fn init() {
    for p in PROC_TABLE.iter() {
        let data = unsafe { p.data_mut() };
        data.kstack = crate::vm::kstack_va(p.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_alloc_is_monotonic() {
        let a = PID::alloc();
        let b = PID::alloc();
        assert!(b.0 > a.0);
    }

    /// Drives `kill()` against a real process-table slot without going
    /// through `ProcTable::alloc()`, which needs the physical frame
    /// allocator up and running from a linker-provided symbol this test
    /// binary doesn't have.
    #[test]
    fn kill_wakes_a_sleeping_process_and_marks_it_killed() {
        let p = PROC_TABLE.get(NPROC - 1);
        let test_pid = PID(usize::MAX - 1);

        {
            let mut inner = p.inner.lock();
            inner.pid = test_pid;
            inner.state = ProcState::Sleeping;
            inner.chan = Some(Channel::Ticks);
            inner.killed = false;
        }

        assert!(kill(test_pid));

        {
            let inner = p.inner.lock();
            assert!(inner.killed);
            assert_eq!(inner.state, ProcState::Runnable);
        }

        // Leave the slot Unused so it doesn't leak into another test.
        let mut inner = p.inner.lock();
        inner.state = ProcState::Unused;
        inner.killed = false;
        inner.chan = None;
        inner.pid = PID(0);
    }

    #[test]
    fn kill_returns_false_for_an_unknown_pid() {
        assert!(!kill(PID(usize::MAX)));
    }
}
