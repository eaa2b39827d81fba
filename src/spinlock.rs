use core::cell::UnsafeCell;
use core::hint;
use core::ops::{Deref, DerefMut};
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::proc::InterruptLock;
use crate::proc::{Cpu, CpuPool};

/// A mutual-exclusion lock that spins while waiting and disables interrupts
/// on the local hart for as long as it is held (locked when `cpu` is
/// non-null).
#[derive(Debug)]
pub struct SpinLock<T> {
    name: &'static str,
    cpu: AtomicPtr<Cpu>,
    data: UnsafeCell<T>,
}

// Safety: UnsafeCell is not Sync but it can only be consumed with a guard
// or an exclusive reference. So SpinLock is safe to sync, if the inner type T is.
unsafe impl<T> Sync for SpinLock<T> where T: Send {}

pub struct SpinLockGuard<'a, T: 'a> {
    lock: &'a SpinLock<T>,
    _intr_lock: InterruptLock,
}

// Safety: UnsafeCell inside SpinLock is not Sync but only one thread can hold this guard.
// So SpinLockGuard is safe to sync as long as the inner type T is.
unsafe impl<T> Sync for SpinLockGuard<'_, T> where T: Sync {}

impl<T> SpinLock<T> {
    pub const fn new(value: T, name: &'static str) -> Self {
        SpinLock {
            name,
            cpu: AtomicPtr::new(ptr::null_mut()),
            data: UnsafeCell::new(value),
        }
    }

    // Safety: must be called with interrupts disabled.
    unsafe fn holding(&self) -> bool {
        self.cpu.load(Ordering::Relaxed) == unsafe { CpuPool::mycpu() }
    }

    pub fn lock(&self) -> SpinLockGuard<T> {
        let _intr_lock = CpuPool::lock_mycpu();

        unsafe {
            assert!(!self.holding(), "acquire lock {}", self.name);

            loop {
                if self
                    .cpu
                    .compare_exchange(
                        ptr::null_mut(),
                        CpuPool::mycpu(),
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    break SpinLockGuard {
                        lock: self,
                        _intr_lock,
                    };
                }

                hint::spin_loop()
            }
        }
    }

    // Since this call consumes self, we can guarentee no one else is holding a reference.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    // Since this call mutably borrows self, we can guarentee no one else is holding a reference.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    // Use this over `get_mut` when you need unsafe mutable access.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut_unchecked(&self) -> &mut T {
        unsafe { &mut *self.data.get() }
    }
}

// Dropping the guard will release the lock and also release the interrupt lock.
impl<'a, T: 'a> Drop for SpinLockGuard<'a, T> {
    fn drop(&mut self) {
        // Safety: the guard has an interrupt lock, it is safe to call holding
        unsafe {
            assert!(self.lock.holding(), "release lock {}", self.lock.name);
        }

        self.lock.cpu.store(ptr::null_mut(), Ordering::Release);
    }
}

impl<'a, T> SpinLockGuard<'a, T> {
    /// Releases the guard early and returns the lock it was borrowed from,
    /// so the caller can block and re-acquire it later (see `proc::sleep`).
    pub fn into_lock(self) -> &'a SpinLock<T> {
        let lock = self.lock;
        drop(self);
        lock
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}
