//! Page tables: the kernel's own mapping and each process's user mapping.

use alloc::boxed::Box;
use core::cmp::min;
use core::fmt;
use core::mem::MaybeUninit;
use core::ops::{Deref, DerefMut, Index, IndexMut};

use crate::memlayout::{KERNBASE, PHYSTOP, PLIC, TRAMPOLINE, TRAPFRAME, UART0, VIRTIO0, kstack};
use crate::param::{NKSTACK_PAGES, NPROC};
use crate::proc::TrapFrame;
use crate::riscv::{
    MAXVA, PGSIZE, PTE_R, PTE_U, PTE_V, PTE_W, PTE_X, pa_to_pte, pg_round_down, pg_round_up,
    pte_flags, pte_to_pa, px,
    registers::{satp, vma},
};
use crate::sync::OnceLock;
use crate::trampoline::trampoline;

// kernel.ld sets this to the end of kernel code
unsafe extern "C" {
    fn etext();
}

pub static KVM: OnceLock<Kvm> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    Alloc,
    InvalidPage,
    InvalidAddress,
    InvalidPte,
    MapExists,
}

impl From<core::alloc::AllocError> for VmError {
    fn from(_: core::alloc::AllocError) -> Self {
        VmError::Alloc
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::Alloc => write!(f, "out of memory"),
            VmError::InvalidPage => write!(f, "page not mapped"),
            VmError::InvalidAddress => write!(f, "address out of range"),
            VmError::InvalidPte => write!(f, "invalid page table entry"),
            VmError::MapExists => write!(f, "mapping already exists"),
        }
    }
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy)]
pub struct PA(pub usize);

impl From<usize> for PA {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy)]
pub struct VA(pub usize);

impl From<usize> for VA {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

#[repr(C, align(4096))]
#[derive(Debug, Clone)]
struct Page([u8; PGSIZE]);

#[repr(transparent)]
#[derive(Debug, Clone, Copy)]
struct PageTableEntry(usize);

impl PageTableEntry {
    fn is_v(&self) -> bool {
        self.0 & PTE_V != 0
    }

    fn is_u(&self) -> bool {
        self.0 & PTE_U != 0
    }

    fn is_w(&self) -> bool {
        self.0 & PTE_W != 0
    }

    /// True if this PTE carries one of the permission bits, i.e. points to
    /// data rather than to a lower page-table level.
    fn is_leaf(&self) -> bool {
        (self.0 & (PTE_X | PTE_W | PTE_R)) != 0
    }

    fn from_pa(pa: PA) -> Self {
        Self(pa_to_pte(pa.0))
    }

    fn as_pa(&self) -> PA {
        PA(pte_to_pa(self.0))
    }
}

#[repr(C, align(4096))]
#[derive(Debug, Clone)]
struct RawPageTable([PageTableEntry; 512]);

impl RawPageTable {
    fn try_new() -> Result<*mut Self, VmError> {
        let memory: Box<MaybeUninit<RawPageTable>> = Box::try_new_zeroed()?;
        let memory = unsafe { memory.assume_init() };
        Ok(Box::into_raw(memory))
    }
}

impl Index<usize> for RawPageTable {
    type Output = PageTableEntry;
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl IndexMut<usize> for RawPageTable {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

/// A Sv39 page table: three levels of 512-entry pages, each 4 KiB and
/// identity-pointed to by its own physical address.
#[derive(Debug, Clone)]
pub struct PageTable {
    ptr: *mut RawPageTable,
}

impl PageTable {
    pub fn try_new() -> Result<Self, VmError> {
        Ok(Self {
            ptr: RawPageTable::try_new()?,
        })
    }

    fn from_pa(pa: PA) -> Self {
        Self {
            ptr: pa.0 as *mut RawPageTable,
        }
    }

    pub fn as_pa(&self) -> PA {
        PA(self.ptr as usize)
    }

    fn walk(&mut self, va: VA, alloc: bool) -> Result<&mut PageTableEntry, VmError> {
        assert!(va.0 < MAXVA, "walk: va out of range");

        let mut pagetable = self.ptr;

        unsafe {
            for level in (1..=2).rev() {
                let pte = &mut (*pagetable)[px(level, va.0)];

                if pte.is_v() {
                    pagetable = pte.as_pa().0 as *mut RawPageTable;
                } else {
                    if !alloc {
                        return Err(VmError::InvalidPage);
                    }

                    pagetable = RawPageTable::try_new()?;
                    pte.0 = pa_to_pte(pagetable as usize) | PTE_V;
                }
            }

            Ok(&mut (*pagetable)[px(0, va.0)])
        }
    }

    /// Looks up a user virtual address and returns its physical address, or
    /// an error if it isn't mapped for user access.
    fn walk_addr(&mut self, va: VA) -> Result<PA, VmError> {
        if va.0 > MAXVA {
            return Err(VmError::InvalidAddress);
        }

        let pte = self.walk(va, false)?;

        if !pte.is_v() || !pte.is_u() {
            return Err(VmError::InvalidPte);
        }

        Ok(pte.as_pa())
    }

    /// Creates PTEs for `size` bytes starting at `va`, pointing at physical
    /// memory starting at `pa`. Both must be page-aligned.
    pub fn map_pages(&mut self, va: VA, pa: PA, size: usize, perm: usize) -> Result<(), VmError> {
        assert_eq!(va.0 % PGSIZE, 0, "map_pages: va not aligned");
        assert_eq!(size % PGSIZE, 0, "map_pages: size not aligned");
        assert_ne!(size, 0, "map_pages: size");

        let last = va.0 + size - PGSIZE;
        let mut va = va;
        let mut pa = pa.0;

        loop {
            let pte = self.walk(va, true)?;
            if pte.is_v() {
                return Err(VmError::MapExists);
            }

            pte.0 = pa_to_pte(pa) | perm | PTE_V;

            if va.0 == last {
                break;
            }

            va.0 += PGSIZE;
            pa += PGSIZE;
        }

        Ok(())
    }

    /// Recursively frees page-table pages. All leaf mappings must already
    /// have been removed.
    fn free_walk(self) {
        let pagetable = unsafe { &mut *self.ptr };

        for i in 0..512 {
            let pte = pagetable[i];
            if pte.is_v() {
                assert!(!pte.is_leaf(), "free_walk: leaf");
                let child = PageTable::from_pa(pte.as_pa());
                child.free_walk();
                pagetable[i] = PageTableEntry(0);
            }
        }

        let _pt = unsafe { Box::from_raw(self.ptr) };
    }
}

/// The single kernel page table, shared by every hart and mapped into every
/// process's page table at the trampoline page.
#[derive(Debug)]
pub struct Kvm(PageTable);

impl Kvm {
    fn new() -> Result<Self, VmError> {
        Ok(Self(PageTable::try_new()?))
    }

    pub fn map(&mut self, va: VA, pa: PA, size: usize, perm: usize) {
        self.0.map_pages(va, pa, size, perm).expect("kvmmap");
    }

    fn make(&mut self) -> Result<(), VmError> {
        self.map(VA(UART0), PA(UART0), PGSIZE, PTE_R | PTE_W);
        self.map(VA(VIRTIO0), PA(VIRTIO0), PGSIZE, PTE_R | PTE_W);
        self.map(VA(PLIC), PA(PLIC), 0x40_0000, PTE_R | PTE_W);

        self.map(
            VA(KERNBASE),
            PA(KERNBASE),
            (etext as *const () as usize) - KERNBASE,
            PTE_R | PTE_X,
        );

        self.map(
            VA(etext as *const () as usize),
            PA(etext as *const () as usize),
            PHYSTOP - (etext as *const () as usize),
            PTE_R | PTE_W,
        );

        self.map(
            VA(TRAMPOLINE),
            PA(trampoline as *const () as usize),
            PGSIZE,
            PTE_R | PTE_X,
        );

        self.map_stacks()?;

        Ok(())
    }

    /// Gives every process slot a kernel stack, each guarded below by an
    /// unmapped page so a stack overflow faults instead of corrupting the
    /// neighboring stack.
    fn map_stacks(&mut self) -> Result<(), VmError> {
        for id in 0..NPROC {
            let pages: Box<MaybeUninit<[Page; NKSTACK_PAGES]>> = Box::try_new_zeroed()?;
            let pages = unsafe { pages.assume_init() };
            let pa = Box::into_raw(pages) as usize;

            self.map(
                VA(kstack(id)),
                PA(pa),
                NKSTACK_PAGES * PGSIZE,
                PTE_R | PTE_W,
            );
        }
        Ok(())
    }
}

/// A process's user address space.
#[derive(Debug)]
pub struct Uvm(pub PageTable);

impl Uvm {
    /// Creates a fresh user page table with only the trampoline and
    /// trapframe pages mapped, mirroring the layout every user process
    /// expects at its top of memory.
    pub fn try_new(trapframe: &TrapFrame) -> Result<Self, VmError> {
        let mut pt = PageTable::try_new()?;

        if let Err(e) = pt.map_pages(
            VA(TRAMPOLINE),
            PA(trampoline as *const () as usize),
            PGSIZE,
            PTE_R | PTE_X,
        ) {
            pt.free_walk();
            return Err(e);
        }

        if let Err(e) = pt.map_pages(
            VA(TRAPFRAME),
            PA(trapframe as *const TrapFrame as usize),
            PGSIZE,
            PTE_R | PTE_W,
        ) {
            pt.unmap_one(VA(TRAMPOLINE));
            pt.free_walk();
            return Err(e);
        }

        Ok(Self(pt))
    }

    /// Removes `npages` worth of mappings starting at `va`, which must be
    /// page-aligned and already mapped. Optionally frees the backing pages.
    pub fn unmap(&mut self, va: VA, npages: usize, free: bool) {
        assert!(va.0.is_multiple_of(PGSIZE), "unmap: not aligned");

        for addr in (va.0..va.0 + (npages * PGSIZE)).step_by(PGSIZE) {
            match self.0.walk(VA(addr), false) {
                Err(_) => panic!("unmap: walk"),
                Ok(pte) if !pte.is_v() => panic!("unmap: not mapped"),
                Ok(pte) if !pte.is_leaf() => panic!("unmap: not a leaf"),
                Ok(pte) => {
                    if free {
                        let pa = pte.as_pa();
                        let _pg = unsafe { Box::from_raw(pa.0 as *mut Page) };
                    }
                    *pte = PageTableEntry(0);
                }
            }
        }
    }

    /// Allocates PTEs and physical memory to grow the process from
    /// `old_size` to `new_size`, which need not be page-aligned. `xperm`
    /// carries any extra permission bits (e.g. `PTE_X` for an ELF text
    /// segment, `PTE_W` for heap growth) on top of the always-present
    /// `PTE_R | PTE_U`.
    pub fn alloc(&mut self, old_size: usize, new_size: usize, xperm: usize) -> Result<usize, VmError> {
        if new_size < old_size {
            return Ok(old_size);
        }

        let aligned_old = pg_round_up(old_size);
        for addr in (aligned_old..new_size).step_by(PGSIZE) {
            let mem = match Box::<Page>::try_new_zeroed() {
                Ok(mem) => unsafe { mem.assume_init() },
                Err(err) => {
                    self.dealloc(addr, aligned_old);
                    return Err(err.into());
                }
            };
            let mem = Box::into_raw(mem);

            if let Err(err) =
                self.0
                    .map_pages(VA(addr), PA(mem as usize), PGSIZE, PTE_R | PTE_U | xperm)
            {
                let _pg = unsafe { Box::from_raw(mem) };
                self.dealloc(addr, aligned_old);
                return Err(err);
            }
        }

        Ok(new_size)
    }

    /// Deallocates user pages to bring the process size from `old_size` to
    /// `new_size`, returning the new size. `new_size` need not be smaller
    /// than `old_size`, in which case this is a no-op.
    pub fn dealloc(&mut self, old_size: usize, new_size: usize) -> usize {
        if new_size >= old_size {
            return old_size;
        }

        let aligned_old = pg_round_up(old_size);
        let aligned_new = pg_round_up(new_size);

        if aligned_new < aligned_old {
            let npages = (aligned_old - aligned_new) / PGSIZE;
            self.unmap(VA(aligned_new), npages, true);
        }

        new_size
    }

    /// Copies every mapped user page up to `size` bytes into `dst`,
    /// preserving permissions. Used to give a cloned process its own copy
    /// of the parent's address space.
    pub fn copy_to(&mut self, dst: &mut Uvm, size: usize) -> Result<(), VmError> {
        let mut copied = 0usize;

        for va in (0..pg_round_up(size)).step_by(PGSIZE) {
            let pte = self.0.walk(VA(va), false)?;
            if !pte.is_v() {
                continue;
            }
            let pa = pte.as_pa();
            let flags = pte_flags(pte.0);

            let mem = match Box::<Page>::try_new_zeroed() {
                Ok(mem) => unsafe { mem.assume_init() },
                Err(err) => {
                    dst.unmap(VA(0), copied / PGSIZE, true);
                    return Err(err.into());
                }
            };
            let mem = Box::into_raw(mem);

            unsafe {
                core::ptr::copy_nonoverlapping(pa.0 as *const u8, mem as *mut u8, PGSIZE);
            }

            if let Err(err) = dst.0.map_pages(VA(va), PA(mem as usize), PGSIZE, flags) {
                let _pg = unsafe { Box::from_raw(mem) };
                dst.unmap(VA(0), copied / PGSIZE, true);
                return Err(err);
            }

            copied += PGSIZE;
        }

        Ok(())
    }

    /// Frees user memory pages, then the page-table pages themselves.
    pub fn free(mut self, size: usize) {
        if size > 0 {
            self.unmap(VA(0), pg_round_up(size) / PGSIZE, true);
        }
        self.0.free_walk();
    }

    /// Tears down a process's page table: unmaps the trampoline and
    /// trapframe pages (neither owned by this page table) before freeing
    /// everything else.
    pub fn proc_free(mut self, size: usize) {
        self.unmap_one(VA(TRAMPOLINE));
        self.unmap_one(VA(TRAPFRAME));
        self.free(size);
    }

    fn unmap_one(&mut self, va: VA) {
        self.unmap(va, 1, false);
    }

    /// Physical address backing the user page containing `va`. Used to
    /// load raw program bytes directly into a segment that may end up
    /// read-only, bypassing the writability check `copy_out` enforces.
    pub fn walk_user_pa(&mut self, va: VA) -> Result<usize, VmError> {
        Ok(self.0.walk_addr(va)?.0)
    }

    /// Copies from the kernel into user memory at `dstva`.
    pub fn copy_out(&mut self, dstva: VA, mut src: &[u8]) -> Result<(), VmError> {
        let mut dstva = dstva.0;

        while !src.is_empty() {
            let va0 = pg_round_down(dstva);
            if va0 > MAXVA {
                return Err(VmError::InvalidAddress);
            }

            let pte = self.0.walk(VA(va0), false)?;
            if !pte.is_v() || !pte.is_u() || !pte.is_w() {
                return Err(VmError::InvalidPte);
            }

            let pa0 = pte.as_pa();
            let n = min(PGSIZE - (dstva - va0), src.len());

            unsafe {
                let dst_ptr = (pa0.0 + (dstva - va0)) as *mut u8;
                core::ptr::copy_nonoverlapping(src.as_ptr(), dst_ptr, n);
            }

            src = &src[n..];
            dstva = va0 + PGSIZE;
        }

        Ok(())
    }

    /// Copies from user memory at `srcva` into the kernel at `dst`.
    pub fn copy_in(&mut self, mut dst: &mut [u8], srcva: VA) -> Result<(), VmError> {
        let mut srcva = srcva.0;

        while !dst.is_empty() {
            let va0 = pg_round_down(srcva);
            let pa0 = self.0.walk_addr(VA(va0))?;

            let n = min(PGSIZE - (srcva - va0), dst.len());

            unsafe {
                let src_ptr = (pa0.0 + (srcva - va0)) as *const u8;
                core::ptr::copy_nonoverlapping(src_ptr, dst.as_mut_ptr(), n);
            }

            dst = &mut dst[n..];
            srcva = va0 + PGSIZE;
        }

        Ok(())
    }
}

impl Deref for Uvm {
    type Target = PageTable;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Uvm {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Returns the kernel-virtual address of the bottom of process `id`'s
/// kernel stack (the value `context.sp` is computed from at boot).
pub fn kstack_va(id: usize) -> usize {
    kstack(id)
}

/// Initializes the kernel page table. Must run once, before any hart turns
/// paging on.
pub fn init() {
    KVM.initialize(Kvm::new).expect("kvm: out of memory");
    unsafe { KVM.get_mut_unchecked() }
        .make()
        .expect("kvm: failed to build kernel mappings");
}

/// Switches this hart's page table register to the kernel page table and
/// turns on paging.
///
/// # Safety
/// Must run once per hart, after `kinit` has completed.
pub unsafe fn init_hart() {
    unsafe {
        vma::sfence();
        satp::write(satp::make(KVM.get().unwrap().0.as_pa().0));
        vma::sfence();
    }
}
