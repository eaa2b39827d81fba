//! Physical and virtual memory layout.
//!
//! qemu -machine virt is set up like this, based on qemu's hw/riscv/virt.c:
//!
//! 00001000 -- boot ROM, provided by qemu
//! 02000000 -- CLINT
//! 0C000000 -- PLIC
//! 10000000 -- uart0
//! 10001000 -- virtio disk
//! 80000000 -- boot ROM jumps here in machine mode, kernel loads the kernel here
//! unused RAM after 80000000.
//!
//! The kernel uses physical memory thus:
//! 80000000 -- entry, then kernel text and data
//! end -- start of kernel page allocation area
//! PHYSTOP -- end RAM used by the kernel

use crate::param::NKSTACK_PAGES;
use crate::riscv::{MAXVA, PGSIZE};

pub const UART0: usize = 0x1000_0000;
pub const UART0_IRQ: usize = 10;
pub const VIRTIO0: usize = 0x1000_1000;
pub const VIRTIO0_IRQ: usize = 1;
pub const PLIC: usize = 0x0c00_0000;

/// PLIC supervisor enable registers for hart n
pub const fn PLIC_SENABLE(hart: usize) -> usize {
    PLIC + 0x2080 + hart * 0x100
}

/// PLIC supervisor priority registers for hart n
pub const fn PLIC_SPRIORITY(hart: usize) -> usize {
    PLIC + 0x201000 + hart * 0x2000
}

/// PLIC supervisor claim registers for hart n
pub const fn PLIC_SCLAIM(hart: usize) -> usize {
    PLIC + 0x201004 + hart * 0x2000
}

// Core Local Interrupter (CLINT)
pub const CLINT: usize = 0x2000000;
pub const fn clint_mtimecmp(hartid: usize) -> usize {
    CLINT + 0x4000 + 8 * hartid
}
pub const CLINT_MTIME: usize = CLINT + 0xBFF8; // Cycles since boot

pub const KERNBASE: usize = 0x8000_0000;
/// 128 MiB of physical RAM, matching the machine this kernel targets.
pub const PHYSTOP: usize = KERNBASE + 128 * 1024 * 1024;

/// One beyond the highest user/kernel virtual address, so the trampoline
/// page can live there without overlapping any valid process address.
pub const TRAMPOLINE: usize = MAXVA - PGSIZE;
/// Per-process trapframe, mapped just below the (shared) trampoline page.
pub const TRAPFRAME: usize = TRAMPOLINE - PGSIZE;

/// Kernel-virtual address of the bottom of process `id`'s kernel stack.
/// Each stack is preceded by an unmapped guard page.
pub const fn kstack(id: usize) -> usize {
    TRAMPOLINE - (id + 1) * (NKSTACK_PAGES + 1) * PGSIZE
}
