//! Generic byte-addressed [`RegisterWindow`] over a live [`PhysMem`] mapping. Used for every
//! window whose offsets are computed dynamically (descriptor fields, packet buffers, the
//! debug-hub memory region) rather than named as fixed fields — those get a `tock-registers`
//! `register_structs!` block instead (see `jtag.rs`).
//!
//! The volatile-read/debug_assert/SAFETY-comment shape mirrors `Gpio::set_field` in the
//! teacher's `bootloader-loader/src/gpio.rs`, generalized from bit-fields to whole 32-bit
//! words at an arbitrary byte offset.

use std::ptr::NonNull;
use std::sync::atomic::{fence, Ordering};

use xvc_core::reg::RegisterWindow;

use crate::physmem::PhysMem;

/// An MMIO window backed by a real `/dev/mem` mapping.
pub struct MmapWindow {
    mem: PhysMem,
}

impl MmapWindow {
    pub fn new(mem: PhysMem) -> Self {
        Self { mem }
    }

    #[inline]
    fn word_ptr(&self, offset: usize) -> NonNull<u32> {
        debug_assert!(
            offset + 4 <= self.mem.len(),
            "register offset {offset:#x} out of bounds for a {:#x}-byte window",
            self.mem.len()
        );
        debug_assert_eq!(offset % 4, 0, "register offset {offset:#x} must be 4-byte aligned");
        // SAFETY: the bounds and alignment of `offset` were just checked; `self.mem` stays
        // mapped for at least as long as `self` exists.
        unsafe { self.mem.as_ptr().as_ptr().add(offset).cast::<u32>() }
            .try_into()
            .expect("pointer offset from a NonNull base is never null")
    }
}

impl RegisterWindow for MmapWindow {
    fn load32(&self, offset: usize) -> u32 {
        // SAFETY: `word_ptr` validated `offset`; the device always has a defined value to read.
        unsafe { self.word_ptr(offset).as_ptr().read_volatile() }
    }

    fn store32(&mut self, offset: usize, value: u32) {
        // SAFETY: `word_ptr` validated `offset`; writing a 32-bit register never invalidates
        // the mapping.
        unsafe { self.word_ptr(offset).as_ptr().write_volatile(value) }
    }

    fn barrier(&self) {
        // No aarch64/x86 assembly intrinsic is portable across hosts this crate targets; a
        // sequentially-consistent fence is the standard-library equivalent of the teacher's
        // `__dmb(OSHST)` call and is sufficient to order the prior volatile stores ahead of
        // whatever store follows (spec.md §4.1/§9).
        fence(Ordering::SeqCst);
    }
}
