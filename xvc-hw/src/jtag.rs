//! JTAG poke-register binding (component G, JTAG flavor). Grounded on `handle_data` in
//! `XAPP1251/src/xvcServer.c`: five 32-bit registers (length, TMS, TDI, TDO, control), with
//! bit 0 of control meaning "shift in progress" and clearing when hardware is done.
//!
//! The register block itself is modeled with `tock-registers`' `register_structs!`, the same
//! macro the teacher's `bootloader-loader/src/{dma,mailbox}.rs` use for fixed hardware layouts
//! — unlike the DMA/ring windows (whose offsets are computed per-descriptor at runtime and so
//! stay behind the dynamic [`xvc_core::reg::RegisterWindow`] trait), this block never changes
//! shape, so a typed struct is the better fit.

use std::ptr::NonNull;

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::ReadWrite;
use tock_registers::register_structs;

use xvc_core::error::HandlerError;
use xvc_core::handlers::{CoreOps, JtagOps};

use crate::physmem::PhysMem;

register_structs! {
    pub JtagRegisters {
        (0x00 => length: ReadWrite<u32>),
        (0x04 => tms: ReadWrite<u32>),
        (0x08 => tdi: ReadWrite<u32>),
        (0x0C => tdo: ReadWrite<u32>),
        (0x10 => control: ReadWrite<u32>),
        (0x14 => @END),
    }
}

/// Control register bit 0: set by software to start a shift, cleared by hardware when done.
const CTRL_BUSY: u32 = 0x1;
/// Bounded busy-wait iterations for one 32-bit (or shorter final) shift chunk (spec.md §5).
const SHIFT_MAX_POLLS: usize = 100;

/// The JTAG binding: owns the mmap'd register block and the currently-selected TCK period
/// (echoed back by `set_tck`, per spec.md §4.4: "usually echoed").
pub struct JtagBinding {
    _mem: PhysMem,
    regs: NonNull<JtagRegisters>,
    tck_period_ns: u32,
}

// SAFETY: the server serializes all access behind one connection at a time (spec.md §5); no
// two threads ever call into a `JtagBinding` concurrently.
unsafe impl Send for JtagBinding {}

impl JtagBinding {
    pub fn new(mem: PhysMem) -> Self {
        // SAFETY: `mem` maps at least `size_of::<JtagRegisters>()` bytes (callers pass the
        // documented `MAP_SIZE`), and the mapping outlives `regs` since it's stored alongside it.
        let regs = mem.as_ptr().cast::<JtagRegisters>();
        Self {
            _mem: mem,
            regs,
            tck_period_ns: 0,
        }
    }

    fn regs(&self) -> &JtagRegisters {
        // SAFETY: `regs` was derived from a live mapping in `new` and never reassigned.
        unsafe { self.regs.as_ref() }
    }
}

impl CoreOps for JtagBinding {
    fn open_port(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    fn close_port(&mut self) {}
}

impl JtagOps for JtagBinding {
    fn set_tck(&mut self, period_ns: u32) -> Result<u32, HandlerError> {
        self.tck_period_ns = period_ns;
        Ok(period_ns)
    }

    /// Clocks `bit_count` bits through the chain in 32-bit (or shorter final) chunks, per
    /// `handle_data`'s inner loop: each chunk writes `length`/`tms`/`tdi`, sets control bit 0,
    /// busy-waits for hardware to clear it, then reads `tdo`.
    fn shift_tms_tdi(
        &mut self,
        bit_count: u32,
        tms: &[u8],
        tdi: &[u8],
        tdo: &mut [u8],
    ) -> Result<(), HandlerError> {
        let total_bytes = tdo.len();
        let mut bits_left = bit_count;
        let mut byte_index = 0usize;

        while byte_index < total_bytes {
            let chunk_bytes = (total_bytes - byte_index).min(4);
            let chunk_bits = bits_left.min(32);

            let mut tms_word = [0u8; 4];
            let mut tdi_word = [0u8; 4];
            tms_word[..chunk_bytes].copy_from_slice(&tms[byte_index..byte_index + chunk_bytes]);
            tdi_word[..chunk_bytes].copy_from_slice(&tdi[byte_index..byte_index + chunk_bytes]);

            let regs = self.regs();
            regs.length.set(chunk_bits);
            regs.tms.set(u32::from_le_bytes(tms_word));
            regs.tdi.set(u32::from_le_bytes(tdi_word));
            regs.control.set(CTRL_BUSY);

            let mut settled = false;
            for _ in 0..SHIFT_MAX_POLLS {
                if regs.control.get() & CTRL_BUSY == 0 {
                    settled = true;
                    break;
                }
                core::hint::spin_loop();
            }
            if !settled {
                return Err(HandlerError::new(
                    "timed out waiting for JTAG shift to complete",
                ));
            }

            let tdo_word = regs.tdo.get().to_le_bytes();
            tdo[byte_index..byte_index + chunk_bytes].copy_from_slice(&tdo_word[..chunk_bytes]);

            byte_index += chunk_bytes;
            bits_left = bits_left.saturating_sub(32);
        }

        Ok(())
    }
}
