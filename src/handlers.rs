//! Handler table (component D).
//!
//! Modeled per the design note in spec.md §9 as a tagged union of trait objects rather than a
//! record of function pointers or a string-keyed feature list: each optional capability is its
//! own trait, and [`Binding`] holds `Option<&mut dyn Trait>` for each one. The protocol engine
//! gates a verb purely on whether that slot is `Some`, never on matching a capability name.

use crate::error::HandlerError;

/// Operations every binding provides. `flush` defaults to a no-op, which is exactly
/// "absent" from the protocol engine's perspective (spec.md §4.4: "flush — ensure all
/// deferred effects complete").
pub trait CoreOps {
    /// Initializes binding-specific state for a freshly accepted connection.
    fn open_port(&mut self) -> Result<(), HandlerError>;

    /// Releases binding resources when the connection closes.
    fn close_port(&mut self);

    /// Ensures deferred hardware effects are observable. Invoked before every batched reply.
    fn flush(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// JTAG scan-chain primitives (`settck:`/`shift:`, the legacy v1.0 verbs).
pub trait JtagOps {
    /// Programs the TCK period and reports back what was actually selected.
    fn set_tck(&mut self, period_ns: u32) -> Result<u32, HandlerError>;

    /// Clocks `bit_count` bits through the chain, filling `tdo` from `tms`/`tdi`.
    fn shift_tms_tdi(
        &mut self,
        bit_count: u32,
        tms: &[u8],
        tdi: &[u8],
        tdo: &mut [u8],
    ) -> Result<(), HandlerError>;
}

/// Mutual exclusion with external scan owners (`lock:`/`unlock:`).
pub trait LockingOps {
    fn lock(&mut self, timeout_ms: u64) -> Result<(), HandlerError>;
    fn unlock(&mut self) -> Result<(), HandlerError>;
}

/// v1.1 register-shift verbs that track JTAG state across a call (`irshift:`/`drshift:`,
/// `state:`).
pub trait StateAwareOps {
    /// `is_ir` selects IR vs. DR shift; `tdi`/`tdo` are present according to `flags` (spec.md
    /// §4.5 `irshift:`/`drshift:`).
    fn register_shift(
        &mut self,
        is_ir: bool,
        flags: u32,
        end_state: u32,
        bit_count: u64,
        tdi: Option<&[u8]>,
        tdo: Option<&mut [u8]>,
    ) -> Result<(), HandlerError>;

    /// Traverses JTAG states then issues `count` extra clocks.
    fn state(&mut self, flags: u32, end_state: u32, count: u64) -> Result<(), HandlerError>;
}

/// Reads/writes into the debug-hub memory window (`mrd:`/`mwr:`).
pub trait MemoryOps {
    fn mrd(&mut self, flags: u32, addr: u64, out: &mut [u8]) -> Result<(), HandlerError>;
    fn mwr(&mut self, flags: u32, addr: u64, data: &[u8]) -> Result<(), HandlerError>;
}

/// Sends/receives a DPC packet via the DMA engine (`idpc:`/`edpc:`).
pub trait DpcOps {
    fn idpc(&mut self, flags: u32, data: &[u8]) -> Result<(), HandlerError>;
    fn edpc(&mut self, flags: u32, word_count: u32) -> Result<Vec<u8>, HandlerError>;
}

/// The set of handlers a single server binding (JTAG, memory, or DPC) makes available. Each
/// optional field directly controls a capability advertised by `capabilities:` and whether
/// the protocol engine accepts the corresponding verb at all (spec.md §4.4, §4.5).
pub struct Binding<'a> {
    pub core: &'a mut dyn CoreOps,
    pub jtag: Option<&'a mut dyn JtagOps>,
    pub locking: Option<&'a mut dyn LockingOps>,
    pub state_aware: Option<&'a mut dyn StateAwareOps>,
    pub memory: Option<&'a mut dyn MemoryOps>,
    pub dpc: Option<&'a mut dyn DpcOps>,
    /// Advertised in `capabilities:` as `idcode=<n>` when the memory binding opts in
    /// (`xvcserver.c` advertises the Versal debug bridge's IDCODE).
    pub idcode: Option<u32>,
}

impl<'a> Binding<'a> {
    pub fn locking_supported(&self) -> bool {
        self.locking.is_some()
    }

    pub fn state_aware_supported(&self) -> bool {
        self.state_aware.is_some()
    }

    pub fn memory_supported(&self) -> bool {
        self.memory.is_some()
    }
}

/// A `CoreOps` that does nothing. Every shipped binding's `open_port`/`close_port` is already a
/// no-op (none of the JTAG, memory, or DPC bindings has per-connection setup to do), so callers
/// wiring one of them into a [`Binding`] can hand this in for `core` instead of borrowing the
/// capability object twice — `core` and e.g. `jtag` would otherwise alias the same value, which
/// the borrow checker rejects.
#[derive(Debug, Default)]
pub struct NullCore;

impl CoreOps for NullCore {
    fn open_port(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    fn close_port(&mut self) {}
}
