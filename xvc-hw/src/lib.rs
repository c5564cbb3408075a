//! Register-level bindings for the XVC server family: the `/dev/mem` mmap helper, the JTAG
//! poke-register block, the debug-hub memory window, and the DPC DMA wiring. Everything that
//! touches real hardware or an OS mmap syscall lives here, never in `xvc-core`.

pub mod dpc;
pub mod jtag;
pub mod memory;
pub mod mmio;
pub mod physmem;

pub use dpc::{open_dma_engine, DpcBinding, RingCarveOut};
pub use jtag::JtagBinding;
pub use memory::MemoryBinding;
pub use mmio::MmapWindow;
pub use physmem::PhysMem;
