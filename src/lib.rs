//! Transport-agnostic engine shared by the XVC server family.
//!
//! This crate carries the two tightly-coupled pieces described as "the core" of an XVC
//! daemon: the buffered, length-prefixed wire-protocol decoder (`session`, `uleb128`,
//! `handlers`) and the cyclic descriptor-ring DMA engine that drives the DPC transport
//! (`ring`, `dma`, `reg`). Nothing in here opens a socket or maps `/dev/mem` — those are
//! the job of the `xvc-hw` and `server` crates, which are the only places unsafe code and
//! OS-specific syscalls belong.

pub mod dma;
pub mod error;
pub mod handlers;
pub mod reg;
pub mod ring;
pub mod session;
pub mod uleb128;
pub mod url;

pub use error::{DmaError, HandlerError, ProtocolError, UrlError};
pub use handlers::{Binding, CoreOps, DpcOps, JtagOps, LockingOps, MemoryOps, NullCore, StateAwareOps};
pub use session::Session;
pub use url::{parse_url, ServerUrl};
