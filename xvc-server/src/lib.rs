//! Library half of the `xvc-server` binary, split out so integration tests can drive the
//! accept/serve loop's pieces (socket setup, logging) without subprocessing the CLI.

pub mod log_mode;
pub mod net;
