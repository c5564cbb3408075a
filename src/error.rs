//! Error kinds for the protocol engine and DMA engine.
//!
//! The teacher crate never reaches for `thiserror`; it propagates `io::Error` with `?` and
//! builds ad hoc errors with `String`/`&str` via `Into<Box<dyn Error>>`. We follow the same
//! shape here: small enums with hand-written `Display`/`Error` impls, no derive macro.

use std::fmt;
use std::io;

/// A fatal error that closes the connection (spec.md error kind `ProtocolError`/`IOError`).
#[derive(Debug)]
pub enum ProtocolError {
    /// No verb terminator (`:`) found within the first 30 bytes of an otherwise full buffer.
    UnterminatedVerb,
    /// The verb token decoded does not match any entry in the handler table, or its slot is
    /// absent (capability not negotiated).
    UnknownVerb(String),
    /// The peer closed the connection (`recv() == 0`).
    PeerClosed,
    /// A read or write against the socket failed.
    Io(io::Error),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedVerb => write!(f, "protocol error: no verb terminator found"),
            Self::UnknownVerb(verb) => write!(f, "protocol error: received {verb}"),
            Self::PeerClosed => write!(f, "connection closed by peer"),
            Self::Io(err) => write!(f, "XVC connection terminated: {err}"),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// A non-fatal, per-verb failure. Captured in `Session::pending_error` and retrieved by the
/// client via a later `error:` verb; never interrupts reply framing (spec.md §7).
#[derive(Debug, Clone)]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for HandlerError {}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_owned())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

/// Failures from the DMA descriptor-ring engine (spec.md §4.3/§7).
#[derive(Debug)]
pub enum DmaError {
    /// No ingress descriptor became available (done or errored) within 1000 polls.
    NoIngressDescriptors,
    /// The packet is larger than a single descriptor's packet buffer.
    PacketTooLarge { requested: usize, max: usize },
}

impl fmt::Display for DmaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoIngressDescriptors => {
                write!(f, "no ingress descriptor became available after 1000 polls")
            }
            Self::PacketTooLarge { requested, max } => write!(
                f,
                "packet of {requested} bytes exceeds packet buffer size {max}"
            ),
        }
    }
}

impl std::error::Error for DmaError {}

/// URL grammar errors from parsing `[transport:]host:port` (spec.md §4.6, §6 exit code 3/4).
#[derive(Debug)]
pub enum UrlError {
    /// Something other than `tcp` was named as the transport.
    InvalidTransport(String),
    /// Trailing content after `host:port`.
    UnexpectedField(String),
}

impl fmt::Display for UrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTransport(t) => write!(f, "invalid transport type: {t}"),
            Self::UnexpectedField(field) => write!(f, "unexpected url field: {field}"),
        }
    }
}

impl std::error::Error for UrlError {}
