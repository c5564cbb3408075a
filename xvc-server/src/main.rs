//! CLI and accept/serve loop for the XVC server family.
//!
//! The original ships three separate binaries — `xvcServer` (JTAG-only), `xvc_mem` (adds
//! memory read/write), `xvc_dpc` (adds the DMA/DPC transport) — that share nothing but the
//! protocol engine. SPEC_FULL.md keeps all three reachable from one binary via `--mem`, since
//! `xvc-core::Session` is binding-agnostic; only the handler table wiring here differs.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

use std::error::Error;
use std::io;
use std::net::TcpStream;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use xvc_core::handlers::{Binding, NullCore};
use xvc_core::url::parse_url;
use xvc_core::Session;
use xvc_hw::{open_dma_engine, DpcBinding, JtagBinding, MemoryBinding, PhysMem};
use xvc_server::log_mode::{self, LogMode};
use xvc_server::net;

/// Default hub/DMA register addresses, carried over from `mem/versal/src/xvc_mem.c`
/// (`DEFAULT_HUB_ADDR`/`DEFAULT_HUB_SIZE`) and `xvc_dpc.c`'s usage text (spec.md §6).
mod defaults {
    pub const HUB_ADDR: u64 = 0xA400_0000;
    pub const HUB_SIZE: usize = 0x20_0000;
    pub const JTAG_MAP_SIZE: usize = 0x1_0000;
    pub const DMA_ADDR: u64 = 0xA400_0000;
    pub const DMA_SIZE: usize = 0x1000;
    pub const BUF_ADDR: u64 = 0x7FF0_0000;
    pub const BUF_SIZE: usize = 0x4_0000;
}

/// Exit codes (spec.md §6), ported from the `ERROR_*` enum in `xvcserver.h`.
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
enum XvcExitCode {
    NoError = 0,
    InvalidArgument = 1,
    #[allow(dead_code)]
    LoopbackFailed = 2,
    InvalidTransport = 3,
    InvalidUrlField = 4,
    SocketCreation = 5,
    HostnameFailed = 6,
    HsdpOpenFailed = 7,
}

/// Which binding flavor serves this process — `xvc-core`'s `Session` is the same regardless,
/// only the handler table differs (spec.md §4.4/§4.5 "Bindings").
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BindingKind {
    Jtag,
    Memory,
    Dpc,
}

/// XVC family server: exposes an FPGA's JTAG scan chain, debug-hub memory window, or DPC
/// packet transport to a remote debug tool over TCP.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Which hardware binding to serve.
    #[arg(long, value_enum, default_value = "jtag")]
    mem: BindingKind,

    /// Socket listening transport and address, `[tcp:]host:port`.
    #[arg(short = 's', long)]
    server: Option<String>,

    /// Debug hub address (memory binding only).
    #[arg(long, default_value_t = defaults::HUB_ADDR)]
    addr: u64,

    /// AXI DMA IP physical address (DPC binding only).
    #[arg(long, default_value_t = defaults::DMA_ADDR)]
    dma_addr: u64,

    /// AXI DMA IP size in bytes (DPC binding only).
    #[arg(long, default_value_t = defaults::DMA_SIZE)]
    dma_size: usize,

    /// DMA-coherent buffer physical address (DPC binding only).
    #[arg(long, default_value_t = defaults::BUF_ADDR)]
    buf_addr: u64,

    /// DMA-coherent buffer size in bytes (DPC binding only).
    #[arg(long, default_value_t = defaults::BUF_SIZE)]
    buf_size: usize,

    /// Show additional messages during execution.
    #[arg(short, long)]
    verbose: bool,

    /// Disable logging all non-error messages during execution.
    #[arg(long)]
    quiet: bool,
}

impl BindingKind {
    /// `xvcServer`/`xvc_mem` default to `tcp::2542`; `xvc_dpc` defaults to `tcp::10200`
    /// (spec.md §6: "default `tcp::2542`, or `10200` in some bindings").
    fn default_url(self) -> &'static str {
        match self {
            Self::Jtag | Self::Memory => "tcp::2542",
            Self::Dpc => "tcp::10200",
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let log_mode = LogMode::from_flags(args.verbose, args.quiet);
    match run(&args, log_mode) {
        Ok(()) => ExitCode::from(XvcExitCode::NoError as u8),
        Err((code, message)) => {
            eprintln!("ERROR: {message}");
            ExitCode::from(code as u8)
        }
    }
}

fn run(args: &Args, log_mode: LogMode) -> Result<(), (XvcExitCode, Box<dyn Error>)> {
    let url_str = args.server.as_deref().unwrap_or_else(|| args.mem.default_url());
    let url = parse_url(url_str).map_err(|e| match &e {
        xvc_core::UrlError::InvalidTransport(_) => (XvcExitCode::InvalidTransport, Box::new(e) as _),
        xvc_core::UrlError::UnexpectedField(_) => (XvcExitCode::InvalidUrlField, Box::new(e) as _),
    })?;

    let listener = net::bind_listener(&url.host, &url.port)
        .map_err(|e| (XvcExitCode::SocketCreation, Box::new(e) as Box<dyn Error>))?;

    let display_host = if url.host.is_empty() {
        hostname().map_err(|e| (XvcExitCode::HostnameFailed, Box::new(e) as Box<dyn Error>))?
    } else {
        url.host.clone()
    };
    log_mode::info!(
        log_mode,
        "INFO: To connect to this xvc instance use url: tcp:{display_host}:{}",
        url.port
    );

    loop {
        let (mut stream, peer) = listener
            .accept()
            .map_err(|e| (XvcExitCode::SocketCreation, Box::new(e) as Box<dyn Error>))?;
        let _ = stream.set_nodelay(true);
        log_mode::info!(log_mode, "INFO: xvcserver accepted connection from client {peer}");

        if let Err((_, err)) = serve_one_connection(args, log_mode, &mut stream) {
            eprintln!("XVC connection terminated: {err}");
        }
    }
}

fn serve_one_connection(
    args: &Args,
    log_mode: LogMode,
    stream: &mut TcpStream,
) -> Result<(), (XvcExitCode, Box<dyn Error>)> {
    let mut core = NullCore;
    match args.mem {
        BindingKind::Jtag => {
            let mem = PhysMem::open(args.addr, defaults::JTAG_MAP_SIZE)
                .map_err(|e| (XvcExitCode::HsdpOpenFailed, Box::new(e) as Box<dyn Error>))?;
            let mut jtag = JtagBinding::new(mem);
            let binding = Binding {
                core: &mut core,
                jtag: Some(&mut jtag),
                locking: None,
                state_aware: None,
                memory: None,
                dpc: None,
                idcode: None,
            };
            let mut session = Session::new(binding);
            session.serve(stream).map_err(|e| (XvcExitCode::NoError, Box::new(e) as Box<dyn Error>))
        }
        BindingKind::Memory => {
            let hub_mem = PhysMem::open(args.addr, defaults::HUB_SIZE)
                .map_err(|e| (XvcExitCode::HsdpOpenFailed, Box::new(e) as Box<dyn Error>))?;
            let mut memory = MemoryBinding::new(
                args.addr,
                xvc_hw::MmapWindow::new(hub_mem),
                defaults::HUB_SIZE,
            );
            let binding = Binding {
                core: &mut core,
                jtag: None,
                locking: None,
                state_aware: None,
                memory: Some(&mut memory),
                dpc: None,
                idcode: Some(xvc_hw::memory::VERSAL_DEBUG_BRIDGE_IDCODE),
            };
            let mut session = Session::new(binding);
            session.serve(stream).map_err(|e| (XvcExitCode::NoError, Box::new(e) as Box<dyn Error>))
        }
        BindingKind::Dpc => {
            let engine = open_dma_engine(args.dma_addr, args.dma_size, args.buf_addr, args.buf_size)
                .map_err(|e| (XvcExitCode::HsdpOpenFailed, Box::new(e) as Box<dyn Error>))?;
            let mut dpc = DpcBinding::new(engine, log_mode::receive_polls(log_mode));
            let binding = Binding {
                core: &mut core,
                jtag: None,
                locking: None,
                state_aware: None,
                memory: None,
                dpc: Some(&mut dpc),
                idcode: None,
            };
            let mut session = Session::new(binding);
            session.serve(stream).map_err(|e| (XvcExitCode::NoError, Box::new(e) as Box<dyn Error>))
        }
    }
}

fn hostname() -> io::Result<String> {
    let mut buf = vec![0u8; 256];
    // SAFETY: `buf` is a valid, writable buffer of `buf.len()` bytes; `gethostname` null-
    // terminates within it on success.
    let result = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    buf.truncate(end);
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
