//! Logging verbosity, ported from `LoggingMode` in `xvcserver.h`: three mutually exclusive
//! levels rather than a filter stack, matching the teacher's prefixed `eprintln!`/`println!`
//! style (`bootloader-server`'s `"[LOG] ..."`/`"[WARN] ..."`) instead of reaching for `tracing`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    Default,
    Verbose,
    Quiet,
}

impl LogMode {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Default
        }
    }

    pub fn prints_info(self) -> bool {
        !matches!(self, Self::Quiet)
    }

    pub fn prints_verbose(self) -> bool {
        matches!(self, Self::Verbose)
    }
}

impl fmt::Display for LogMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Verbose => write!(f, "verbose"),
            Self::Quiet => write!(f, "quiet"),
        }
    }
}

/// `hsdp_receive_fast_packet`'s verbose multiplier: 10 polls instead of 1 (spec.md §4.3).
pub fn receive_polls(mode: LogMode) -> usize {
    if mode.prints_verbose() {
        xvc_core::dma::RECEIVE_MAX_POLLS_VERBOSE
    } else {
        xvc_core::dma::RECEIVE_MAX_POLLS_DEFAULT
    }
}

/// `"INFO: ..."`-style line, suppressed under `--quiet` (`xvcserver_start`'s
/// `if (log_mode != LOG_MODE_QUIET) fprintf(stdout, "INFO: ...")`).
macro_rules! info {
    ($mode:expr, $($arg:tt)*) => {
        if $mode.prints_info() {
            println!($($arg)*);
        }
    };
}

/// `"INFO: ..."`-style line gated on `--verbose` only (`LOG_MODE_VERBOSE` checks scattered
/// through `xvc_dpc.c`/`xvc_mem.c`).
macro_rules! verbose {
    ($mode:expr, $($arg:tt)*) => {
        if $mode.prints_verbose() {
            println!($($arg)*);
        }
    };
}

pub use info;
pub use verbose;
