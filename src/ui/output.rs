//! ui::output
//!
//! Output formatting and display.
//!
//! Results go to stdout and always print; status chatter respects
//! `--quiet`; diagnostics go to stderr.

use std::fmt::Display;
use std::io::{self, Write};

use crate::core::types::{Signature, Time};

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Quiet mode - minimal output
    Quiet,
    /// Normal mode - standard output
    Normal,
    /// Debug mode - verbose output
    Debug,
}

impl Verbosity {
    /// Create verbosity from flags.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }
}

/// Print a command result. Shown even in quiet mode.
pub fn result(message: impl Display) {
    println!("{}", message);
}

/// Write raw bytes (blob content) to stdout.
pub fn raw(data: &[u8]) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(data)?;
    stdout.flush()
}

/// Print a message (respects quiet mode).
pub fn print(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        println!("{}", message);
    }
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

/// Print a warning message (respects quiet mode).
pub fn warn(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        eprintln!("warning: {}", message);
    }
}

/// Print a hint about what to do next (respects quiet mode).
pub fn hint(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        eprintln!("hint: {}", message);
    }
}

/// `Sat Jan 6 10:00:00 2024 +0100`, in the signature's own offset.
pub fn format_time(time: Time) -> String {
    let offset = chrono::FixedOffset::east_opt(time.offset_minutes * 60);
    match (chrono::DateTime::from_timestamp(time.seconds, 0), offset) {
        (Some(utc), Some(offset)) => utc
            .with_timezone(&offset)
            .format("%a %b %-d %H:%M:%S %Y %z")
            .to_string(),
        _ => format!("{} {}", time.seconds, time.offset_string()),
    }
}

/// `Name <email>`
pub fn format_identity(sig: &Signature) -> String {
    format!("{} <{}>", sig.name, sig.email)
}
