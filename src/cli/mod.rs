//! cli
//!
//! Command-line interface layer for `gv`.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Open the repository and delegate to the library
//! - Format results for the terminal
//!
//! The CLI layer is thin: every command is a few library calls on a
//! [`crate::Repository`].

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use anyhow::Result;
use std::process::ExitCode;

use crate::ui::output::Verbosity;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`. Commands that
/// report a negative answer (an unclean merge, a missing merge base)
/// return a failing exit code rather than an error.
pub fn run(cli: Cli) -> Result<ExitCode> {
    let ctx = commands::Context {
        repo: cli.repo.clone(),
        verbosity: Verbosity::from_flags(cli.quiet, cli.debug),
    };
    commands::dispatch(cli.command, &ctx)
}
