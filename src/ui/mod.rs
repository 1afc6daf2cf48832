//! ui
//!
//! User-facing output for the `gv` binary.
//!
//! - [`output`] - Verbosity-aware printing and display formatting

pub mod output;
