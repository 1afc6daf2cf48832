//! core
//!
//! Core domain types, configuration, and operation bookkeeping.
//!
//! # Modules
//!
//! - [`types`] - Strong types: Oid, RefName, FileMode, Signature, etc.
//! - [`paths`] - Centralized path routing for repository storage
//! - [`config`] - Configuration schema and loading
//! - [`ops`] - Operation journaling and locking
//! - [`cancel`] - Cooperative cancellation

pub mod cancel;
pub mod config;
pub mod ops;
pub mod paths;
pub mod types;
