//! Grove - a content-addressed version-control engine
//!
//! Grove stores blobs, trees, commits and annotated tags in a
//! content-addressed object database, moves named references with
//! compare-and-swap, walks revision history, computes tree and line
//! diffs, and performs three-way merges, cherry-picks, reverts and
//! rebases. The `gv` binary exposes the library as plumbing commands.
//!
//! # Architecture
//!
//! - [`core`] - Domain types, configuration, paths, locking and journaling
//! - [`odb`] - Object database: [`odb::Odb`] is the explicit context handle
//! - [`object`] - Object model, canonical encoding and tree building
//! - [`refs`] - References with CAS updates, symbolic chains and reflogs
//! - [`index`] - Staging area with conflict stages
//! - [`revwalk`], [`graph`], [`revparse`] - History traversal and lookup
//! - [`diff`] - Tree, index and working-directory diffs with patches
//! - [`merge`] - Tree and file merges, cherry-pick, revert, analysis
//! - [`rebase`] - Persisted rebase state machine
//! - [`status`], [`notes`], [`blame`] - Working-state and history queries
//! - [`repo`] - [`Repository`] facade tying the subsystems together
//! - [`cli`], [`ui`] - The `gv` binary
//!
//! # Correctness Invariants
//!
//! 1. An object's id is the hash of its canonical encoding; stored
//!    objects are never modified
//! 2. Reference updates are atomic and conditional on the expected value
//! 3. Merge conflicts are values, never errors
//! 4. Interrupted rebases resume from persisted state

pub mod blame;
pub mod cli;
pub mod core;
pub mod diff;
pub mod error;
pub mod graph;
pub mod index;
pub mod merge;
pub mod notes;
pub mod object;
pub mod odb;
pub mod rebase;
pub mod refs;
pub mod repo;
pub mod revparse;
pub mod revwalk;
pub mod status;
pub mod ui;

pub use error::{Error, ErrorKind, Result};
pub use repo::{InitOptions, Repository, RepositoryState};
