//! refs
//!
//! Named, mutable pointers into the object graph.
//!
//! # Architecture
//!
//! [`RefStore`] layers the reference semantics over a [`RefBackend`]:
//! - compare-and-swap updates ([`RefStore::update`]) that fail with
//!   `Conflict` when the current value differs from the expected one,
//! - iterative symbolic resolution bounded by a depth limit,
//! - a reflog line for every change.
//!
//! Each mutation runs its read-compare-write cycle while holding the
//! transaction lock: an in-process mutex, plus an `fs2` lock on
//! `<repo>/refs.lock` for on-disk repositories so that other processes
//! are excluded as well.
//!
//! # Example
//!
//! ```
//! use grove::core::types::{HashAlgorithm, RefName};
//! use grove::refs::RefStore;
//!
//! let refs = RefStore::in_memory(HashAlgorithm::Sha1);
//! let main = RefName::new("refs/heads/main")?;
//! let first = grove::core::types::Oid::from_bytes(&[1; 20])?;
//! let second = grove::core::types::Oid::from_bytes(&[2; 20])?;
//! refs.create(&main, first, false, "branch: created")?;
//! refs.update(&main, second, first, "moved")?;
//! assert!(refs.update(&main, first, first, "stale").is_err());
//! # Ok::<(), grove::Error>(())
//! ```

pub mod backend;
pub mod file;
pub mod memory;
pub mod reflog;

use std::fmt;
use std::path::PathBuf;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

pub use backend::RefBackend;
pub use file::FileRefBackend;
pub use memory::MemoryRefBackend;
pub use reflog::ReflogEntry;

use crate::core::config::Config;
use crate::core::ops::lock::FileLock;
use crate::core::paths::RepoPaths;
use crate::core::types::{BranchName, HashAlgorithm, ObjectType, Oid, RefName, Signature};
use crate::error::{Error, Result};
use crate::object::Tag;
use crate::odb::Odb;

/// Value of a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    Direct(Oid),
    Symbolic(RefName),
}

impl fmt::Display for RefTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefTarget::Direct(oid) => write!(f, "{oid}"),
            RefTarget::Symbolic(name) => write!(f, "ref: {name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: RefName,
    pub target: RefTarget,
}

impl Reference {
    pub fn oid(&self) -> Option<Oid> {
        match &self.target {
            RefTarget::Direct(oid) => Some(*oid),
            RefTarget::Symbolic(_) => None,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self.target, RefTarget::Symbolic(_))
    }
}

/// Where HEAD points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Head {
    /// Branch HEAD is attached to; `None` when detached.
    pub branch: Option<RefName>,
    pub oid: Oid,
}

impl Head {
    pub fn is_detached(&self) -> bool {
        self.branch.is_none()
    }
}

/// Reference store with compare-and-swap updates.
#[derive(Debug)]
pub struct RefStore {
    backend: Box<dyn RefBackend>,
    lock_path: Option<PathBuf>,
    guard: Mutex<()>,
    algorithm: HashAlgorithm,
    symref_depth: usize,
    identity: RwLock<(String, String)>,
}

impl RefStore {
    pub fn new(
        backend: Box<dyn RefBackend>,
        lock_path: Option<PathBuf>,
        algorithm: HashAlgorithm,
        symref_depth: usize,
    ) -> Self {
        Self {
            backend,
            lock_path,
            guard: Mutex::new(()),
            algorithm,
            symref_depth,
            identity: RwLock::new(("grove".to_string(), "grove@localhost".to_string())),
        }
    }

    pub fn in_memory(algorithm: HashAlgorithm) -> Self {
        Self::new(
            Box::new(MemoryRefBackend::new()),
            None,
            algorithm,
            Config::DEFAULT_SYMREF_DEPTH,
        )
    }

    /// On-disk store under `paths`.
    pub fn file(paths: &RepoPaths, algorithm: HashAlgorithm, symref_depth: usize) -> Self {
        Self::new(
            Box::new(FileRefBackend::new(paths.clone())),
            Some(paths.refs_lock_path()),
            algorithm,
            symref_depth,
        )
    }

    /// Identity stamped on reflog entries.
    pub fn set_identity(&self, name: impl Into<String>, email: impl Into<String>) {
        *self.identity.write() = (name.into(), email.into());
    }

    fn log_signature(&self) -> Result<Signature> {
        let (name, email) = self.identity.read().clone();
        Ok(Signature::now(name, email)?)
    }

    /// Run `f` while holding the transaction lock.
    fn transaction<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self.guard.lock();
        let _file_lock = match &self.lock_path {
            Some(path) => Some(FileLock::acquire(path)?),
            None => None,
        };
        f()
    }

    // Reading

    /// Raw value of `name`, `None` when absent.
    pub fn find(&self, name: &RefName) -> Result<Option<Reference>> {
        Ok(self.backend.read(name)?.map(|target| Reference {
            name: name.clone(),
            target,
        }))
    }

    /// Raw value of `name`, failing with `NotFound` when absent.
    pub fn lookup(&self, name: &RefName) -> Result<Reference> {
        self.find(name)?
            .ok_or_else(|| Error::not_found("reference", name))
    }

    /// Follow symbolic links from `name` to the direct reference at the end.
    ///
    /// Returns the final name and its id, or `None` when that final
    /// reference does not exist yet (an unborn branch).
    pub fn resolve_chain(&self, name: &RefName) -> Result<(RefName, Option<Oid>)> {
        let mut current = name.clone();
        for _ in 0..=self.symref_depth {
            match self.backend.read(&current)? {
                Some(RefTarget::Direct(oid)) => return Ok((current, Some(oid))),
                Some(RefTarget::Symbolic(next)) => current = next,
                None => return Ok((current, None)),
            }
        }
        Err(Error::InvalidSpec(format!(
            "symbolic reference chain from '{name}' exceeds {} levels",
            self.symref_depth
        )))
    }

    /// Id `name` ultimately points at.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `name` does not exist
    /// - `Unborn` if `name` is symbolic and its final target does not exist
    /// - `InvalidSpec` on cycles or chains deeper than the configured limit
    pub fn resolve(&self, name: &RefName) -> Result<Oid> {
        match self.resolve_chain(name)? {
            (_, Some(oid)) => Ok(oid),
            (last, None) if last == *name => Err(Error::not_found("reference", name)),
            (last, None) => Err(Error::Unborn(last.to_string())),
        }
    }

    /// Current HEAD.
    ///
    /// # Errors
    ///
    /// `Unborn` when HEAD names a branch without commits.
    pub fn head(&self) -> Result<Head> {
        let head = RefName::head();
        let (last, oid) = self.resolve_chain(&head)?;
        let branch = (last != head).then_some(last.clone());
        match oid {
            Some(oid) => Ok(Head { branch, oid }),
            None if branch.is_some() => Err(Error::Unborn(last.to_string())),
            None => Err(Error::not_found("reference", head)),
        }
    }

    /// Branch HEAD is attached to, even when it is unborn. `None` when detached.
    pub fn head_branch(&self) -> Result<Option<RefName>> {
        match self.backend.read(&RefName::head())? {
            Some(RefTarget::Symbolic(name)) => Ok(Some(name)),
            _ => Ok(None),
        }
    }

    /// References whose names start with `prefix`, sorted, resolved lazily.
    pub fn iter(&self, prefix: &str) -> Result<RefIter<'_>> {
        let names: Vec<RefName> = self
            .backend
            .names()?
            .into_iter()
            .filter(|name| name.as_str().starts_with(prefix))
            .collect();
        Ok(RefIter {
            store: self,
            names: names.into_iter(),
        })
    }

    /// Reflog of `name`, newest entry first.
    pub fn reflog(&self, name: &RefName) -> Result<Vec<ReflogEntry>> {
        let mut entries = self.backend.read_log(name)?;
        entries.reverse();
        Ok(entries)
    }

    // Writing

    fn zero(&self) -> Oid {
        Oid::zero(self.algorithm)
    }

    fn log(&self, name: &RefName, old: Option<Oid>, new: Option<Oid>, message: &str) -> Result<()> {
        let entry = ReflogEntry {
            old: old.unwrap_or_else(|| self.zero()),
            new: new.unwrap_or_else(|| self.zero()),
            committer: self.log_signature()?,
            message: message.to_string(),
        };
        self.backend.append_log(name, &entry)
    }

    /// Write a direct value to the end of `name`'s chain and log it there
    /// and, when reached through a symbolic ref, on `name` as well.
    fn store_direct(
        &self,
        name: &RefName,
        target: &RefName,
        old: Option<Oid>,
        new: Oid,
        message: &str,
    ) -> Result<()> {
        self.backend.write(target, &RefTarget::Direct(new))?;
        self.log(target, old, Some(new), message)?;
        if target != name {
            self.log(name, old, Some(new), message)?;
        }
        debug!(refname = %target, old = ?old, %new, "updated reference");
        Ok(())
    }

    /// Compare-and-swap: set `name` to `new` only if its current id is
    /// `expected` (`None` = must not exist yet).
    ///
    /// Symbolic references are followed; the direct reference at the end
    /// of the chain is the one updated.
    ///
    /// # Errors
    ///
    /// `Conflict` (`CasFailed`) when the current value differs.
    pub fn compare_and_swap(
        &self,
        name: &RefName,
        expected: Option<Oid>,
        new: Oid,
        message: &str,
    ) -> Result<()> {
        self.transaction(|| {
            let (target, current) = self.resolve_chain(name)?;
            if current != expected {
                return Err(Error::CasFailed {
                    refname: target.to_string(),
                    expected: describe(expected),
                    actual: describe(current),
                });
            }
            self.store_direct(name, &target, current, new, message)
        })
    }

    /// Create `name`. Without `force`, fails with `Conflict` if it exists.
    pub fn create(&self, name: &RefName, oid: Oid, force: bool, message: &str) -> Result<()> {
        if force {
            self.set(name, oid, message)
        } else {
            self.compare_and_swap(name, None, oid, message)
        }
    }

    /// Move `name` from `expected` to `new`.
    pub fn update(&self, name: &RefName, new: Oid, expected: Oid, message: &str) -> Result<()> {
        self.compare_and_swap(name, Some(expected), new, message)
    }

    /// Set `name` unconditionally.
    pub fn set(&self, name: &RefName, new: Oid, message: &str) -> Result<()> {
        self.transaction(|| {
            let (target, current) = self.resolve_chain(name)?;
            self.store_direct(name, &target, current, new, message)
        })
    }

    /// Point `name` at another reference.
    pub fn set_symbolic(&self, name: &RefName, target: &RefName, message: &str) -> Result<()> {
        if name == target {
            return Err(Error::InvalidSpec(format!("'{name}' cannot point at itself")));
        }
        self.transaction(|| {
            let old = self.resolve_chain(name).ok().and_then(|(_, oid)| oid);
            self.backend
                .write(name, &RefTarget::Symbolic(target.clone()))?;
            let new = self.resolve_chain(target).ok().and_then(|(_, oid)| oid);
            if old.is_some() || new.is_some() {
                self.log(name, old, new, message)?;
            }
            debug!(refname = %name, %target, "updated symbolic reference");
            Ok(())
        })
    }

    /// Point HEAD directly at a commit.
    pub fn detach_head(&self, oid: Oid, message: &str) -> Result<()> {
        self.transaction(|| {
            let head = RefName::head();
            let old = self.resolve_chain(&head).ok().and_then(|(_, oid)| oid);
            self.backend.write(&head, &RefTarget::Direct(oid))?;
            self.log(&head, old, Some(oid), message)
        })
    }

    /// Delete `name` itself (symbolic refs are not followed). With
    /// `expected`, the current id must match.
    pub fn delete(&self, name: &RefName, expected: Option<Oid>) -> Result<()> {
        self.transaction(|| {
            let current = self
                .backend
                .read(name)?
                .ok_or_else(|| Error::not_found("reference", name))?;
            if let Some(expected) = expected {
                let actual = match &current {
                    RefTarget::Direct(oid) => Some(*oid),
                    RefTarget::Symbolic(_) => self.resolve_chain(name)?.1,
                };
                if actual != Some(expected) {
                    return Err(Error::CasFailed {
                        refname: name.to_string(),
                        expected: expected.to_string(),
                        actual: describe(actual),
                    });
                }
            }
            self.backend.remove(name)?;
            self.backend.remove_log(name)?;
            debug!(refname = %name, "deleted reference");
            Ok(())
        })
    }

    // Branches and tags

    pub fn create_branch(&self, branch: &BranchName, target: Oid, force: bool) -> Result<RefName> {
        let name = RefName::for_branch(branch);
        self.create(&name, target, force, &format!("branch: Created from {}", target))?;
        Ok(name)
    }

    /// Delete a branch. The branch HEAD is attached to cannot be deleted.
    pub fn delete_branch(&self, branch: &BranchName) -> Result<()> {
        let name = RefName::for_branch(branch);
        if self.head_branch()?.as_ref() == Some(&name) {
            return Err(Error::InvalidState(format!(
                "cannot delete branch '{branch}' checked out at HEAD"
            )));
        }
        self.delete(&name, None)
    }

    /// Local branches with their ids.
    pub fn branches(&self) -> Result<Vec<(RefName, Oid)>> {
        self.resolved(RefName::HEADS)
    }

    pub fn tags(&self) -> Result<Vec<(RefName, Oid)>> {
        self.resolved(RefName::TAGS)
    }

    fn resolved(&self, prefix: &str) -> Result<Vec<(RefName, Oid)>> {
        let mut out = Vec::new();
        for reference in self.iter(prefix)? {
            let reference = reference?;
            let oid = self.resolve(&reference.name)?;
            out.push((reference.name, oid));
        }
        Ok(out)
    }

    /// A tag that is only a reference.
    pub fn create_lightweight_tag(&self, tag: &BranchName, target: Oid, force: bool) -> Result<RefName> {
        let name = RefName::for_tag(tag);
        self.create(&name, target, force, "tag: created")?;
        Ok(name)
    }

    /// Write a tag object for `target` and point `refs/tags/<tag>` at it.
    pub fn create_annotated_tag(
        &self,
        odb: &Odb,
        tag: &BranchName,
        target: Oid,
        tagger: &Signature,
        message: &str,
        force: bool,
    ) -> Result<Oid> {
        let (target_kind, _) = odb.read_header(&target)?;
        let object = Tag {
            target,
            target_kind,
            name: tag.to_string(),
            tagger: Some(tagger.clone()),
            message: ensure_trailing_newline(message).into_bytes(),
        };
        let tag_oid = odb.write_tag(&object)?;
        self.create(&RefName::for_tag(tag), tag_oid, force, "tag: created")?;
        Ok(tag_oid)
    }

    pub fn delete_tag(&self, tag: &BranchName) -> Result<()> {
        self.delete(&RefName::for_tag(tag), None)
    }

    /// Type of object a tag reference points at (a tag object for annotated tags).
    pub fn tag_kind(&self, odb: &Odb, tag: &RefName) -> Result<ObjectType> {
        Ok(odb.read_header(&self.resolve(tag)?)?.0)
    }
}

fn describe(oid: Option<Oid>) -> String {
    oid.map_or_else(|| "(absent)".to_string(), |oid| oid.to_string())
}

pub(crate) fn ensure_trailing_newline(message: &str) -> String {
    if message.is_empty() || message.ends_with('\n') {
        message.to_string()
    } else {
        format!("{message}\n")
    }
}

/// Lazy iterator over references.
#[derive(Debug)]
pub struct RefIter<'a> {
    store: &'a RefStore,
    names: std::vec::IntoIter<RefName>,
}

impl Iterator for RefIter<'_> {
    type Item = Result<Reference>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let name = self.names.next()?;
            match self.store.find(&name) {
                Ok(Some(reference)) => return Some(Ok(reference)),
                // Deleted since the names were listed.
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
