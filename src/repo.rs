//! repo
//!
//! The [`Repository`] handle: one object database, one reference store,
//! the index and configuration, opened together.
//!
//! A repository is either on disk (`<work>/.grove/`, or a bare directory)
//! or entirely in memory. Both expose the same operations; only the
//! persistence of the index and of in-progress rebases differs.
//!
//! # Example
//!
//! ```
//! use grove::core::types::{HashAlgorithm, Signature, Time};
//! use grove::repo::Repository;
//!
//! let repo = Repository::in_memory(HashAlgorithm::Sha1);
//! let tree = repo.odb().write_tree(&grove::object::Tree::empty())?;
//! let sig = Signature::new("Ada", "ada@example.com", Time::new(0, 0))?;
//! let head = grove::core::types::RefName::head();
//! let first = repo.commit(Some(&head), &sig, &sig, "first\n", &tree, &[])?;
//! assert_eq!(repo.head()?.oid, first);
//! # Ok::<(), grove::Error>(())
//! ```

use std::fs;
use std::path::Path;

use parking_lot::Mutex;
use tracing::debug;

use crate::blame::{Blame, BlameOptions};
use crate::core::config::{Config, ConfigError, CoreSection, FileConfig};
use crate::core::ops::journal::write_durable;
use crate::core::paths::{RepoPaths, REPO_DIR_NAME};
use crate::core::types::{BranchName, HashAlgorithm, ObjectType, Oid, RefName, Signature};
use crate::diff::{self, Diff, DiffOptions, WorkdirSource};
use crate::error::{Error, ErrorKind, Result};
use crate::index::Index;
use crate::merge::{self, MergeAnalysis, MergeOptions, MergeOutcome};
use crate::notes::Notes;
use crate::object::{Blob, Commit, Tag, Tree};
use crate::odb::{MemoryBackend, Odb};
use crate::refs::{Head, RefStore};
use crate::revparse::{self, Lookup};
use crate::revwalk::RevWalk;
use crate::status::{self, StatusEntry, StatusList, StatusOptions};

/// Options for [`Repository::init`].
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub hash: HashAlgorithm,
    /// Branch HEAD points at before the first commit.
    pub initial_branch: String,
    /// Create the repository directly in the given directory instead of
    /// a `.grove` subdirectory.
    pub bare: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            hash: HashAlgorithm::Sha1,
            initial_branch: "main".to_string(),
            bare: false,
        }
    }
}

/// Whether a multi-step operation is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryState {
    Clean,
    Rebase,
}

#[derive(Debug)]
pub struct Repository {
    paths: Option<RepoPaths>,
    config: Config,
    odb: Odb,
    refs: RefStore,
    /// Index and rebase state of an in-memory repository.
    memory: Option<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    index: Index,
    rebase: Option<Vec<u8>>,
}

impl Repository {
    /// Create a repository at `path`.
    ///
    /// # Errors
    ///
    /// `InvalidState` when a repository already exists there.
    pub fn init(path: &Path, options: &InitOptions) -> Result<Self> {
        let root = if options.bare {
            path.to_path_buf()
        } else {
            path.join(REPO_DIR_NAME)
        };
        let paths = RepoPaths::new(root);
        if paths.head_path().exists() {
            return Err(Error::InvalidState(format!(
                "repository already exists at {}",
                paths.root().display()
            )));
        }
        let branch = BranchName::new(&options.initial_branch)?;
        paths.ensure_dirs().map_err(Error::at_path(paths.root()))?;
        let file = FileConfig {
            core: Some(CoreSection {
                hash: Some(options.hash),
                ..CoreSection::default()
            }),
            ..FileConfig::default()
        };
        Config::write_file(&paths.config_path(), &file)?;

        let root = paths.root().to_path_buf();
        let repo = Self::open_paths(paths)?;
        repo.refs
            .set_symbolic(&RefName::head(), &RefName::for_branch(&branch), "init")?;
        debug!(root = %root.display(), hash = %options.hash, "initialized repository");
        Ok(repo)
    }

    /// Open the repository containing `path`.
    ///
    /// # Errors
    ///
    /// `NotFound` when no repository is found at or above `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let paths = RepoPaths::discover(path)
            .ok_or_else(|| Error::not_found("repository", path.display()))?;
        Self::open_paths(paths)
    }

    fn open_paths(paths: RepoPaths) -> Result<Self> {
        let loaded = Config::load(Some(&paths.config_path()))?;
        for warning in &loaded.warnings {
            tracing::warn!(path = %warning.path.display(), "{}", warning.message);
        }
        let config = loaded.config;
        let algorithm = config.hash_algorithm();
        let odb = Odb::loose(paths.objects_dir(), algorithm, &config);
        let refs = RefStore::file(&paths, algorithm, config.symref_depth());
        let repo = Self {
            paths: Some(paths),
            config,
            odb,
            refs,
            memory: None,
        };
        repo.apply_identity();
        Ok(repo)
    }

    /// A repository that lives only in memory, with HEAD on `main`.
    pub fn in_memory(hash: HashAlgorithm) -> Self {
        Self::in_memory_with_config(hash, Config::default())
    }

    pub fn in_memory_with_config(hash: HashAlgorithm, config: Config) -> Self {
        let refs = RefStore::in_memory(hash);
        let odb = Odb::new(
            hash,
            Box::new(MemoryBackend::new()),
            config.cache_objects(),
        );
        let repo = Self {
            paths: None,
            config,
            odb,
            refs,
            memory: Some(Mutex::new(MemoryState::default())),
        };
        if let Ok(main) = RefName::new("refs/heads/main") {
            // A fresh in-memory store accepts the first HEAD write.
            let _ = repo.refs.set_symbolic(&RefName::head(), &main, "init");
        }
        repo.apply_identity();
        repo
    }

    fn apply_identity(&self) {
        if let (Some(name), Some(email)) = (self.config.user_name(), self.config.user_email()) {
            self.refs.set_identity(name, email);
        }
    }

    pub fn paths(&self) -> Option<&RepoPaths> {
        self.paths.as_ref()
    }

    /// Directory holding the checked-out files; `None` for bare and
    /// in-memory repositories.
    pub fn workdir(&self) -> Option<&Path> {
        let root = self.paths.as_ref()?.root();
        match root.file_name() {
            Some(name) if name == REPO_DIR_NAME => root.parent(),
            _ => None,
        }
    }

    pub fn odb(&self) -> &Odb {
        &self.odb
    }

    pub fn refs(&self) -> &RefStore {
        &self.refs
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.odb.algorithm()
    }

    /// Configured identity, for commits made on the user's behalf.
    ///
    /// # Errors
    ///
    /// `Config` when `user.name` or `user.email` is unset.
    pub fn signature(&self) -> Result<Signature> {
        match (self.config.user_name(), self.config.user_email()) {
            (Some(name), Some(email)) => Ok(Signature::now(name, email)?),
            _ => Err(Error::Config(ConfigError::InvalidValue(
                "user.name and user.email must be set".to_string(),
            ))),
        }
    }

    // Objects

    pub fn head(&self) -> Result<Head> {
        self.refs.head()
    }

    pub fn head_commit(&self) -> Result<Commit> {
        let head = self.head()?;
        self.odb.find_commit(&self.odb.peel_to_commit(&head.oid)?)
    }

    pub fn find_commit(&self, oid: &Oid) -> Result<Commit> {
        self.odb.find_commit(oid)
    }

    pub fn find_tree(&self, oid: &Oid) -> Result<Tree> {
        self.odb.find_tree(oid)
    }

    pub fn find_blob(&self, oid: &Oid) -> Result<Blob> {
        self.odb.find_blob(oid)
    }

    pub fn find_tag(&self, oid: &Oid) -> Result<Tag> {
        self.odb.find_tag(oid)
    }

    /// Write a commit and, when `update_ref` is given, move that reference
    /// to it.
    ///
    /// The move is a compare-and-swap against the first parent (or against
    /// absence for a root commit), so a concurrent update fails with
    /// `Conflict` instead of being overwritten.
    pub fn commit(
        &self,
        update_ref: Option<&RefName>,
        author: &Signature,
        committer: &Signature,
        message: &str,
        tree: &Oid,
        parents: &[Oid],
    ) -> Result<Oid> {
        self.odb.peel(tree, ObjectType::Tree)?;
        for parent in parents {
            self.odb.peel(parent, ObjectType::Commit)?;
        }
        let commit = Commit::new(
            *tree,
            parents.to_vec(),
            author.clone(),
            committer.clone(),
            crate::refs::ensure_trailing_newline(message),
        );
        let oid = self.odb.write_commit(&commit)?;
        if let Some(name) = update_ref {
            let reflog = if parents.is_empty() {
                format!("commit (initial): {}", commit.summary())
            } else {
                format!("commit: {}", commit.summary())
            };
            self.refs
                .compare_and_swap(name, parents.first().copied(), oid, &reflog)?;
        }
        debug!(%oid, parents = parents.len(), "created commit");
        Ok(oid)
    }

    // Index

    /// Current index; an empty one when none was written yet.
    pub fn index(&self) -> Result<Index> {
        match (&self.memory, &self.paths) {
            (Some(memory), _) => Ok(memory.lock().index.clone()),
            (None, Some(paths)) => Index::load(paths, self.hash_algorithm()),
            (None, None) => Ok(Index::new()),
        }
    }

    pub fn write_index(&self, index: &Index) -> Result<()> {
        match (&self.memory, &self.paths) {
            (Some(memory), _) => {
                memory.lock().index = index.clone();
                Ok(())
            }
            (None, Some(paths)) => index.save(paths, self.hash_algorithm()),
            (None, None) => Ok(()),
        }
    }

    // History

    pub fn revwalk(&self) -> RevWalk<'_> {
        RevWalk::new(&self.odb, &self.refs)
    }

    /// Resolve a revision expression such as `main~2^{tree}`.
    pub fn revparse(&self, spec: &str) -> Result<Oid> {
        revparse::resolve(&self.odb, &self.refs, spec)
    }

    pub fn lookup(&self, lookup: impl Into<Lookup>) -> Result<Oid> {
        lookup.into().resolve(&self.odb, &self.refs)
    }

    // Diff

    pub fn diff_options(&self) -> DiffOptions {
        DiffOptions::from_config(&self.config)
    }

    pub fn diff_tree_to_tree(
        &self,
        old: Option<&Oid>,
        new: Option<&Oid>,
        options: &DiffOptions,
    ) -> Result<Diff<'_>> {
        diff::tree_to_tree(&self.odb, old, new, options)
    }

    /// Staged changes relative to `tree`.
    pub fn diff_tree_to_index(&self, tree: Option<&Oid>, options: &DiffOptions) -> Result<Diff<'_>> {
        let index = self.index()?;
        diff::tree_to_index(&self.odb, tree, &index, options)
    }

    pub fn diff_index_to_workdir(
        &self,
        workdir: &dyn WorkdirSource,
        options: &DiffOptions,
    ) -> Result<Diff<'_>> {
        let index = self.index()?;
        diff::index_to_workdir(&self.odb, &index, workdir, options)
    }

    pub fn diff_tree_to_workdir(
        &self,
        tree: Option<&Oid>,
        workdir: &dyn WorkdirSource,
        options: &DiffOptions,
    ) -> Result<Diff<'_>> {
        diff::tree_to_workdir(&self.odb, tree, workdir, options)
    }

    // Merge

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions::from_config(&self.config)
    }

    pub fn merge_trees(
        &self,
        ancestor: Option<&Oid>,
        ours: &Oid,
        theirs: &Oid,
        options: &MergeOptions,
    ) -> Result<MergeOutcome> {
        merge::merge_trees(&self.odb, ancestor, ours, theirs, options)
    }

    pub fn merge_commits(&self, ours: &Oid, theirs: &Oid, options: &MergeOptions) -> Result<MergeOutcome> {
        merge::merge_commits(&self.odb, ours, theirs, options)
    }

    /// How merging `theirs` into HEAD would proceed.
    pub fn merge_analysis(&self, theirs: &Oid) -> Result<MergeAnalysis> {
        merge::merge_analysis(&self.odb, &self.refs, theirs)
    }

    pub fn cherry_pick(&self, commit: &Oid, onto: &Oid, options: &MergeOptions) -> Result<MergeOutcome> {
        merge::cherry_pick(&self.odb, commit, onto, options)
    }

    pub fn revert(&self, commit: &Oid, onto: &Oid, options: &MergeOptions) -> Result<MergeOutcome> {
        merge::revert(&self.odb, commit, onto, options)
    }

    // Status

    pub fn status_options(&self) -> StatusOptions {
        StatusOptions::from_config(&self.config)
    }

    /// HEAD's tree, `None` while HEAD is unborn.
    pub fn head_tree(&self) -> Result<Option<Oid>> {
        match self.head() {
            Ok(head) => Ok(Some(self.odb.peel_to_tree(&head.oid)?)),
            Err(e) if e.kind() == ErrorKind::Unborn => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn statuses(
        &self,
        workdir: Option<&dyn WorkdirSource>,
        options: &StatusOptions,
    ) -> Result<StatusList> {
        let head = self.head_tree()?;
        let index = self.index()?;
        status::statuses(&self.odb, head.as_ref(), &index, workdir, options)
    }

    pub fn status_file(
        &self,
        workdir: Option<&dyn WorkdirSource>,
        path: &str,
        options: &StatusOptions,
    ) -> Result<Option<StatusEntry>> {
        let head = self.head_tree()?;
        let index = self.index()?;
        status::status_file(&self.odb, head.as_ref(), &index, workdir, path, options)
    }

    // Notes and blame

    /// Notes under `notes_ref`, or under `core.notes_ref` when `None`.
    pub fn notes(&self, notes_ref: Option<&str>) -> Result<Notes<'_>> {
        let name = match notes_ref {
            Some(name) => RefName::new(name)?,
            None => RefName::new(self.config.notes_ref())?,
        };
        Ok(Notes::new(&self.odb, &self.refs, name))
    }

    pub fn blame_options(&self) -> BlameOptions {
        BlameOptions {
            algorithm: self.config.diff_algorithm(),
            ..BlameOptions::default()
        }
    }

    pub fn blame_file(&self, path: &str, options: &BlameOptions) -> Result<Blame> {
        Blame::file(&self.odb, &self.refs, path, options)
    }

    // Operation state

    pub fn state(&self) -> Result<RepositoryState> {
        Ok(if self.load_rebase_state()?.is_some() {
            RepositoryState::Rebase
        } else {
            RepositoryState::Clean
        })
    }

    pub(crate) fn load_rebase_state(&self) -> Result<Option<Vec<u8>>> {
        match (&self.memory, &self.paths) {
            (Some(memory), _) => Ok(memory.lock().rebase.clone()),
            (None, Some(paths)) => {
                let path = paths.rebase_state_path();
                match fs::read(&path) {
                    Ok(content) => Ok(Some(content)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(Error::at_path(path)(e)),
                }
            }
            (None, None) => Ok(None),
        }
    }

    /// Persist (`Some`) or clear (`None`) the rebase state.
    pub(crate) fn store_rebase_state(&self, content: Option<&[u8]>) -> Result<()> {
        match (&self.memory, &self.paths) {
            (Some(memory), _) => {
                memory.lock().rebase = content.map(<[u8]>::to_vec);
                Ok(())
            }
            (None, Some(paths)) => {
                let path = paths.rebase_state_path();
                match content {
                    Some(content) => {
                        fs::create_dir_all(paths.rebase_dir())
                            .map_err(Error::at_path(paths.rebase_dir()))?;
                        write_durable(&path, content).map_err(Error::at_path(&path))
                    }
                    None => match fs::remove_dir_all(paths.rebase_dir()) {
                        Ok(()) => Ok(()),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                        Err(e) => Err(Error::at_path(paths.rebase_dir())(e)),
                    },
                }
            }
            (None, None) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{FileMode, Time};
    use crate::error::ErrorKind;
    use crate::object::TreeUpdater;

    fn sig(time: i64) -> Signature {
        Signature::new("Ada", "ada@example.com", Time::new(time, 0)).unwrap()
    }

    #[test]
    fn init_then_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path(), &InitOptions::default()).unwrap();
        assert_eq!(
            repo.refs().head_branch().unwrap(),
            Some(RefName::new("refs/heads/main").unwrap())
        );
        assert_eq!(repo.head().unwrap_err().kind(), ErrorKind::Unborn);

        let blob = repo.odb().write_blob(b"hello").unwrap();
        let tree = TreeUpdater::new(repo.odb())
            .upsert("a.txt", FileMode::Blob, blob)
            .apply(None)
            .unwrap();
        let first = repo
            .commit(Some(&RefName::head()), &sig(1), &sig(1), "first", &tree, &[])
            .unwrap();
        drop(repo);

        let nested = dir.path().join("sub");
        fs::create_dir_all(&nested).unwrap();
        let reopened = Repository::open(&nested).unwrap();
        assert_eq!(reopened.head().unwrap().oid, first);
        assert_eq!(reopened.head_commit().unwrap().message, b"first\n");
        assert_eq!(reopened.revparse("main^{tree}").unwrap(), tree);

        let again = Repository::init(dir.path(), &InitOptions::default()).unwrap_err();
        assert_eq!(again.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn sha256_repository() {
        let dir = tempfile::tempdir().unwrap();
        let options = InitOptions {
            hash: HashAlgorithm::Sha256,
            bare: true,
            ..InitOptions::default()
        };
        Repository::init(dir.path(), &options).unwrap();
        let repo = Repository::open(dir.path()).unwrap();
        assert_eq!(repo.hash_algorithm(), HashAlgorithm::Sha256);
        assert_eq!(repo.odb().write_blob(b"x").unwrap().to_hex().len(), 64);
    }

    #[test]
    fn commit_is_compare_and_swap() {
        let repo = Repository::in_memory(HashAlgorithm::Sha1);
        let tree = repo.odb().write_tree(&Tree::empty()).unwrap();
        let head = RefName::head();
        let first = repo.commit(Some(&head), &sig(1), &sig(1), "1", &tree, &[]).unwrap();
        let second = repo
            .commit(Some(&head), &sig(2), &sig(2), "2", &tree, &[first])
            .unwrap();
        // A stale parent no longer matches the branch.
        let err = repo
            .commit(Some(&head), &sig(3), &sig(3), "3", &tree, &[first])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(repo.head().unwrap().oid, second);
    }

    #[test]
    fn index_round_trip_on_disk_and_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let disk = Repository::init(dir.path(), &InitOptions::default()).unwrap();
        let memory = Repository::in_memory(HashAlgorithm::Sha1);
        for repo in [&disk, &memory] {
            assert!(repo.index().unwrap().is_empty());
            let blob = repo.odb().write_blob(b"x\n").unwrap();
            let mut index = Index::new();
            index.add("x", FileMode::Blob, blob).unwrap();
            repo.write_index(&index).unwrap();
            assert_eq!(repo.index().unwrap(), index);
            let diff = repo.diff_tree_to_index(None, &repo.diff_options()).unwrap();
            assert_eq!(diff.len(), 1);
        }
    }
}
