//! diff::workdir
//!
//! Collaborators supplied by the host: the working-tree enumerator and
//! the per-path classifier (binary / ignored).

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use crate::core::paths::REPO_DIR_NAME;
use crate::core::types::FileMode;
use crate::error::{Error, Result};
use crate::object::blob::looks_binary;

/// A file as seen in the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkdirFile {
    pub path: String,
    pub mode: FileMode,
    /// `None` when the file exists but could not be read.
    pub content: Option<Arc<[u8]>>,
}

/// Enumerates working-tree files in lexicographic path order.
pub trait WorkdirSource: fmt::Debug {
    fn files(&self) -> Result<Vec<WorkdirFile>>;
}

/// Per-path decisions normally made by attribute and ignore rules.
pub trait PathClassifier: fmt::Debug + Send + Sync {
    fn is_binary(&self, _path: &str, content: &[u8]) -> bool {
        looks_binary(content)
    }

    fn is_ignored(&self, _path: &str) -> bool {
        false
    }
}

/// NUL-byte sniffing, nothing ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl PathClassifier for DefaultClassifier {}

/// Ignores paths that start with any of the given prefixes.
#[derive(Debug, Clone, Default)]
pub struct PrefixIgnore {
    prefixes: Vec<String>,
}

impl PrefixIgnore {
    pub fn new(prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }
}

impl PathClassifier for PrefixIgnore {
    fn is_ignored(&self, path: &str) -> bool {
        self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}

/// Working tree held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkdir {
    files: BTreeMap<String, (FileMode, Option<Arc<[u8]>>)>,
}

impl MemoryWorkdir {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, mode: FileMode, content: impl AsRef<[u8]>) -> Result<()> {
        let path = path.into();
        if mode.is_tree() {
            return Err(Error::InvalidSpec(format!(
                "working tree entries are files: '{path}'"
            )));
        }
        self.files
            .insert(path, (mode, Some(Arc::from(content.as_ref()))));
        Ok(())
    }

    /// Add a file whose content cannot be read.
    pub fn insert_unreadable(&mut self, path: impl Into<String>, mode: FileMode) {
        self.files.insert(path.into(), (mode, None));
    }

    pub fn remove(&mut self, path: &str) -> bool {
        self.files.remove(path).is_some()
    }
}

impl WorkdirSource for MemoryWorkdir {
    fn files(&self) -> Result<Vec<WorkdirFile>> {
        Ok(self
            .files
            .iter()
            .map(|(path, (mode, content))| WorkdirFile {
                path: path.clone(),
                mode: *mode,
                content: content.clone(),
            })
            .collect())
    }
}

/// Working tree on disk below `root`, skipping the repository directory.
///
/// Symlinks are reported with their target as content; on Unix the owner
/// execute bit selects [`FileMode::BlobExecutable`].
#[derive(Debug, Clone)]
pub struct FsWorkdir {
    root: PathBuf,
}

impl FsWorkdir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn walk(&self, dir: &Path, prefix: &str, out: &mut Vec<WorkdirFile>) -> Result<()> {
        let entries = fs::read_dir(dir).map_err(|source| Error::Path {
            path: dir.to_path_buf(),
            source,
        })?;
        for entry in entries {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %entry.path().display(), "skipping non-UTF-8 file name");
                continue;
            };
            if name == REPO_DIR_NAME {
                continue;
            }
            let path = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                self.walk(&entry.path(), &path, out)?;
            } else if file_type.is_symlink() {
                let content = fs::read_link(entry.path())
                    .ok()
                    .map(|target| Arc::from(target.to_string_lossy().as_bytes()));
                out.push(WorkdirFile {
                    path,
                    mode: FileMode::Link,
                    content,
                });
            } else if file_type.is_file() {
                out.push(WorkdirFile {
                    path,
                    mode: file_mode(&entry.metadata()?),
                    content: fs::read(entry.path()).ok().map(Arc::from),
                });
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> FileMode {
    use std::os::unix::fs::PermissionsExt;
    if metadata.permissions().mode() & 0o100 != 0 {
        FileMode::BlobExecutable
    } else {
        FileMode::Blob
    }
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata) -> FileMode {
    FileMode::Blob
}

impl WorkdirSource for FsWorkdir {
    fn files(&self) -> Result<Vec<WorkdirFile>> {
        let mut out = Vec::new();
        self.walk(&self.root, "", &mut out)?;
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }
}
