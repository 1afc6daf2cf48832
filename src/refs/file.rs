//! refs::file
//!
//! Loose reference files: `<repo>/<refname>` holding `<hex>\n` or
//! `ref: <name>\n`, and reflogs under `<repo>/logs/<refname>`.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use tracing::warn;

use super::backend::RefBackend;
use super::{RefTarget, ReflogEntry};
use crate::core::ops::journal::write_durable;
use crate::core::paths::RepoPaths;
use crate::core::types::{Oid, RefName};
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct FileRefBackend {
    paths: RepoPaths,
}

impl FileRefBackend {
    pub fn new(paths: RepoPaths) -> Self {
        Self { paths }
    }

    fn parse_value(name: &RefName, content: &str) -> Result<RefTarget> {
        let value = content.trim_end();
        if let Some(target) = value.strip_prefix("ref: ") {
            let target = RefName::new(target.trim())
                .map_err(|e| Error::corrupt(format!("reference {name}"), e.to_string()))?;
            return Ok(RefTarget::Symbolic(target));
        }
        Oid::from_hex(value)
            .map(RefTarget::Direct)
            .map_err(|e| Error::corrupt(format!("reference {name}"), e.to_string()))
    }

    fn collect_names(&self, dir: &Path, prefix: &str, out: &mut Vec<RefName>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::at_path(dir)(e)),
        };
        for entry in entries {
            let entry = entry.map_err(Error::at_path(dir))?;
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            if file_name.starts_with('.') || file_name.ends_with(".lock") {
                continue;
            }
            let full = format!("{prefix}/{file_name}");
            let file_type = entry.file_type().map_err(Error::at_path(entry.path()))?;
            if file_type.is_dir() {
                self.collect_names(&entry.path(), &full, out)?;
            } else {
                match RefName::new(full.clone()) {
                    Ok(name) => out.push(name),
                    Err(e) => warn!(path = %full, error = %e, "skipping unparseable ref file"),
                }
            }
        }
        Ok(())
    }

    /// Remove directories emptied by a deletion, stopping at `refs/`.
    fn prune_empty_parents(&self, path: &Path) {
        let stop = self.paths.refs_dir();
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == stop || !dir.starts_with(&stop) || fs::remove_dir(dir).is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

impl RefBackend for FileRefBackend {
    fn read(&self, name: &RefName) -> Result<Option<RefTarget>> {
        let path = self.paths.ref_path(name);
        match fs::read_to_string(&path) {
            Ok(content) => Self::parse_value(name, &content).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            // A directory where a ref would be means "refs/heads/a" when "a/b" exists.
            Err(_) if path.is_dir() => Ok(None),
            Err(e) => Err(Error::at_path(path)(e)),
        }
    }

    fn write(&self, name: &RefName, target: &RefTarget) -> Result<()> {
        let path = self.paths.ref_path(name);
        let content = match target {
            RefTarget::Direct(oid) => format!("{oid}\n"),
            RefTarget::Symbolic(to) => format!("ref: {to}\n"),
        };
        write_durable(&path, content.as_bytes()).map_err(Error::at_path(path))
    }

    fn remove(&self, name: &RefName) -> Result<bool> {
        let path = self.paths.ref_path(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                self.prune_empty_parents(&path);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::at_path(path)(e)),
        }
    }

    fn names(&self) -> Result<Vec<RefName>> {
        let mut out = Vec::new();
        self.collect_names(&self.paths.refs_dir(), "refs", &mut out)?;
        out.sort();
        Ok(out)
    }

    fn append_log(&self, name: &RefName, entry: &ReflogEntry) -> Result<()> {
        let path = self.paths.reflog_path(name);
        let append = || -> io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            writeln!(file, "{entry}")?;
            file.sync_data()
        };
        append().map_err(Error::at_path(&path))
    }

    fn read_log(&self, name: &RefName) -> Result<Vec<ReflogEntry>> {
        let path = self.paths.reflog_path(name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(Error::at_path(path)(e)),
        };
        let mut entries = Vec::new();
        for line in content.lines().filter(|line| !line.is_empty()) {
            match ReflogEntry::parse(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(refname = %name, error = %e, "skipping unreadable reflog line"),
            }
        }
        Ok(entries)
    }

    fn remove_log(&self, name: &RefName) -> Result<()> {
        let path = self.paths.reflog_path(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::at_path(path)(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{HashAlgorithm, Signature, Time};
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileRefBackend) {
        let temp = TempDir::new().unwrap();
        let paths = RepoPaths::new(temp.path().to_path_buf());
        paths.ensure_dirs().unwrap();
        (temp, FileRefBackend::new(paths))
    }

    #[test]
    fn values_use_git_file_format() {
        let (temp, backend) = setup();
        let main = RefName::new("refs/heads/main").unwrap();
        let oid = Oid::from_bytes(&[0xab; 20]).unwrap();

        backend.write(&main, &RefTarget::Direct(oid)).unwrap();
        backend
            .write(&RefName::head(), &RefTarget::Symbolic(main.clone()))
            .unwrap();

        assert_eq!(
            fs::read_to_string(temp.path().join("refs/heads/main")).unwrap(),
            format!("{oid}\n")
        );
        assert_eq!(
            fs::read_to_string(temp.path().join("HEAD")).unwrap(),
            "ref: refs/heads/main\n"
        );
        assert_eq!(
            backend.read(&RefName::head()).unwrap(),
            Some(RefTarget::Symbolic(main))
        );
    }

    #[test]
    fn names_are_sorted_and_nested() {
        let (_temp, backend) = setup();
        let oid = Oid::from_bytes(&[1; 20]).unwrap();
        for name in ["refs/tags/v1", "refs/heads/topic/x", "refs/heads/main"] {
            backend
                .write(&RefName::new(name).unwrap(), &RefTarget::Direct(oid))
                .unwrap();
        }
        let names: Vec<_> = backend.names().unwrap().into_iter().map(String::from).collect();
        assert_eq!(names, vec!["refs/heads/main", "refs/heads/topic/x", "refs/tags/v1"]);

        assert!(backend.remove(&RefName::new("refs/heads/topic/x").unwrap()).unwrap());
        assert_eq!(backend.names().unwrap().len(), 2);
    }

    #[test]
    fn garbage_ref_file_is_corrupt() {
        let (temp, backend) = setup();
        fs::write(temp.path().join("refs/heads/bad"), "not an id\n").unwrap();
        let err = backend.read(&RefName::new("refs/heads/bad").unwrap()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Corrupt);
    }

    #[test]
    fn reflog_skips_unreadable_lines() {
        let (temp, backend) = setup();
        let main = RefName::new("refs/heads/main").unwrap();
        let entry = ReflogEntry {
            old: Oid::zero(HashAlgorithm::Sha1),
            new: Oid::from_bytes(&[2; 20]).unwrap(),
            committer: Signature::new("A", "a@x", Time::new(1, 0)).unwrap(),
            message: "created".into(),
        };
        backend.append_log(&main, &entry).unwrap();
        let log_path = temp.path().join("logs/refs/heads/main");
        let mut content = fs::read_to_string(&log_path).unwrap();
        content.push_str("torn line without ids\n");
        fs::write(&log_path, content).unwrap();
        backend.append_log(&main, &entry).unwrap();

        assert_eq!(backend.read_log(&main).unwrap().len(), 2);
        backend.remove_log(&main).unwrap();
        assert!(backend.read_log(&main).unwrap().is_empty());
    }
}
