//! object::tree
//!
//! Directory listings.
//!
//! # Ordering
//!
//! Entries are kept in git's canonical order: byte-wise by name, with
//! directory names compared as if they ended in `/`. The order is part of
//! the encoding, so two trees with the same entries always hash alike.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::core::types::{FileMode, HashAlgorithm, ObjectType, Oid};
use crate::error::{Error, Result};
use crate::odb::Odb;

/// One named entry of a tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreeEntry {
    pub name: String,
    pub mode: FileMode,
    pub oid: Oid,
}

impl TreeEntry {
    pub fn new(name: impl Into<String>, mode: FileMode, oid: Oid) -> Self {
        Self {
            name: name.into(),
            mode,
            oid,
        }
    }

    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }

    pub fn kind(&self) -> ObjectType {
        self.mode.object_type()
    }

    /// Canonical tree order.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        canonical_name_cmp(&self.name, self.is_tree(), &other.name, other.is_tree())
    }
}

/// Compare two entry names, treating directories as suffixed by `/`.
pub fn canonical_name_cmp(a: &str, a_is_tree: bool, b: &str, b_is_tree: bool) -> Ordering {
    let a_bytes = a.as_bytes().iter().chain(a_is_tree.then_some(&b'/'));
    let b_bytes = b.as_bytes().iter().chain(b_is_tree.then_some(&b'/'));
    a_bytes.cmp(b_bytes)
}

/// Reject names that cannot appear in a tree.
pub fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(Error::InvalidSpec(format!("invalid tree entry name '{name}'")));
    }
    Ok(())
}

/// An immutable directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// Build a tree, putting `entries` into canonical order.
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort_by(TreeEntry::canonical_cmp);
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a tree payload: repeated `"<mode> <name>\0<raw id>"`.
    pub fn parse(algorithm: HashAlgorithm, data: &[u8]) -> Result<Self> {
        let id_len = algorithm.digest_len();
        let mut entries = Vec::new();
        let mut rest = data;
        while !rest.is_empty() {
            let space = rest
                .iter()
                .position(|b| *b == b' ')
                .ok_or_else(|| Error::corrupt("tree", "entry without mode separator"))?;
            let mode = FileMode::from_octal(&rest[..space])
                .map_err(|e| Error::corrupt("tree", e.to_string()))?;
            rest = &rest[space + 1..];

            let nul = rest
                .iter()
                .position(|b| *b == 0)
                .ok_or_else(|| Error::corrupt("tree", "entry name not terminated"))?;
            let name = std::str::from_utf8(&rest[..nul])
                .map_err(|_| Error::corrupt("tree", "entry name is not UTF-8"))?;
            if name.is_empty() || name.contains('/') {
                return Err(Error::corrupt("tree", format!("bad entry name '{name}'")));
            }
            rest = &rest[nul + 1..];

            if rest.len() < id_len {
                return Err(Error::corrupt("tree", "truncated entry id"));
            }
            let oid = Oid::from_bytes(&rest[..id_len])
                .map_err(|e| Error::corrupt("tree", e.to_string()))?;
            rest = &rest[id_len..];

            entries.push(TreeEntry::new(name, mode, oid));
        }
        Ok(Self { entries })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            out.extend_from_slice(entry.mode.as_octal().as_bytes());
            out.push(b' ');
            out.extend_from_slice(entry.name.as_bytes());
            out.push(0);
            out.extend_from_slice(entry.oid.as_bytes());
        }
        out
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TreeEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Look up a slash-separated path, descending through the store.
    pub fn entry_by_path(&self, odb: &Odb, path: &str) -> Result<Option<TreeEntry>> {
        let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
        let mut current = self.clone();
        while let Some(component) = components.next() {
            let Some(entry) = current.get(component).cloned() else {
                return Ok(None);
            };
            if components.peek().is_none() {
                return Ok(Some(entry));
            }
            if !entry.is_tree() {
                return Ok(None);
            }
            current = odb.find_tree(&entry.oid)?;
        }
        Ok(None)
    }
}

impl<'a> IntoIterator for &'a Tree {
    type Item = &'a TreeEntry;
    type IntoIter = std::slice::Iter<'a, TreeEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// A non-tree entry reached by flattening a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlatEntry {
    pub mode: FileMode,
    pub oid: Oid,
}

/// Every blob, symlink and gitlink below `tree`, keyed by full path.
pub fn flatten(odb: &Odb, tree: &Oid) -> Result<BTreeMap<String, FlatEntry>> {
    let mut out = BTreeMap::new();
    flatten_into(odb, tree, "", &mut out)?;
    Ok(out)
}

fn flatten_into(
    odb: &Odb,
    tree: &Oid,
    prefix: &str,
    out: &mut BTreeMap<String, FlatEntry>,
) -> Result<()> {
    for entry in odb.find_tree(tree)?.iter() {
        let path = join_path(prefix, &entry.name);
        if entry.is_tree() {
            flatten_into(odb, &entry.oid, &path, out)?;
        } else {
            out.insert(
                path,
                FlatEntry {
                    mode: entry.mode,
                    oid: entry.oid,
                },
            );
        }
    }
    Ok(())
}

pub(crate) fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}
