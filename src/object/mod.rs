//! object
//!
//! Typed objects and their canonical payload encodings.
//!
//! # Types
//!
//! - [`Blob`] - opaque file content
//! - [`Tree`] / [`TreeEntry`] - ordered directory listing
//! - [`Commit`] - snapshot plus history links
//! - [`Tag`] - annotated tag
//! - [`TreeBuilder`] / [`TreeUpdater`] - construct new trees
//!
//! Payload formats are bit-exact with git, so ids computed here match the
//! ids git computes for the same content.

pub mod blob;
pub mod builder;
pub mod commit;
mod header;
pub mod tag;
pub mod tree;

pub use blob::Blob;
pub use builder::{TreeBuilder, TreeUpdater};
pub use commit::Commit;
pub use tag::Tag;
pub use tree::{FlatEntry, Tree, TreeEntry};

use crate::core::types::{HashAlgorithm, ObjectType};
use crate::error::Result;

/// Any decoded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
}

impl Object {
    pub fn parse(algorithm: HashAlgorithm, kind: ObjectType, data: &[u8]) -> Result<Self> {
        Ok(match kind {
            ObjectType::Blob => Object::Blob(Blob::new(data.to_vec())),
            ObjectType::Tree => Object::Tree(Tree::parse(algorithm, data)?),
            ObjectType::Commit => Object::Commit(Commit::parse(data)?),
            ObjectType::Tag => Object::Tag(Tag::parse(data)?),
        })
    }

    pub fn kind(&self) -> ObjectType {
        match self {
            Object::Blob(_) => ObjectType::Blob,
            Object::Tree(_) => ObjectType::Tree,
            Object::Commit(_) => ObjectType::Commit,
            Object::Tag(_) => ObjectType::Tag,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Object::Blob(blob) => blob.data.clone(),
            Object::Tree(tree) => tree.encode(),
            Object::Commit(commit) => commit.encode(),
            Object::Tag(tag) => tag.encode(),
        }
    }
}
