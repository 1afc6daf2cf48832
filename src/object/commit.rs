//! object::commit

use std::borrow::Cow;

use super::header::{self, HeaderCursor};
use crate::core::types::{Oid, Signature, Time};
use crate::error::{Error, Result};

/// A snapshot with its history links.
///
/// Headers the engine does not interpret (`gpgsig`, `mergetag`, ...) are
/// kept in `extra_headers` so that re-encoding a parsed commit reproduces
/// its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: Oid,
    pub parents: Vec<Oid>,
    pub author: Signature,
    pub committer: Signature,
    pub encoding: Option<String>,
    pub extra_headers: Vec<(String, String)>,
    /// Raw message bytes, in the charset named by `encoding` (UTF-8 if none).
    pub message: Vec<u8>,
}

impl Commit {
    pub fn new(
        tree: Oid,
        parents: Vec<Oid>,
        author: Signature,
        committer: Signature,
        message: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            tree,
            parents,
            author,
            committer,
            encoding: None,
            extra_headers: Vec::new(),
            message: message.into(),
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let (headers, message) = header::parse("commit", data)?;
        let mut cursor = HeaderCursor::new("commit", &headers);

        let tree = parse_oid(cursor.expect("tree")?)?;
        let mut parents = Vec::new();
        while let Some(parent) = cursor.take("parent") {
            parents.push(parse_oid(parent)?);
        }
        let author = parse_signature(cursor.expect("author")?)?;
        let committer = parse_signature(cursor.expect("committer")?)?;
        let encoding = cursor.take("encoding").map(str::to_string);
        let extra_headers = cursor.remaining().to_vec();
        if extra_headers
            .iter()
            .any(|(key, _)| matches!(key.as_str(), "tree" | "parent" | "author" | "committer"))
        {
            return Err(Error::corrupt("commit", "required header out of order"));
        }

        Ok(Self {
            tree,
            parents,
            author,
            committer,
            encoding,
            extra_headers,
            message: message.to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::new();
        header::write(&mut out, "tree", &self.tree.to_hex());
        for parent in &self.parents {
            header::write(&mut out, "parent", &parent.to_hex());
        }
        header::write(&mut out, "author", &self.author.to_string());
        header::write(&mut out, "committer", &self.committer.to_string());
        if let Some(encoding) = &self.encoding {
            header::write(&mut out, "encoding", encoding);
        }
        for (key, value) in &self.extra_headers {
            header::write(&mut out, key, value);
        }
        out.push('\n');
        let mut out = out.into_bytes();
        out.extend_from_slice(&self.message);
        out
    }

    /// The message as text, with invalid UTF-8 replaced.
    pub fn message_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.message)
    }

    /// First line of the message.
    pub fn summary(&self) -> Cow<'_, str> {
        let end = self
            .message
            .iter()
            .position(|b| *b == b'\n')
            .unwrap_or(self.message.len());
        String::from_utf8_lossy(&self.message[..end])
    }

    /// Committer time, used for date ordering.
    pub fn time(&self) -> Time {
        self.committer.when
    }

    pub fn parent(&self, n: usize) -> Option<&Oid> {
        self.parents.get(n)
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}

pub(crate) fn parse_oid(text: &str) -> Result<Oid> {
    Oid::from_hex(text).map_err(|e| Error::corrupt("object header", e.to_string()))
}

pub(crate) fn parse_signature(text: &str) -> Result<Signature> {
    Signature::parse(text).map_err(|e| Error::corrupt("object header", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::HashAlgorithm;
    use crate::error::ErrorKind;

    fn sig() -> Signature {
        Signature::new("A U Thor", "author@example.com", Time::new(1_112_911_993, -420)).unwrap()
    }

    fn oid(n: u8) -> Oid {
        Oid::from_bytes(&[n; 20]).unwrap()
    }

    #[test]
    fn encodes_in_git_header_order() {
        let commit = Commit::new(oid(1), vec![oid(2), oid(3)], sig(), sig(), "subject\n\nbody\n");
        let text = String::from_utf8(commit.encode()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert!(lines[0].starts_with("tree 0101"));
        assert!(lines[1].starts_with("parent 0202"));
        assert!(lines[2].starts_with("parent 0303"));
        assert_eq!(lines[3], "author A U Thor <author@example.com> 1112911993 -0700");
        assert_eq!(lines[5], "");
        assert_eq!(commit.summary(), "subject");
        assert!(commit.is_merge());
    }

    #[test]
    fn parse_keeps_extra_headers_and_encoding() {
        let mut commit = Commit::new(oid(1), vec![], sig(), sig(), "msg\n");
        commit.encoding = Some("ISO-8859-1".into());
        commit.extra_headers = vec![("gpgsig".into(), "-----BEGIN-----\nabc\n-----END-----".into())];
        let encoded = commit.encode();
        let parsed = Commit::parse(&encoded).unwrap();
        assert_eq!(parsed, commit);
        assert_eq!(parsed.encode(), encoded);
    }

    #[test]
    fn non_utf8_message_survives_round_trip() {
        let mut commit = Commit::new(oid(1), vec![], sig(), sig(), b"caf\xe9\n".to_vec());
        commit.encoding = Some("ISO-8859-1".into());
        let encoded = commit.encode();
        let parsed = Commit::parse(&encoded).unwrap();
        assert_eq!(parsed.message, b"caf\xe9\n");
        assert_eq!(parsed.encode(), encoded);
        assert_eq!(parsed.summary(), "caf\u{fffd}");
    }

    #[test]
    fn known_commit_id() {
        // `git commit-tree` of the empty tree with fixed identity and time.
        let empty_tree = Oid::from_hex("4b825dc642cb6eb9a060e54bf8d69288fbee4904").unwrap();
        let who = Signature::new("A", "a@x", Time::new(0, 0)).unwrap();
        let commit = Commit::new(empty_tree, vec![], who.clone(), who, "m\n");
        let encoded = commit.encode();
        let expected = "tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
                        author A <a@x> 0 +0000\n\
                        committer A <a@x> 0 +0000\n\nm\n";
        assert_eq!(String::from_utf8(encoded.clone()).unwrap(), expected);
        let id = crate::odb::encoding::hash(
            HashAlgorithm::Sha1,
            crate::core::types::ObjectType::Commit,
            &encoded,
        );
        assert_eq!(id.to_hex(), "5f7841df035ac026c260f82a8e8b6fe174a4a2ce");
    }

    #[test]
    fn misordered_headers_are_corrupt() {
        let text = format!(
            "author {}\ntree {}\ncommitter {}\n\nm",
            sig(),
            oid(1),
            sig()
        );
        assert_eq!(Commit::parse(text.as_bytes()).unwrap_err().kind(), ErrorKind::Corrupt);

        let text = format!("tree {}\nauthor {}\ncommitter {}\nparent {}\n\nm", oid(1), sig(), sig(), oid(2));
        assert_eq!(Commit::parse(text.as_bytes()).unwrap_err().kind(), ErrorKind::Corrupt);
    }
}
