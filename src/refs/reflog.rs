//! refs::reflog
//!
//! Append-only history of a reference: `<old> <new> <signature>\t<message>`.

use std::fmt;

use crate::core::types::{Oid, Signature};
use crate::error::{Error, Result};

/// One reflog line. A zero `old` marks creation, a zero `new` deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflogEntry {
    pub old: Oid,
    pub new: Oid,
    pub committer: Signature,
    pub message: String,
}

impl ReflogEntry {
    pub fn parse(line: &str) -> Result<Self> {
        let bad = || Error::corrupt("reflog line", line.to_string());
        let (head, message) = line.split_once('\t').unwrap_or((line, ""));
        let mut parts = head.splitn(3, ' ');
        let old = parts.next().and_then(|s| Oid::from_hex(s).ok()).ok_or_else(bad)?;
        let new = parts.next().and_then(|s| Oid::from_hex(s).ok()).ok_or_else(bad)?;
        let committer = parts
            .next()
            .and_then(|s| Signature::parse(s).ok())
            .ok_or_else(bad)?;
        Ok(Self {
            old,
            new,
            committer,
            message: message.to_string(),
        })
    }
}

impl fmt::Display for ReflogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Messages are single-line in the log format.
        let message = self.message.replace('\n', " ");
        write!(f, "{} {} {}\t{}", self.old, self.new, self.committer, message)
    }
}
