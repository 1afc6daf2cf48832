//! revparse
//!
//! Revision expressions resolved to object ids.
//!
//! Callers that may hold an id, a hex string or an expression wrap it in
//! a [`Lookup`], which is resolved once to a canonical [`Oid`] at the
//! boundary.
//!
//! # Grammar
//!
//! ```text
//! spec    := base suffix*
//! base    := "@" | "HEAD" | <ref name> | <hex id or prefix>
//! suffix  := "^" [N] | "~" [N] | "^{" [type] "}"
//! range   := [spec] ".." [spec]        (an empty side means HEAD)
//! ```
//!
//! Short reference names are searched in git's order: `<name>`,
//! `refs/<name>`, `refs/tags/<name>`, `refs/heads/<name>`,
//! `refs/remotes/<name>`, `refs/remotes/<name>/HEAD`. A matching
//! reference wins over an id prefix.

use crate::core::types::{ObjectType, Oid, RefName};
use crate::error::{Error, Result};
use crate::odb::{Odb, MIN_PREFIX_LEN};
use crate::refs::RefStore;

/// A lookup argument in one of its accepted forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// An id that is already canonical.
    Id(Oid),
    /// A full or abbreviated hex id.
    Hex(String),
    /// A revision expression.
    Spec(String),
}

impl Lookup {
    pub fn resolve(&self, odb: &Odb, refs: &RefStore) -> Result<Oid> {
        match self {
            Lookup::Id(oid) => Ok(*oid),
            Lookup::Hex(hex) => resolve_hex(odb, hex),
            Lookup::Spec(spec) => resolve(odb, refs, spec),
        }
    }
}

impl From<Oid> for Lookup {
    fn from(oid: Oid) -> Self {
        Lookup::Id(oid)
    }
}

impl From<&str> for Lookup {
    fn from(spec: &str) -> Self {
        Lookup::Spec(spec.to_string())
    }
}

fn resolve_hex(odb: &Odb, hex: &str) -> Result<Oid> {
    if hex.len() == odb.algorithm().hex_len() {
        let oid = Oid::from_hex(hex)?;
        if !odb.exists(&oid)? {
            return Err(Error::not_found("object", oid));
        }
        return Ok(oid);
    }
    odb.resolve_prefix(hex)
}

fn is_hex(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_hexdigit())
}

fn ref_candidates(name: &str) -> [String; 6] {
    [
        name.to_string(),
        format!("refs/{name}"),
        format!("{}{name}", RefName::TAGS),
        format!("{}{name}", RefName::HEADS),
        format!("{}{name}", RefName::REMOTES),
        format!("{}{name}/HEAD", RefName::REMOTES),
    ]
}

/// Resolve a short or full reference name to the id it points at.
pub fn resolve_ref_name(refs: &RefStore, name: &str) -> Result<Option<(RefName, Oid)>> {
    for candidate in ref_candidates(name) {
        let Ok(refname) = RefName::new(candidate) else {
            continue;
        };
        if refs.find(&refname)?.is_some() {
            let oid = refs.resolve(&refname)?;
            return Ok(Some((refname, oid)));
        }
    }
    Ok(None)
}

fn resolve_base(odb: &Odb, refs: &RefStore, base: &str) -> Result<Oid> {
    if base.is_empty() || base == "@" {
        return Ok(refs.head()?.oid);
    }
    if let Some((_, oid)) = resolve_ref_name(refs, base)? {
        return Ok(oid);
    }
    if is_hex(base) && base.len() >= MIN_PREFIX_LEN {
        return resolve_hex(odb, base);
    }
    if base.contains(['\0', ' ', ':', '?', '*', '[', '\\']) {
        return Err(Error::InvalidSpec(format!("invalid revision '{base}'")));
    }
    Err(Error::not_found("revision", base))
}

/// Parse an optional decimal count after `^` or `~`.
fn take_number(rest: &str) -> Result<(Option<usize>, &str)> {
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return Ok((None, rest));
    }
    let n = rest[..digits]
        .parse()
        .map_err(|_| Error::InvalidSpec(format!("count too large in '{rest}'")))?;
    Ok((Some(n), &rest[digits..]))
}

fn nth_parent(odb: &Odb, oid: &Oid, n: usize) -> Result<Oid> {
    let commit_oid = odb.peel_to_commit(oid)?;
    if n == 0 {
        return Ok(commit_oid);
    }
    let commit = odb.find_commit(&commit_oid)?;
    commit
        .parent(n - 1)
        .copied()
        .ok_or_else(|| Error::not_found("parent", format!("{commit_oid}^{n}")))
}

fn peel_suffix(odb: &Odb, oid: &Oid, kind: &str) -> Result<Oid> {
    match kind {
        "" => {
            let mut current = *oid;
            while odb.read_header(&current)?.0 == ObjectType::Tag {
                current = odb.find_tag(&current)?.target;
            }
            Ok(current)
        }
        "object" => Ok(*oid),
        other => {
            let target: ObjectType = other
                .parse()
                .map_err(|_| Error::InvalidSpec(format!("unknown object type '{other}'")))?;
            odb.peel(oid, target)
        }
    }
}

/// Resolve a revision expression to an id.
///
/// # Errors
///
/// - `InvalidSpec` for malformed expressions or ranges
/// - `NotFound` when a name, id or parent does not exist
/// - `Ambiguous` when an id prefix matches several objects
pub fn resolve(odb: &Odb, refs: &RefStore, spec: &str) -> Result<Oid> {
    if spec.is_empty() {
        return Err(Error::InvalidSpec("empty revision".into()));
    }
    if spec.contains("..") {
        return Err(Error::InvalidSpec(format!(
            "'{spec}' is a range, not a single revision"
        )));
    }

    let split = spec.find(['^', '~']).unwrap_or(spec.len());
    let (base, mut rest) = spec.split_at(split);
    if base.is_empty() {
        return Err(Error::InvalidSpec(format!("'{spec}' has no base revision")));
    }
    let mut oid = resolve_base(odb, refs, base)?;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("^{") {
            let end = after
                .find('}')
                .ok_or_else(|| Error::InvalidSpec(format!("unterminated '^{{' in '{spec}'")))?;
            oid = peel_suffix(odb, &oid, &after[..end])?;
            rest = &after[end + 1..];
        } else if let Some(after) = rest.strip_prefix('^') {
            let (n, tail) = take_number(after)?;
            oid = nth_parent(odb, &oid, n.unwrap_or(1))?;
            rest = tail;
        } else if let Some(after) = rest.strip_prefix('~') {
            let (n, tail) = take_number(after)?;
            for _ in 0..n.unwrap_or(1) {
                oid = nth_parent(odb, &oid, 1)?;
            }
            rest = tail;
        } else {
            return Err(Error::InvalidSpec(format!(
                "unexpected '{rest}' in revision '{spec}'"
            )));
        }
    }
    Ok(oid)
}

/// Resolve `a..b` to the commits `(a, b)`.
pub fn range(odb: &Odb, refs: &RefStore, spec: &str) -> Result<(Oid, Oid)> {
    if spec.contains("...") {
        return Err(Error::InvalidSpec(format!(
            "symmetric difference '{spec}' is not supported"
        )));
    }
    let (from, to) = spec
        .split_once("..")
        .ok_or_else(|| Error::InvalidSpec(format!("'{spec}' is not a range")))?;
    let side = |text: &str| -> Result<Oid> {
        let oid = if text.is_empty() {
            refs.head()?.oid
        } else {
            resolve(odb, refs, text)?
        };
        odb.peel_to_commit(&oid)
    };
    Ok((side(from)?, side(to)?))
}
