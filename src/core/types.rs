//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`Oid`] - Object identifier (raw SHA-1 or SHA-256 digest)
//! - [`HashAlgorithm`] - Digest used to derive object ids
//! - [`ObjectType`] - Kind of a stored object
//! - [`FileMode`] - Mode of a tree entry
//! - [`RefName`] - Validated reference name
//! - [`BranchName`] - Validated branch name
//! - [`Signature`] / [`Time`] - Author, committer and tagger identities
//! - [`UtcTimestamp`] - RFC3339 timestamp for persisted bookkeeping
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use grove::core::types::{BranchName, HashAlgorithm, Oid, RefName};
//!
//! let branch = BranchName::new("feature/my-branch").unwrap();
//! let oid = Oid::from_hex("abc123def4567890abc123def4567890abc12345").unwrap();
//! assert_eq!(oid.algorithm(), HashAlgorithm::Sha1);
//! let refname = RefName::for_branch(&branch);
//! assert_eq!(refname.as_str(), "refs/heads/feature/my-branch");
//!
//! assert!(BranchName::new("invalid..name").is_err());
//! assert!(Oid::from_hex("not-a-sha").is_err());
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    #[error("invalid file mode: {0}")]
    InvalidFileMode(String),

    #[error("invalid object type: {0}")]
    InvalidObjectType(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

/// Digest algorithm used to derive object ids.
///
/// Chosen once when a repository is created; every id in a repository
/// shares the same algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    /// Length of a raw digest in bytes.
    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
        }
    }

    /// Length of a full hex id.
    pub fn hex_len(self) -> usize {
        self.digest_len() * 2
    }

    /// Digest the concatenation of `parts`.
    pub fn digest(self, parts: &[&[u8]]) -> Oid {
        match self {
            HashAlgorithm::Sha1 => {
                let mut hasher = Sha1::new();
                for part in parts {
                    hasher.update(part);
                }
                Oid::from_raw(self, &hasher.finalize())
            }
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                for part in parts {
                    hasher.update(part);
                }
                Oid::from_raw(self, &hasher.finalize())
            }
        }
    }

    /// Name used in configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
        }
    }

    fn from_digest_len(len: usize) -> Option<Self> {
        match len {
            20 => Some(HashAlgorithm::Sha1),
            32 => Some(HashAlgorithm::Sha256),
            _ => None,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An object identifier (SHA-1 or SHA-256 digest).
///
/// Stored as raw bytes; compared and ordered byte-wise so that any
/// collection keyed by `Oid` iterates deterministically.
///
/// # Example
///
/// ```
/// use grove::core::types::Oid;
///
/// // Hex input is normalized to lowercase
/// let oid = Oid::from_hex("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(oid.to_hex(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(oid.short(7), "abc123d");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid {
    bytes: [u8; 32],
    len: u8,
}

impl Oid {
    fn from_raw(algorithm: HashAlgorithm, digest: &[u8]) -> Self {
        let mut bytes = [0u8; 32];
        let len = algorithm.digest_len();
        bytes[..len].copy_from_slice(&digest[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }

    /// Build an id from raw digest bytes (20 or 32 bytes).
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` for any other length.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, TypeError> {
        let algorithm = HashAlgorithm::from_digest_len(raw.len()).ok_or_else(|| {
            TypeError::InvalidOid(format!("expected 20 or 32 bytes, got {}", raw.len()))
        })?;
        Ok(Self::from_raw(algorithm, raw))
    }

    /// Parse a full-length hex id (40 or 64 characters).
    pub fn from_hex(hex_str: &str) -> Result<Self, TypeError> {
        if hex_str.len() != 40 && hex_str.len() != 64 {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                hex_str.len()
            )));
        }
        let raw = hex::decode(hex_str)
            .map_err(|_| TypeError::InvalidOid("object id must be hexadecimal".into()))?;
        Self::from_bytes(&raw)
    }

    /// The all-zero id, used as the "no object" marker in reflogs.
    pub fn zero(algorithm: HashAlgorithm) -> Self {
        Self {
            bytes: [0u8; 32],
            len: algorithm.digest_len() as u8,
        }
    }

    /// Check if this is the zero/null id.
    pub fn is_zero(&self) -> bool {
        self.as_bytes().iter().all(|b| *b == 0)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// The algorithm this id was produced with.
    pub fn algorithm(&self) -> HashAlgorithm {
        if self.len == 32 {
            HashAlgorithm::Sha256
        } else {
            HashAlgorithm::Sha1
        }
    }

    /// Full lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Abbreviated hex form of at most `len` characters.
    pub fn short(&self, len: usize) -> String {
        let mut full = self.to_hex();
        full.truncate(len);
        full
    }

    /// Whether the hex form of this id begins with `prefix` (case-insensitive).
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        let full = self.to_hex();
        full.len() >= prefix.len() && full[..prefix.len()].eq_ignore_ascii_case(prefix)
    }
}

impl Ord for Oid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl PartialOrd for Oid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.to_hex()
    }
}

impl FromStr for Oid {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self.to_hex())
    }
}

/// Kind of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectType {
    /// Type name as written in the canonical object header.
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Blob => "blob",
            ObjectType::Tree => "tree",
            ObjectType::Commit => "commit",
            ObjectType::Tag => "tag",
        }
    }

    /// Parse a header type name.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, TypeError> {
        match raw {
            b"blob" => Ok(ObjectType::Blob),
            b"tree" => Ok(ObjectType::Tree),
            b"commit" => Ok(ObjectType::Commit),
            b"tag" => Ok(ObjectType::Tag),
            other => Err(TypeError::InvalidObjectType(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }
}

impl FromStr for ObjectType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mode of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileMode {
    /// Regular file (`100644`).
    Blob,
    /// Executable file (`100755`).
    BlobExecutable,
    /// Symbolic link (`120000`).
    Link,
    /// Directory (`40000`).
    Tree,
    /// Submodule commit reference (`160000`).
    Commit,
}

/// Coarse classification used to detect type changes between two entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeClass {
    File,
    Link,
    Tree,
    Gitlink,
}

impl FileMode {
    /// Numeric mode.
    pub fn raw(self) -> u32 {
        match self {
            FileMode::Blob => 0o100644,
            FileMode::BlobExecutable => 0o100755,
            FileMode::Link => 0o120000,
            FileMode::Tree => 0o040000,
            FileMode::Commit => 0o160000,
        }
    }

    /// Parse a numeric mode.
    ///
    /// The historical group-writable file mode `100664` is accepted and
    /// normalized to [`FileMode::Blob`].
    pub fn from_raw(raw: u32) -> Result<Self, TypeError> {
        match raw {
            0o100644 | 0o100664 => Ok(FileMode::Blob),
            0o100755 => Ok(FileMode::BlobExecutable),
            0o120000 => Ok(FileMode::Link),
            0o040000 => Ok(FileMode::Tree),
            0o160000 => Ok(FileMode::Commit),
            other => Err(TypeError::InvalidFileMode(format!("{other:o}"))),
        }
    }

    /// Parse the octal text form used inside tree objects.
    pub fn from_octal(text: &[u8]) -> Result<Self, TypeError> {
        let text = std::str::from_utf8(text)
            .map_err(|_| TypeError::InvalidFileMode("non-ascii mode".into()))?;
        let raw = u32::from_str_radix(text, 8)
            .map_err(|_| TypeError::InvalidFileMode(text.to_string()))?;
        Self::from_raw(raw)
    }

    /// Octal text form used inside tree objects (no leading zero).
    pub fn as_octal(self) -> String {
        format!("{:o}", self.raw())
    }

    pub fn is_tree(self) -> bool {
        self == FileMode::Tree
    }

    /// Regular or executable file.
    pub fn is_blob(self) -> bool {
        matches!(self, FileMode::Blob | FileMode::BlobExecutable)
    }

    pub fn is_link(self) -> bool {
        self == FileMode::Link
    }

    pub fn is_gitlink(self) -> bool {
        self == FileMode::Commit
    }

    /// Object type an entry with this mode must point at.
    pub fn object_type(self) -> ObjectType {
        match self {
            FileMode::Tree => ObjectType::Tree,
            FileMode::Commit => ObjectType::Commit,
            _ => ObjectType::Blob,
        }
    }

    pub fn class(self) -> ModeClass {
        match self {
            FileMode::Blob | FileMode::BlobExecutable => ModeClass::File,
            FileMode::Link => ModeClass::Link,
            FileMode::Tree => ModeClass::Tree,
            FileMode::Commit => ModeClass::Gitlink,
        }
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06o}", self.raw())
    }
}

/// A validated branch name.
///
/// Branch names must conform to the refname rules (see `git check-ref-format`):
/// - Cannot be empty
/// - Cannot start with `.` or `-`
/// - Cannot end with `.lock` or `/`
/// - Cannot contain `..`, `@{`, `//`, or ASCII control characters
/// - Cannot contain spaces, `~`, `^`, `:`, `\`, `?`, `*`, `[`
/// - Cannot be exactly `@` or `HEAD`
///
/// # Example
///
/// ```
/// use grove::core::types::BranchName;
///
/// let name = BranchName::new("feature/my-branch").unwrap();
/// assert_eq!(name.as_str(), "feature/my-branch");
///
/// assert!(BranchName::new("").is_err());
/// assert!(BranchName::new(".hidden").is_err());
/// assert!(BranchName::new("branch.lock").is_err());
/// assert!(BranchName::new("has space").is_err());
/// assert!(BranchName::new("HEAD").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates the refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name == "@" || name == "HEAD" {
            return Err(TypeError::InvalidBranchName(format!(
                "branch name cannot be '{name}' (reserved)"
            )));
        }
        if name.starts_with('-') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot start with '-'".into(),
            ));
        }
        check_refname_rules(&name).map_err(TypeError::InvalidBranchName)?;
        Ok(Self(name))
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated reference name.
///
/// Either a one-level upper-case pseudo ref (`HEAD`, `ORIG_HEAD`) or a
/// name under `refs/`.
///
/// # Example
///
/// ```
/// use grove::core::types::{BranchName, RefName};
///
/// let branch = BranchName::new("feature/foo").unwrap();
/// let refname = RefName::for_branch(&branch);
/// assert_eq!(refname.as_str(), "refs/heads/feature/foo");
/// assert!(RefName::new("HEAD").is_ok());
/// assert!(RefName::new("heads/main").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName(String);

impl RefName {
    /// Prefix of local branches.
    pub const HEADS: &'static str = "refs/heads/";
    /// Prefix of tags.
    pub const TAGS: &'static str = "refs/tags/";
    /// Prefix of remote-tracking branches.
    pub const REMOTES: &'static str = "refs/remotes/";

    /// Create a new validated ref name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRefName` if the name violates the refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// `HEAD`.
    pub fn head() -> Self {
        Self("HEAD".to_string())
    }

    /// Create a ref name for a branch (`refs/heads/<branch>`).
    pub fn for_branch(branch: &BranchName) -> Self {
        Self(format!("{}{}", Self::HEADS, branch.as_str()))
    }

    /// Create a ref name for a tag (`refs/tags/<tag>`).
    pub fn for_tag(tag: &BranchName) -> Self {
        Self(format!("{}{}", Self::TAGS, tag.as_str()))
    }

    /// Strip a prefix from the ref name and return the remainder.
    ///
    /// # Example
    ///
    /// ```
    /// use grove::core::types::RefName;
    ///
    /// let refname = RefName::new("refs/heads/feature/foo").unwrap();
    /// assert_eq!(refname.strip_prefix("refs/heads/"), Some("feature/foo"));
    /// assert_eq!(refname.strip_prefix("refs/tags/"), None);
    /// ```
    pub fn strip_prefix(&self, prefix: &str) -> Option<&str> {
        self.0.strip_prefix(prefix)
    }

    /// Check if this ref is a branch ref.
    pub fn is_branch_ref(&self) -> bool {
        self.0.starts_with(Self::HEADS)
    }

    /// Check if this ref is a tag ref.
    pub fn is_tag_ref(&self) -> bool {
        self.0.starts_with(Self::TAGS)
    }

    /// Check if this ref is a remote-tracking ref.
    pub fn is_remote_ref(&self) -> bool {
        self.0.starts_with(Self::REMOTES)
    }

    /// Shortest unambiguous display form (`refs/heads/main` → `main`).
    pub fn shorthand(&self) -> &str {
        self.strip_prefix(Self::HEADS)
            .or_else(|| self.strip_prefix(Self::TAGS))
            .or_else(|| self.strip_prefix(Self::REMOTES))
            .unwrap_or(&self.0)
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if !name.contains('/') {
            let pseudo = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c == '_')
                && !name.starts_with('_')
                && !name.ends_with('_');
            if pseudo {
                return Ok(());
            }
            return Err(TypeError::InvalidRefName(format!(
                "'{name}' is neither a pseudo ref nor under refs/"
            )));
        }
        if !name.starts_with("refs/") {
            return Err(TypeError::InvalidRefName(format!(
                "'{name}' must live under refs/"
            )));
        }
        check_refname_rules(name).map_err(TypeError::InvalidRefName)
    }

    /// Get the ref name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RefName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RefName> for String {
    fn from(name: RefName) -> Self {
        name.0
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared refname rules for branch and ref names.
fn check_refname_rules(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name cannot be empty".into());
    }
    if name.starts_with('/') {
        return Err("name cannot start with '/'".into());
    }
    if name.ends_with('/') {
        return Err("name cannot end with '/'".into());
    }
    if name.ends_with('.') {
        return Err("name cannot end with '.'".into());
    }
    if name.contains("..") {
        return Err("name cannot contain '..'".into());
    }
    if name.contains("@{") {
        return Err("name cannot contain '@{'".into());
    }
    if name.contains("//") {
        return Err("name cannot contain '//'".into());
    }

    const INVALID_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];
    for c in INVALID_CHARS {
        if name.contains(c) {
            return Err(format!("name cannot contain '{c}'"));
        }
    }
    if name.chars().any(|c| c.is_ascii_control()) {
        return Err("name cannot contain control characters".into());
    }

    for component in name.split('/') {
        if component.starts_with('.') {
            return Err("path component cannot start with '.'".into());
        }
        if component.ends_with(".lock") {
            return Err("path component cannot end with '.lock'".into());
        }
    }
    Ok(())
}

/// A point in time with the author's timezone offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Time {
    /// Seconds since the Unix epoch.
    pub seconds: i64,
    /// Offset from UTC in minutes.
    pub offset_minutes: i32,
}

impl Time {
    pub fn new(seconds: i64, offset_minutes: i32) -> Self {
        Self {
            seconds,
            offset_minutes,
        }
    }

    /// Current wall-clock time in the local timezone.
    pub fn now() -> Self {
        let now = chrono::Local::now();
        Self {
            seconds: now.timestamp(),
            offset_minutes: now.offset().local_minus_utc() / 60,
        }
    }

    /// `+hhmm` / `-hhmm` form used in object headers.
    pub fn offset_string(&self) -> String {
        let sign = if self.offset_minutes < 0 { '-' } else { '+' };
        let abs = self.offset_minutes.abs();
        format!("{}{:02}{:02}", sign, abs / 60, abs % 60)
    }

    fn parse_offset(text: &str) -> Option<i32> {
        let (sign, digits) = match text.as_bytes().first()? {
            b'+' => (1, &text[1..]),
            b'-' => (-1, &text[1..]),
            _ => return None,
        };
        if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let hours: i32 = digits[..2].parse().ok()?;
        let minutes: i32 = digits[2..].parse().ok()?;
        Some(sign * (hours * 60 + minutes))
    }
}

/// An identity with a timestamp, as recorded on commits, tags and reflogs.
///
/// Encoded as `Name <email> <seconds> <+hhmm>`.
///
/// # Example
///
/// ```
/// use grove::core::types::{Signature, Time};
///
/// let sig = Signature::new("Ada", "ada@example.com", Time::new(1_700_000_000, 60)).unwrap();
/// assert_eq!(sig.to_string(), "Ada <ada@example.com> 1700000000 +0100");
/// assert_eq!(Signature::parse(&sig.to_string()).unwrap(), sig);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub when: Time,
}

impl Signature {
    /// Create a signature, rejecting names or emails that would break the encoding.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        when: Time,
    ) -> Result<Self, TypeError> {
        let name = name.into();
        let email = email.into();
        for (field, value) in [("name", &name), ("email", &email)] {
            if value.contains(['<', '>', '\n']) {
                return Err(TypeError::InvalidSignature(format!(
                    "{field} cannot contain '<', '>' or newlines"
                )));
            }
        }
        Ok(Self {
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            when,
        })
    }

    /// Signature stamped with the current local time.
    pub fn now(name: impl Into<String>, email: impl Into<String>) -> Result<Self, TypeError> {
        Self::new(name, email, Time::now())
    }

    /// Parse the encoded form.
    pub fn parse(text: &str) -> Result<Self, TypeError> {
        let invalid = || TypeError::InvalidSignature(text.to_string());
        let open = text.find('<').ok_or_else(invalid)?;
        let close = text[open..].find('>').ok_or_else(invalid)? + open;
        let name = text[..open].trim_end();
        let email = &text[open + 1..close];
        let mut rest = text[close + 1..].split_whitespace();
        let seconds = rest
            .next()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(invalid)?;
        let offset = rest.next().and_then(Time::parse_offset).ok_or_else(invalid)?;
        if rest.next().is_some() {
            return Err(invalid());
        }
        Ok(Self {
            name: name.to_string(),
            email: email.to_string(),
            when: Time::new(seconds, offset),
        })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.when.seconds,
            self.when.offset_string()
        )
    }
}

/// A UTC timestamp in RFC3339 format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtcTimestamp(chrono::DateTime<chrono::Utc>);

impl UtcTimestamp {
    /// Create a timestamp for the current moment.
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    /// Get the underlying datetime.
    pub fn as_datetime(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.0
    }
}

impl fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
