//! odb::encoding
//!
//! Canonical object framing: `"<type> <size>\0<payload>"`.
//!
//! The id of an object is the digest of its framed bytes, so this
//! function pair must stay pure: the same `(type, payload)` always frames
//! to the same bytes.

use crate::core::types::{HashAlgorithm, ObjectType, Oid};
use crate::error::{Error, Result};

/// Longest header we ever need to look at (`commit 18446744073709551615\0`).
pub(crate) const MAX_HEADER_LEN: usize = 32;

/// `"<type> <size>\0"`.
pub fn header(kind: ObjectType, size: usize) -> Vec<u8> {
    format!("{} {}\0", kind.as_str(), size).into_bytes()
}

/// Digest of the framed object, without materializing the framing.
pub fn hash(algorithm: HashAlgorithm, kind: ObjectType, payload: &[u8]) -> Oid {
    algorithm.digest(&[&header(kind, payload.len()), payload])
}

/// Frame `payload` for storage.
pub fn encode(kind: ObjectType, payload: &[u8]) -> Vec<u8> {
    let mut framed = header(kind, payload.len());
    framed.extend_from_slice(payload);
    framed
}

/// Parse a header prefix, returning `(type, declared size, header length)`.
pub fn parse_header(bytes: &[u8]) -> Result<(ObjectType, usize, usize)> {
    let nul = bytes
        .iter()
        .take(MAX_HEADER_LEN)
        .position(|b| *b == 0)
        .ok_or_else(|| Error::corrupt("object header", "missing NUL terminator"))?;
    let head = &bytes[..nul];
    let space = head
        .iter()
        .position(|b| *b == b' ')
        .ok_or_else(|| Error::corrupt("object header", "missing size"))?;
    let kind = ObjectType::from_bytes(&head[..space])
        .map_err(|e| Error::corrupt("object header", e.to_string()))?;
    let size = std::str::from_utf8(&head[space + 1..])
        .ok()
        .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| Error::corrupt("object header", "size is not a decimal number"))?;
    Ok((kind, size, nul + 1))
}

/// Split framed bytes into type and payload, checking the declared size.
pub fn decode(bytes: &[u8]) -> Result<(ObjectType, &[u8])> {
    let (kind, size, header_len) = parse_header(bytes)?;
    let payload = &bytes[header_len..];
    if payload.len() != size {
        return Err(Error::corrupt(
            "object",
            format!("header declares {} bytes, found {}", size, payload.len()),
        ));
    }
    Ok((kind, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn empty_blob_has_the_well_known_id() {
        let oid = hash(HashAlgorithm::Sha1, ObjectType::Blob, b"");
        assert_eq!(oid.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn hello_blob_matches_git() {
        let oid = hash(HashAlgorithm::Sha1, ObjectType::Blob, b"hello\n");
        assert_eq!(oid.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
    }

    #[test]
    fn decode_checks_declared_size() {
        let framed = encode(ObjectType::Tree, b"abc");
        let (kind, payload) = decode(&framed).unwrap();
        assert_eq!(kind, ObjectType::Tree);
        assert_eq!(payload, b"abc");

        let err = decode(b"blob 4\0abc").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert!(decode(b"blob x\0").is_err());
        assert!(decode(b"nonsense").is_err());
        assert!(decode(b"widget 0\0").is_err());
    }
}
