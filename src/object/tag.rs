//! object::tag

use super::commit::{parse_oid, parse_signature};
use super::header::{self, HeaderCursor};
use crate::core::types::{ObjectType, Oid, Signature};
use crate::error::{Error, Result};

/// An annotated tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub target: Oid,
    pub target_kind: ObjectType,
    pub name: String,
    /// Very old tags have no tagger line.
    pub tagger: Option<Signature>,
    /// Raw message bytes.
    pub message: Vec<u8>,
}

impl Tag {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let (headers, message) = header::parse("tag", data)?;
        let mut cursor = HeaderCursor::new("tag", &headers);

        let target = parse_oid(cursor.expect("object")?)?;
        let target_kind = cursor
            .expect("type")?
            .parse::<ObjectType>()
            .map_err(|e| Error::corrupt("tag", e.to_string()))?;
        let name = cursor.expect("tag")?.to_string();
        let tagger = cursor.take("tagger").map(parse_signature).transpose()?;

        Ok(Self {
            target,
            target_kind,
            name,
            tagger,
            message: message.to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::new();
        header::write(&mut out, "object", &self.target.to_hex());
        header::write(&mut out, "type", self.target_kind.as_str());
        header::write(&mut out, "tag", &self.name);
        if let Some(tagger) = &self.tagger {
            header::write(&mut out, "tagger", &tagger.to_string());
        }
        out.push('\n');
        let mut out = out.into_bytes();
        out.extend_from_slice(&self.message);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Time;

    #[test]
    fn tag_round_trip_with_and_without_tagger() {
        let mut tag = Tag {
            target: Oid::from_bytes(&[4; 20]).unwrap(),
            target_kind: ObjectType::Commit,
            name: "v1.0".into(),
            tagger: Some(Signature::new("T", "t@x", Time::new(5, 0)).unwrap()),
            message: "release\n".into(),
        };
        assert_eq!(Tag::parse(&tag.encode()).unwrap(), tag);
        tag.tagger = None;
        assert_eq!(Tag::parse(&tag.encode()).unwrap(), tag);
    }

    #[test]
    fn missing_type_is_corrupt() {
        let text = format!("object {}\ntag v1\n\nm", Oid::from_bytes(&[1; 20]).unwrap());
        assert!(Tag::parse(text.as_bytes()).is_err());
    }
}
