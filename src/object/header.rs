//! object::header
//!
//! `key value` header block shared by commits and tags.
//!
//! A header block is a sequence of `key value\n` lines ended by an empty
//! line; everything after it is the message, kept byte for byte. A line
//! starting with a space continues the previous value (used by
//! multi-line headers such as `gpgsig`).

use crate::error::{Error, Result};

pub(crate) type Headers = Vec<(String, String)>;

/// Split a payload into its header lines and message.
///
/// Header lines must be UTF-8; the message is returned as raw bytes since
/// an `encoding` header may declare some other charset for it.
pub(crate) fn parse<'a>(what: &str, data: &'a [u8]) -> Result<(Headers, &'a [u8])> {
    let mut headers: Headers = Vec::new();
    let mut rest = data;
    loop {
        let (raw, next) = match rest.iter().position(|b| *b == b'\n') {
            Some(pos) => (&rest[..pos], &rest[pos + 1..]),
            // No blank line: headers run to the end and the message is empty.
            None => (rest, &rest[rest.len()..]),
        };
        rest = next;
        if raw.is_empty() {
            break;
        }
        let line = std::str::from_utf8(raw)
            .map_err(|_| Error::corrupt(what, "header line is not valid UTF-8"))?;
        if let Some(continuation) = line.strip_prefix(' ') {
            let (_, value) = headers
                .last_mut()
                .ok_or_else(|| Error::corrupt(what, "continuation line before any header"))?;
            value.push('\n');
            value.push_str(continuation);
        } else {
            let (key, value) = line
                .split_once(' ')
                .ok_or_else(|| Error::corrupt(what, format!("malformed header line '{line}'")))?;
            headers.push((key.to_string(), value.to_string()));
        }
        if rest.is_empty() {
            break;
        }
    }
    Ok((headers, rest))
}

/// Append `key value\n`, folding embedded newlines into continuation lines.
pub(crate) fn write(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push(' ');
    out.push_str(&value.replace('\n', "\n "));
    out.push('\n');
}

/// Cursor over parsed headers that enforces the required order.
pub(crate) struct HeaderCursor<'h> {
    what: &'static str,
    headers: &'h [(String, String)],
    pos: usize,
}

impl<'h> HeaderCursor<'h> {
    pub(crate) fn new(what: &'static str, headers: &'h [(String, String)]) -> Self {
        Self {
            what,
            headers,
            pos: 0,
        }
    }

    /// Consume the next header, which must be `key`.
    pub(crate) fn expect(&mut self, key: &str) -> Result<&'h str> {
        self.take(key).ok_or_else(|| {
            Error::corrupt(self.what, format!("missing or misplaced '{key}' header"))
        })
    }

    /// Consume the next header if it is `key`.
    pub(crate) fn take(&mut self, key: &str) -> Option<&'h str> {
        match self.headers.get(self.pos) {
            Some((k, v)) if k == key => {
                self.pos += 1;
                Some(v.as_str())
            }
            _ => None,
        }
    }

    pub(crate) fn remaining(&self) -> &'h [(String, String)] {
        &self.headers[self.pos..]
    }
}
