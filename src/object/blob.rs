//! object::blob

/// Opaque file content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Blob {
    pub data: Vec<u8>,
}

/// Bytes inspected when sniffing for binary content.
const BINARY_SNIFF_LEN: usize = 8000;

impl Blob {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_binary(&self) -> bool {
        looks_binary(&self.data)
    }
}

/// A NUL byte in the first 8000 bytes marks content as binary.
pub fn looks_binary(data: &[u8]) -> bool {
    data.iter().take(BINARY_SNIFF_LEN).any(|b| *b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nul_byte_means_binary() {
        assert!(!Blob::new("plain text\n").is_binary());
        assert!(Blob::new(vec![b'a', 0, b'b']).is_binary());
        let mut late = vec![b'a'; BINARY_SNIFF_LEN];
        late.push(0);
        assert!(!looks_binary(&late));
    }
}
