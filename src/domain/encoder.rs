//! Chunk encoding for the characteristic write path.

use crate::domain::profile::Encoding;

/// Value handed to the host write primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireValue {
    Bytes(Vec<u8>),
    Text(String),
}

impl WireValue {
    /// Bytes that go over the air.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            WireValue::Bytes(bytes) => bytes,
            WireValue::Text(text) => text.as_bytes(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// Encode a chunk for the given mode. Total and side-effect free.
pub fn encode(bytes: &[u8], mode: Encoding) -> WireValue {
    match mode {
        Encoding::Raw => WireValue::Bytes(bytes.to_vec()),
        Encoding::HexText => WireValue::Text(hex::encode(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_text() {
        assert_eq!(
            encode(&[0x1, 0xAB], Encoding::HexText),
            WireValue::Text("01ab".to_string())
        );
        assert_eq!(encode(b"! 0", Encoding::HexText).as_bytes(), b"212030");
    }

    #[test]
    fn test_raw_passthrough() {
        let value = encode(&[0x1, 0xAB], Encoding::Raw);
        assert_eq!(value, WireValue::Bytes(vec![0x01, 0xAB]));
        assert_eq!(value.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(encode(&[], Encoding::HexText).is_empty());
        assert!(encode(&[], Encoding::Raw).is_empty());
    }
}
