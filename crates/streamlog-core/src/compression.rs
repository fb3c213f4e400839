//! Snapshot Compression
//!
//! Node bodies inside a snapshot may be LZ4-compressed. Live nodes are never
//! compressed in memory: the iterator reads them in place.
//!
//! - **None**: raw packed node bytes
//! - **LZ4**: `lz4_flex` block format with the uncompressed size prepended

use serde::{Deserialize, Serialize};

/// Compression type for snapshot node bodies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u16)]
pub enum Compression {
    #[default]
    None = 0,
    Lz4 = 1,
}

impl TryFrom<u16> for Compression {
    type Error = crate::Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Lz4),
            _ => Err(crate::Error::InvalidCompression(value)),
        }
    }
}

impl Compression {
    /// Compress a node body.
    pub fn compress(self, data: &[u8]) -> Vec<u8> {
        match self {
            Compression::None => data.to_vec(),
            Compression::Lz4 => lz4_flex::compress_prepend_size(data),
        }
    }

    /// Decompress a node body written by [`Compression::compress`].
    pub fn decompress(self, data: &[u8]) -> crate::Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| crate::Error::Decompression(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_ids() {
        assert_eq!(Compression::try_from(0).unwrap(), Compression::None);
        assert_eq!(Compression::try_from(1).unwrap(), Compression::Lz4);
        assert_eq!(
            Compression::try_from(2),
            Err(crate::Error::InvalidCompression(2))
        );
    }

    #[test]
    fn test_lz4_body() {
        let body = b"field-a value field-a value field-a value".repeat(20);
        let packed = Compression::Lz4.compress(&body);
        assert!(packed.len() < body.len());
        assert_eq!(Compression::Lz4.decompress(&packed).unwrap(), body);
    }

    #[test]
    fn test_lz4_garbage_is_an_error() {
        let err = Compression::Lz4.decompress(&[0x10, 0, 0, 0, 0xFF, 0xFF]);
        assert!(matches!(err, Err(crate::Error::Decompression(_))));
    }
}
