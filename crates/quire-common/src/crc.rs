//! CRC-32 (IEEE) checksums, as stored in ZIP headers.

/// Compute the CRC-32 of a byte slice.
#[inline]
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_checksum() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn test_known_checksum() {
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
    }
}
