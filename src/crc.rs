use crc32fast::Hasher;

/// Computes an IEEE CRC32 over `bytes`, continuing from a previous CRC.
///
/// `seed` is the output of an earlier `crc32` call (0 to start a fresh
/// checksum), so checksums can be chained across buffers. `length` caps how
/// many leading bytes are hashed, which lets a frame exclude its own
/// trailing CRC field.
pub fn crc32(bytes: &[u8], seed: u32, length: Option<usize>) -> u32 {
    let end = length.unwrap_or_else(|| bytes.len());
    let mut hasher = Hasher::new_with_initial(seed);
    hasher.update(&bytes[..end]);
    hasher.finalize()
}

/// Decodes a little-endian u32 at `offset`.
pub fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // The classic check value for IEEE CRC32.
        assert_eq!(crc32(b"123456789", 0, None), 0xCBF4_3926);
    }

    #[test]
    fn chaining_matches_single_pass() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let whole = crc32(data, 0, None);
        let first = crc32(&data[..17], 0, None);
        let chained = crc32(&data[17..], first, None);
        assert_eq!(chained, whole);
    }

    #[test]
    fn length_cap_excludes_tail() {
        let data = b"payloadCRC!";
        assert_eq!(crc32(data, 0, Some(7)), crc32(b"payload", 0, None));
    }

    #[test]
    fn read_u32_le_at_offset() {
        let bytes = [0xFF, 0x78, 0x56, 0x34, 0x12];
        assert_eq!(read_u32_le(&bytes, 1), 0x1234_5678);
    }
}
