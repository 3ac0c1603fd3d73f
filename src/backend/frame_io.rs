use std::io::{self, Read};

use crate::codec::{Frame, MIN_FRAME_LENGTH};
use crate::crc::read_u32_le;
use crate::crypto::Cipher;
use crate::error::{HiveError, Result};
use crate::keystore::Keystore;
use crate::registry::TypeRegistry;

/// Scans a whole log into `keystore`, frame by frame.
///
/// `reader` must be positioned at the start of the log and `file_len` must
/// be its total size. With `lazy`, values are skipped and only positions are
/// indexed.
///
/// Returns `Some(offset)` of the first byte past the last valid frame when
/// the tail is damaged (short frame, impossible length, CRC mismatch), and
/// `None` when every byte was consumed cleanly. Errors that cannot stem
/// from a torn write, like a missing type adapter, propagate instead.
pub(crate) fn scan<R: Read>(
    reader: &mut R,
    file_len: u64,
    registry: &TypeRegistry,
    cipher: Option<&Cipher>,
    keystore: &mut Keystore,
    lazy: bool,
) -> Result<Option<u64>> {
    let mut offset = 0u64;

    while offset < file_len {
        if file_len - offset < u64::from(MIN_FRAME_LENGTH) {
            return Ok(Some(offset));
        }

        let mut prefix = [0; 4];
        if read_or_eof(reader, &mut prefix)?.is_none() {
            return Ok(Some(offset));
        }
        let length = read_u32_le(&prefix, 0);
        if length < MIN_FRAME_LENGTH || offset + u64::from(length) > file_len {
            return Ok(Some(offset));
        }

        let mut buf = vec![0; length as usize];
        buf[..4].copy_from_slice(&prefix);
        if read_or_eof(reader, &mut buf[4..])?.is_none() {
            return Ok(Some(offset));
        }

        let mut frame = match Frame::decode(&buf, registry, cipher, lazy) {
            Ok(frame) => frame,
            Err(HiveError::CorruptFrame(_)) => return Ok(Some(offset)),
            Err(err) => return Err(err),
        };
        frame.offset = offset;
        keystore.apply(&frame, lazy);
        offset += u64::from(length);
    }

    Ok(None)
}

/// Fills `buf`, mapping a torn tail to `None` instead of an error.
fn read_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<Option<()>> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(Some(())),
        Err(ref err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Key;
    use crate::value::Value;

    fn encode(frames: &[Frame]) -> Vec<u8> {
        let registry = TypeRegistry::new();
        let mut buf = Vec::new();
        for frame in frames {
            frame.encode_into(&mut buf, &registry, None).unwrap();
        }
        buf
    }

    fn scan_bytes(bytes: &[u8], lazy: bool) -> (Keystore, Option<u64>) {
        let registry = TypeRegistry::new();
        let mut keystore = Keystore::new();
        let mut reader = bytes;
        let recovered = scan(
            &mut reader,
            bytes.len() as u64,
            &registry,
            None,
            &mut keystore,
            lazy,
        )
        .unwrap();
        (keystore, recovered)
    }

    #[test]
    fn clean_log_scans_fully() {
        let bytes = encode(&[
            Frame::put("a", Value::Int(1)),
            Frame::put("b", Value::Int(2)),
            Frame::tombstone("a"),
        ]);
        let (keystore, recovered) = scan_bytes(&bytes, false);
        assert_eq!(recovered, None);
        assert_eq!(keystore.len(), 1);
        assert_eq!(keystore.deleted_entries(), 2);
        assert!(keystore.contains(&Key::Str("b".into())));
    }

    #[test]
    fn truncated_tail_reports_last_good_offset() {
        let good = encode(&[Frame::put("a", Value::Int(1))]);
        let mut bytes = good.clone();
        let second = encode(&[Frame::put("b", Value::Int(2))]);
        bytes.extend_from_slice(&second[..second.len() / 2]);

        let (keystore, recovered) = scan_bytes(&bytes, false);
        assert_eq!(recovered, Some(good.len() as u64));
        assert_eq!(keystore.len(), 1);
    }

    #[test]
    fn corrupt_crc_reports_frame_offset() {
        let first = encode(&[Frame::put("a", Value::Int(1))]);
        let mut bytes = encode(&[Frame::put("a", Value::Int(1)), Frame::put("b", Value::Int(2))]);
        let flip_at = first.len() + 6;
        bytes[flip_at] ^= 0xFF;

        let (keystore, recovered) = scan_bytes(&bytes, false);
        assert_eq!(recovered, Some(first.len() as u64));
        assert_eq!(keystore.len(), 1);
    }

    #[test]
    fn absurd_length_prefix_is_corruption() {
        let mut bytes = encode(&[Frame::put("a", Value::Int(1))]);
        let good_len = bytes.len() as u64;
        bytes.extend_from_slice(&[0xFF; 16]);

        let (_, recovered) = scan_bytes(&bytes, false);
        assert_eq!(recovered, Some(good_len));
    }

    #[test]
    fn lazy_scan_indexes_positions_only() {
        let bytes = encode(&[Frame::put("a", Value::Int(1)), Frame::put("b", Value::Int(2))]);
        let (keystore, recovered) = scan_bytes(&bytes, true);
        assert_eq!(recovered, None);

        let entry = keystore.get(&Key::Str("b".into())).unwrap();
        assert_eq!(entry.value, None);
        assert!(entry.offset > 0);
        assert_eq!(
            entry.offset + u64::from(entry.length),
            bytes.len() as u64
        );
    }

    #[test]
    fn empty_log_is_clean() {
        let (keystore, recovered) = scan_bytes(&[], false);
        assert_eq!(recovered, None);
        assert!(keystore.is_empty());
    }
}
