use std::cmp::Ordering;
use std::fmt;

use crate::codec::{BinaryReader, BinaryWriter};
use crate::crc::{crc32, read_u32_le};
use crate::crypto::Cipher;
use crate::error::{HiveError, Result};
use crate::registry::TypeRegistry;
use crate::value::Value;

/// Longest allowed string key, in bytes.
pub const MAX_STRING_KEY_LENGTH: usize = 255;

const KEY_TYPE_INT: u8 = 0;
const KEY_TYPE_STRING: u8 = 1;

/// Shortest possible frame: length, key type, one-byte string key, CRC.
pub(crate) const MIN_FRAME_LENGTH: u32 = 11;

/// A box key, either an unsigned integer or a short ASCII string.
///
/// Keys order with all integer keys before all string keys, integers
/// numerically and strings by codepoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// An integer key.
    Int(u32),
    /// An ASCII string key of 1 to 255 bytes.
    Str(String),
}

impl Key {
    /// Checks that the key is storable.
    ///
    /// # Errors
    ///
    /// [`HiveError::InvalidKey`] for empty, overlong or non-ASCII string
    /// keys.
    pub fn validate(&self) -> Result<()> {
        if let Key::Str(s) = self {
            if s.is_empty() || s.len() > MAX_STRING_KEY_LENGTH {
                return Err(HiveError::InvalidKey(format!(
                    "string key must be 1 to {} bytes, got {}",
                    MAX_STRING_KEY_LENGTH,
                    s.len()
                )));
            }
            if !s.is_ascii() {
                return Err(HiveError::InvalidKey(format!(
                    "string key \"{}\" is not ASCII",
                    s
                )));
            }
        }
        Ok(())
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Key) -> Ordering {
        match (self, other) {
            (Key::Int(a), Key::Int(b)) => a.cmp(b),
            (Key::Str(a), Key::Str(b)) => a.cmp(b),
            (Key::Int(_), Key::Str(_)) => Ordering::Less,
            (Key::Str(_), Key::Int(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Key) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{}", i),
            Key::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<u32> for Key {
    fn from(key: u32) -> Key {
        Key::Int(key)
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Key {
        Key::Str(key.to_owned())
    }
}

impl From<String> for Key {
    fn from(key: String) -> Key {
        Key::Str(key)
    }
}

/// One record of the append-only log.
///
/// A frame either carries a value or is a tombstone deleting its key. A
/// lazily loaded frame carries neither; only its file position is known.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// The key this frame writes or deletes.
    pub key: Key,
    /// The value, absent for tombstones and lazily loaded frames.
    pub value: Option<Value>,
    /// Whether this frame deletes its key.
    pub deleted: bool,
    /// Byte position in the file, stamped after the frame is written or
    /// scanned.
    pub offset: u64,
    /// Total on-disk byte count including length prefix and CRC.
    pub length: u32,
}

impl Frame {
    /// Creates a frame writing `value` under `key`.
    pub fn put(key: impl Into<Key>, value: Value) -> Frame {
        Frame {
            key: key.into(),
            value: Some(value),
            deleted: false,
            offset: 0,
            length: 0,
        }
    }

    /// Creates a tombstone deleting `key`.
    pub fn tombstone(key: impl Into<Key>) -> Frame {
        Frame {
            key: key.into(),
            value: None,
            deleted: true,
            offset: 0,
            length: 0,
        }
    }

    fn lazy(key: Key, length: u32) -> Frame {
        Frame {
            key,
            value: None,
            deleted: false,
            offset: 0,
            length,
        }
    }

    /// Encodes this frame onto the end of `buf`, returning its length.
    ///
    /// With a cipher, the value is serialized to a scratch buffer and the
    /// encrypted bytes take its place. The CRC is seeded with the cipher's
    /// key CRC so a mismatched key is caught before any decryption.
    pub fn encode_into(
        &self,
        buf: &mut Vec<u8>,
        registry: &TypeRegistry,
        cipher: Option<&Cipher>,
    ) -> Result<u32> {
        self.key.validate()?;
        let start = buf.len();
        buf.extend_from_slice(&[0; 4]);

        match &self.key {
            Key::Int(key) => {
                buf.push(KEY_TYPE_INT);
                buf.extend_from_slice(&key.to_le_bytes());
            }
            Key::Str(key) => {
                buf.push(KEY_TYPE_STRING);
                buf.push(key.len() as u8);
                buf.extend_from_slice(key.as_bytes());
            }
        }

        if let Some(value) = &self.value {
            match cipher {
                Some(cipher) => {
                    let mut scratch = Vec::new();
                    let mut writer = BinaryWriter::new(&mut scratch, registry);
                    writer.write_value(value)?;
                    buf.extend_from_slice(&cipher.encrypt(&scratch));
                }
                None => {
                    let mut writer = BinaryWriter::new(buf, registry);
                    writer.write_value(value)?;
                }
            }
        }

        buf.extend_from_slice(&[0; 4]);
        let length = (buf.len() - start) as u32;
        buf[start..start + 4].copy_from_slice(&length.to_le_bytes());

        let seed = cipher.map_or(0, Cipher::key_crc);
        let crc = crc32(&buf[start..], seed, Some(length as usize - 4));
        let crc_at = start + length as usize - 4;
        buf[crc_at..crc_at + 4].copy_from_slice(&crc.to_le_bytes());

        Ok(length)
    }

    /// Encodes this frame on its own.
    pub fn to_bytes(&self, registry: &TypeRegistry, cipher: Option<&Cipher>) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf, registry, cipher)?;
        Ok(buf)
    }

    /// Decodes one complete frame from `bytes`.
    ///
    /// `bytes` must span exactly the frame, length prefix and CRC
    /// included. With `lazy`, the value block is skipped and the frame
    /// carries only its position. The caller stamps `offset`.
    ///
    /// # Errors
    ///
    /// [`HiveError::CorruptFrame`] on a bad length, a CRC mismatch, or a
    /// value that fails to decode structurally.
    pub fn decode(
        bytes: &[u8],
        registry: &TypeRegistry,
        cipher: Option<&Cipher>,
        lazy: bool,
    ) -> Result<Frame> {
        if bytes.len() < MIN_FRAME_LENGTH as usize {
            return Err(HiveError::corrupt("frame is shorter than any valid frame"));
        }
        let length = read_u32_le(bytes, 0);
        if length as usize != bytes.len() {
            return Err(HiveError::corrupt(format!(
                "frame length {} does not match its {} bytes",
                length,
                bytes.len()
            )));
        }

        let seed = cipher.map_or(0, Cipher::key_crc);
        let stored = read_u32_le(bytes, bytes.len() - 4);
        let computed = crc32(bytes, seed, Some(bytes.len() - 4));
        if stored != computed {
            return Err(HiveError::corrupt(format!(
                "CRC mismatch, stored {:08x} computed {:08x}",
                stored, computed
            )));
        }

        let body = &bytes[4..bytes.len() - 4];
        let mut reader = BinaryReader::new(body, registry);
        let key = match reader.read_byte()? {
            KEY_TYPE_INT => Key::Int(reader.read_uint32()?),
            KEY_TYPE_STRING => {
                let len = reader.read_byte()? as usize;
                let raw = reader.read_bytes(len)?;
                if !raw.is_ascii() {
                    return Err(HiveError::corrupt("string key is not ASCII"));
                }
                Key::Str(raw.iter().map(|b| *b as char).collect())
            }
            other => {
                return Err(HiveError::corrupt(format!("unknown key type {}", other)));
            }
        };

        if reader.remaining() == 0 {
            let mut frame = Frame::tombstone(key);
            frame.length = length;
            return Ok(frame);
        }

        if lazy {
            return Ok(Frame::lazy(key, length));
        }

        let value = match cipher {
            Some(cipher) => {
                let sealed = reader.read_bytes(reader.remaining())?;
                let plain = cipher.decrypt(sealed)?;
                let mut value_reader = BinaryReader::new(&plain, registry);
                value_reader.read_value(None)?
            }
            None => reader.read_value(None)?,
        };

        let mut frame = Frame::put(key, value);
        frame.length = length;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::new()
    }

    fn roundtrip_with(frame: &Frame, cipher: Option<&Cipher>) -> Frame {
        let registry = registry();
        let bytes = frame.to_bytes(&registry, cipher).unwrap();
        let mut decoded = Frame::decode(&bytes, &registry, cipher, false).unwrap();
        assert_eq!(decoded.length as usize, bytes.len());
        decoded.length = 0;
        decoded
    }

    #[test]
    fn int_key_roundtrips() {
        let frame = Frame::put(77u32, Value::Str("hello".into()));
        assert_eq!(roundtrip_with(&frame, None), frame);
    }

    #[test]
    fn string_key_roundtrips() {
        let frame = Frame::put("answer", Value::Int(42));
        assert_eq!(roundtrip_with(&frame, None), frame);
    }

    #[test]
    fn tombstone_roundtrips() {
        let frame = Frame::tombstone("gone");
        assert_eq!(roundtrip_with(&frame, None), frame);
    }

    #[test]
    fn encrypted_roundtrip() {
        let cipher = Cipher::new([9; 32]);
        let frame = Frame::put("x", Value::IntList(vec![1, 2, 3]));
        assert_eq!(roundtrip_with(&frame, Some(&cipher)), frame);
    }

    #[test]
    fn encrypted_frame_hides_plaintext() {
        let registry = registry();
        let cipher = Cipher::new([9; 32]);
        let frame = Frame::put("k", Value::Str("visible secret".into()));
        let bytes = frame.to_bytes(&registry, Some(&cipher)).unwrap();
        let needle = b"visible secret";
        assert!(!bytes.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn wrong_key_fails_crc() {
        let registry = registry();
        let frame = Frame::put("k", Value::Int(5));
        let bytes = frame.to_bytes(&registry, Some(&Cipher::new([1; 32]))).unwrap();
        let wrong = Cipher::new([2; 32]);
        match Frame::decode(&bytes, &registry, Some(&wrong), false) {
            Err(HiveError::CorruptFrame(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn flipped_bit_fails_crc() {
        let registry = registry();
        let frame = Frame::put("k", Value::Int(5));
        let mut bytes = frame.to_bytes(&registry, None).unwrap();
        bytes[6] ^= 0x40;
        match Frame::decode(&bytes, &registry, None, false) {
            Err(HiveError::CorruptFrame(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn lazy_decode_skips_value() {
        let registry = registry();
        let frame = Frame::put("k", Value::Str("big payload".into()));
        let bytes = frame.to_bytes(&registry, None).unwrap();
        let lazy = Frame::decode(&bytes, &registry, None, true).unwrap();
        assert_eq!(lazy.key, Key::Str("k".into()));
        assert_eq!(lazy.value, None);
        assert!(!lazy.deleted);
        assert_eq!(lazy.length as usize, bytes.len());
    }

    #[test]
    fn batch_encoding_appends() {
        let registry = registry();
        let mut buf = Vec::new();
        let first = Frame::put(1u32, Value::Int(1))
            .encode_into(&mut buf, &registry, None)
            .unwrap();
        let second = Frame::put(2u32, Value::Int(2))
            .encode_into(&mut buf, &registry, None)
            .unwrap();
        assert_eq!(buf.len(), (first + second) as usize);

        let decoded = Frame::decode(&buf[..first as usize], &registry, None, false).unwrap();
        assert_eq!(decoded.key, Key::Int(1));
        let decoded = Frame::decode(&buf[first as usize..], &registry, None, false).unwrap();
        assert_eq!(decoded.key, Key::Int(2));
    }

    #[test]
    fn invalid_keys_are_rejected() {
        let registry = registry();
        let mut buf = Vec::new();
        let long_key = "k".repeat(MAX_STRING_KEY_LENGTH + 1);
        for key in [String::new(), long_key, "übel".to_owned()].iter() {
            let frame = Frame::put(key.as_str(), Value::Null);
            match frame.encode_into(&mut buf, &registry, None) {
                Err(HiveError::InvalidKey(_)) => {}
                other => panic!("unexpected: {:?}", other),
            }
        }
    }

    #[test]
    fn key_ordering() {
        let mut keys = vec![
            Key::Str("b".into()),
            Key::Int(10),
            Key::Str("a".into()),
            Key::Int(2),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                Key::Int(2),
                Key::Int(10),
                Key::Str("a".into()),
                Key::Str("b".into()),
            ]
        );
    }
}
