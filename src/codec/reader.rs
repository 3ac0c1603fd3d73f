use crate::codec::tag;
use crate::error::{HiveError, Result};
use crate::registry::{TypeRegistry, RESERVED_TAGS};
use crate::value::Value;

/// Reads typed values from a byte slice with a cursor.
pub struct BinaryReader<'a> {
    buf: &'a [u8],
    pos: usize,
    registry: &'a TypeRegistry,
}

impl<'a> BinaryReader<'a> {
    /// Creates a reader over `buf`.
    pub fn new(buf: &'a [u8], registry: &'a TypeRegistry) -> BinaryReader<'a> {
        BinaryReader {
            buf,
            pos: 0,
            registry,
        }
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Advances the cursor without decoding.
    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count).map(|_| ())
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(HiveError::corrupt(format!(
                "needed {} bytes but only {} remain",
                count,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    /// Reads a single byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a u16.
    pub fn read_word(&mut self) -> Result<u16> {
        let raw = self.take(2)?;
        Ok(u16::from_le_bytes([raw[0], raw[1]]))
    }

    /// Reads an i32.
    pub fn read_int32(&mut self) -> Result<i32> {
        let raw = self.take(4)?;
        Ok(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// Reads a u32.
    pub fn read_uint32(&mut self) -> Result<u32> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// Reads an f64.
    pub fn read_double(&mut self) -> Result<f64> {
        let raw = self.take(8)?;
        let mut bytes = [0; 8];
        bytes.copy_from_slice(raw);
        Ok(f64::from_le_bytes(bytes))
    }

    /// Reads an integer from the f64 encoding, truncating the fraction.
    pub fn read_int(&mut self) -> Result<i64> {
        Ok(self.read_double()? as i64)
    }

    /// Reads a bool from one byte, nonzero meaning true.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_byte()? != 0)
    }

    /// Reads `count` raw bytes.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        self.take(count)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_word()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| HiveError::corrupt("string payload is not valid UTF-8"))
    }

    /// Reads a length-prefixed ASCII string.
    pub fn read_ascii_string(&mut self) -> Result<String> {
        let len = self.read_word()? as usize;
        let raw = self.take(len)?;
        if !raw.is_ascii() {
            return Err(HiveError::corrupt("string payload is not ASCII"));
        }
        Ok(raw.iter().map(|b| *b as char).collect())
    }

    /// Reads a length-prefixed byte list.
    pub fn read_byte_list(&mut self) -> Result<Vec<u8>> {
        let len = self.read_word()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// Reads a length-prefixed integer list.
    pub fn read_int_list(&mut self) -> Result<Vec<i64>> {
        let len = self.read_word()? as usize;
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            values.push(self.read_int()?);
        }
        Ok(values)
    }

    /// Reads a length-prefixed double list.
    pub fn read_double_list(&mut self) -> Result<Vec<f64>> {
        let len = self.read_word()? as usize;
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            values.push(self.read_double()?);
        }
        Ok(values)
    }

    /// Reads a length-prefixed bool list.
    pub fn read_bool_list(&mut self) -> Result<Vec<bool>> {
        let len = self.read_word()? as usize;
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            values.push(self.read_bool()?);
        }
        Ok(values)
    }

    /// Reads a length-prefixed list of strings.
    pub fn read_string_list(&mut self) -> Result<Vec<String>> {
        let len = self.read_word()? as usize;
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            values.push(self.read_string()?);
        }
        Ok(values)
    }

    /// Reads a length-prefixed heterogeneous list.
    pub fn read_list(&mut self) -> Result<Vec<Value>> {
        let len = self.read_word()? as usize;
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            values.push(self.read_value(None)?);
        }
        Ok(values)
    }

    /// Reads a length-prefixed map of alternating keys and values.
    pub fn read_map(&mut self) -> Result<Vec<(Value, Value)>> {
        let len = self.read_word()? as usize;
        let mut entries = Vec::with_capacity(len);
        for _ in 0..len {
            let key = self.read_value(None)?;
            let value = self.read_value(None)?;
            entries.push((key, value));
        }
        Ok(entries)
    }

    /// Reads a value, taking the tag from the stream unless one is given.
    ///
    /// # Errors
    ///
    /// [`HiveError::CorruptFrame`] on short reads or a reserved tag,
    /// [`HiveError::UnknownType`] when the tag names an unregistered
    /// adapter.
    pub fn read_value(&mut self, wire_tag: Option<u8>) -> Result<Value> {
        let wire_tag = match wire_tag {
            Some(t) => t,
            None => self.read_byte()?,
        };
        match wire_tag {
            tag::NULL => Ok(Value::Null),
            tag::INT => Ok(Value::Int(self.read_int()?)),
            tag::DOUBLE => Ok(Value::Double(self.read_double()?)),
            tag::BOOL => Ok(Value::Bool(self.read_bool()?)),
            tag::STRING => Ok(Value::Str(self.read_string()?)),
            tag::BYTE_LIST => Ok(Value::Bytes(self.read_byte_list()?)),
            tag::INT_LIST => Ok(Value::IntList(self.read_int_list()?)),
            tag::DOUBLE_LIST => Ok(Value::DoubleList(self.read_double_list()?)),
            tag::BOOL_LIST => Ok(Value::BoolList(self.read_bool_list()?)),
            tag::STRING_LIST => Ok(Value::StringList(self.read_string_list()?)),
            tag::LIST => Ok(Value::List(self.read_list()?)),
            tag::MAP => Ok(Value::Map(self.read_map()?)),
            t if t < RESERVED_TAGS => {
                Err(HiveError::corrupt(format!("reserved value tag {}", t)))
            }
            t => match self.registry.find_by_tag(t) {
                Some(adapter) => Ok(Value::Custom(adapter.read(self)?)),
                None => Err(HiveError::UnknownType(format!(
                    "no adapter for type id {}",
                    t - RESERVED_TAGS
                ))),
            },
        }
    }
}
