use crate::codec::tag;
use crate::error::{HiveError, Result};
use crate::registry::TypeRegistry;
use crate::value::Value;

/// Appends typed values to a byte buffer.
///
/// The writer borrows its output buffer, so one buffer can collect many
/// frames before a single append to disk.
pub struct BinaryWriter<'a> {
    buf: &'a mut Vec<u8>,
    registry: &'a TypeRegistry,
}

impl<'a> BinaryWriter<'a> {
    /// Creates a writer appending to `buf`.
    pub fn new(buf: &'a mut Vec<u8>, registry: &'a TypeRegistry) -> BinaryWriter<'a> {
        BinaryWriter { buf, registry }
    }

    /// Writes a single byte.
    pub fn write_byte(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Writes a u16.
    pub fn write_word(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an i32.
    pub fn write_int32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u32.
    pub fn write_uint32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an f64.
    pub fn write_double(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an integer through the f64 encoding.
    pub fn write_int(&mut self, value: i64) {
        self.write_double(value as f64);
    }

    /// Writes a bool as one byte.
    pub fn write_bool(&mut self, value: bool) {
        self.write_byte(value as u8);
    }

    /// Writes raw bytes with no length prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        let len = checked_len(value.len())?;
        self.write_word(len);
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    /// Writes a length-prefixed ASCII string.
    pub fn write_ascii_string(&mut self, value: &str) -> Result<()> {
        if !value.is_ascii() {
            return Err(HiveError::UnsupportedOperation(format!(
                "string \"{}\" is not ASCII",
                value
            )));
        }
        let len = checked_len(value.len())?;
        self.write_word(len);
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    /// Writes a length-prefixed byte list.
    pub fn write_byte_list(&mut self, values: &[u8]) -> Result<()> {
        let len = checked_len(values.len())?;
        self.write_word(len);
        self.buf.extend_from_slice(values);
        Ok(())
    }

    /// Writes a length-prefixed integer list, each element as an f64.
    pub fn write_int_list(&mut self, values: &[i64]) -> Result<()> {
        let len = checked_len(values.len())?;
        self.write_word(len);
        for value in values {
            self.write_int(*value);
        }
        Ok(())
    }

    /// Writes a length-prefixed double list.
    pub fn write_double_list(&mut self, values: &[f64]) -> Result<()> {
        let len = checked_len(values.len())?;
        self.write_word(len);
        for value in values {
            self.write_double(*value);
        }
        Ok(())
    }

    /// Writes a length-prefixed bool list.
    pub fn write_bool_list(&mut self, values: &[bool]) -> Result<()> {
        let len = checked_len(values.len())?;
        self.write_word(len);
        for value in values {
            self.write_bool(*value);
        }
        Ok(())
    }

    /// Writes a length-prefixed list of strings.
    pub fn write_string_list(&mut self, values: &[String]) -> Result<()> {
        let len = checked_len(values.len())?;
        self.write_word(len);
        for value in values {
            self.write_string(value)?;
        }
        Ok(())
    }

    /// Writes a length-prefixed heterogeneous list.
    pub fn write_list(&mut self, values: &[Value]) -> Result<()> {
        let len = checked_len(values.len())?;
        self.write_word(len);
        for value in values {
            self.write_value(value)?;
        }
        Ok(())
    }

    /// Writes a length-prefixed map as alternating keys and values.
    pub fn write_map(&mut self, entries: &[(Value, Value)]) -> Result<()> {
        let len = checked_len(entries.len())?;
        self.write_word(len);
        for (key, value) in entries {
            self.write_value(key)?;
            self.write_value(value)?;
        }
        Ok(())
    }

    /// Writes a value as its tag byte followed by the payload.
    ///
    /// Custom values are dispatched through the registry; writing one
    /// without a matching adapter fails with [`HiveError::UnknownType`].
    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => {
                self.write_byte(tag::NULL);
                Ok(())
            }
            Value::Int(v) => {
                self.write_byte(tag::INT);
                self.write_int(*v);
                Ok(())
            }
            Value::Double(v) => {
                self.write_byte(tag::DOUBLE);
                self.write_double(*v);
                Ok(())
            }
            Value::Bool(v) => {
                self.write_byte(tag::BOOL);
                self.write_bool(*v);
                Ok(())
            }
            Value::Str(v) => {
                self.write_byte(tag::STRING);
                self.write_string(v)
            }
            Value::Bytes(v) => {
                self.write_byte(tag::BYTE_LIST);
                self.write_byte_list(v)
            }
            Value::IntList(v) => {
                self.write_byte(tag::INT_LIST);
                self.write_int_list(v)
            }
            Value::DoubleList(v) => {
                self.write_byte(tag::DOUBLE_LIST);
                self.write_double_list(v)
            }
            Value::BoolList(v) => {
                self.write_byte(tag::BOOL_LIST);
                self.write_bool_list(v)
            }
            Value::StringList(v) => {
                self.write_byte(tag::STRING_LIST);
                self.write_string_list(v)
            }
            Value::List(v) => {
                self.write_byte(tag::LIST);
                self.write_list(v)
            }
            Value::Map(v) => {
                self.write_byte(tag::MAP);
                self.write_map(v)
            }
            Value::Custom(v) => match self.registry.find_by_value(v.as_ref()) {
                Some((wire_tag, adapter)) => {
                    self.write_byte(wire_tag);
                    adapter.write(self, v.as_ref())
                }
                None => Err(HiveError::UnknownType(format!(
                    "no adapter registered for value {:?}",
                    v
                ))),
            },
        }
    }
}

fn checked_len(len: usize) -> Result<u16> {
    if len > u16::max_value() as usize {
        return Err(HiveError::UnsupportedOperation(format!(
            "length {} exceeds the u16 prefix",
            len
        )));
    }
    Ok(len as u16)
}
