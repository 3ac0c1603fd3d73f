use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

/// A user-defined value stored through a registered adapter.
///
/// Implementors are plain data objects; the matching [`TypeAdapter`] knows
/// how to serialize them. Equality goes through `eq_value` so boxed values
/// can be compared behind the trait object.
///
/// [`TypeAdapter`]: crate::TypeAdapter
pub trait CustomValue: Debug + Send + Sync {
    /// Returns self for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Compares against another custom value.
    fn eq_value(&self, other: &dyn CustomValue) -> bool;
}

/// A value storable in a box.
///
/// Integers are persisted through an f64 round-trip for compatibility with
/// existing box files, which bounds them to 2^53. Lists of integers share
/// the same encoding.
#[derive(Debug, Clone)]
pub enum Value {
    /// The null value.
    Null,
    /// A signed integer.
    Int(i64),
    /// A double precision float.
    Double(f64),
    /// A boolean.
    Bool(bool),
    /// A UTF-8 string.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A list of integers.
    IntList(Vec<i64>),
    /// A list of doubles.
    DoubleList(Vec<f64>),
    /// A list of booleans.
    BoolList(Vec<bool>),
    /// A list of strings.
    StringList(Vec<String>),
    /// A heterogeneous list.
    List(Vec<Value>),
    /// An ordered map with arbitrary keys and values.
    Map(Vec<(Value, Value)>),
    /// A user-defined value, serialized by a registered adapter.
    Custom(Arc<dyn CustomValue>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        use self::Value::*;

        match (self, other) {
            (Null, Null) => true,
            (Int(a), Int(b)) => a == b,
            (Double(a), Double(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (IntList(a), IntList(b)) => a == b,
            (DoubleList(a), DoubleList(b)) => a == b,
            (BoolList(a), BoolList(b)) => a == b,
            (StringList(a), StringList(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Custom(a), Custom(b)) => a.eq_value(b.as_ref()),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Value {
        Value::Bytes(v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Value {
        Value::IntList(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Value {
        Value::DoubleList(v)
    }
}

impl From<Vec<bool>> for Value {
    fn from(v: Vec<bool>) -> Value {
        Value::BoolList(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Value {
        Value::StringList(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Value {
        Value::List(v)
    }
}
