use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use bytes::{Buf, BufMut, BytesMut};

use super::DataType;
use crate::common::{DbError, Result};

/// Represents a typed value that can be stored in a tuple.
/// Each variant corresponds to a DataType and holds the actual data.
#[derive(Debug, Clone)]
pub enum Value {
    Boolean(bool),
    Integer(i32),
    BigInt(i64),
    Double(f64),
    /// String value stored in a VarChar field
    String(String),
}

impl Value {
    /// Returns the DataType that best matches this value.
    /// Strings report a VarChar sized to their own length, saturating at the
    /// widest VarChar; such strings do not `fit` any field.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Boolean(_) => DataType::Boolean,
            Value::Integer(_) => DataType::Integer,
            Value::BigInt(_) => DataType::BigInt,
            Value::Double(_) => DataType::Double,
            Value::String(s) => DataType::VarChar(u16::try_from(s.len()).unwrap_or(u16::MAX)),
        }
    }

    /// Returns true if this value can be stored in a field of the given type.
    pub fn fits(&self, data_type: &DataType) -> bool {
        match (self, data_type) {
            (Value::Boolean(_), DataType::Boolean)
            | (Value::Integer(_), DataType::Integer)
            | (Value::BigInt(_), DataType::BigInt)
            | (Value::Double(_), DataType::Double) => true,
            (Value::String(s), DataType::VarChar(n)) => s.len() <= *n as usize,
            _ => false,
        }
    }

    /// Returns the value widened to i64 for integral variants.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v as i64),
            Value::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Appends exactly `data_type.size()` bytes encoding this value.
    pub fn serialize(&self, data_type: &DataType, buf: &mut BytesMut) -> Result<()> {
        match (self, data_type) {
            (Value::Boolean(b), DataType::Boolean) => buf.put_u8(u8::from(*b)),
            (Value::Integer(v), DataType::Integer) => buf.put_i32_le(*v),
            (Value::BigInt(v), DataType::BigInt) => buf.put_i64_le(*v),
            (Value::Double(v), DataType::Double) => buf.put_f64_le(*v),
            (Value::String(s), DataType::VarChar(n)) => {
                let n = *n as usize;
                let bytes = s.as_bytes();
                if bytes.len() > n {
                    return Err(DbError::TypeMismatch(format!(
                        "string of {} bytes exceeds {}",
                        bytes.len(),
                        data_type
                    )));
                }
                buf.put_u16_le(bytes.len() as u16);
                buf.put_slice(bytes);
                buf.put_bytes(0, n - bytes.len());
            }
            _ => {
                return Err(DbError::TypeMismatch(format!(
                    "cannot store {} in a {} field",
                    self, data_type
                )))
            }
        }
        Ok(())
    }

    /// Reads one value of the given type from the front of `buf`, advancing it
    /// by `data_type.size()` bytes. Returns None if the bytes are malformed.
    pub fn deserialize(buf: &mut &[u8], data_type: &DataType) -> Option<Self> {
        if buf.remaining() < data_type.size() {
            return None;
        }

        let value = match data_type {
            DataType::Boolean => Value::Boolean(buf.get_u8() != 0),
            DataType::Integer => Value::Integer(buf.get_i32_le()),
            DataType::BigInt => Value::BigInt(buf.get_i64_le()),
            DataType::Double => Value::Double(buf.get_f64_le()),
            DataType::VarChar(n) => {
                let n = *n as usize;
                let len = buf.get_u16_le() as usize;
                if len > n {
                    return None;
                }
                let s = String::from_utf8(buf[..len].to_vec()).ok()?;
                buf.advance(n);
                Value::String(s)
            }
        };

        Some(value)
    }

    /// Compares two values for ordering.
    ///
    /// Numeric values compare across variants: integers widen to `i64`, and a
    /// comparison involving a `Double` is done in `f64`. Other values of
    /// different variants are not comparable and return None.
    ///
    /// This is the comparison predicates use. `==` is stricter and never
    /// equates different variants, so `Integer(5)` and `BigInt(5)` compare
    /// equal here but are distinct as group keys.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::BigInt(a), Value::BigInt(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => Some(a.total_cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),

            // Cross-type numeric comparisons (promote to larger type)
            (Value::Integer(a), Value::BigInt(b)) => Some((*a as i64).cmp(b)),
            (Value::BigInt(a), Value::Integer(b)) => Some(a.cmp(&(*b as i64))),
            (Value::Integer(a), Value::Double(b)) => Some((*a as f64).total_cmp(b)),
            (Value::Double(a), Value::Integer(b)) => Some(a.total_cmp(&(*b as f64))),
            (Value::BigInt(a), Value::Double(b)) => Some((*a as f64).total_cmp(b)),
            (Value::Double(a), Value::BigInt(b)) => Some(a.total_cmp(&(*b as f64))),

            _ => None,
        }
    }
}

/// Structural equality: values of different variants are never equal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            // Bitwise so that Eq and Hash agree, including for NaN
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Boolean(v) => v.hash(state),
            Value::Integer(v) => v.hash(state),
            Value::BigInt(v) => v.hash(state),
            Value::Double(v) => v.to_bits().hash(state),
            Value::String(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "'{}'", s),
        }
    }
}

// Convenience conversions
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
