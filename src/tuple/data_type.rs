use std::fmt;

/// Field types supported by the engine.
/// Every type serializes to a fixed number of bytes so that heap pages can use
/// fixed-width slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Boolean type: 1 byte (0 = false, 1 = true)
    Boolean,

    /// 32-bit signed integer: 4 bytes, little-endian
    Integer,

    /// 64-bit signed integer: 8 bytes, little-endian
    BigInt,

    /// 64-bit floating point: 8 bytes, IEEE 754
    Double,

    /// Character string of at most n bytes.
    /// Stored as: length (2 bytes) + data, zero padded to n bytes
    VarChar(u16),
}

impl DataType {
    /// Returns the serialized width of this type in bytes.
    pub fn size(&self) -> usize {
        match self {
            DataType::Boolean => 1,
            DataType::Integer => 4,
            DataType::BigInt => 8,
            DataType::Double => 8,
            DataType::VarChar(n) => 2 + *n as usize,
        }
    }

    /// Returns true for the integral types the integer aggregator accepts.
    pub fn is_integral(&self) -> bool {
        matches!(self, DataType::Integer | DataType::BigInt)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Integer => write!(f, "INTEGER"),
            DataType::BigInt => write!(f, "BIGINT"),
            DataType::Double => write!(f, "DOUBLE"),
            DataType::VarChar(n) => write!(f, "VARCHAR({})", n),
        }
    }
}
