use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use super::{TupleDesc, Value};
use crate::common::{DbError, RecordId, Result};

/// Represents a single row/tuple in a table.
///
/// A tuple holds one value per field of its descriptor. Because every field is
/// fixed width, the serialized form is simply the field encodings concatenated
/// in descriptor order:
///
/// ```text
/// +----------+----------+-----+----------+
/// | field 0  | field 1  | ... | field n  |
/// +----------+----------+-----+----------+
/// ```
///
/// The record id is set once the tuple has been placed in a page.
#[derive(Debug, Clone)]
pub struct Tuple {
    /// The descriptor defining the structure of this tuple
    desc: Arc<TupleDesc>,

    /// The values for each field (in descriptor order)
    values: Vec<Value>,

    /// Location of the tuple on disk, if it has been stored
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Creates a new tuple with the given descriptor and values.
    ///
    /// Fails if the value count or any value type does not match the descriptor.
    pub fn new(desc: Arc<TupleDesc>, values: Vec<Value>) -> Result<Self> {
        if values.len() != desc.num_fields() {
            return Err(DbError::TypeMismatch(format!(
                "expected {} values, got {}",
                desc.num_fields(),
                values.len()
            )));
        }
        for (value, field) in values.iter().zip(desc.fields()) {
            if !value.fits(field.data_type()) {
                return Err(DbError::TypeMismatch(format!(
                    "{} does not fit a {} field",
                    value,
                    field.data_type()
                )));
            }
        }
        Ok(Self {
            desc,
            values,
            record_id: None,
        })
    }

    /// Decodes a tuple from exactly `desc.size()` bytes.
    pub fn from_bytes(desc: Arc<TupleDesc>, data: &[u8]) -> Option<Self> {
        if data.len() != desc.size() {
            return None;
        }
        let mut cursor = data;
        let values = desc
            .fields()
            .map(|f| Value::deserialize(&mut cursor, f.data_type()))
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            desc,
            values,
            record_id: None,
        })
    }

    /// Concatenates the fields of two tuples (left fields first).
    /// The result carries no record id.
    pub fn merge(left: &Tuple, right: &Tuple) -> Tuple {
        let desc = Arc::new(TupleDesc::merge(&left.desc, &right.desc));
        let values = left.values.iter().chain(right.values.iter()).cloned().collect();
        Tuple {
            desc,
            values,
            record_id: None,
        }
    }

    /// Rebinds the tuple to a descriptor with the same field types, e.g. one
    /// carrying different field names. The record id is kept.
    pub fn with_desc(mut self, desc: Arc<TupleDesc>) -> Result<Self> {
        if *desc != *self.desc {
            return Err(DbError::SchemaMismatch {
                expected: self.desc.to_string(),
                actual: desc.to_string(),
            });
        }
        self.desc = desc;
        Ok(self)
    }

    /// Returns the descriptor of this tuple.
    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    /// Returns the value at the given field index.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns all values in this tuple.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Replaces the value at the given field index.
    pub fn set_value(&mut self, index: usize, value: Value) -> Result<()> {
        let data_type = self
            .desc
            .field_type(index)
            .ok_or_else(|| DbError::NoSuchField(index.to_string()))?;
        if !value.fits(data_type) {
            return Err(DbError::TypeMismatch(format!(
                "{} does not fit a {} field",
                value, data_type
            )));
        }
        self.values[index] = value;
        Ok(())
    }

    /// Returns the record id, if the tuple has been stored in a page.
    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// Returns the number of fields in this tuple.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this tuple has no fields.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Appends the serialized tuple to `buf`.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<()> {
        for (value, field) in self.values.iter().zip(self.desc.fields()) {
            value.serialize(field.data_type(), buf)?;
        }
        Ok(())
    }

    /// Serializes the tuple to bytes for storage.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.desc.size());
        self.write_to(&mut buf)?;
        Ok(buf.freeze())
    }
}

/// Equality compares descriptors and values; the record id is location
/// metadata and is ignored.
impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.desc == other.desc && self.values == other.values
    }
}

impl Eq for Tuple {}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
        write!(f, "({})", parts.join(", "))
    }
}

/// Builder for constructing tuples fluently.
pub struct TupleBuilder {
    desc: Arc<TupleDesc>,
    values: Vec<Value>,
}

impl TupleBuilder {
    /// Creates a new tuple builder for the given descriptor.
    pub fn new(desc: Arc<TupleDesc>) -> Self {
        let count = desc.num_fields();
        Self {
            desc,
            values: Vec::with_capacity(count),
        }
    }

    /// Appends the value for the next field.
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.values.push(value.into());
        self
    }

    /// Builds the tuple, validating it against the descriptor.
    pub fn build(self) -> Result<Tuple> {
        Tuple::new(self.desc, self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PageId, SlotId};
    use crate::tuple::DataType;

    fn create_test_desc() -> Arc<TupleDesc> {
        TupleDesc::builder()
            .field("id", DataType::Integer)
            .field("name", DataType::VarChar(16))
            .field("active", DataType::Boolean)
            .build_arc()
    }

    #[test]
    fn test_tuple_builder() {
        let tuple = TupleBuilder::new(create_test_desc())
            .value(42i32)
            .value("Bob")
            .value(true)
            .build()
            .unwrap();

        assert_eq!(tuple.len(), 3);
        assert_eq!(tuple.value(0), Some(&Value::Integer(42)));
        assert_eq!(tuple.value(1), Some(&Value::String("Bob".to_string())));
        assert_eq!(tuple.record_id(), None);
    }

    #[test]
    fn test_tuple_rejects_wrong_arity_and_type() {
        let desc = create_test_desc();
        assert!(Tuple::new(desc.clone(), vec![Value::Integer(1)]).is_err());
        assert!(Tuple::new(
            desc,
            vec![Value::BigInt(1), Value::from("x"), Value::Boolean(false)]
        )
        .is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let desc = create_test_desc();
        let original = TupleBuilder::new(desc.clone())
            .value(7i32)
            .value("Test User")
            .value(false)
            .build()
            .unwrap();

        let bytes = original.to_bytes().unwrap();
        assert_eq!(bytes.len(), desc.size());

        let recovered = Tuple::from_bytes(desc, &bytes).unwrap();
        assert_eq!(original, recovered);
    }

    #[test]
    fn test_set_value() {
        let mut tuple = TupleBuilder::new(create_test_desc())
            .value(1i32)
            .value("a")
            .value(true)
            .build()
            .unwrap();

        tuple.set_value(0, Value::Integer(99)).unwrap();
        assert_eq!(tuple.value(0), Some(&Value::Integer(99)));
        assert!(tuple.set_value(0, Value::from("nope")).is_err());
        assert!(tuple.set_value(5, Value::Integer(1)).is_err());
    }

    #[test]
    fn test_merge_concatenates_fields() {
        let desc = TupleDesc::from_types(&[DataType::Integer, DataType::Integer]);
        let desc = Arc::new(desc);
        let left = Tuple::new(desc.clone(), vec![Value::Integer(1), Value::Integer(2)]).unwrap();
        let mut right = Tuple::new(desc, vec![Value::Integer(1), Value::Integer(5)]).unwrap();
        right.set_record_id(Some(RecordId::new(PageId::new(1, 0), SlotId::new(3))));

        let merged = Tuple::merge(&left, &right);
        assert_eq!(merged.len(), 4);
        let expected: Vec<Value> = [1, 2, 1, 5].into_iter().map(Value::Integer).collect();
        assert_eq!(merged.values(), expected.as_slice());
        assert_eq!(merged.record_id(), None);
    }
}
