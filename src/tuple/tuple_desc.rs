use std::fmt;
use std::sync::Arc;

use super::DataType;
use crate::common::{DbError, Result};

/// A single field of a tuple descriptor.
#[derive(Debug, Clone)]
pub struct FieldDesc {
    /// Field data type
    data_type: DataType,

    /// Optional field name; metadata only, ignored by equality
    name: Option<String>,
}

impl FieldDesc {
    pub fn new(data_type: DataType, name: Option<String>) -> Self {
        Self { data_type, name }
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Describes the layout of a tuple: an ordered list of typed, optionally named fields.
///
/// Every field type has a fixed width, so the serialized size of a tuple is the
/// sum of the field widths. Two descriptors are equal iff their field types match
/// position-wise.
#[derive(Debug, Clone)]
pub struct TupleDesc {
    /// Ordered list of fields
    fields: Vec<FieldDesc>,

    /// Total serialized size in bytes
    size: usize,
}

impl TupleDesc {
    /// Creates a descriptor from a list of fields.
    pub fn new(fields: Vec<FieldDesc>) -> Self {
        let size = fields.iter().map(|f| f.data_type.size()).sum();
        Self { fields, size }
    }

    /// Creates a descriptor with anonymous fields of the given types.
    pub fn from_types(types: &[DataType]) -> Self {
        Self::new(types.iter().map(|t| FieldDesc::new(*t, None)).collect())
    }

    /// Creates a descriptor builder for fluent construction.
    pub fn builder() -> TupleDescBuilder {
        TupleDescBuilder::new()
    }

    /// Concatenates the fields of `a` and `b`.
    pub fn merge(a: &TupleDesc, b: &TupleDesc) -> TupleDesc {
        let fields = a.fields.iter().chain(b.fields.iter()).cloned().collect();
        TupleDesc::new(fields)
    }

    /// Returns a copy with every named field renamed to `prefix.name`.
    /// Anonymous fields become `prefix.null`.
    pub fn with_prefix(&self, prefix: &str) -> TupleDesc {
        let fields = self
            .fields
            .iter()
            .map(|f| {
                let name = format!("{}.{}", prefix, f.name().unwrap_or("null"));
                FieldDesc::new(f.data_type, Some(name))
            })
            .collect();
        TupleDesc::new(fields)
    }

    /// Returns the number of fields.
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Returns the field at the given index.
    pub fn field(&self, index: usize) -> Option<&FieldDesc> {
        self.fields.get(index)
    }

    /// Returns the type of the field at the given index.
    pub fn field_type(&self, index: usize) -> Option<&DataType> {
        self.fields.get(index).map(|f| &f.data_type)
    }

    /// Returns the name of the field at the given index, if it has one.
    pub fn field_name(&self, index: usize) -> Option<&str> {
        self.fields.get(index).and_then(|f| f.name())
    }

    /// Returns the index of the first field with the given name.
    pub fn field_name_to_index(&self, name: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|f| f.name() == Some(name))
            .ok_or_else(|| DbError::NoSuchField(name.to_string()))
    }

    /// Returns an iterator over all fields.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDesc> {
        self.fields.iter()
    }

    /// Returns the serialized size of a tuple with this descriptor in bytes.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl PartialEq for TupleDesc {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|(a, b)| a.data_type == b.data_type)
    }
}

impl Eq for TupleDesc {}

impl fmt::Display for TupleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|field| format!("{}({})", field.name().unwrap_or("null"), field.data_type))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Builder for constructing descriptors fluently.
pub struct TupleDescBuilder {
    fields: Vec<FieldDesc>,
}

impl TupleDescBuilder {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Adds a named field.
    pub fn field(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.fields.push(FieldDesc::new(data_type, Some(name.into())));
        self
    }

    /// Adds an anonymous field.
    pub fn anonymous(mut self, data_type: DataType) -> Self {
        self.fields.push(FieldDesc::new(data_type, None));
        self
    }

    pub fn build(self) -> TupleDesc {
        TupleDesc::new(self.fields)
    }

    /// Builds the descriptor wrapped in an Arc for shared ownership.
    pub fn build_arc(self) -> Arc<TupleDesc> {
        Arc::new(self.build())
    }
}

impl Default for TupleDescBuilder {
    fn default() -> Self {
        Self::new()
    }
}
