//! Grouped aggregation.
//!
//! Aggregators fold tuples into per-group running results without buffering
//! the input. [`Aggregate`] wraps a child operator and an aggregator chosen by
//! the type of the aggregated field.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::common::{DbError, Result};
use crate::tuple::{DataType, FieldDesc, Tuple, TupleDesc, Value};

use super::{IterState, OpIterator, Operator, TupleIterator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateOp::Count => "count",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
        };
        f.write_str(name)
    }
}

/// Key of one aggregation group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    /// The single group of an ungrouped aggregation
    NoGroup,
    Value(Value),
}

/// Group-by field index and its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupBy {
    pub field: usize,
    pub data_type: DataType,
}

impl GroupBy {
    pub fn new(field: usize, data_type: DataType) -> Self {
        Self { field, data_type }
    }
}

/// Folds tuples into per-group aggregate results.
pub trait Aggregator: Send {
    /// Merges one input tuple into its group's running result.
    fn merge_tuple_into_group(&mut self, tuple: &Tuple) -> Result<()>;

    /// Materializes one tuple per group: `(group, aggregate)` when grouped,
    /// `(aggregate)` otherwise. Group order is unspecified.
    fn iterator(&self) -> Result<TupleIterator>;

    /// Descriptor of the result tuples.
    fn tuple_desc(&self) -> &Arc<TupleDesc>;
}

fn result_desc(group_by: Option<GroupBy>, aggregate_type: DataType) -> Arc<TupleDesc> {
    let mut types = Vec::with_capacity(2);
    if let Some(group_by) = group_by {
        types.push(group_by.data_type);
    }
    types.push(aggregate_type);
    Arc::new(TupleDesc::from_types(&types))
}

fn group_key(group_by: Option<GroupBy>, tuple: &Tuple) -> Result<GroupKey> {
    match group_by {
        None => Ok(GroupKey::NoGroup),
        Some(group_by) => {
            let value = tuple
                .value(group_by.field)
                .ok_or_else(|| DbError::NoSuchField(group_by.field.to_string()))?;
            if !value.fits(&group_by.data_type) {
                return Err(DbError::TypeMismatch(format!(
                    "group value {} is not a {}",
                    value, group_by.data_type
                )));
            }
            Ok(GroupKey::Value(value.clone()))
        }
    }
}

fn result_tuples(
    desc: &Arc<TupleDesc>,
    groups: impl Iterator<Item = (GroupKey, Value)>,
) -> Result<Vec<Tuple>> {
    groups
        .map(|(key, aggregate)| {
            let values = match key {
                GroupKey::NoGroup => vec![aggregate],
                GroupKey::Value(group) => vec![group, aggregate],
            };
            Tuple::new(Arc::clone(desc), values)
        })
        .collect()
}

/// Running result of one group of an integer aggregate.
#[derive(Debug, Clone, Copy, Default)]
struct IntegerGroup {
    count: i64,
    /// Sum, min or max so far
    value: i64,
    /// Running mean for AVG
    mean: f64,
}

impl IntegerGroup {
    fn merge(&mut self, op: AggregateOp, x: i64) -> Result<()> {
        let n = self.count;
        match op {
            AggregateOp::Count => {}
            AggregateOp::Sum => {
                self.value = if n == 0 {
                    x
                } else {
                    self.value.checked_add(x).ok_or_else(|| {
                        DbError::Overflow(format!("SUM of {} and {}", self.value, x))
                    })?
                }
            }
            AggregateOp::Min => self.value = if n == 0 { x } else { self.value.min(x) },
            AggregateOp::Max => self.value = if n == 0 { x } else { self.value.max(x) },
            AggregateOp::Avg => {
                self.mean = if n == 0 {
                    x as f64
                } else {
                    (self.mean * n as f64 + x as f64) / (n + 1) as f64
                }
            }
        }
        self.count = n + 1;
        Ok(())
    }

    fn result(&self, op: AggregateOp) -> Value {
        match op {
            AggregateOp::Count => Value::BigInt(self.count),
            AggregateOp::Avg => Value::Double(self.mean),
            AggregateOp::Sum | AggregateOp::Min | AggregateOp::Max => Value::BigInt(self.value),
        }
    }
}

/// Aggregates an `Integer` or `BigInt` field.
///
/// COUNT, SUM, MIN and MAX produce `BigInt`; AVG produces `Double`.
pub struct IntegerAggregator {
    group_by: Option<GroupBy>,
    field: usize,
    op: AggregateOp,
    groups: HashMap<GroupKey, IntegerGroup>,
    desc: Arc<TupleDesc>,
}

impl IntegerAggregator {
    pub fn new(group_by: Option<GroupBy>, field: usize, op: AggregateOp) -> Self {
        let aggregate_type = match op {
            AggregateOp::Avg => DataType::Double,
            _ => DataType::BigInt,
        };
        Self {
            group_by,
            field,
            op,
            groups: HashMap::new(),
            desc: result_desc(group_by, aggregate_type),
        }
    }
}

impl Aggregator for IntegerAggregator {
    fn merge_tuple_into_group(&mut self, tuple: &Tuple) -> Result<()> {
        let x = tuple
            .value(self.field)
            .ok_or_else(|| DbError::NoSuchField(self.field.to_string()))?
            .as_i64()
            .ok_or_else(|| {
                DbError::TypeMismatch(format!("field {} is not an integer", self.field))
            })?;

        let key = group_key(self.group_by, tuple)?;
        self.groups.entry(key).or_default().merge(self.op, x)
    }

    fn iterator(&self) -> Result<TupleIterator> {
        let op = self.op;
        let tuples = result_tuples(
            &self.desc,
            self.groups
                .iter()
                .map(|(key, group)| (key.clone(), group.result(op))),
        )?;
        Ok(TupleIterator::new(Arc::clone(&self.desc), tuples))
    }

    fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }
}

/// Counts a `VarChar` field. Only COUNT is supported.
pub struct StringAggregator {
    group_by: Option<GroupBy>,
    field: usize,
    counts: HashMap<GroupKey, i64>,
    desc: Arc<TupleDesc>,
}

impl StringAggregator {
    pub fn new(group_by: Option<GroupBy>, field: usize, op: AggregateOp) -> Result<Self> {
        if op != AggregateOp::Count {
            return Err(DbError::UnsupportedAggregate {
                op: op.to_string(),
                data_type: "string".to_string(),
            });
        }
        Ok(Self {
            group_by,
            field,
            counts: HashMap::new(),
            desc: result_desc(group_by, DataType::BigInt),
        })
    }
}

impl Aggregator for StringAggregator {
    fn merge_tuple_into_group(&mut self, tuple: &Tuple) -> Result<()> {
        let value = tuple
            .value(self.field)
            .ok_or_else(|| DbError::NoSuchField(self.field.to_string()))?;
        if value.as_str().is_none() {
            return Err(DbError::TypeMismatch(format!(
                "field {} is not a string",
                self.field
            )));
        }

        let key = group_key(self.group_by, tuple)?;
        *self.counts.entry(key).or_default() += 1;
        Ok(())
    }

    fn iterator(&self) -> Result<TupleIterator> {
        let tuples = result_tuples(
            &self.desc,
            self.counts
                .iter()
                .map(|(key, count)| (key.clone(), Value::BigInt(*count))),
        )?;
        Ok(TupleIterator::new(Arc::clone(&self.desc), tuples))
    }

    fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }
}

/// Aggregation operator over a child.
///
/// The child is drained on `open`; output columns are named after the group
/// field and `op(field)`.
pub struct Aggregate {
    child: Box<dyn OpIterator>,
    field: usize,
    group_field: Option<usize>,
    op: AggregateOp,
    desc: Arc<TupleDesc>,
    results: Option<TupleIterator>,
    state: IterState,
}

impl Aggregate {
    pub fn new(
        child: Box<dyn OpIterator>,
        field: usize,
        group_field: Option<usize>,
        op: AggregateOp,
    ) -> Result<Self> {
        let child_desc = Arc::clone(child.tuple_desc());
        // Builds an aggregator up front so unsupported combinations fail here
        let aggregator = Self::make_aggregator(&child_desc, field, group_field, op)?;

        let mut fields = Vec::with_capacity(2);
        if let Some(group_field) = group_field {
            let data_type = *child_desc
                .field_type(group_field)
                .ok_or_else(|| DbError::NoSuchField(group_field.to_string()))?;
            let name = child_desc.field_name(group_field).map(str::to_string);
            fields.push(FieldDesc::new(data_type, name));
        }
        let aggregate_type = aggregator
            .tuple_desc()
            .fields()
            .last()
            .map_or(DataType::BigInt, |f| *f.data_type());
        let aggregate_name = format!(
            "{}({})",
            op,
            child_desc.field_name(field).unwrap_or("null")
        );
        fields.push(FieldDesc::new(aggregate_type, Some(aggregate_name)));

        Ok(Self {
            child,
            field,
            group_field,
            op,
            desc: Arc::new(TupleDesc::new(fields)),
            results: None,
            state: IterState::default(),
        })
    }

    fn make_aggregator(
        child_desc: &TupleDesc,
        field: usize,
        group_field: Option<usize>,
        op: AggregateOp,
    ) -> Result<Box<dyn Aggregator>> {
        let field_type = *child_desc
            .field_type(field)
            .ok_or_else(|| DbError::NoSuchField(field.to_string()))?;
        let group_by = match group_field {
            Some(index) => {
                let data_type = *child_desc
                    .field_type(index)
                    .ok_or_else(|| DbError::NoSuchField(index.to_string()))?;
                Some(GroupBy::new(index, data_type))
            }
            None => None,
        };

        match field_type {
            t if t.is_integral() => Ok(Box::new(IntegerAggregator::new(group_by, field, op))),
            DataType::VarChar(_) => Ok(Box::new(StringAggregator::new(group_by, field, op)?)),
            other => Err(DbError::UnsupportedAggregate {
                op: op.to_string(),
                data_type: other.to_string(),
            }),
        }
    }

    pub fn op(&self) -> AggregateOp {
        self.op
    }

    pub fn aggregate_field(&self) -> usize {
        self.field
    }

    pub fn group_field(&self) -> Option<usize> {
        self.group_field
    }
}

impl Operator for Aggregate {
    fn state(&mut self) -> &mut IterState {
        &mut self.state
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        let Some(results) = self.results.as_mut() else {
            return Ok(None);
        };
        if !results.has_next()? {
            return Ok(None);
        }
        Ok(Some(results.next()?.with_desc(Arc::clone(&self.desc))?))
    }

    fn open_inner(&mut self) -> Result<()> {
        let mut aggregator = Self::make_aggregator(
            self.child.tuple_desc(),
            self.field,
            self.group_field,
            self.op,
        )?;

        self.child.open()?;
        while self.child.has_next()? {
            aggregator.merge_tuple_into_group(&self.child.next()?)?;
        }

        let mut results = aggregator.iterator()?;
        results.open()?;
        self.results = Some(results);
        Ok(())
    }

    fn close_inner(&mut self) {
        self.child.close();
        self.results = None;
    }

    fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }
}
