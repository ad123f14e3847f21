use std::cmp::Ordering;
use std::fmt;

use crate::tuple::{Tuple, Value};

/// Comparison operators usable in predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEq,
    GreaterThan,
    GreaterThanOrEq,
    /// Substring match on strings; equality on other types.
    Like,
}

impl CompareOp {
    /// Applies the operator to two values using [`Value::compare`], so numeric
    /// values match across variants. Values of incomparable types never
    /// satisfy any operator except `NotEquals`.
    pub fn apply(&self, left: &Value, right: &Value) -> bool {
        if let (CompareOp::Like, Value::String(l), Value::String(r)) = (self, left, right) {
            return l.contains(r.as_str());
        }

        let ordering = match left.compare(right) {
            Some(ordering) => ordering,
            None => return *self == CompareOp::NotEquals,
        };

        match self {
            CompareOp::Equals | CompareOp::Like => ordering == Ordering::Equal,
            CompareOp::NotEquals => ordering != Ordering::Equal,
            CompareOp::LessThan => ordering == Ordering::Less,
            CompareOp::LessThanOrEq => ordering != Ordering::Greater,
            CompareOp::GreaterThan => ordering == Ordering::Greater,
            CompareOp::GreaterThanOrEq => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Equals => "=",
            CompareOp::NotEquals => "<>",
            CompareOp::LessThan => "<",
            CompareOp::LessThanOrEq => "<=",
            CompareOp::GreaterThan => ">",
            CompareOp::GreaterThanOrEq => ">=",
            CompareOp::Like => "LIKE",
        };
        f.write_str(symbol)
    }
}

/// Compares field `field1` of a left tuple with field `field2` of a right tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinPredicate {
    field1: usize,
    op: CompareOp,
    field2: usize,
}

impl JoinPredicate {
    pub fn new(field1: usize, op: CompareOp, field2: usize) -> Self {
        Self { field1, op, field2 }
    }

    pub fn field1(&self) -> usize {
        self.field1
    }

    pub fn field2(&self) -> usize {
        self.field2
    }

    pub fn op(&self) -> CompareOp {
        self.op
    }

    /// True if the pair satisfies the predicate. A missing field never matches.
    pub fn filter(&self, left: &Tuple, right: &Tuple) -> bool {
        match (left.value(self.field1), right.value(self.field2)) {
            (Some(l), Some(r)) => self.op.apply(l, r),
            _ => false,
        }
    }
}

impl fmt::Display for JoinPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$left.{} {} $right.{}", self.field1, self.op, self.field2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_comparisons() {
        let one = Value::Integer(1);
        let two = Value::Integer(2);

        assert!(CompareOp::LessThan.apply(&one, &two));
        assert!(CompareOp::LessThanOrEq.apply(&one, &one));
        assert!(CompareOp::GreaterThan.apply(&two, &one));
        assert!(CompareOp::GreaterThanOrEq.apply(&two, &two));
        assert!(CompareOp::NotEquals.apply(&one, &two));
        assert!(!CompareOp::Equals.apply(&one, &two));
        assert!(CompareOp::Equals.apply(&Value::Integer(5), &Value::BigInt(5)));
        assert!(CompareOp::Equals.apply(&Value::BigInt(5), &Value::Double(5.0)));
        assert!(CompareOp::LessThan.apply(&Value::BigInt(5), &Value::Double(5.5)));
    }

    #[test]
    fn test_like() {
        let hay = Value::from("database");
        assert!(CompareOp::Like.apply(&hay, &Value::from("tab")));
        assert!(!CompareOp::Like.apply(&hay, &Value::from("xyz")));
        assert!(CompareOp::Like.apply(&Value::Integer(3), &Value::Integer(3)));
    }

    #[test]
    fn test_incomparable_types() {
        let s = Value::from("1");
        let i = Value::Integer(1);
        assert!(!CompareOp::Equals.apply(&s, &i));
        assert!(CompareOp::NotEquals.apply(&s, &i));
    }
}
