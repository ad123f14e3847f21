use std::sync::Arc;

use crate::common::Result;
use crate::tuple::{Tuple, TupleDesc};

use super::{IterState, Operator};

/// Iterates over an in-memory list of tuples.
pub struct TupleIterator {
    desc: Arc<TupleDesc>,
    tuples: Vec<Tuple>,
    position: usize,
    state: IterState,
}

impl TupleIterator {
    pub fn new(desc: Arc<TupleDesc>, tuples: Vec<Tuple>) -> Self {
        Self {
            desc,
            tuples,
            position: 0,
            state: IterState::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }
}

impl Operator for TupleIterator {
    fn state(&mut self) -> &mut IterState {
        &mut self.state
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        let next = self.tuples.get(self.position).cloned();
        if next.is_some() {
            self.position += 1;
        }
        Ok(next)
    }

    fn open_inner(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::DbError;
    use crate::execution::{collect_tuples, OpIterator};
    use crate::tuple::{DataType, Value};

    fn iter_of(values: &[i32]) -> TupleIterator {
        let desc = Arc::new(TupleDesc::from_types(&[DataType::Integer]));
        let tuples = values
            .iter()
            .map(|&v| Tuple::new(Arc::clone(&desc), vec![Value::Integer(v)]).unwrap())
            .collect();
        TupleIterator::new(desc, tuples)
    }

    #[test]
    fn test_not_open() {
        let mut iter = iter_of(&[1]);
        assert!(matches!(iter.has_next(), Err(DbError::IteratorNotOpen)));
        assert!(matches!(iter.next(), Err(DbError::IteratorNotOpen)));

        iter.open().unwrap();
        iter.close();
        assert!(matches!(iter.next(), Err(DbError::IteratorNotOpen)));
    }

    #[test]
    fn test_iterates_then_exhausts() {
        let mut iter = iter_of(&[1, 2, 3]);
        iter.open().unwrap();

        let tuples = collect_tuples(&mut iter).unwrap();
        assert_eq!(tuples.len(), 3);
        assert_eq!(tuples[2].value(0), Some(&Value::Integer(3)));

        assert!(!iter.has_next().unwrap());
        assert!(matches!(iter.next(), Err(DbError::NoSuchElement)));
    }

    #[test]
    fn test_has_next_does_not_consume() {
        let mut iter = iter_of(&[7]);
        iter.open().unwrap();
        assert!(iter.has_next().unwrap());
        assert!(iter.has_next().unwrap());
        assert_eq!(iter.next().unwrap().value(0), Some(&Value::Integer(7)));
    }

    #[test]
    fn test_rewind_restarts() {
        let mut iter = iter_of(&[1, 2]);
        iter.open().unwrap();
        iter.next().unwrap();
        iter.next().unwrap();

        iter.rewind().unwrap();
        assert_eq!(collect_tuples(&mut iter).unwrap().len(), 2);
    }
}
