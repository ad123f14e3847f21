use std::sync::Arc;

use crate::common::Result;
use crate::tuple::{Tuple, TupleDesc};

use super::{IterState, JoinPredicate, OpIterator, Operator};

/// Nested-loop join.
///
/// For each left tuple the right child is scanned in full; every pair that
/// satisfies the predicate yields the left fields followed by the right
/// fields. The left tuple being matched is kept between calls so iteration
/// resumes inside the right scan.
pub struct Join {
    predicate: JoinPredicate,
    left: Box<dyn OpIterator>,
    right: Box<dyn OpIterator>,
    desc: Arc<TupleDesc>,
    /// Left tuple whose right scan is in progress
    current_left: Option<Tuple>,
    state: IterState,
}

impl Join {
    pub fn new(
        predicate: JoinPredicate,
        left: Box<dyn OpIterator>,
        right: Box<dyn OpIterator>,
    ) -> Self {
        let desc = Arc::new(TupleDesc::merge(left.tuple_desc(), right.tuple_desc()));
        Self {
            predicate,
            left,
            right,
            desc,
            current_left: None,
            state: IterState::default(),
        }
    }

    pub fn predicate(&self) -> &JoinPredicate {
        &self.predicate
    }

    /// Names of the two join fields, qualified as the children name them.
    pub fn join_field_names(&self) -> (Option<&str>, Option<&str>) {
        (
            self.left.tuple_desc().field_name(self.predicate.field1()),
            self.right.tuple_desc().field_name(self.predicate.field2()),
        )
    }
}

impl Operator for Join {
    fn state(&mut self) -> &mut IterState {
        &mut self.state
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        loop {
            if self.current_left.is_none() {
                if !self.left.has_next()? {
                    return Ok(None);
                }
                self.current_left = Some(self.left.next()?);
            }

            if let Some(left) = &self.current_left {
                while self.right.has_next()? {
                    let right = self.right.next()?;
                    if self.predicate.filter(left, &right) {
                        return Ok(Some(Tuple::merge(left, &right)));
                    }
                }
            }

            self.current_left = None;
            self.right.rewind()?;
        }
    }

    fn open_inner(&mut self) -> Result<()> {
        self.current_left = None;
        self.left.open()?;
        self.right.open()
    }

    fn close_inner(&mut self) {
        self.current_left = None;
        self.left.close();
        self.right.close();
    }

    fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }
}
