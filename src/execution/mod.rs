//! Pull-based query operators.
//!
//! Every operator implements [`OpIterator`]. Operators that produce tuples one
//! at a time implement the smaller [`Operator`] trait instead and get the
//! open/close bookkeeping and one-tuple lookahead from a blanket impl.

mod aggregate;
mod join;
mod predicate;
mod seq_scan;
mod tuple_iterator;

pub use aggregate::*;
pub use join::*;
pub use predicate::*;
pub use seq_scan::*;
pub use tuple_iterator::*;

use std::sync::Arc;

use crate::common::{DbError, Result};
use crate::tuple::{Tuple, TupleDesc};

/// The iterator protocol shared by scans and operators.
///
/// Calling `has_next` or `next` on an iterator that is not open fails with
/// [`DbError::IteratorNotOpen`]; calling `next` past the end fails with
/// [`DbError::NoSuchElement`].
pub trait OpIterator: Send {
    fn open(&mut self) -> Result<()>;
    fn has_next(&mut self) -> Result<bool>;
    fn next(&mut self) -> Result<Tuple>;
    /// Restarts iteration from the beginning. Equivalent to `close` then `open`.
    fn rewind(&mut self) -> Result<()>;
    fn close(&mut self);
    fn tuple_desc(&self) -> &Arc<TupleDesc>;
}

/// Open flag and lookahead slot of an [`Operator`].
#[derive(Debug, Default)]
pub struct IterState {
    open: bool,
    next: Option<Tuple>,
}

impl IterState {
    pub fn is_open(&self) -> bool {
        self.open
    }
}

/// An operator that produces its output one tuple at a time.
pub trait Operator: Send {
    fn state(&mut self) -> &mut IterState;

    /// Produces the next output tuple, or None when exhausted.
    /// Only called while the operator is open.
    fn fetch_next(&mut self) -> Result<Option<Tuple>>;

    /// Opens children and resets per-iteration state.
    fn open_inner(&mut self) -> Result<()> {
        Ok(())
    }

    fn close_inner(&mut self) {}

    fn desc(&self) -> &Arc<TupleDesc>;
}

impl<T: Operator> OpIterator for T {
    fn open(&mut self) -> Result<()> {
        self.open_inner()?;
        let state = self.state();
        state.open = true;
        state.next = None;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        if !self.state().open {
            return Err(DbError::IteratorNotOpen);
        }
        if self.state().next.is_none() {
            let next = self.fetch_next()?;
            self.state().next = next;
        }
        Ok(self.state().next.is_some())
    }

    fn next(&mut self) -> Result<Tuple> {
        if !self.has_next()? {
            return Err(DbError::NoSuchElement);
        }
        self.state().next.take().ok_or(DbError::NoSuchElement)
    }

    fn rewind(&mut self) -> Result<()> {
        self.close();
        self.open()
    }

    fn close(&mut self) {
        self.close_inner();
        let state = self.state();
        state.open = false;
        state.next = None;
    }

    fn tuple_desc(&self) -> &Arc<TupleDesc> {
        self.desc()
    }
}

/// Drains an open iterator into a vector.
pub fn collect_tuples(iter: &mut dyn OpIterator) -> Result<Vec<Tuple>> {
    let mut tuples = Vec::new();
    while iter.has_next()? {
        tuples.push(iter.next()?);
    }
    Ok(tuples)
}
