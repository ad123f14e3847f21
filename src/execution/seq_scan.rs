use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::common::{Result, TransactionId};
use crate::execution::OpIterator;
use crate::storage::HeapFileIterator;
use crate::tuple::{Tuple, TupleDesc};

use super::{IterState, Operator};

/// Scans every tuple of a table through the buffer pool.
///
/// Output field names are qualified as `alias.field`.
pub struct SeqScan {
    table_id: u32,
    alias: String,
    desc: Arc<TupleDesc>,
    inner: HeapFileIterator,
    state: IterState,
}

impl SeqScan {
    pub fn new(
        pool: Arc<BufferPool>,
        tid: TransactionId,
        table_id: u32,
        alias: &str,
    ) -> Result<Self> {
        let file = pool.catalog().heap_file(table_id)?;
        let desc = Arc::new(file.desc().with_prefix(alias));

        Ok(Self {
            table_id,
            alias: alias.to_string(),
            desc,
            inner: file.scan(pool, tid),
            state: IterState::default(),
        })
    }

    pub fn table_id(&self) -> u32 {
        self.table_id
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl Operator for SeqScan {
    fn state(&mut self) -> &mut IterState {
        &mut self.state
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        if !self.inner.has_next()? {
            return Ok(None);
        }
        let tuple = self.inner.next()?;
        Ok(Some(tuple.with_desc(Arc::clone(&self.desc))?))
    }

    fn open_inner(&mut self) -> Result<()> {
        self.inner.open()
    }

    fn close_inner(&mut self) {
        self.inner.close();
    }

    fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }
}
