use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::buffer::BufferPool;
use crate::common::{DbError, PageId, Permission, Result, TransactionId};
use crate::execution::{IterState, Operator};
use crate::storage::disk::{DiskManager, DiskScheduler};
use crate::storage::page::HeapPage;
use crate::tuple::{Tuple, TupleDesc};

/// A table stored as an array of fixed-size heap pages in one file.
///
/// Page `n` occupies bytes `[n * page_size, (n + 1) * page_size)`. Reads and
/// writes go straight to disk; tuple mutations and scans go through the
/// buffer pool so they are covered by the caller's transaction.
pub struct HeapFile {
    table_id: u32,
    desc: Arc<TupleDesc>,
    page_size: usize,
    scheduler: DiskScheduler,
}

impl HeapFile {
    /// Opens (or creates) the heap file at `path`.
    ///
    /// Fails with `InvalidConfig` when a page would have more slots than a
    /// record id can address.
    pub fn open<P: AsRef<Path>>(
        table_id: u32,
        path: P,
        desc: Arc<TupleDesc>,
        page_size: usize,
    ) -> Result<Self> {
        let num_slots = HeapPage::slots_per_page(page_size, desc.size());
        if num_slots > HeapPage::MAX_SLOTS {
            return Err(DbError::InvalidConfig(format!(
                "{}-byte pages hold {} tuples of {} bytes, more than {} slots",
                page_size,
                num_slots,
                desc.size(),
                HeapPage::MAX_SLOTS
            )));
        }
        let disk_manager = Arc::new(DiskManager::new(path, page_size)?);
        Ok(Self {
            table_id,
            desc,
            page_size,
            scheduler: DiskScheduler::new(disk_manager),
        })
    }

    pub fn table_id(&self) -> u32 {
        self.table_id
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn path(&self) -> &Path {
        self.scheduler.disk_manager().path()
    }

    /// Number of whole pages in the file.
    pub fn page_count(&self) -> u32 {
        self.scheduler.disk_manager().get_num_pages()
    }

    /// Number of pages read from disk since the file was opened.
    pub fn disk_reads(&self) -> u32 {
        self.scheduler.disk_manager().get_num_reads()
    }

    /// Number of pages written to disk since the file was opened.
    pub fn disk_writes(&self) -> u32 {
        self.scheduler.disk_manager().get_num_writes()
    }

    /// Reads and decodes a page directly from disk.
    pub fn read_page(&self, page_id: PageId) -> Result<HeapPage> {
        if page_id.table_id() != self.table_id || page_id.page_no() >= self.page_count() {
            return Err(DbError::InvalidPage(page_id));
        }

        let data = self.scheduler.schedule_read_sync(page_id.page_no())?;
        HeapPage::decode(page_id, &data, Arc::clone(&self.desc), self.page_size)
    }

    /// Encodes a page and writes it at its offset. Durable on return.
    pub fn write_page(&self, page: &HeapPage) -> Result<()> {
        let page_id = page.page_id();
        if page_id.table_id() != self.table_id {
            return Err(DbError::InvalidPage(page_id));
        }

        let data = page.encode()?;
        self.scheduler.schedule_write_sync(page_id.page_no(), data)
    }

    /// Inserts a tuple into the first page with a free slot, appending a new
    /// page when every existing page is full. Returns the dirtied pages.
    ///
    /// Every page examined is locked exclusively for `tid`.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: Tuple,
    ) -> Result<Vec<PageId>> {
        if **tuple.desc() != *self.desc {
            return Err(DbError::SchemaMismatch {
                expected: self.desc.to_string(),
                actual: tuple.desc().to_string(),
            });
        }
        if HeapPage::slots_per_page(self.page_size, self.desc.size()) == 0 {
            return Err(DbError::RecordTooLarge {
                size: self.desc.size(),
                page_size: self.page_size,
            });
        }

        let mut page_no = 0;
        loop {
            while page_no < self.page_count() {
                let page_id = PageId::new(self.table_id, page_no);
                let guard = pool.get_page(tid, page_id, Permission::ReadWrite)?;
                let mut page = guard.write()?;

                if page.num_empty_slots() > 0 {
                    page.insert_tuple(tuple)?;
                    pool.mark_dirty(page_id, tid);
                    return Ok(vec![page_id]);
                }
                page_no += 1;
            }

            // Another transaction may claim the new page first; the scan then
            // simply continues past it.
            let appended = self.scheduler.disk_manager().allocate_page()?;
            debug!(table_id = self.table_id, page_no = appended, "appended empty page");
        }
    }

    /// Removes a tuple from the page named by its record id.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageId>> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| DbError::InvalidRecordId("tuple has no record id".into()))?;

        let page_id = record_id.page_id;
        if page_id.table_id() != self.table_id || page_id.page_no() >= self.page_count() {
            return Err(DbError::InvalidRecordId(format!(
                "{} does not belong to table {}",
                record_id, self.table_id
            )));
        }

        let guard = pool.get_page(tid, page_id, Permission::ReadWrite)?;
        guard.write()?.delete_tuple(tuple)?;
        pool.mark_dirty(page_id, tid);
        Ok(vec![page_id])
    }

    /// Returns a lazy iterator over every tuple, fetching pages through the
    /// buffer pool with read permission.
    pub fn scan(self: &Arc<Self>, pool: Arc<BufferPool>, tid: TransactionId) -> HeapFileIterator {
        HeapFileIterator::new(Arc::clone(self), pool, tid)
    }
}

/// Iterates a heap file page by page in slot order.
///
/// The page count is re-read whenever a page is exhausted, so pages appended
/// during the scan are visited.
pub struct HeapFileIterator {
    file: Arc<HeapFile>,
    pool: Arc<BufferPool>,
    tid: TransactionId,
    next_page_no: u32,
    page_tuples: VecDeque<Tuple>,
    state: IterState,
}

impl HeapFileIterator {
    pub fn new(file: Arc<HeapFile>, pool: Arc<BufferPool>, tid: TransactionId) -> Self {
        Self {
            file,
            pool,
            tid,
            next_page_no: 0,
            page_tuples: VecDeque::new(),
            state: IterState::default(),
        }
    }
}

impl Operator for HeapFileIterator {
    fn state(&mut self) -> &mut IterState {
        &mut self.state
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        loop {
            if let Some(tuple) = self.page_tuples.pop_front() {
                return Ok(Some(tuple));
            }
            if self.next_page_no >= self.file.page_count() {
                return Ok(None);
            }

            let page_id = PageId::new(self.file.table_id(), self.next_page_no);
            let guard = self.pool.get_page(self.tid, page_id, Permission::Read)?;
            self.page_tuples = guard.read().tuples().cloned().collect();
            self.next_page_no += 1;
        }
    }

    fn open_inner(&mut self) -> Result<()> {
        self.next_page_no = 0;
        self.page_tuples.clear();
        Ok(())
    }

    fn close_inner(&mut self) {
        self.page_tuples.clear();
    }

    fn desc(&self) -> &Arc<TupleDesc> {
        self.file.desc()
    }
}
