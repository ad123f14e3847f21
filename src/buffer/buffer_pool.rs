use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::common::{DbError, PageId, Permission, Result, TransactionId};
use crate::concurrency::LockManager;
use crate::storage::page::HeapPage;
use crate::tuple::Tuple;

use super::{FrameHeader, LruKReplacer, PageGuard, ReleaseCallback};

#[derive(Default)]
struct PoolTables {
    /// Cached pages
    page_table: HashMap<PageId, Arc<FrameHeader>>,
    /// Pages each running transaction has modified
    dirty_pages: HashMap<TransactionId, HashSet<PageId>>,
    /// Slots reserved by misses whose page is being read from disk
    loading: usize,
}

/// State shared with page guard release callbacks
struct BufferPoolState {
    tables: Mutex<PoolTables>,
    /// Tracks clean, unpinned pages only
    replacer: LruKReplacer,
}

impl BufferPoolState {
    /// Makes the frame a replacement candidate if it is still the cached
    /// copy of its page, clean and unpinned. Caller holds the tables lock.
    fn maybe_evictable(&self, tables: &PoolTables, frame: &Arc<FrameHeader>) {
        let page_id = frame.page_id();
        let is_cached = tables
            .page_table
            .get(&page_id)
            .is_some_and(|cached| Arc::ptr_eq(cached, frame));

        if is_cached && frame.pin_count() == 0 && !frame.is_dirty() {
            self.replacer.set_evictable(page_id, true);
        }
    }
}

/// BufferPool caches heap pages in memory, at most `capacity` at a time, and
/// is the only path by which transactions reach page contents.
///
/// Every fetch first takes a page lock through the [`LockManager`], so
/// transactions see strict two-phase locking. The pool never writes a page
/// holding uncommitted changes: dirty pages are pinned in memory until their
/// transaction commits (pages are flushed) or aborts (pages are dropped and
/// re-read from disk on next use).
pub struct BufferPool {
    capacity: usize,
    catalog: Arc<Catalog>,
    lock_manager: LockManager,
    state: Arc<BufferPoolState>,
}

impl BufferPool {
    /// Creates a pool holding up to `capacity` pages, evicting by LRU-`k`.
    pub fn new(capacity: usize, k: usize, catalog: Arc<Catalog>) -> Self {
        let state = Arc::new(BufferPoolState {
            tables: Mutex::new(PoolTables::default()),
            replacer: LruKReplacer::new(k),
        });

        Self {
            capacity,
            catalog,
            lock_manager: LockManager::new(),
            state,
        }
    }

    /// Fetches a page on behalf of `tid`.
    ///
    /// Blocks until the page lock matching `permission` is granted and fails
    /// with [`DbError::TransactionAborted`] if waiting would deadlock. A miss
    /// loads the page from its heap file, evicting a clean page first when the
    /// pool is at capacity.
    pub fn get_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        permission: Permission,
    ) -> Result<PageGuard> {
        self.lock_manager.acquire(tid, page_id, permission.into())?;

        let mut tables = self.state.tables.lock();
        if !tables.page_table.contains_key(&page_id) {
            if tables.page_table.len() + tables.loading >= self.capacity {
                self.evict_page(&mut tables)?;
            }

            // Read without the pool mutex so other misses are not serialized
            tables.loading += 1;
            let loaded = MutexGuard::unlocked(&mut tables, || self.load_page(page_id));
            tables.loading -= 1;
            let page = loaded?;

            // Another miss on the same page may have won the race
            if let Entry::Vacant(entry) = tables.page_table.entry(page_id) {
                entry.insert(Arc::new(FrameHeader::new(page)));
                debug!(%page_id, %tid, "loaded page into buffer pool");
            }
        }
        let frame = tables
            .page_table
            .get(&page_id)
            .cloned()
            .ok_or(DbError::InvalidPage(page_id))?;

        self.state.replacer.record_access(page_id);
        self.state.replacer.set_evictable(page_id, false);
        Ok(PageGuard::new(frame, permission, self.release_callback()))
    }

    fn load_page(&self, page_id: PageId) -> Result<HeapPage> {
        self.catalog.heap_file(page_id.table_id())?.read_page(page_id)
    }

    fn release_callback(&self) -> ReleaseCallback {
        let state = Arc::clone(&self.state);
        Box::new(move |frame: &Arc<FrameHeader>| {
            let tables = state.tables.lock();
            if frame.unpin() == Some(0) {
                state.maybe_evictable(&tables, frame);
            }
        })
    }

    /// Drops the replacer's choice among clean, unpinned pages.
    fn evict_page(&self, tables: &mut PoolTables) -> Result<()> {
        while let Some(victim) = self.state.replacer.evict() {
            let evictable = tables
                .page_table
                .get(&victim)
                .is_some_and(|frame| frame.pin_count() == 0 && !frame.is_dirty());

            if evictable {
                tables.page_table.remove(&victim);
                debug!(page_id = %victim, "evicted page");
                return Ok(());
            }
        }

        Err(DbError::BufferPoolFull)
    }

    /// Records that `tid` modified the cached page. The page is pinned in
    /// memory until `tid` completes.
    pub fn mark_dirty(&self, page_id: PageId, tid: TransactionId) {
        let mut tables = self.state.tables.lock();
        if let Some(frame) = tables.page_table.get(&page_id) {
            frame.set_dirtied_by(Some(tid));
        }
        tables.dirty_pages.entry(tid).or_default().insert(page_id);
        self.state.replacer.set_evictable(page_id, false);
    }

    /// Ends `tid`: on commit its dirty pages are written to disk, on abort
    /// they are dropped from the cache. All of its locks are then released.
    ///
    /// If a write fails during commit, the pages not yet written are dropped
    /// as on abort and the error is returned; locks are still released.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<()> {
        let result = if commit {
            self.flush_transaction(tid)
        } else {
            self.discard_transaction(tid);
            Ok(())
        };

        self.lock_manager.release_all(tid);

        match (&result, commit) {
            (Ok(()), true) => info!(%tid, "transaction committed"),
            (Ok(()), false) => info!(%tid, "transaction aborted"),
            (Err(e), _) => info!(%tid, error = %e, "transaction commit failed"),
        }
        result
    }

    fn flush_transaction(&self, tid: TransactionId) -> Result<()> {
        let mut frames: Vec<Arc<FrameHeader>> = {
            let mut tables = self.state.tables.lock();
            let pages = tables.dirty_pages.remove(&tid).unwrap_or_default();
            pages
                .iter()
                .filter_map(|page_id| tables.page_table.get(page_id).cloned())
                .collect()
        };
        frames.sort_by_key(|frame| frame.page_id());

        for (i, frame) in frames.iter().enumerate() {
            if let Err(e) = self.write_frame(frame) {
                let mut tables = self.state.tables.lock();
                for frame in &frames[i..] {
                    self.drop_frame(&mut tables, frame);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn discard_transaction(&self, tid: TransactionId) {
        let mut tables = self.state.tables.lock();
        let pages = tables.dirty_pages.remove(&tid).unwrap_or_default();
        for page_id in pages {
            if let Some(frame) = tables.page_table.get(&page_id).cloned() {
                self.drop_frame(&mut tables, &frame);
            }
        }
    }

    /// Removes the frame from the cache if it is still the cached copy.
    fn drop_frame(&self, tables: &mut PoolTables, frame: &Arc<FrameHeader>) {
        let page_id = frame.page_id();
        let is_cached = tables
            .page_table
            .get(&page_id)
            .is_some_and(|cached| Arc::ptr_eq(cached, frame));

        if is_cached {
            tables.page_table.remove(&page_id);
            self.state.replacer.remove(page_id);
            debug!(%page_id, "discarded page");
        }
    }

    /// Writes the frame's page to its heap file and marks it clean.
    fn write_frame(&self, frame: &Arc<FrameHeader>) -> Result<()> {
        let page_id = frame.page_id();
        let file = self.catalog.heap_file(page_id.table_id())?;
        file.write_page(&frame.read())?;

        let tables = self.state.tables.lock();
        frame.set_dirtied_by(None);
        self.state.maybe_evictable(&tables, frame);
        debug!(%page_id, "flushed page");
        Ok(())
    }

    /// Writes every dirty page to disk regardless of which transaction
    /// modified it. This breaks the no-steal guarantee for running
    /// transactions and is meant for shutdown and tests.
    pub fn flush_all(&self) -> Result<()> {
        let frames: Vec<Arc<FrameHeader>> = {
            let tables = self.state.tables.lock();
            tables
                .page_table
                .values()
                .filter(|frame| frame.is_dirty())
                .cloned()
                .collect()
        };

        for frame in &frames {
            self.write_frame(frame)?;
        }
        Ok(())
    }

    /// Writes one page to disk if it is cached and dirty.
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        let frame = self.state.tables.lock().page_table.get(&page_id).cloned();
        match frame {
            Some(frame) if frame.is_dirty() => self.write_frame(&frame),
            _ => Ok(()),
        }
    }

    /// Drops a page from the cache without writing it.
    pub fn discard_page(&self, page_id: PageId) {
        let mut tables = self.state.tables.lock();
        if let Some(frame) = tables.page_table.get(&page_id).cloned() {
            self.drop_frame(&mut tables, &frame);
        }
    }

    /// Inserts a tuple into a table on behalf of `tid`.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: u32,
        tuple: Tuple,
    ) -> Result<Vec<PageId>> {
        let file = self.catalog.heap_file(table_id)?;
        let pages = file.insert_tuple(self, tid, tuple)?;
        for page_id in &pages {
            self.mark_dirty(*page_id, tid);
        }
        Ok(pages)
    }

    /// Deletes a tuple, located by its record id, on behalf of `tid`.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<Vec<PageId>> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| DbError::InvalidRecordId("tuple has no record id".into()))?;

        let file = self.catalog.heap_file(record_id.page_id.table_id())?;
        let pages = file.delete_tuple(self, tid, tuple)?;
        for page_id in &pages {
            self.mark_dirty(*page_id, tid);
        }
        Ok(pages)
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_manager.holds_lock(tid, page_id)
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cached_page_count(&self) -> usize {
        self.state.tables.lock().page_table.len()
    }

    /// True if the page is cached with uncommitted changes.
    pub fn is_dirty(&self, page_id: PageId) -> bool {
        self.state
            .tables
            .lock()
            .page_table
            .get(&page_id)
            .is_some_and(|frame| frame.is_dirty())
    }
}
