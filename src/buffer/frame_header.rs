use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, TransactionId};
use crate::storage::page::HeapPage;

/// FrameHeader holds one cached page and its buffer pool metadata.
pub struct FrameHeader {
    page_id: PageId,
    /// Number of live page guards on this frame
    pin_count: AtomicU32,
    /// Transaction holding uncommitted changes to the page, if any
    dirtied_by: Mutex<Option<TransactionId>>,
    page: RwLock<HeapPage>,
}

impl FrameHeader {
    pub fn new(page: HeapPage) -> Self {
        Self {
            page_id: page.page_id(),
            pin_count: AtomicU32::new(0),
            dirtied_by: Mutex::new(None),
            page: RwLock::new(page),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the new value.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value.
    /// Returns None if the pin count was already 0.
    pub fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            })
            .ok()
            .map(|previous| previous - 1)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirtied_by.lock().is_some()
    }

    pub fn dirtied_by(&self) -> Option<TransactionId> {
        *self.dirtied_by.lock()
    }

    /// Records the transaction that modified the page, or clears it after a flush.
    pub fn set_dirtied_by(&self, tid: Option<TransactionId>) {
        *self.dirtied_by.lock() = tid;
    }

    pub fn read(&self) -> RwLockReadGuard<'_, HeapPage> {
        self.page.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, HeapPage> {
        self.page.write()
    }
}
