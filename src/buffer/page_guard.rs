use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{DbError, PageId, Permission, Result};
use crate::storage::page::HeapPage;

use super::FrameHeader;

/// Callback run once when a guard is dropped
pub(crate) type ReleaseCallback = Box<dyn FnOnce(&Arc<FrameHeader>) + Send + Sync>;

/// RAII handle to a cached page, returned by `BufferPool::get_page`.
///
/// The page stays pinned in the pool for the guard's lifetime. The page lock
/// held by the transaction outlives the guard.
pub struct PageGuard {
    frame: Arc<FrameHeader>,
    permission: Permission,
    release_callback: Option<ReleaseCallback>,
}

impl PageGuard {
    pub(crate) fn new(
        frame: Arc<FrameHeader>,
        permission: Permission,
        release_callback: ReleaseCallback,
    ) -> Self {
        frame.pin();
        Self {
            frame,
            permission,
            release_callback: Some(release_callback),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.frame.page_id()
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    pub fn read(&self) -> RwLockReadGuard<'_, HeapPage> {
        self.frame.read()
    }

    /// Mutable access to the page. Fails unless fetched with `ReadWrite`.
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, HeapPage>> {
        match self.permission {
            Permission::ReadWrite => Ok(self.frame.write()),
            Permission::Read => Err(DbError::ReadOnlyPage(self.page_id())),
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(callback) = self.release_callback.take() {
            callback(&self.frame);
        }
    }
}
