//! Page-granular shared/exclusive locks with wait-for-graph deadlock detection.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::common::{DbError, PageId, Permission, Result, TransactionId};

/// Lock modes supported by the lock manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl LockMode {
    pub fn is_compatible_with(&self, other: &LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }
}

impl From<Permission> for LockMode {
    fn from(permission: Permission) -> Self {
        match permission {
            Permission::Read => LockMode::Shared,
            Permission::ReadWrite => LockMode::Exclusive,
        }
    }
}

#[derive(Debug, Default)]
struct LockTable {
    /// Granted locks per page
    holders: HashMap<PageId, HashMap<TransactionId, LockMode>>,
    /// Pages locked per transaction
    held: HashMap<TransactionId, HashSet<PageId>>,
    /// Wait-for graph: waiter -> holders it is blocked on
    waits_for: HashMap<TransactionId, HashSet<TransactionId>>,
}

impl LockTable {
    /// Holders of `page_id` whose locks conflict with `tid` taking `mode`.
    fn conflicting_holders(
        &self,
        tid: TransactionId,
        page_id: PageId,
        mode: LockMode,
    ) -> HashSet<TransactionId> {
        self.holders
            .get(&page_id)
            .map(|holders| {
                holders
                    .iter()
                    .filter(|(holder, held)| **holder != tid && !held.is_compatible_with(&mode))
                    .map(|(holder, _)| *holder)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn grant(&mut self, tid: TransactionId, page_id: PageId, mode: LockMode) {
        let held = self.holders.entry(page_id).or_default().entry(tid).or_insert(mode);
        *held = (*held).max(mode);
        self.held.entry(tid).or_default().insert(page_id);
    }

    /// True if `tid` can reach itself by following wait-for edges.
    fn reaches_itself(&self, tid: TransactionId) -> bool {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<TransactionId> = self
            .waits_for
            .get(&tid)
            .map(|holders| holders.iter().copied().collect())
            .unwrap_or_default();

        while let Some(current) = queue.pop_front() {
            if current == tid {
                return true;
            }
            if visited.insert(current) {
                if let Some(next) = self.waits_for.get(&current) {
                    queue.extend(next.iter().copied());
                }
            }
        }

        false
    }
}

/// Grants page locks to transactions under strict two-phase locking.
///
/// A transaction keeps every lock until [`LockManager::release_all`]. Blocked
/// requests record wait-for edges; a request that would close a cycle fails
/// with [`DbError::TransactionAborted`] instead of waiting.
pub struct LockManager {
    table: Mutex<LockTable>,
    released: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            released: Condvar::new(),
        }
    }

    /// Acquires a lock on `page_id` for `tid`, blocking while other
    /// transactions hold conflicting locks.
    ///
    /// A held lock of equal or stronger mode is reported as granted. A shared
    /// lock held alone is upgraded to exclusive in place.
    pub fn acquire(&self, tid: TransactionId, page_id: PageId, mode: LockMode) -> Result<()> {
        let mut table = self.table.lock();

        loop {
            let conflicts = table.conflicting_holders(tid, page_id, mode);
            if conflicts.is_empty() {
                table.grant(tid, page_id, mode);
                table.waits_for.remove(&tid);
                debug!(%tid, %page_id, ?mode, "lock granted");
                return Ok(());
            }

            table.waits_for.insert(tid, conflicts);
            if table.reaches_itself(tid) {
                table.waits_for.remove(&tid);
                warn!(%tid, %page_id, ?mode, "deadlock detected, aborting requester");
                return Err(DbError::TransactionAborted(tid));
            }

            debug!(%tid, %page_id, ?mode, "waiting for lock");
            self.released.wait(&mut table);
        }
    }

    /// Releases every lock held by `tid` and wakes all waiters.
    pub fn release_all(&self, tid: TransactionId) {
        let mut table = self.table.lock();

        if let Some(pages) = table.held.remove(&tid) {
            for page_id in pages {
                if let Some(holders) = table.holders.get_mut(&page_id) {
                    holders.remove(&tid);
                    if holders.is_empty() {
                        table.holders.remove(&page_id);
                    }
                }
            }
        }

        table.waits_for.remove(&tid);
        for waiting_on in table.waits_for.values_mut() {
            waiting_on.remove(&tid);
        }

        drop(table);
        self.released.notify_all();
    }

    /// True if `tid` holds any lock on `page_id`.
    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_mode(tid, page_id).is_some()
    }

    /// The mode in which `tid` holds `page_id`, if at all.
    pub fn lock_mode(&self, tid: TransactionId, page_id: PageId) -> Option<LockMode> {
        let table = self.table.lock();
        table
            .holders
            .get(&page_id)
            .and_then(|holders| holders.get(&tid))
            .copied()
    }

    /// Pages currently locked by `tid`, in ascending order.
    pub fn pages_locked_by(&self, tid: TransactionId) -> Vec<PageId> {
        let table = self.table.lock();
        let mut pages: Vec<PageId> = table
            .held
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default();
        pages.sort();
        pages
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn pid(n: u32) -> PageId {
        PageId::new(1, n)
    }

    #[test]
    fn test_shared_locks_are_compatible() {
        let lm = LockManager::new();
        let t1 = TransactionId::new();
        let t2 = TransactionId::new();

        lm.acquire(t1, pid(0), LockMode::Shared).unwrap();
        lm.acquire(t2, pid(0), LockMode::Shared).unwrap();

        assert_eq!(lm.lock_mode(t1, pid(0)), Some(LockMode::Shared));
        assert_eq!(lm.lock_mode(t2, pid(0)), Some(LockMode::Shared));
    }

    #[test]
    fn test_reacquire_and_upgrade() {
        let lm = LockManager::new();
        let t1 = TransactionId::new();

        lm.acquire(t1, pid(0), LockMode::Shared).unwrap();
        lm.acquire(t1, pid(0), LockMode::Exclusive).unwrap();
        assert_eq!(lm.lock_mode(t1, pid(0)), Some(LockMode::Exclusive));

        // Weaker request keeps the stronger lock
        lm.acquire(t1, pid(0), LockMode::Shared).unwrap();
        assert_eq!(lm.lock_mode(t1, pid(0)), Some(LockMode::Exclusive));
        assert_eq!(lm.pages_locked_by(t1), vec![pid(0)]);
    }

    #[test]
    fn test_release_all() {
        let lm = LockManager::new();
        let t1 = TransactionId::new();

        lm.acquire(t1, pid(2), LockMode::Exclusive).unwrap();
        lm.acquire(t1, pid(1), LockMode::Shared).unwrap();
        assert_eq!(lm.pages_locked_by(t1), vec![pid(1), pid(2)]);

        lm.release_all(t1);
        assert!(!lm.holds_lock(t1, pid(1)));
        assert!(!lm.holds_lock(t1, pid(2)));
        assert!(lm.pages_locked_by(t1).is_empty());
    }

    #[test]
    fn test_exclusive_blocks_until_release() {
        let lm = Arc::new(LockManager::new());
        let t1 = TransactionId::new();
        let t2 = TransactionId::new();
        lm.acquire(t1, pid(0), LockMode::Exclusive).unwrap();

        let acquired = Arc::new(AtomicBool::new(false));
        let handle = {
            let lm = Arc::clone(&lm);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                lm.acquire(t2, pid(0), LockMode::Shared).unwrap();
                acquired.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!acquired.load(Ordering::SeqCst));

        lm.release_all(t1);
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
        assert_eq!(lm.lock_mode(t2, pid(0)), Some(LockMode::Shared));
    }

    #[test]
    fn test_upgrade_waits_for_other_reader() {
        let lm = Arc::new(LockManager::new());
        let t1 = TransactionId::new();
        let t2 = TransactionId::new();
        lm.acquire(t1, pid(0), LockMode::Shared).unwrap();
        lm.acquire(t2, pid(0), LockMode::Shared).unwrap();

        let handle = {
            let lm = Arc::clone(&lm);
            thread::spawn(move || lm.acquire(t1, pid(0), LockMode::Exclusive))
        };

        thread::sleep(Duration::from_millis(100));
        lm.release_all(t2);
        handle.join().unwrap().unwrap();
        assert_eq!(lm.lock_mode(t1, pid(0)), Some(LockMode::Exclusive));
    }

    #[test]
    fn test_deadlock_aborts_requester() {
        let lm = Arc::new(LockManager::new());
        let t1 = TransactionId::new();
        let t2 = TransactionId::new();
        lm.acquire(t1, pid(0), LockMode::Exclusive).unwrap();
        lm.acquire(t2, pid(1), LockMode::Exclusive).unwrap();

        // t1 blocks on page 1 held by t2
        let handle = {
            let lm = Arc::clone(&lm);
            thread::spawn(move || lm.acquire(t1, pid(1), LockMode::Exclusive))
        };
        thread::sleep(Duration::from_millis(100));

        // t2 asking for page 0 closes the cycle
        let err = lm.acquire(t2, pid(0), LockMode::Exclusive).unwrap_err();
        assert!(matches!(err, DbError::TransactionAborted(t) if t == t2));
        assert!(err.is_retryable());

        lm.release_all(t2);
        handle.join().unwrap().unwrap();
        assert_eq!(lm.lock_mode(t1, pid(1)), Some(LockMode::Exclusive));
    }
}
