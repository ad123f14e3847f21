use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::common::PageId;

type Timestamp = u64;

/// Access history of one cached page
#[derive(Debug)]
struct PageAccessInfo {
    /// Last k access timestamps, most recent at back
    history: VecDeque<Timestamp>,
    is_evictable: bool,
}

impl PageAccessInfo {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Backward k-distance, or None (+inf) with fewer than k accesses.
    fn k_distance(&self, current_timestamp: Timestamp, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            Some(current_timestamp - self.history[self.history.len() - k])
        }
    }

    fn earliest_timestamp(&self) -> Option<Timestamp> {
        self.history.front().copied()
    }
}

struct ReplacerState {
    pages: HashMap<PageId, PageAccessInfo>,
    num_evictable: usize,
}

/// LRU-K Replacement Policy
///
/// Evicts the evictable page whose backward k-distance is the maximum of all
/// tracked pages. Backward k-distance is the difference between the current
/// timestamp and the timestamp of the kth previous access.
///
/// A page with fewer than k recorded accesses has +inf backward k-distance.
/// Ties among +inf pages go to the page with the earliest recorded access.
///
/// The buffer pool marks a page evictable only while it is clean and unpinned.
pub struct LruKReplacer {
    k: usize,
    current_timestamp: AtomicU64,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer with the given k value.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            current_timestamp: AtomicU64::new(0),
            state: Mutex::new(ReplacerState {
                pages: HashMap::new(),
                num_evictable: 0,
            }),
        }
    }

    /// Removes and returns the evictable page with the largest backward
    /// k-distance, or None if no page is evictable.
    pub fn evict(&self) -> Option<PageId> {
        let mut state = self.state.lock();
        if state.num_evictable == 0 {
            return None;
        }

        let current_ts = self.current_timestamp.load(Ordering::Relaxed);

        let mut victim: Option<PageId> = None;
        let mut victim_k_dist: Option<Timestamp> = None;
        let mut victim_earliest_ts: Option<Timestamp> = None;

        for (page_id, info) in state.pages.iter() {
            if !info.is_evictable {
                continue;
            }

            let k_dist = info.k_distance(current_ts, self.k);
            let earliest_ts = info.earliest_timestamp();

            let should_replace = match (victim_k_dist, k_dist) {
                (None, Some(_)) => false,
                (Some(_), None) => true,
                (None, None) => match (victim_earliest_ts, earliest_ts) {
                    (Some(v_ts), Some(c_ts)) => c_ts < v_ts,
                    (None, Some(_)) => true,
                    _ => false,
                },
                (Some(v_dist), Some(c_dist)) => c_dist > v_dist,
            };

            if victim.is_none() || should_replace {
                victim = Some(*page_id);
                victim_k_dist = k_dist;
                victim_earliest_ts = earliest_ts;
            }
        }

        if let Some(page_id) = victim {
            state.pages.remove(&page_id);
            state.num_evictable -= 1;
        }

        victim
    }

    /// Records an access to the page at the current timestamp.
    pub fn record_access(&self, page_id: PageId) {
        let timestamp = self.current_timestamp.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();

        state
            .pages
            .entry(page_id)
            .or_insert_with(PageAccessInfo::new)
            .record_access(timestamp, self.k);
    }

    /// Sets whether a page may be chosen as a victim.
    pub fn set_evictable(&self, page_id: PageId, is_evictable: bool) {
        let mut state = self.state.lock();
        let state = &mut *state;

        match state.pages.get_mut(&page_id) {
            Some(info) if info.is_evictable != is_evictable => {
                info.is_evictable = is_evictable;
                if is_evictable {
                    state.num_evictable += 1;
                } else {
                    state.num_evictable -= 1;
                }
            }
            Some(_) => {}
            None if is_evictable => {
                let mut info = PageAccessInfo::new();
                info.is_evictable = true;
                state.pages.insert(page_id, info);
                state.num_evictable += 1;
            }
            None => {}
        }
    }

    /// Forgets a page entirely, e.g. when it is discarded from the pool.
    pub fn remove(&self, page_id: PageId) {
        let mut state = self.state.lock();
        if let Some(info) = state.pages.remove(&page_id) {
            if info.is_evictable {
                state.num_evictable -= 1;
            }
        }
    }

    /// Returns the number of evictable pages.
    pub fn size(&self) -> usize {
        self.state.lock().num_evictable
    }

    /// Returns the k value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }
}
