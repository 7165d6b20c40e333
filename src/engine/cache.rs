//! Period cache
//!
//! Raw store mapping period index to loaded items, plus the pending state that
//! keeps a period from being requested twice.
//!
//! ## Entry lifecycle
//! ```text
//! (absent) --get_or_request--> Pending --resolve(Ok)--> Loaded
//!                                      --resolve(Err)-> Failed
//! any --evict--> (absent)
//! ```
//! Entries never move backwards. A failed entry is retried by clearing it and
//! requesting again, which issues a fresh request id.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::loader::{LoadError, LoadResult};
use super::{Period, RawItem};

/// Items of one loaded period, in loader order
pub type PeriodItems<C> = Arc<[Arc<RawItem<C>>]>;

/// Public status of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Loader call outstanding
    Pending,
    /// Items available
    Loaded,
    /// Loader rejected
    Failed,
}

#[derive(Debug)]
enum EntryState<C> {
    Pending,
    Loaded(PeriodItems<C>),
    Failed(LoadError),
}

impl<C> Clone for EntryState<C> {
    fn clone(&self) -> Self {
        match self {
            EntryState::Pending => EntryState::Pending,
            EntryState::Loaded(items) => EntryState::Loaded(Arc::clone(items)),
            EntryState::Failed(e) => EntryState::Failed(e.clone()),
        }
    }
}

/// One period's entry
#[derive(Debug)]
struct CacheEntry<C> {
    /// Identifies the loader call that owns this entry
    request_id: u64,
    state: EntryState<C>,
}

impl<C> Clone for CacheEntry<C> {
    fn clone(&self) -> Self {
        Self {
            request_id: self.request_id,
            state: self.state.clone(),
        }
    }
}

/// A loader call the cache wants issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadRequest {
    pub index: i64,
    pub request_id: u64,
    pub start_ms: i64,
    pub end_ms: i64,
}

/// What happened when a loader result was handed back
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Entry moved to Loaded with this many items
    Loaded(usize),
    /// Entry moved to Failed
    Failed(LoadError),
    /// No matching pending entry (evicted or superseded); result dropped
    Stale,
}

/// Entry counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub pending: usize,
    pub loaded: usize,
    pub failed: usize,
    /// Total items held by loaded entries
    pub items: usize,
}

impl CacheStats {
    pub fn total(&self) -> usize {
        self.pending + self.loaded + self.failed
    }
}

/// Per-player period store
#[derive(Debug)]
pub struct PeriodCache<C> {
    period_length: i64,
    entries: BTreeMap<i64, CacheEntry<C>>,
    next_request_id: u64,
}

impl<C> Clone for PeriodCache<C> {
    fn clone(&self) -> Self {
        Self {
            period_length: self.period_length,
            entries: self.entries.clone(),
            next_request_id: self.next_request_id,
        }
    }
}

impl<C> PeriodCache<C> {
    /// Create an empty cache for periods of `period_length` ms
    pub fn new(period_length: i64) -> Self {
        Self {
            period_length,
            entries: BTreeMap::new(),
            next_request_id: 1,
        }
    }

    /// Return the status of `index`, requesting it first if absent
    ///
    /// `loader_fn` is called exactly once, and only when a new Pending entry
    /// is created. Existing entries of any status are returned untouched.
    pub fn get_or_request(&mut self, index: i64, loader_fn: impl FnOnce(LoadRequest)) -> EntryStatus {
        if let Some(status) = self.status(index) {
            return status;
        }

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.entries.insert(
            index,
            CacheEntry {
                request_id,
                state: EntryState::Pending,
            },
        );

        let period = Period::new(index, self.period_length);
        debug!(
            "Period {} requested ({}..{}ms, request {})",
            index, period.start_time, period.end_time, request_id
        );
        loader_fn(LoadRequest {
            index,
            request_id,
            start_ms: period.start_time,
            end_ms: period.end_time,
        });

        EntryStatus::Pending
    }

    /// Drop a Failed entry so the next `get_or_request` reissues it
    ///
    /// Returns false if the entry is absent or not Failed.
    pub fn clear_failed(&mut self, index: i64) -> bool {
        if self.status(index) == Some(EntryStatus::Failed) {
            self.entries.remove(&index);
            true
        } else {
            false
        }
    }

    /// Settle the pending entry for `index` with a loader result
    pub fn resolve(&mut self, index: i64, request_id: u64, result: LoadResult<C>) -> Resolution {
        let Some(entry) = self.entries.get_mut(&index) else {
            debug!("Discarding stale result for evicted period {}", index);
            return Resolution::Stale;
        };
        if entry.request_id != request_id || !matches!(entry.state, EntryState::Pending) {
            debug!(
                "Discarding stale result for period {} (request {}, live {})",
                index, request_id, entry.request_id
            );
            return Resolution::Stale;
        }

        match result {
            Ok(items) => {
                let count = items.len();
                let items: PeriodItems<C> = items.into_iter().map(Arc::new).collect();
                entry.state = EntryState::Loaded(items);
                debug!("Period {} loaded with {} items", index, count);
                Resolution::Loaded(count)
            }
            Err(e) => {
                warn!("Failed to load period {}: {}", index, e);
                entry.state = EntryState::Failed(e.clone());
                Resolution::Failed(e)
            }
        }
    }

    /// Remove entries for every index in `indices`, whatever their status
    ///
    /// Returns the number of entries removed.
    pub fn evict(&mut self, indices: impl IntoIterator<Item = i64>) -> usize {
        let mut removed = 0;
        for index in indices {
            if self.entries.remove(&index).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Evicted {} cached periods", removed);
        }
        removed
    }

    /// Evict every entry for which `keep` returns false
    pub fn evict_unless(&mut self, keep: impl Fn(i64) -> bool) -> usize {
        let stale: Vec<i64> = self.entries.keys().copied().filter(|i| !keep(*i)).collect();
        self.evict(stale)
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn status(&self, index: i64) -> Option<EntryStatus> {
        self.entries.get(&index).map(|entry| match entry.state {
            EntryState::Pending => EntryStatus::Pending,
            EntryState::Loaded(_) => EntryStatus::Loaded,
            EntryState::Failed(_) => EntryStatus::Failed,
        })
    }

    /// Loaded items for `index`
    pub fn items(&self, index: i64) -> Option<PeriodItems<C>> {
        match &self.entries.get(&index)?.state {
            EntryState::Loaded(items) => Some(Arc::clone(items)),
            _ => None,
        }
    }

    /// Rejection recorded for `index`
    pub fn error(&self, index: i64) -> Option<&LoadError> {
        match &self.entries.get(&index)?.state {
            EntryState::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Cached indices in ascending order
    pub fn indices(&self) -> impl Iterator<Item = i64> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn period_length(&self) -> i64 {
        self.period_length
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for entry in self.entries.values() {
            match &entry.state {
                EntryState::Pending => stats.pending += 1,
                EntryState::Loaded(items) => {
                    stats.loaded += 1;
                    stats.items += items.len();
                }
                EntryState::Failed(_) => stats.failed += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(cache: &mut PeriodCache<String>, index: i64) -> (EntryStatus, Vec<LoadRequest>) {
        let mut issued = Vec::new();
        let status = cache.get_or_request(index, |req| issued.push(req));
        (status, issued)
    }

    fn loaded(n: usize) -> LoadResult<String> {
        Ok((0..n)
            .map(|i| RawItem::new(i as i64, i as i64 * 10, format!("#{}", i)))
            .collect())
    }

    #[test]
    fn test_request_once_while_pending() {
        let mut cache = PeriodCache::new(10_000);

        let (status, issued) = request(&mut cache, 3);
        assert_eq!(status, EntryStatus::Pending);
        assert_eq!(issued.len(), 1);
        assert_eq!(issued[0].start_ms, 30_000);
        assert_eq!(issued[0].end_ms, 40_000);

        let (status, issued) = request(&mut cache, 3);
        assert_eq!(status, EntryStatus::Pending);
        assert!(issued.is_empty(), "Second request must not call the loader");
    }

    #[test]
    fn test_resolve_loaded() {
        let mut cache = PeriodCache::new(1000);
        let (_, issued) = request(&mut cache, 0);

        let resolution = cache.resolve(0, issued[0].request_id, loaded(3));
        assert_eq!(resolution, Resolution::Loaded(3));
        assert_eq!(cache.status(0), Some(EntryStatus::Loaded));
        assert_eq!(cache.items(0).map(|items| items.len()), Some(3));

        // Loaded entries are returned without a new request
        let (status, issued) = request(&mut cache, 0);
        assert_eq!(status, EntryStatus::Loaded);
        assert!(issued.is_empty());
    }

    #[test]
    fn test_resolve_failed_and_retry() {
        let mut cache = PeriodCache::new(1000);
        let (_, issued) = request(&mut cache, 1);

        let resolution = cache.resolve(1, issued[0].request_id, Err(LoadError::Timeout));
        assert_eq!(resolution, Resolution::Failed(LoadError::Timeout));
        assert_eq!(cache.status(1), Some(EntryStatus::Failed));
        assert_eq!(cache.error(1), Some(&LoadError::Timeout));

        // Failed is terminal until cleared
        let (status, issued_again) = request(&mut cache, 1);
        assert_eq!(status, EntryStatus::Failed);
        assert!(issued_again.is_empty());

        assert!(cache.clear_failed(1));
        let (status, retried) = request(&mut cache, 1);
        assert_eq!(status, EntryStatus::Pending);
        assert_eq!(retried.len(), 1);
        assert_ne!(retried[0].request_id, issued[0].request_id);
    }

    #[test]
    fn test_clear_failed_ignores_other_states() {
        let mut cache = PeriodCache::new(1000);
        request(&mut cache, 0);
        assert!(!cache.clear_failed(0));
        assert!(!cache.clear_failed(9));
        assert_eq!(cache.status(0), Some(EntryStatus::Pending));
    }

    #[test]
    fn test_evict_then_request_issues_fresh_load() {
        let mut cache = PeriodCache::new(1000);
        let (_, first) = request(&mut cache, 2);
        cache.resolve(2, first[0].request_id, loaded(1));

        assert_eq!(cache.evict([2, 7]), 1);
        assert_eq!(cache.evict([2]), 0, "Evicting an absent index is a no-op");
        assert_eq!(cache.status(2), None);

        let (status, second) = request(&mut cache, 2);
        assert_eq!(status, EntryStatus::Pending);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn test_late_result_after_evict_is_stale() {
        let mut cache = PeriodCache::new(1000);
        let (_, first) = request(&mut cache, 4);
        cache.evict([4]);

        assert_eq!(cache.resolve(4, first[0].request_id, loaded(2)), Resolution::Stale);
        assert_eq!(cache.status(4), None, "Stale data must not be reinstated");
    }

    #[test]
    fn test_late_result_for_superseded_request_is_stale() {
        let mut cache = PeriodCache::new(1000);
        let (_, first) = request(&mut cache, 4);
        cache.evict([4]);
        let (_, second) = request(&mut cache, 4);

        assert_eq!(cache.resolve(4, first[0].request_id, loaded(2)), Resolution::Stale);
        assert_eq!(cache.status(4), Some(EntryStatus::Pending));
        assert_eq!(
            cache.resolve(4, second[0].request_id, loaded(5)),
            Resolution::Loaded(5)
        );
    }

    #[test]
    fn test_evict_unless_and_stats() {
        let mut cache = PeriodCache::new(1000);
        for i in 0..5 {
            request(&mut cache, i);
        }
        cache.resolve(0, 1, loaded(4));
        cache.resolve(1, 2, Err(LoadError::Parse("bad json".into())));

        let stats = cache.stats();
        assert_eq!(stats.loaded, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.items, 4);
        assert_eq!(stats.total(), 5);

        assert_eq!(cache.evict_unless(|i| i >= 3), 3);
        assert_eq!(cache.indices().collect::<Vec<_>>(), vec![3, 4]);
    }
}
