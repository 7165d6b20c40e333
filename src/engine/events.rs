//! Renderer-facing events and shared state
//!
//! - `PlayerEvent` - period lifecycle notifications for mounting/unmounting surfaces
//! - `SharedSnapshot` - read-only view of the scheduler for non-blocking UI reads
//!
//! ## Architecture
//! ```text
//! Player task --[PlayerEvent]--> Renderer
//! Player task --[SharedSnapshot]--> Renderer (non-blocking reads)
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use super::cache::CacheStats;
use super::loader::LoadError;

/// Events emitted by the player
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// A period became current and its surface should be mounted
    PeriodRevealed(i64),
    /// A period's surface finished crossing or left the retention window
    PeriodRemoved(i64),
    /// The clock jumped; every mounted surface is gone
    Reset,
    /// The loader rejected a period
    FetchFailed { index: i64, error: LoadError },
}

pub type PlayerEventSender = mpsc::UnboundedSender<PlayerEvent>;
pub type PlayerEventReceiver = mpsc::UnboundedReceiver<PlayerEvent>;

/// Create a player event channel
pub fn player_event_channel() -> (PlayerEventSender, PlayerEventReceiver) {
    mpsc::unbounded_channel()
}

/// Inner state protected by RwLock
#[derive(Debug, Clone, Default)]
struct SnapshotInner {
    /// Last clock value seen
    clock_ms: Option<i64>,
    current_index: Option<i64>,
    /// Revealed periods, ascending
    active: Vec<i64>,
    paused: bool,
    cache: CacheStats,
    resets: u64,
}

/// Thread-safe snapshot of scheduler state
///
/// The player task writes after each tick, readers never block it for long.
#[derive(Clone, Default)]
pub struct SharedSnapshot {
    inner: Arc<RwLock<SnapshotInner>>,
}

impl std::fmt::Debug for SharedSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("SharedSnapshot")
            .field("clock_ms", &inner.clock_ms)
            .field("current_index", &inner.current_index)
            .field("active", &inner.active)
            .field("paused", &inner.paused)
            .finish()
    }
}

impl SharedSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn publish(
        &self,
        clock_ms: Option<i64>,
        current_index: Option<i64>,
        active: Vec<i64>,
        cache: CacheStats,
    ) {
        let mut inner = self.inner.write();
        inner.clock_ms = clock_ms;
        inner.current_index = current_index;
        inner.active = active;
        inner.cache = cache;
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.inner.write().paused = paused;
    }

    pub(crate) fn record_reset(&self) {
        self.inner.write().resets += 1;
    }

    pub fn clock_ms(&self) -> Option<i64> {
        self.inner.read().clock_ms
    }

    pub fn current_index(&self) -> Option<i64> {
        self.inner.read().current_index
    }

    pub fn active(&self) -> Vec<i64> {
        self.inner.read().active.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.read().paused
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.read().cache
    }

    /// Number of seek resets since creation
    pub fn resets(&self) -> u64 {
        self.inner.read().resets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_shared_between_clones() {
        let snapshot = SharedSnapshot::new();
        let reader = snapshot.clone();

        snapshot.publish(Some(12_000), Some(1), vec![0, 1], CacheStats::default());
        snapshot.set_paused(true);
        snapshot.record_reset();

        assert_eq!(reader.clock_ms(), Some(12_000));
        assert_eq!(reader.current_index(), Some(1));
        assert_eq!(reader.active(), vec![0, 1]);
        assert!(reader.is_paused());
        assert_eq!(reader.resets(), 1);
    }

    #[tokio::test]
    async fn test_event_channel() {
        let (tx, mut rx) = player_event_channel();
        tx.send(PlayerEvent::PeriodRevealed(3)).unwrap();
        tx.send(PlayerEvent::Reset).unwrap();
        assert_eq!(rx.recv().await, Some(PlayerEvent::PeriodRevealed(3)));
        assert_eq!(rx.recv().await, Some(PlayerEvent::Reset));
    }
}
