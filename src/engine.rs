//! Danmaku engine: scheduling, layout and motion
//!
//! - `positioner`: lane and offset layout for one period
//! - `cache`: per-period fetch store with request dedup
//! - `scheduler`: pure reducer driving the period window
//! - `motion`: time-linear trajectories with pause/resume
//! - `loader`: injected async item source
//! - `events`: renderer-facing events and shared snapshot state
//! - `player`: tokio host wiring the pieces together
//!
//! ## Data flow
//! ```text
//! clock tick -> Scheduler (reduce) -> Load effects -> Loader (tokio task)
//!                    ^                                     |
//!                    +------- FetchResolved(index) <-------+
//! Scheduler -> PeriodRevealed -> MotionDriver -> frame() -> renderer
//! ```

pub mod cache;
pub mod events;
pub mod loader;
pub mod motion;
pub mod player;
pub mod positioner;
pub mod scheduler;

use std::sync::Arc;

pub use cache::{CacheStats, EntryStatus, PeriodCache};
pub use events::{PlayerEvent, PlayerEventReceiver, SharedSnapshot};
pub use loader::{LoadError, LoadResult, Loader};
pub use motion::{MotionDriver, Trajectory, TrajectoryHandle};
pub use player::{DanmakuPlayer, RenderedPeriod};
pub use positioner::position;
pub use scheduler::{ActivePeriod, Effect, SchedulerEvent, SchedulerState, SessionState, Transition};

/// Raw bullet comment as returned by the loader
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem<C> {
    /// Unique within the item universe
    pub id: i64,
    /// Playback timestamp in milliseconds
    pub timestamp: i64,
    /// Opaque payload (text, colour, ...)
    pub content: C,
}

impl<C> RawItem<C> {
    pub fn new(id: i64, timestamp: i64, content: C) -> Self {
        Self {
            id,
            timestamp,
            content,
        }
    }
}

/// Item with its computed lane and horizontal offset inside a period surface
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedItem<C> {
    pub item: Arc<RawItem<C>>,
    /// Vertical row, `0..lane_count`
    pub lane: usize,
    /// Offset from the left edge of the period surface
    pub horizontal_offset: f64,
    /// Offset from the top of the viewport (`lane * line_height`)
    pub top: f64,
    pub line_height: f64,
    pub font_size: f64,
}

impl<C> PositionedItem<C> {
    /// Apply a caller-supplied style function to the underlying item
    pub fn styled<S>(&self, style: impl Fn(&RawItem<C>) -> S) -> S {
        style(&self.item)
    }
}

/// Fixed-length window of the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    pub index: i64,
    pub start_time: i64,
    pub end_time: i64,
}

impl Period {
    pub fn new(index: i64, period_length: i64) -> Self {
        Self {
            index,
            start_time: index * period_length,
            end_time: (index + 1) * period_length,
        }
    }

    /// Index of the period containing `time`
    pub fn index_at(time: i64, period_length: i64) -> i64 {
        time.div_euclid(period_length)
    }

    pub fn length(&self) -> i64 {
        self.end_time - self.start_time
    }
}

/// Viewport size in logical pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Geometry {
    pub width: f64,
    pub height: f64,
}

impl Geometry {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Horizontal speed in pixels per millisecond for a given crossing time
    pub fn speed(&self, duration_ms: i64) -> f64 {
        if duration_ms <= 0 {
            return 0.0;
        }
        self.width / duration_ms as f64
    }

    /// Width of a period surface so that items keep time-proportional spacing
    pub fn surface_width(&self, period_length: i64, duration_ms: i64) -> f64 {
        self.speed(duration_ms) * period_length as f64
    }
}
