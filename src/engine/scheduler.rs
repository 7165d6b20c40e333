//! Period window scheduler
//!
//! Written as a reducer: `reduce(&state, event)` returns a fresh state plus
//! the effects the host must carry out. The previous state is never touched,
//! so a renderer still holding it keeps a consistent view.
//!
//! ## Per-tick steps
//! 1. `current = floor(t / period_length)`
//! 2. Seek check: a backward jump or a forward jump over the threshold clears
//!    the revealed set (and the cache under `SeekCachePolicy::Clear`)
//! 3. Request `current ..= current + prefetch_ahead`
//! 4. Evict cache entries outside `retention ∪ load set`; unmount revealed
//!    periods outside retention
//! 5. Reveal `current` if it is loaded and not already shown
//!
//! Retention keeps `i` while `i + 2 * duration / period_length >= current`
//! and `i <= current`.
//!
//! Nothing is scheduled until geometry is known.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::cache::{EntryStatus, LoadRequest, PeriodCache, PeriodItems, Resolution};
use super::loader::{LoadError, LoadResult};
use super::positioner::position;
use super::{Geometry, Period, PositionedItem};
use crate::settings::{ConfigError, DanmakuConfig, RetryPolicy, SeekCachePolicy};

/// Playback session state as seen by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Running,
    Paused,
}

/// Input to the reducer
#[derive(Debug)]
pub enum SchedulerEvent<C> {
    /// The playback clock moved to `time_ms`
    TickOccurred { time_ms: i64 },
    /// A loader call settled
    FetchResolved {
        index: i64,
        request_id: u64,
        result: LoadResult<C>,
    },
    /// Viewport size became known or changed
    GeometryResolved(Geometry),
    /// The renderer finished moving a period across the screen
    TrajectoryCompleted(i64),
    PauseChanged(bool),
}

/// Work for the host to carry out after a reduction
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Call the loader for this range
    Load(LoadRequest),
    /// Clock discontinuity; unmount everything
    Reset,
    /// Mount a surface for this period, its left edge at `start_offset`
    PeriodRevealed { index: i64, start_offset: f64 },
    /// Unmount this period's surface
    PeriodRemoved(i64),
    /// A load was rejected
    FetchFailed { index: i64, error: LoadError },
}

/// A revealed period with its laid-out items
#[derive(Debug)]
pub struct ActivePeriod<C> {
    pub period: Period,
    /// Raw items kept for re-layout when geometry changes
    raw: PeriodItems<C>,
    pub items: Arc<[PositionedItem<C>]>,
    /// Clock value at reveal
    pub revealed_at: i64,
    /// Left edge of the surface when it was mounted
    pub start_offset: f64,
}

impl<C> Clone for ActivePeriod<C> {
    fn clone(&self) -> Self {
        Self {
            period: self.period,
            raw: Arc::clone(&self.raw),
            items: Arc::clone(&self.items),
            revealed_at: self.revealed_at,
            start_offset: self.start_offset,
        }
    }
}

/// New state and the effects that produced it
#[derive(Debug)]
pub struct Transition<C> {
    pub state: SchedulerState<C>,
    pub effects: Vec<Effect>,
}

/// Complete scheduling context of one player
#[derive(Debug)]
pub struct SchedulerState<C> {
    config: DanmakuConfig,
    geometry: Option<Geometry>,
    /// Last clock value seen
    clock: Option<i64>,
    current_index: Option<i64>,
    session: SessionState,
    cache: PeriodCache<C>,
    active: BTreeMap<i64, ActivePeriod<C>>,
    /// Periods whose surface already finished; not revealed again while current
    retired: BTreeSet<i64>,
}

impl<C> Clone for SchedulerState<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            geometry: self.geometry,
            clock: self.clock,
            current_index: self.current_index,
            session: self.session,
            cache: self.cache.clone(),
            active: self.active.clone(),
            retired: self.retired.clone(),
        }
    }
}

impl<C> SchedulerState<C> {
    /// Create an idle scheduler; fails on an invalid configuration
    pub fn new(config: DanmakuConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            geometry: None,
            clock: None,
            current_index: None,
            session: SessionState::Running,
            cache: PeriodCache::new(config.period_length_ms),
            active: BTreeMap::new(),
            retired: BTreeSet::new(),
        })
    }

    /// Pure reduction: `(previous, event) -> (next, effects)`
    pub fn reduce(&self, event: SchedulerEvent<C>) -> Transition<C> {
        let mut state = self.clone();
        let effects = state.apply(event);
        Transition { state, effects }
    }

    /// Apply an event in place, returning its effects
    pub fn apply(&mut self, event: SchedulerEvent<C>) -> Vec<Effect> {
        let mut effects = Vec::new();
        match event {
            SchedulerEvent::TickOccurred { time_ms } => self.on_tick(time_ms, &mut effects),
            SchedulerEvent::FetchResolved {
                index,
                request_id,
                result,
            } => self.on_fetch_resolved(index, request_id, result, &mut effects),
            SchedulerEvent::GeometryResolved(geometry) => {
                self.on_geometry(geometry, &mut effects)
            }
            SchedulerEvent::TrajectoryCompleted(index) => {
                self.on_trajectory_completed(index, &mut effects)
            }
            SchedulerEvent::PauseChanged(paused) => {
                self.session = if paused {
                    SessionState::Paused
                } else {
                    SessionState::Running
                };
            }
        }
        effects
    }

    fn on_tick(&mut self, time_ms: i64, effects: &mut Vec<Effect>) {
        let previous = self.clock.replace(time_ms);
        let current = Period::index_at(time_ms, self.config.period_length_ms);
        self.current_index = Some(current);

        if self.geometry.is_none() {
            return;
        }

        if let Some(previous) = previous {
            if self.is_seek(previous, time_ms) {
                self.reset(previous, time_ms, effects);
            }
        }

        self.schedule(time_ms, current, effects);
    }

    fn is_seek(&self, previous: i64, now: i64) -> bool {
        now < previous || now - previous > self.config.seek_threshold_ms
    }

    fn reset(&mut self, from: i64, to: i64, effects: &mut Vec<Effect>) {
        info!(
            "Seek detected ({}ms -> {}ms), clearing {} revealed periods",
            from,
            to,
            self.active.len()
        );
        self.active.clear();
        self.retired.clear();
        if self.config.seek_cache_policy == SeekCachePolicy::Clear {
            self.cache.clear();
        }
        effects.push(Effect::Reset);
    }

    /// Load, evict and reveal for the period containing `time_ms`
    fn schedule(&mut self, time_ms: i64, current: i64, effects: &mut Vec<Effect>) {
        let load_end = current + i64::from(self.config.prefetch_ahead);

        for index in current..=load_end {
            if self.config.retry_policy == RetryPolicy::NextTick && self.cache.clear_failed(index) {
                debug!("Retrying failed period {}", index);
            }
            self.cache
                .get_or_request(index, |request| effects.push(Effect::Load(request)));
        }

        let span = self.config.retention_span();
        let retained = |index: i64| index <= current && index as f64 + span >= current as f64;

        self.cache
            .evict_unless(|index| retained(index) || (current..=load_end).contains(&index));

        let expired: Vec<i64> = self
            .active
            .keys()
            .copied()
            .filter(|index| !retained(*index))
            .collect();
        for index in expired {
            self.active.remove(&index);
            debug!("Period {} left the retention window", index);
            effects.push(Effect::PeriodRemoved(index));
        }
        self.retired.retain(|index| *index >= current);

        self.reveal(current, time_ms, effects);
    }

    fn reveal(&mut self, index: i64, time_ms: i64, effects: &mut Vec<Effect>) {
        if self.active.contains_key(&index) || self.retired.contains(&index) {
            return;
        }
        let Some(geometry) = self.geometry else {
            return;
        };
        let Some(raw) = self.cache.items(index) else {
            return;
        };

        let period = Period::new(index, self.config.period_length_ms);
        let items = self.layout(&raw, period, geometry);
        // Late reveal: shift the surface to where continuous playback would have it
        let lateness = (time_ms - period.start_time).max(0) as f64;
        let start_offset = geometry.width - lateness * geometry.speed(self.config.duration_ms);

        info!(
            "Revealing period {} ({} items) at offset {:.1}",
            index,
            items.len(),
            start_offset
        );
        self.active.insert(
            index,
            ActivePeriod {
                period,
                raw,
                items,
                revealed_at: time_ms,
                start_offset,
            },
        );
        effects.push(Effect::PeriodRevealed {
            index,
            start_offset,
        });
    }

    fn layout(&self, raw: &PeriodItems<C>, period: Period, geometry: Geometry) -> Arc<[PositionedItem<C>]> {
        let surface_width =
            geometry.surface_width(self.config.period_length_ms, self.config.duration_ms);
        position(
            raw,
            period.start_time,
            period.end_time,
            surface_width,
            geometry.height,
            self.config.line_height,
            self.config.font_size,
        )
        .into()
    }

    fn on_fetch_resolved(
        &mut self,
        index: i64,
        request_id: u64,
        result: LoadResult<C>,
        effects: &mut Vec<Effect>,
    ) {
        match self.cache.resolve(index, request_id, result) {
            Resolution::Loaded(_) => {
                if let Some(time_ms) = self.clock {
                    if self.current_index == Some(index) {
                        self.reveal(index, time_ms, effects);
                    }
                }
            }
            Resolution::Failed(error) => {
                effects.push(Effect::FetchFailed { index, error });
            }
            Resolution::Stale => {}
        }
    }

    fn on_geometry(&mut self, geometry: Geometry, effects: &mut Vec<Effect>) {
        let first = self.geometry.is_none();
        self.geometry = Some(geometry);

        // Re-layout what is already on screen
        let relaid: Vec<(i64, Arc<[PositionedItem<C>]>)> = self
            .active
            .iter()
            .map(|(index, active)| (*index, self.layout(&active.raw, active.period, geometry)))
            .collect();
        for (index, items) in relaid {
            if let Some(active) = self.active.get_mut(&index) {
                active.items = items;
            }
        }

        if first {
            debug!("Geometry resolved: {}x{}", geometry.width, geometry.height);
            if let (Some(time_ms), Some(current)) = (self.clock, self.current_index) {
                self.schedule(time_ms, current, effects);
            }
        }
    }

    fn on_trajectory_completed(&mut self, index: i64, effects: &mut Vec<Effect>) {
        if self.active.remove(&index).is_some() {
            debug!("Period {} finished crossing", index);
            self.retired.insert(index);
            effects.push(Effect::PeriodRemoved(index));
        } else {
            warn!("Completion for period {} which is not revealed", index);
        }
    }

    pub fn config(&self) -> &DanmakuConfig {
        &self.config
    }

    pub fn geometry(&self) -> Option<Geometry> {
        self.geometry
    }

    pub fn clock(&self) -> Option<i64> {
        self.clock
    }

    pub fn current_index(&self) -> Option<i64> {
        self.current_index
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn cache(&self) -> &PeriodCache<C> {
        &self.cache
    }

    pub fn status(&self, index: i64) -> Option<EntryStatus> {
        self.cache.status(index)
    }

    pub fn active(&self, index: i64) -> Option<&ActivePeriod<C>> {
        self.active.get(&index)
    }

    /// Revealed periods in ascending index order
    pub fn active_periods(&self) -> impl Iterator<Item = &ActivePeriod<C>> + '_ {
        self.active.values()
    }

    pub fn active_indices(&self) -> Vec<i64> {
        self.active.keys().copied().collect()
    }
}
