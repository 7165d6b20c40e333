//! Player - hosts one scheduler context and carries out its effects
//!
//! All state lives on the task that owns the player. Loader calls run as
//! tokio tasks and their outcomes are folded back in by `tick` or
//! `wait_for_fetch`, so the scheduler is only ever mutated from one place.
//!
//! Methods that may start loads (`tick`, `set_geometry`) must be called from
//! inside a tokio runtime.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, trace};

use super::events::{PlayerEvent, PlayerEventReceiver, PlayerEventSender, SharedSnapshot, player_event_channel};
use super::loader::{LoadResult, Loader};
use super::motion::{Millis, MotionDriver, TrajectoryHandle};
use super::scheduler::{Effect, SchedulerEvent, SchedulerState, Transition};
use super::{Geometry, PositionedItem};
use crate::settings::{ConfigError, DanmakuConfig};

/// A settled loader call on its way back to the scheduler
struct FetchOutcome<C> {
    index: i64,
    request_id: u64,
    result: LoadResult<C>,
}

/// One period surface as it should be drawn this frame
#[derive(Debug)]
pub struct RenderedPeriod<C> {
    pub index: i64,
    /// Left edge of the surface in viewport coordinates
    pub offset: f64,
    /// Surface width (`speed * period_length`)
    pub width: f64,
    pub items: Arc<[PositionedItem<C>]>,
    pub trajectory: TrajectoryHandle,
}

/// Danmaku player for a single video
pub struct DanmakuPlayer<C> {
    state: SchedulerState<C>,
    loader: Arc<dyn Loader<C>>,
    motion: MotionDriver,
    /// Live trajectory per revealed period
    trajectories: BTreeMap<i64, TrajectoryHandle>,
    fetches: JoinSet<FetchOutcome<C>>,
    subscribers: Vec<PlayerEventSender>,
    snapshot: SharedSnapshot,
}

impl<C> std::fmt::Debug for DanmakuPlayer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DanmakuPlayer")
            .field("clock", &self.state.clock())
            .field("current_index", &self.state.current_index())
            .field("active", &self.state.active_indices())
            .field("in_flight", &self.fetches.len())
            .field("motion", &self.motion)
            .finish()
    }
}

impl<C: Send + 'static> DanmakuPlayer<C> {
    /// Create a player; the configuration is validated here
    pub fn new(config: DanmakuConfig, loader: impl Loader<C>) -> Result<Self, ConfigError> {
        Ok(Self {
            state: SchedulerState::new(config)?,
            loader: Arc::new(loader),
            motion: MotionDriver::new(),
            trajectories: BTreeMap::new(),
            fetches: JoinSet::new(),
            subscribers: Vec::new(),
            snapshot: SharedSnapshot::new(),
        })
    }

    /// Receive lifecycle events from now on
    pub fn subscribe(&mut self) -> PlayerEventReceiver {
        let (tx, rx) = player_event_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Shared read-only view for other threads
    pub fn snapshot(&self) -> SharedSnapshot {
        self.snapshot.clone()
    }

    pub fn state(&self) -> &SchedulerState<C> {
        &self.state
    }

    pub fn config(&self) -> &DanmakuConfig {
        self.state.config()
    }

    /// Number of loader calls still running
    pub fn in_flight(&self) -> usize {
        self.fetches.len()
    }

    /// Viewport size is known (or changed)
    pub fn set_geometry(&mut self, width: f64, height: f64, now: Millis) {
        self.dispatch(SchedulerEvent::GeometryResolved(Geometry::new(width, height)), now);
        self.publish();
    }

    /// Advance to playback position `current_time_ms` at frame time `now`
    pub fn tick(&mut self, current_time_ms: i64, now: Millis) {
        self.drain_fetches(now);
        self.dispatch(
            SchedulerEvent::TickOccurred {
                time_ms: current_time_ms,
            },
            now,
        );
        self.advance_motion(now);
        self.publish();
    }

    /// Freeze or resume every surface without losing progress
    pub fn set_paused(&mut self, paused: bool, now: Millis) {
        if paused {
            self.motion.pause_all(now);
        } else {
            self.motion.resume_all(now);
        }
        self.dispatch(SchedulerEvent::PauseChanged(paused), now);
        self.snapshot.set_paused(paused);
    }

    pub fn is_paused(&self) -> bool {
        self.motion.is_paused()
    }

    /// Fold in every loader result that has already arrived
    pub fn drain_fetches(&mut self, now: Millis) -> usize {
        let mut applied = 0;
        while let Some(joined) = self.fetches.try_join_next() {
            if self.apply_fetch(joined, now) {
                applied += 1;
            }
        }
        if applied > 0 {
            self.publish();
        }
        applied
    }

    /// Wait for the next loader result and fold it in
    ///
    /// Returns false when nothing is in flight.
    pub async fn wait_for_fetch(&mut self, now: Millis) -> bool {
        let Some(joined) = self.fetches.join_next().await else {
            return false;
        };
        self.apply_fetch(joined, now);
        self.publish();
        true
    }

    /// Surfaces to draw at frame time `now`, in period order
    pub fn frame(&self, now: Millis) -> Vec<RenderedPeriod<C>> {
        let config = self.state.config();
        let width = self
            .state
            .geometry()
            .map(|g| g.surface_width(config.period_length_ms, config.duration_ms))
            .unwrap_or(0.0);

        self.state
            .active_periods()
            .filter_map(|active| {
                let index = active.period.index;
                let handle = *self.trajectories.get(&index)?;
                Some(RenderedPeriod {
                    index,
                    offset: self.motion.offset(handle, now)?,
                    width,
                    items: Arc::clone(&active.items),
                    trajectory: handle,
                })
            })
            .collect()
    }

    fn apply_fetch(&mut self, joined: Result<FetchOutcome<C>, JoinError>, now: Millis) -> bool {
        match joined {
            Ok(outcome) => {
                self.dispatch(
                    SchedulerEvent::FetchResolved {
                        index: outcome.index,
                        request_id: outcome.request_id,
                        result: outcome.result,
                    },
                    now,
                );
                true
            }
            Err(e) => {
                // The period stays pending, same as a hung loader
                error!("Loader task did not finish: {}", e);
                false
            }
        }
    }

    fn advance_motion(&mut self, now: Millis) {
        for (handle, index) in self.motion.advance(now) {
            if self.trajectories.get(&index) == Some(&handle) {
                self.trajectories.remove(&index);
                self.dispatch(SchedulerEvent::TrajectoryCompleted(index), now);
            }
        }
    }

    /// Reduce one event and carry out its effects
    fn dispatch(&mut self, event: SchedulerEvent<C>, now: Millis) {
        let Transition { state, effects } = self.state.reduce(event);
        self.state = state;
        for effect in effects {
            self.perform(effect, now);
        }
    }

    fn perform(&mut self, effect: Effect, now: Millis) {
        match effect {
            Effect::Load(request) => {
                trace!("Spawning loader for period {}", request.index);
                let future = self.loader.load(request.start_ms, request.end_ms);
                self.fetches.spawn(async move {
                    FetchOutcome {
                        index: request.index,
                        request_id: request.request_id,
                        result: future.await,
                    }
                });
            }
            Effect::Reset => {
                self.motion.clear();
                self.trajectories.clear();
                self.snapshot.record_reset();
                self.emit(PlayerEvent::Reset);
            }
            Effect::PeriodRevealed {
                index,
                start_offset,
            } => {
                let config = *self.state.config();
                let width = self.state.geometry().map(|g| g.width).unwrap_or(0.0);
                if let Some(stale) = self.trajectories.remove(&index) {
                    self.motion.discard(stale);
                }
                let handle =
                    self.motion
                        .start_from(index, start_offset, width, config.duration_ms, now);
                self.trajectories.insert(index, handle);
                self.emit(PlayerEvent::PeriodRevealed(index));
            }
            Effect::PeriodRemoved(index) => {
                if let Some(handle) = self.trajectories.remove(&index) {
                    self.motion.discard(handle);
                }
                self.emit(PlayerEvent::PeriodRemoved(index));
            }
            Effect::FetchFailed { index, error } => {
                self.emit(PlayerEvent::FetchFailed { index, error });
            }
        }
    }

    fn emit(&mut self, event: PlayerEvent) {
        debug!("Player event: {:?}", event);
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn publish(&self) {
        self.snapshot.publish(
            self.state.clock(),
            self.state.current_index(),
            self.state.active_indices(),
            self.state.cache().stats(),
        );
    }
}
