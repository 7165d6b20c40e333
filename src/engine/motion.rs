//! Time-linear horizontal motion for period surfaces
//!
//! Position is evaluated analytically from elapsed time instead of being
//! integrated frame by frame, so dropped frames never accumulate drift.
//!
//! ## Trajectory
//! ```text
//! progress(t) = clamp(elapsed(t) / (2 * duration), 0, 1)
//! offset(t)   = start + (target - start) * progress(t)
//! target      = start - 2 * viewport_width
//! ```
//! A surface anchored at the right edge (`start = viewport_width`) travels two
//! viewport widths, so every item stays on screen for at least one full
//! `duration` before leaving on the left.
//!
//! Pausing freezes `elapsed`; resuming continues from the frozen offset toward
//! the same target with the remaining time unchanged.

use std::collections::BTreeMap;

use tracing::debug;

/// Timestamp on the caller's monotonic frame clock, in milliseconds
pub type Millis = f64;

/// Opaque reference to a running trajectory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrajectoryHandle(u64);

/// Completion callback, receives the period index
pub type CompleteFn = Box<dyn FnOnce(i64) + Send>;

/// Horizontal path of one period surface
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub period_index: i64,
    pub start_offset: f64,
    pub target_offset: f64,
    /// Total travel time (`2 * duration`)
    pub total_ms: Millis,
    /// Progress banked before the last resume (or at pause)
    pub elapsed_at_pause: Millis,
    /// Frame time of the last resume; None while paused
    running_since: Option<Millis>,
}

impl Trajectory {
    fn new(period_index: i64, start_offset: f64, viewport_width: f64, duration_ms: i64, now: Millis) -> Self {
        Self {
            period_index,
            start_offset,
            target_offset: start_offset - 2.0 * viewport_width,
            total_ms: 2.0 * duration_ms.max(0) as f64,
            elapsed_at_pause: 0.0,
            running_since: Some(now),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.running_since.is_none()
    }

    /// Time spent moving, capped at the total
    pub fn elapsed(&self, now: Millis) -> Millis {
        let running = self
            .running_since
            .map(|since| (now - since).max(0.0))
            .unwrap_or(0.0);
        (self.elapsed_at_pause + running).min(self.total_ms)
    }

    pub fn remaining(&self, now: Millis) -> Millis {
        self.total_ms - self.elapsed(now)
    }

    /// Fraction of the path covered, in `[0, 1]`
    pub fn progress(&self, now: Millis) -> f64 {
        if self.total_ms <= 0.0 {
            return 1.0;
        }
        self.elapsed(now) / self.total_ms
    }

    /// Current horizontal offset of the surface
    pub fn offset(&self, now: Millis) -> f64 {
        self.start_offset + (self.target_offset - self.start_offset) * self.progress(now)
    }

    fn is_finished(&self, now: Millis) -> bool {
        !self.is_paused() && self.elapsed(now) >= self.total_ms
    }

    fn pause(&mut self, now: Millis) {
        if self.running_since.is_some() {
            self.elapsed_at_pause = self.elapsed(now);
            self.running_since = None;
        }
    }

    fn resume(&mut self, now: Millis) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }
}

struct Slot {
    trajectory: Trajectory,
    on_complete: Option<CompleteFn>,
}

/// Owns every live trajectory of one player
pub struct MotionDriver {
    slots: BTreeMap<TrajectoryHandle, Slot>,
    next_handle: u64,
    paused: bool,
}

impl std::fmt::Debug for MotionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionDriver")
            .field("live", &self.slots.len())
            .field("paused", &self.paused)
            .finish()
    }
}

impl Default for MotionDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionDriver {
    pub fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            next_handle: 1,
            paused: false,
        }
    }

    /// Start a trajectory anchored at the right edge of the viewport
    pub fn start(&mut self, period_index: i64, viewport_width: f64, duration_ms: i64, now: Millis) -> TrajectoryHandle {
        self.start_from(period_index, viewport_width, viewport_width, duration_ms, now)
    }

    /// Start a trajectory whose surface begins at `start_offset`
    ///
    /// Used when a period is revealed late and has to catch up with where it
    /// would have been. Starts paused if the driver is paused.
    pub fn start_from(
        &mut self,
        period_index: i64,
        start_offset: f64,
        viewport_width: f64,
        duration_ms: i64,
        now: Millis,
    ) -> TrajectoryHandle {
        let handle = TrajectoryHandle(self.next_handle);
        self.next_handle += 1;

        let mut trajectory = Trajectory::new(period_index, start_offset, viewport_width, duration_ms, now);
        if self.paused {
            trajectory.pause(now);
        }
        debug!(
            "Trajectory {:?} for period {}: {:.1} -> {:.1} over {}ms",
            handle, period_index, trajectory.start_offset, trajectory.target_offset, trajectory.total_ms
        );

        self.slots.insert(
            handle,
            Slot {
                trajectory,
                on_complete: None,
            },
        );
        handle
    }

    /// Register a callback fired once when the trajectory reaches its target
    ///
    /// Replaces any earlier callback. Ignored for unknown handles.
    pub fn on_complete(&mut self, handle: TrajectoryHandle, callback: impl FnOnce(i64) + Send + 'static) {
        if let Some(slot) = self.slots.get_mut(&handle) {
            slot.on_complete = Some(Box::new(callback));
        }
    }

    pub fn pause(&mut self, handle: TrajectoryHandle, now: Millis) {
        if let Some(slot) = self.slots.get_mut(&handle) {
            slot.trajectory.pause(now);
        }
    }

    pub fn resume(&mut self, handle: TrajectoryHandle, now: Millis) {
        if let Some(slot) = self.slots.get_mut(&handle) {
            slot.trajectory.resume(now);
        }
    }

    /// Pause every live trajectory and any started later
    pub fn pause_all(&mut self, now: Millis) {
        self.paused = true;
        for slot in self.slots.values_mut() {
            slot.trajectory.pause(now);
        }
    }

    pub fn resume_all(&mut self, now: Millis) {
        self.paused = false;
        for slot in self.slots.values_mut() {
            slot.trajectory.resume(now);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Retire finished trajectories, firing their callbacks
    ///
    /// Returns `(handle, period_index)` for each one, in handle order.
    pub fn advance(&mut self, now: Millis) -> Vec<(TrajectoryHandle, i64)> {
        let finished: Vec<TrajectoryHandle> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.trajectory.is_finished(now))
            .map(|(handle, _)| *handle)
            .collect();

        let mut completed = Vec::with_capacity(finished.len());
        for handle in finished {
            if let Some(slot) = self.slots.remove(&handle) {
                let index = slot.trajectory.period_index;
                debug!("Trajectory {:?} for period {} completed", handle, index);
                if let Some(callback) = slot.on_complete {
                    callback(index);
                }
                completed.push((handle, index));
            }
        }
        completed
    }

    /// Drop a trajectory without firing its callback
    pub fn discard(&mut self, handle: TrajectoryHandle) -> Option<Trajectory> {
        self.slots.remove(&handle).map(|slot| slot.trajectory)
    }

    /// Drop every trajectory without firing callbacks
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn get(&self, handle: TrajectoryHandle) -> Option<&Trajectory> {
        self.slots.get(&handle).map(|slot| &slot.trajectory)
    }

    pub fn offset(&self, handle: TrajectoryHandle, now: Millis) -> Option<f64> {
        self.get(handle).map(|t| t.offset(now))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_linear_motion() {
        let mut driver = MotionDriver::new();
        let h = driver.start(0, 300.0, 1000, 0.0);

        assert!(approx(driver.offset(h, 0.0).unwrap(), 300.0));
        // Halfway through 2000ms: 300 - 600 * 0.5
        assert!(approx(driver.offset(h, 1000.0).unwrap(), 0.0));
        assert!(approx(driver.offset(h, 2000.0).unwrap(), -300.0));
        // Clamped past the end
        assert!(approx(driver.offset(h, 5000.0).unwrap(), -300.0));
    }

    #[test]
    fn test_pause_resume_preserves_progress() {
        let mut driver = MotionDriver::new();
        let h = driver.start(0, 300.0, 1000, 0.0);

        driver.pause(h, 400.0);
        let frozen = driver.offset(h, 400.0).unwrap();
        // Time passes while paused, nothing moves
        assert!(approx(driver.offset(h, 900.0).unwrap(), frozen));
        assert!(approx(driver.get(h).unwrap().remaining(900.0), 1600.0));

        driver.resume(h, 1000.0);
        assert!(approx(driver.offset(h, 1000.0).unwrap(), frozen));
        assert!(approx(driver.get(h).unwrap().remaining(1000.0), 1600.0));

        // Finishes 1600ms after resume, not 2000
        assert!(driver.advance(2599.0).is_empty());
        assert_eq!(driver.advance(2600.0).len(), 1);
    }

    #[test]
    fn test_on_complete_fires_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut driver = MotionDriver::new();
        let h = driver.start(7, 100.0, 500, 0.0);
        let counter = Arc::clone(&fired);
        driver.on_complete(h, move |index| {
            assert_eq!(index, 7);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(driver.advance(1000.0), vec![(h, 7)]);
        assert!(driver.advance(2000.0).is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(driver.is_empty());
    }

    #[test]
    fn test_paused_never_completes() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut driver = MotionDriver::new();
        let h = driver.start(1, 100.0, 500, 0.0);
        let counter = Arc::clone(&fired);
        driver.on_complete(h, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        driver.pause_all(999.0);
        assert!(driver.advance(10_000.0).is_empty());

        // Discarding a paused trajectory must not fire either
        assert!(driver.discard(h).is_some());
        driver.resume_all(10_000.0);
        assert!(driver.advance(20_000.0).is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_start_while_paused_starts_frozen() {
        let mut driver = MotionDriver::new();
        driver.pause_all(0.0);
        let h = driver.start_from(2, 150.0, 300.0, 1000, 100.0);
        assert!(driver.get(h).unwrap().is_paused());
        assert!(approx(driver.offset(h, 5000.0).unwrap(), 150.0));
        assert!(approx(driver.get(h).unwrap().target_offset, -450.0));

        driver.resume_all(5000.0);
        assert!(approx(driver.offset(h, 6000.0).unwrap(), 150.0 - 300.0));
    }

    #[test]
    fn test_zero_duration_completes_immediately() {
        let mut driver = MotionDriver::new();
        let h = driver.start(0, 100.0, 0, 10.0);
        assert!(approx(driver.get(h).unwrap().progress(10.0), 1.0));
        assert_eq!(driver.advance(10.0).len(), 1);
    }
}
