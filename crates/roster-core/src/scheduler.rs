//! Coordinator-only refresh scheduling.
//!
//! Three phases:
//! 1. `Idle` - no attempt made yet since the coordinator role was acquired
//! 2. `FetchInFlight` - a refresh cycle holds the in-progress slot
//! 3. `CoolingDown` - waiting for the interval to elapse or a manual trigger
//!
//! The caller is responsible for:
//! - Calling `advance()` from its periodic tick
//! - Calling `finish()` for every completion it receives
//! - Acting on the cycle IDs handed out by `trigger()` / `advance()`

use std::fmt::{self, Display, Formatter};
use std::time::Duration;
use tracing::debug;

/// Identifies one fetch-parse-decide cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CycleId(u64);

impl CycleId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for CycleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "cycle-{}", self.0)
    }
}

/// Scheduler phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SchedulerPhase {
    Idle,
    FetchInFlight,
    CoolingDown,
}

/// What caused a refresh cycle to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Participant started while holding the coordinator role
    Startup,
    /// Coordinator role acquired at runtime
    BecameCoordinator,
    /// External `refresh()` call
    Manual,
    /// Cooldown interval elapsed
    Cooldown,
    /// Source URL replaced at runtime
    SourceChanged,
}

/// Timer and in-progress slot for the coordinator's refresh loop.
#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    interval: Duration,
    /// Time spent cooling down since the last cycle started
    elapsed: Duration,
    /// Set once the first cycle ends, whatever its outcome
    initial_attempt_done: bool,
    phase: SchedulerPhase,
    /// Single-slot token for the cycle currently in progress
    in_progress: Option<CycleId>,
    next_cycle: u64,
}

impl RefreshScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            elapsed: Duration::ZERO,
            initial_attempt_done: false,
            phase: SchedulerPhase::Idle,
            in_progress: None,
            next_cycle: 1,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn initial_attempt_done(&self) -> bool {
        self.initial_attempt_done
    }

    /// Cycle currently holding the in-progress slot.
    pub fn in_progress(&self) -> Option<CycleId> {
        self.in_progress
    }

    /// Start a cycle now.
    ///
    /// Returns `None` (and changes nothing) if another cycle is still in
    /// progress. Otherwise resets the timer and hands out the new cycle's ID.
    pub fn trigger(&mut self, trigger: Trigger) -> Option<CycleId> {
        if let Some(current) = self.in_progress {
            debug!("Ignoring {:?} trigger: {} still in progress", trigger, current);
            return None;
        }

        let id = CycleId(self.next_cycle);
        self.next_cycle += 1;
        self.elapsed = Duration::ZERO;
        self.phase = SchedulerPhase::FetchInFlight;
        self.in_progress = Some(id);
        debug!("Starting {} ({:?})", id, trigger);
        Some(id)
    }

    /// Advance the cooldown timer.
    ///
    /// Only counts while cooling down. Returns a cycle ID when the interval
    /// is reached; at most one cycle starts per call.
    pub fn advance(&mut self, delta: Duration) -> Option<CycleId> {
        if self.phase != SchedulerPhase::CoolingDown {
            return None;
        }
        self.elapsed = self.elapsed.saturating_add(delta);
        if self.elapsed >= self.interval {
            self.trigger(Trigger::Cooldown)
        } else {
            None
        }
    }

    /// Release the slot for a completed cycle.
    ///
    /// Returns false if `id` does not hold the slot (superseded or reset),
    /// in which case nothing changes.
    pub fn finish(&mut self, id: CycleId) -> bool {
        if self.in_progress != Some(id) {
            return false;
        }
        self.release();
        true
    }

    /// Release the slot without a completion (configuration error, source
    /// change). The timer keeps running from zero.
    pub fn abandon(&mut self) -> Option<CycleId> {
        let abandoned = self.in_progress;
        if abandoned.is_some() {
            self.release();
        }
        abandoned
    }

    /// Back to `Idle` with a zeroed timer, as on newly acquiring the
    /// coordinator role.
    pub fn reset(&mut self) {
        self.elapsed = Duration::ZERO;
        self.initial_attempt_done = false;
        self.phase = SchedulerPhase::Idle;
        self.in_progress = None;
    }

    fn release(&mut self) {
        self.in_progress = None;
        self.initial_attempt_done = true;
        self.phase = SchedulerPhase::CoolingDown;
    }
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::new(Duration::from_secs(crate::config::DEFAULT_REFRESH_INTERVAL_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_initial_state() {
        let scheduler = RefreshScheduler::default();
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
        assert_eq!(scheduler.interval(), Duration::from_secs(60));
        assert!(!scheduler.initial_attempt_done());
        assert!(scheduler.in_progress().is_none());
    }

    #[test]
    fn test_idle_timer_does_not_count() {
        let mut scheduler = RefreshScheduler::new(10 * SECOND);
        assert!(scheduler.advance(100 * SECOND).is_none());
        assert_eq!(scheduler.elapsed(), Duration::ZERO);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
    }

    #[test]
    fn test_trigger_while_in_flight_is_ignored() {
        let mut scheduler = RefreshScheduler::new(10 * SECOND);
        let first = scheduler.trigger(Trigger::Startup).unwrap();
        assert!(scheduler.trigger(Trigger::Manual).is_none());
        assert_eq!(scheduler.in_progress(), Some(first));
    }

    #[test]
    fn test_finish_moves_to_cooling_down() {
        let mut scheduler = RefreshScheduler::new(10 * SECOND);
        let id = scheduler.trigger(Trigger::Startup).unwrap();
        assert!(scheduler.finish(id));
        assert_eq!(scheduler.phase(), SchedulerPhase::CoolingDown);
        assert!(scheduler.initial_attempt_done());
        assert!(scheduler.in_progress().is_none());
    }

    #[test]
    fn test_finish_unknown_cycle_is_noop() {
        let mut scheduler = RefreshScheduler::new(10 * SECOND);
        let id = scheduler.trigger(Trigger::Startup).unwrap();
        assert!(!scheduler.finish(CycleId::new(id.as_u64() + 5)));
        assert_eq!(scheduler.phase(), SchedulerPhase::FetchInFlight);
        assert!(scheduler.finish(id));
        // Finishing twice releases only once
        assert!(!scheduler.finish(id));
    }

    #[test]
    fn test_cooldown_expiry_starts_exactly_one_cycle() {
        let mut scheduler = RefreshScheduler::new(60 * SECOND);
        let id = scheduler.trigger(Trigger::Startup).unwrap();
        scheduler.finish(id);

        assert!(scheduler.advance(59 * SECOND).is_none());
        let next = scheduler.advance(SECOND).expect("interval reached");
        assert_ne!(next, id);
        // Timer resets on start, not on completion
        assert_eq!(scheduler.elapsed(), Duration::ZERO);
        assert_eq!(scheduler.phase(), SchedulerPhase::FetchInFlight);

        // Further ticks while in flight start nothing
        assert!(scheduler.advance(600 * SECOND).is_none());
        assert_eq!(scheduler.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_large_tick_starts_one_cycle() {
        let mut scheduler = RefreshScheduler::new(10 * SECOND);
        let id = scheduler.trigger(Trigger::Startup).unwrap();
        scheduler.finish(id);
        assert!(scheduler.advance(1000 * SECOND).is_some());
        assert!(scheduler.advance(1000 * SECOND).is_none());
    }

    #[test]
    fn test_manual_trigger_during_cooldown_resets_timer() {
        let mut scheduler = RefreshScheduler::new(60 * SECOND);
        let id = scheduler.trigger(Trigger::Startup).unwrap();
        scheduler.finish(id);
        scheduler.advance(30 * SECOND);
        assert_eq!(scheduler.elapsed(), 30 * SECOND);

        let manual = scheduler.trigger(Trigger::Manual).unwrap();
        assert_eq!(scheduler.elapsed(), Duration::ZERO);
        scheduler.finish(manual);
        assert!(scheduler.advance(59 * SECOND).is_none());
    }

    #[test]
    fn test_abandon_releases_slot() {
        let mut scheduler = RefreshScheduler::new(10 * SECOND);
        let id = scheduler.trigger(Trigger::Startup).unwrap();
        assert_eq!(scheduler.abandon(), Some(id));
        assert_eq!(scheduler.phase(), SchedulerPhase::CoolingDown);
        assert!(scheduler.initial_attempt_done());
        assert!(!scheduler.finish(id));
        assert!(scheduler.abandon().is_none());
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let mut scheduler = RefreshScheduler::new(10 * SECOND);
        let id = scheduler.trigger(Trigger::Startup).unwrap();
        scheduler.finish(id);
        scheduler.advance(5 * SECOND);
        scheduler.trigger(Trigger::Manual);

        scheduler.reset();
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
        assert_eq!(scheduler.elapsed(), Duration::ZERO);
        assert!(!scheduler.initial_attempt_done());
        assert!(scheduler.in_progress().is_none());
        assert!(scheduler.trigger(Trigger::BecameCoordinator).is_some());
    }
}
