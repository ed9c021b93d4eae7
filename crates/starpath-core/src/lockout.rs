//! Session lockout controller.
//!
//! Bounds a child's play session to a fixed window and enforces a cool-down
//! afterwards. The controller is a wall-clock state machine with no internal
//! thread -- the caller owns the ~1 s ticker and calls `tick()` with the
//! elapsed time, which also means tearing the caller down tears the ticker
//! down with it.
//!
//! The only durable fact is the unlock timestamp, persisted through a
//! [`LockoutStore`] the moment the lock engages. `check_lock_status()`
//! re-derives lock state purely from that timestamp and the clock, so
//! killing and reopening the app during the cool-down changes nothing.
//!
//! If the store cannot be read the controller fails open (treats the child
//! as unlocked) and logs a warning. Availability over enforcement, by
//! explicit policy; the tests pin this down.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::StorageError;
use crate::events::{Event, EventBus};

/// Durable home of the unlock timestamp.
pub trait LockoutStore: Send + Sync {
    fn load_unlock_at(&self) -> Result<Option<i64>, StorageError>;
    fn save_unlock_at(&self, unlock_at_epoch_ms: i64) -> Result<(), StorageError>;
}

/// Session window, warning threshold and cool-down length.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LockoutDurations {
    pub session_ms: u64,
    pub warning_ms: u64,
    pub lockout_ms: u64,
}

impl Default for LockoutDurations {
    fn default() -> Self {
        Self {
            session_ms: 15 * 60 * 1000,
            warning_ms: 5 * 60 * 1000,
            lockout_ms: 15 * 60 * 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockPhase {
    Unlocked { session_active: bool },
    Locked { until_epoch_ms: i64 },
}

/// Store-derived lock status, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Unlocked,
    Locked {
        until_epoch_ms: i64,
        remaining_ms: u64,
    },
}

/// Outcome of `start_session`. Being locked is an expected condition, not an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { duration_ms: u64 },
    StillLocked { remaining_ms: u64 },
}

/// Controller state persisted between short-lived processes (the CLI saves
/// one of these between invocations). Only the unlock timestamp is truly
/// durable; this snapshot just carries the countdown across restarts of the
/// driving process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockoutSnapshot {
    pub session_active: bool,
    pub remaining_ms: u64,
    pub warning_shown: bool,
    pub saved_at_epoch_ms: i64,
}

pub struct SessionLockoutController {
    clock: Arc<dyn Clock>,
    store: Arc<dyn LockoutStore>,
    durations: LockoutDurations,
    bus: EventBus,
    phase: LockPhase,
    remaining_ms: u64,
    warning_shown: bool,
}

impl SessionLockoutController {
    pub fn new(
        clock: Arc<dyn Clock>,
        store: Arc<dyn LockoutStore>,
        durations: LockoutDurations,
        bus: EventBus,
    ) -> Self {
        Self {
            clock,
            store,
            durations,
            bus,
            phase: LockPhase::Unlocked {
                session_active: false,
            },
            remaining_ms: 0,
            warning_shown: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> LockPhase {
        self.phase
    }

    pub fn session_active(&self) -> bool {
        matches!(
            self.phase,
            LockPhase::Unlocked {
                session_active: true
            }
        )
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.phase, LockPhase::Locked { .. })
    }

    pub fn remaining_session_ms(&self) -> u64 {
        self.remaining_ms
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Adopt the persisted lock state. Call once at construction time.
    pub fn initialize(&mut self) -> LockStatus {
        let status = self.check_lock_status();
        self.phase = match status {
            LockStatus::Locked { until_epoch_ms, .. } => LockPhase::Locked { until_epoch_ms },
            LockStatus::Unlocked => LockPhase::Unlocked {
                session_active: false,
            },
        };
        status
    }

    /// Start the session countdown, unless the cool-down is still running.
    pub fn start_session(&mut self) -> StartOutcome {
        // Re-derive from the store so an expired lock clears and a persisted
        // one wins even if this instance was never told about it.
        match self.check_lock_status() {
            LockStatus::Locked {
                until_epoch_ms,
                remaining_ms,
            } => {
                self.phase = LockPhase::Locked { until_epoch_ms };
                StartOutcome::StillLocked { remaining_ms }
            }
            LockStatus::Unlocked => {
                self.phase = LockPhase::Unlocked {
                    session_active: true,
                };
                self.remaining_ms = self.durations.session_ms;
                self.warning_shown = false;
                self.bus.publish(Event::SessionStarted {
                    duration_ms: self.durations.session_ms,
                    at: self.clock.now(),
                });
                StartOutcome::Started {
                    duration_ms: self.durations.session_ms,
                }
            }
        }
    }

    /// Advance the countdown. A no-op unless a session is active.
    ///
    /// Crossing the warning threshold publishes `SessionWarning` exactly
    /// once per session; hitting zero persists the unlock timestamp and
    /// engages the lock.
    pub fn tick(&mut self, elapsed_ms: u64) {
        if !self.session_active() {
            return;
        }
        self.remaining_ms = self.remaining_ms.saturating_sub(elapsed_ms);

        if self.remaining_ms == 0 {
            let until_epoch_ms = self.clock.now_ms() + self.durations.lockout_ms as i64;
            if let Err(e) = self.store.save_unlock_at(until_epoch_ms) {
                // The in-memory lock still engages; it just won't survive a
                // restart.
                tracing::error!(error = %e, "failed to persist lockout timestamp");
            }
            self.phase = LockPhase::Locked { until_epoch_ms };
            self.bus.publish(Event::SessionLocked {
                until_epoch_ms,
                at: self.clock.now(),
            });
            return;
        }

        if self.remaining_ms <= self.durations.warning_ms && !self.warning_shown {
            self.warning_shown = true;
            self.bus.publish(Event::SessionWarning {
                remaining_ms: self.remaining_ms,
                at: self.clock.now(),
            });
        }
    }

    /// Cancel the countdown without engaging the lock (leaving the activity
    /// view voluntarily).
    pub fn stop_session(&mut self) {
        if !self.session_active() {
            return;
        }
        self.phase = LockPhase::Unlocked {
            session_active: false,
        };
        self.bus.publish(Event::SessionStopped {
            remaining_ms: self.remaining_ms,
            at: self.clock.now(),
        });
    }

    /// Derive lock status purely from the persisted timestamp and the clock.
    ///
    /// Safe to call at any resume-from-background point. A store failure is
    /// reported as unlocked (fail open) and logged.
    pub fn check_lock_status(&self) -> LockStatus {
        match self.store.load_unlock_at() {
            Ok(Some(until_epoch_ms)) => {
                let now = self.clock.now_ms();
                if until_epoch_ms > now {
                    LockStatus::Locked {
                        until_epoch_ms,
                        remaining_ms: (until_epoch_ms - now) as u64,
                    }
                } else {
                    LockStatus::Unlocked
                }
            }
            Ok(None) => LockStatus::Unlocked,
            Err(e) => {
                tracing::warn!(error = %e, "lockout state unreadable, failing open");
                LockStatus::Unlocked
            }
        }
    }

    // ── Process-restart snapshots ────────────────────────────────────

    pub fn snapshot(&self) -> LockoutSnapshot {
        LockoutSnapshot {
            session_active: self.session_active(),
            remaining_ms: self.remaining_ms,
            warning_shown: self.warning_shown,
            saved_at_epoch_ms: self.clock.now_ms(),
        }
    }

    /// Resume a snapshotted countdown, charging it for the wall-clock time
    /// that passed while no process was running. The persisted lock always
    /// wins over a stale snapshot.
    pub fn restore(&mut self, snapshot: &LockoutSnapshot) {
        if self.initialize() != LockStatus::Unlocked || !snapshot.session_active {
            return;
        }
        self.phase = LockPhase::Unlocked {
            session_active: true,
        };
        self.remaining_ms = snapshot.remaining_ms;
        self.warning_shown = snapshot.warning_shown;
        let elapsed = (self.clock.now_ms() - snapshot.saved_at_epoch_ms).max(0) as u64;
        if elapsed > 0 {
            self.tick(elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::EventBus;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryLockoutStore {
        unlock_at: Mutex<Option<i64>>,
        fail: AtomicBool,
    }

    impl MemoryLockoutStore {
        fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }
    }

    impl LockoutStore for MemoryLockoutStore {
        fn load_unlock_at(&self) -> Result<Option<i64>, StorageError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StorageError::QueryFailed("injected".into()));
            }
            Ok(*self.unlock_at.lock().unwrap())
        }

        fn save_unlock_at(&self, unlock_at_epoch_ms: i64) -> Result<(), StorageError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StorageError::QueryFailed("injected".into()));
            }
            *self.unlock_at.lock().unwrap() = Some(unlock_at_epoch_ms);
            Ok(())
        }
    }

    fn controller() -> (
        SessionLockoutController,
        Arc<ManualClock>,
        Arc<MemoryLockoutStore>,
        EventBus,
    ) {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(MemoryLockoutStore::default());
        let bus = EventBus::new(1024);
        let ctrl = SessionLockoutController::new(
            clock.clone(),
            store.clone(),
            LockoutDurations::default(),
            bus.clone(),
        );
        (ctrl, clock, store, bus)
    }

    fn drain_warnings(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> usize {
        let mut warnings = 0;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, Event::SessionWarning { .. }) {
                warnings += 1;
            }
        }
        warnings
    }

    #[test]
    fn full_session_engages_lock_with_persisted_timestamp() {
        let (mut ctrl, clock, store, _bus) = controller();
        ctrl.initialize();
        assert_eq!(
            ctrl.start_session(),
            StartOutcome::Started {
                duration_ms: 900_000
            }
        );

        // 900 one-second ticks, wall clock advancing in step.
        for _ in 0..900 {
            clock.advance_ms(1_000);
            ctrl.tick(1_000);
        }

        assert!(ctrl.is_locked());
        let saved = store.unlock_at.lock().unwrap().unwrap();
        assert_eq!(saved, clock.now_ms() + 900_000);

        match ctrl.check_lock_status() {
            LockStatus::Locked { remaining_ms, .. } => assert_eq!(remaining_ms, 900_000),
            other => panic!("expected locked, got {other:?}"),
        }

        // Cool-down elapses; the same check now reports unlocked.
        clock.advance_ms(900_000);
        assert_eq!(ctrl.check_lock_status(), LockStatus::Unlocked);
    }

    #[test]
    fn warning_fires_exactly_once_per_session() {
        let (mut ctrl, _clock, _store, bus) = controller();
        let mut rx = bus.subscribe();
        ctrl.initialize();
        ctrl.start_session();

        // Cross the 5-minute threshold, then keep ticking below it.
        ctrl.tick(600_000);
        ctrl.tick(1_000);
        ctrl.tick(1_000);
        assert_eq!(drain_warnings(&mut rx), 1);

        // A fresh session re-arms the warning.
        ctrl.stop_session();
        ctrl.start_session();
        ctrl.tick(700_000);
        assert_eq!(drain_warnings(&mut rx), 1);
    }

    #[test]
    fn start_while_locked_is_refused() {
        let (mut ctrl, clock, store, _bus) = controller();
        store.save_unlock_at(clock.now_ms() + 60_000).unwrap();
        ctrl.initialize();
        assert_eq!(
            ctrl.start_session(),
            StartOutcome::StillLocked {
                remaining_ms: 60_000
            }
        );
        assert!(!ctrl.session_active());
    }

    #[test]
    fn lock_expiry_allows_start_without_reinitialize() {
        let (mut ctrl, clock, store, _bus) = controller();
        store.save_unlock_at(clock.now_ms() + 60_000).unwrap();
        ctrl.initialize();
        clock.advance_ms(61_000);
        assert!(matches!(ctrl.start_session(), StartOutcome::Started { .. }));
    }

    #[test]
    fn stop_session_does_not_engage_lock() {
        let (mut ctrl, _clock, store, _bus) = controller();
        ctrl.initialize();
        ctrl.start_session();
        ctrl.tick(100_000);
        ctrl.stop_session();
        assert!(!ctrl.session_active());
        assert!(!ctrl.is_locked());
        assert!(store.unlock_at.lock().unwrap().is_none());
        // Ticking after stop changes nothing.
        ctrl.tick(1_000_000);
        assert!(!ctrl.is_locked());
    }

    #[test]
    fn unreadable_store_fails_open_by_policy() {
        // Availability over enforcement: a broken store must not lock a
        // child out of the app.
        let (mut ctrl, _clock, store, _bus) = controller();
        store.set_failing(true);
        assert_eq!(ctrl.initialize(), LockStatus::Unlocked);
        assert_eq!(ctrl.check_lock_status(), LockStatus::Unlocked);
        assert!(matches!(ctrl.start_session(), StartOutcome::Started { .. }));
    }

    #[test]
    fn persist_failure_still_locks_in_memory() {
        let (mut ctrl, _clock, store, _bus) = controller();
        ctrl.initialize();
        ctrl.start_session();
        store.set_failing(true);
        ctrl.tick(900_000);
        assert!(ctrl.is_locked());
        // The durable record is gone though, so a fresh check fails open.
        assert_eq!(ctrl.check_lock_status(), LockStatus::Unlocked);
    }

    #[test]
    fn snapshot_restore_charges_elapsed_wall_time() {
        let (mut ctrl, clock, store, bus) = controller();
        ctrl.initialize();
        ctrl.start_session();
        ctrl.tick(100_000);
        let snap = ctrl.snapshot();

        // 200s pass with no process running.
        clock.advance_ms(200_000);
        let mut restored = SessionLockoutController::new(
            clock.clone(),
            store.clone(),
            LockoutDurations::default(),
            bus.clone(),
        );
        restored.restore(&snap);
        assert!(restored.session_active());
        assert_eq!(restored.remaining_session_ms(), 900_000 - 300_000);
    }

    #[test]
    fn restore_defers_to_a_persisted_lock() {
        let (mut ctrl, clock, store, bus) = controller();
        ctrl.initialize();
        ctrl.start_session();
        let snap = ctrl.snapshot();

        store.save_unlock_at(clock.now_ms() + 500_000).unwrap();
        let mut restored = SessionLockoutController::new(
            clock.clone(),
            store.clone(),
            LockoutDurations::default(),
            bus.clone(),
        );
        restored.restore(&snap);
        assert!(restored.is_locked());
        assert!(!restored.session_active());
    }
}
