//! Events and the broadcast bus.
//!
//! Every state change in the lockout controller and the routine engine
//! produces an [`Event`]. Events are published through an [`EventBus`] and
//! delivered as immutable clones to every current subscriber; subscribers
//! observe state but never mutate it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::routine::SessionPhase;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A play session was granted and the countdown started.
    SessionStarted {
        duration_ms: u64,
        at: DateTime<Utc>,
    },
    /// One-shot low-time warning, fired once per session.
    SessionWarning {
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    /// The session ran out and the cool-down lock engaged.
    SessionLocked {
        until_epoch_ms: i64,
        at: DateTime<Utc>,
    },
    /// The session was stopped voluntarily, without engaging the lock.
    SessionStopped {
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    /// A task was presented and its scoring timer started.
    TaskPresented {
        routine_key: String,
        task_index: usize,
        title: String,
        at: DateTime<Utc>,
    },
    /// The recognizer started or stopped listening.
    ListeningChanged {
        listening: bool,
        at: DateTime<Utc>,
    },
    /// A spoken utterance was accepted for the current task.
    UtteranceMatched {
        task_index: usize,
        score: u32,
        utterance: String,
        at: DateTime<Utc>,
    },
    /// A spoken utterance did not match; the task is unchanged.
    UtteranceRejected {
        task_index: usize,
        score: u32,
        utterance: String,
        at: DateTime<Utc>,
    },
    /// Reward artwork is ready (generated or stock fallback).
    RewardReady {
        task_index: usize,
        generated: bool,
        at: DateTime<Utc>,
    },
    /// A task was confirmed and stars were awarded.
    TaskCompleted {
        task_index: usize,
        stars: u32,
        elapsed_ms: u64,
        at: DateTime<Utc>,
    },
    /// The whole routine finished.
    RoutineCompleted {
        routine_key: String,
        stars_total: u32,
        at: DateTime<Utc>,
    },
    /// Full routine-engine state snapshot.
    RoutineSnapshot {
        phase: SessionPhase,
        task_index: usize,
        total_tasks: usize,
        stars_collected: u32,
        last_utterance: String,
        at: DateTime<Utc>,
    },
}

/// Broadcast fan-out for [`Event`]s.
///
/// Cloning the bus clones the sending half; all clones feed the same
/// subscribers. Publishing with no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) {
        // A send only fails when nobody is listening, which is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
