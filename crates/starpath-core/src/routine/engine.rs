//! Routine progression engine.
//!
//! Walks a child through one routine, task by task, on spoken confirmation.
//! The engine is a caller-driven state machine -- recognizer events, reward
//! confirmations and advance requests all arrive as method calls, and every
//! state change is published to the [`EventBus`].
//!
//! ## Phases
//!
//! ```text
//! Instruction <-> Listening -> Generating -> Success -> (next task | Completed)
//! ```
//!
//! Reward fetches run outside the engine: a match hands back a
//! [`FetchRequest`] carrying a ticket, the caller fetches however it likes,
//! and confirms with the same ticket. Tickets from a previous task or a
//! previous `load_routine` are stale and ignored, which is what makes
//! teardown mid-fetch safe.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::catalog::{self, Routine, Task};
use crate::clock::Clock;
use crate::events::{Event, EventBus};
use crate::reward::RewardArtifact;
use crate::speech::{self, MatchDecision};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Instruction,
    Listening,
    Generating,
    Success,
    Completed,
}

/// Star amounts and the fast-completion threshold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StarRules {
    /// Completions faster than this (from task presentation) earn the bonus.
    pub fast_threshold_ms: u64,
    pub fast_stars: u32,
    pub base_stars: u32,
}

impl Default for StarRules {
    fn default() -> Self {
        Self {
            fast_threshold_ms: 20_000,
            fast_stars: 2,
            base_stars: 1,
        }
    }
}

/// Per-session traversal state. Created on load, discarded on completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub task_index: usize,
    /// When the current task was first presented; star scoring measures from
    /// here, so re-listens before a match don't skew the timing.
    pub task_started_at_ms: i64,
    pub stars_collected: u32,
    pub last_utterance: String,
    /// Reward for the current task, set between match confirmation and advance.
    pub artifact: Option<RewardArtifact>,
}

/// Ticket tying an in-flight reward fetch to the task that requested it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(u64);

/// Everything the caller needs to fetch reward artwork for a matched task.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub ticket: FetchTicket,
    pub task_index: usize,
    pub prompt: String,
    pub fallback_artwork_id: String,
}

/// One recognizer observation: speaking flag plus current transcript.
#[derive(Debug, Clone)]
pub struct RecognizerEvent {
    pub is_speaking: bool,
    pub transcript: String,
}

/// Result of feeding an utterance to the engine.
#[derive(Debug, Clone)]
pub enum UtteranceOutcome {
    /// Accepted; the caller should fetch the reward and confirm.
    Matched {
        request: FetchRequest,
        decision: MatchDecision,
    },
    /// Not accepted; the utterance is retained for display, nothing else
    /// changes.
    Rejected { decision: MatchDecision },
    /// Blank transcript, or the engine is past the matching phases.
    Ignored,
}

/// Result of advancing past a confirmed task.
#[derive(Debug, Clone)]
pub enum AdvanceOutcome {
    NextTask {
        task_index: usize,
        /// Artwork the caller may warm up ahead of time; purely advisory.
        prefetch_artwork_id: Option<String>,
    },
    RoutineComplete {
        routine_key: String,
        stars_total: u32,
    },
}

pub struct RoutineProgressionEngine {
    clock: Arc<dyn Clock>,
    rules: StarRules,
    bus: EventBus,
    routine: Routine,
    state: SessionState,
    /// Bumped on every task change, reload and abandon; stale fetch tickets
    /// compare unequal and are dropped.
    fetch_epoch: u64,
}

impl RoutineProgressionEngine {
    pub fn new(clock: Arc<dyn Clock>, rules: StarRules, bus: EventBus, routine_key: &str) -> Self {
        let routine = catalog::get_routine(routine_key);
        let mut engine = Self {
            clock,
            rules,
            bus,
            routine,
            state: SessionState {
                phase: SessionPhase::Instruction,
                task_index: 0,
                task_started_at_ms: 0,
                stars_collected: 0,
                last_utterance: String::new(),
                artifact: None,
            },
            fetch_epoch: 0,
        };
        engine.present_current_task();
        engine
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn routine(&self) -> &Routine {
        &self.routine
    }

    pub fn current_task(&self) -> Option<&Task> {
        self.routine.tasks.get(self.state.task_index)
    }

    /// 0.0 .. 1.0 progress across the routine.
    pub fn progress(&self) -> f64 {
        if self.routine.tasks.is_empty() {
            return 0.0;
        }
        self.state.task_index as f64 / self.routine.tasks.len() as f64
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Event {
        Event::RoutineSnapshot {
            phase: self.state.phase,
            task_index: self.state.task_index,
            total_tasks: self.routine.tasks.len(),
            stars_collected: self.state.stars_collected,
            last_utterance: self.state.last_utterance.clone(),
            at: self.clock.now(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Reload with another routine, resetting the session and invalidating
    /// any in-flight fetch.
    pub fn load_routine(&mut self, routine_key: &str) {
        self.routine = catalog::get_routine(routine_key);
        self.fetch_epoch += 1;
        self.state.task_index = 0;
        self.state.stars_collected = 0;
        self.present_current_task();
    }

    /// Mic pressed: start listening. Only valid from `Instruction`.
    pub fn begin_listening(&mut self) -> bool {
        if self.state.phase != SessionPhase::Instruction {
            return false;
        }
        self.state.phase = SessionPhase::Listening;
        self.bus.publish(Event::ListeningChanged {
            listening: true,
            at: self.clock.now(),
        });
        true
    }

    /// Mic pressed again: stop listening without a match.
    pub fn stop_listening(&mut self) {
        if self.state.phase == SessionPhase::Listening {
            self.state.phase = SessionPhase::Instruction;
            self.bus.publish(Event::ListeningChanged {
                listening: false,
                at: self.clock.now(),
            });
        }
    }

    /// Feed one recognizer observation.
    ///
    /// A speaking -> silent transition while still listening drops back to
    /// `Instruction`; a non-blank transcript is treated as a candidate
    /// utterance either way.
    pub fn on_recognizer_event(&mut self, event: RecognizerEvent) -> UtteranceOutcome {
        if !event.is_speaking && self.state.phase == SessionPhase::Listening {
            self.stop_listening();
        }
        let transcript = event.transcript.trim().to_string();
        if transcript.is_empty() {
            return UtteranceOutcome::Ignored;
        }
        self.on_recognized_utterance(&transcript)
    }

    /// Judge a candidate utterance against the current task.
    pub fn on_recognized_utterance(&mut self, text: &str) -> UtteranceOutcome {
        match self.state.phase {
            SessionPhase::Instruction | SessionPhase::Listening => {}
            // A match is already being rewarded, or the routine is done.
            _ => return UtteranceOutcome::Ignored,
        }
        let text = text.trim();
        if text.is_empty() {
            return UtteranceOutcome::Ignored;
        }
        self.state.last_utterance = text.to_string();

        let Some(task) = self.routine.tasks.get(self.state.task_index) else {
            return UtteranceOutcome::Ignored;
        };
        let decision = speech::is_match(text, task);
        let at = self.clock.now();

        if !decision.accepted {
            self.bus.publish(Event::UtteranceRejected {
                task_index: self.state.task_index,
                score: decision.best_score,
                utterance: text.to_string(),
                at,
            });
            return UtteranceOutcome::Rejected { decision };
        }

        let prompt = if task.image_prompt.is_empty() {
            format!("Cartoon illustration of {}", task.title)
        } else {
            task.image_prompt.clone()
        };
        let request = FetchRequest {
            ticket: FetchTicket(self.fetch_epoch),
            task_index: self.state.task_index,
            prompt,
            fallback_artwork_id: task.artwork_id.clone(),
        };
        self.state.phase = SessionPhase::Generating;
        self.bus.publish(Event::UtteranceMatched {
            task_index: self.state.task_index,
            score: decision.best_score,
            utterance: text.to_string(),
            at,
        });
        UtteranceOutcome::Matched { request, decision }
    }

    /// Deliver the fetched reward. Returns false for stale tickets, which
    /// leave the session untouched.
    pub fn on_match_confirmed(&mut self, ticket: FetchTicket, artifact: RewardArtifact) -> bool {
        if ticket.0 != self.fetch_epoch || self.state.phase != SessionPhase::Generating {
            tracing::debug!(?ticket, "dropping stale reward confirmation");
            return false;
        }
        let generated = artifact.is_generated();
        self.state.artifact = Some(artifact);
        self.state.phase = SessionPhase::Success;
        self.bus.publish(Event::RewardReady {
            task_index: self.state.task_index,
            generated,
            at: self.clock.now(),
        });
        true
    }

    /// Score the confirmed task and move on. Only valid from `Success`.
    pub fn advance(&mut self) -> Option<AdvanceOutcome> {
        if self.state.phase != SessionPhase::Success {
            return None;
        }
        let elapsed_ms = (self.clock.now_ms() - self.state.task_started_at_ms).max(0) as u64;
        let stars = if elapsed_ms < self.rules.fast_threshold_ms {
            self.rules.fast_stars
        } else {
            self.rules.base_stars
        };
        self.state.stars_collected += stars;
        self.bus.publish(Event::TaskCompleted {
            task_index: self.state.task_index,
            stars,
            elapsed_ms,
            at: self.clock.now(),
        });

        self.fetch_epoch += 1;
        self.state.task_index += 1;
        if self.state.task_index < self.routine.tasks.len() {
            self.present_current_task();
            let prefetch_artwork_id = self
                .routine
                .tasks
                .get(self.state.task_index + 1)
                .map(|t| t.artwork_id.clone());
            Some(AdvanceOutcome::NextTask {
                task_index: self.state.task_index,
                prefetch_artwork_id,
            })
        } else {
            self.state.phase = SessionPhase::Completed;
            self.bus.publish(Event::RoutineCompleted {
                routine_key: self.routine.key.clone(),
                stars_total: self.state.stars_collected,
                at: self.clock.now(),
            });
            Some(AdvanceOutcome::RoutineComplete {
                routine_key: self.routine.key.clone(),
                stars_total: self.state.stars_collected,
            })
        }
    }

    /// Tear down mid-routine: invalidates in-flight fetches and stops
    /// listening. Already-committed stars are untouched; the engine is
    /// expected to be dropped or reloaded afterwards.
    pub fn abandon(&mut self) {
        self.fetch_epoch += 1;
        self.stop_listening();
    }

    fn present_current_task(&mut self) {
        self.state.phase = SessionPhase::Instruction;
        self.state.task_started_at_ms = self.clock.now_ms();
        self.state.last_utterance.clear();
        self.state.artifact = None;
        if let Some(task) = self.routine.tasks.get(self.state.task_index) {
            self.bus.publish(Event::TaskPresented {
                routine_key: self.routine.key.clone(),
                task_index: self.state.task_index,
                title: task.title.clone(),
                at: self.clock.now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn engine_with_clock(key: &str) -> (RoutineProgressionEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let engine = RoutineProgressionEngine::new(
            clock.clone(),
            StarRules::default(),
            EventBus::new(64),
            key,
        );
        (engine, clock)
    }

    fn confirm_current(engine: &mut RoutineProgressionEngine, utterance: &str) {
        let outcome = engine.on_recognized_utterance(utterance);
        let UtteranceOutcome::Matched { request, .. } = outcome else {
            panic!("expected a match for '{utterance}'");
        };
        assert!(engine.on_match_confirmed(
            request.ticket,
            RewardArtifact::Stock {
                artwork_id: request.fallback_artwork_id,
            },
        ));
    }

    #[test]
    fn fast_completion_earns_two_stars() {
        let (mut engine, clock) = engine_with_clock("morning");
        confirm_current(&mut engine, "I brushed my teeth");
        clock.set_ms(15_000);
        engine.advance();
        assert_eq!(engine.state().stars_collected, 2);
    }

    #[test]
    fn slow_completion_earns_one_star() {
        let (mut engine, clock) = engine_with_clock("morning");
        confirm_current(&mut engine, "I brushed my teeth");
        clock.set_ms(25_000);
        engine.advance();
        assert_eq!(engine.state().stars_collected, 1);
    }

    #[test]
    fn timing_measured_from_presentation_not_confirmation() {
        let (mut engine, clock) = engine_with_clock("morning");
        // Child fumbles for 22s before the match lands; the clock for star
        // purposes started at presentation, so this is a slow completion
        // even when advance follows confirmation immediately.
        clock.set_ms(22_000);
        confirm_current(&mut engine, "done");
        engine.advance();
        assert_eq!(engine.state().stars_collected, 1);
    }

    #[test]
    fn rejected_utterance_keeps_phase_and_retains_text() {
        let (mut engine, _clock) = engine_with_clock("morning");
        let outcome = engine.on_recognized_utterance("zebra rollercoaster");
        assert!(matches!(outcome, UtteranceOutcome::Rejected { .. }));
        assert_eq!(engine.state().phase, SessionPhase::Instruction);
        assert_eq!(engine.state().last_utterance, "zebra rollercoaster");
    }

    #[test]
    fn advance_outside_success_is_a_no_op() {
        let (mut engine, _clock) = engine_with_clock("morning");
        assert!(engine.advance().is_none());
        assert_eq!(engine.state().stars_collected, 0);
    }

    #[test]
    fn stale_ticket_after_reload_is_dropped() {
        let (mut engine, _clock) = engine_with_clock("morning");
        let UtteranceOutcome::Matched { request, .. } =
            engine.on_recognized_utterance("I brushed my teeth")
        else {
            panic!("expected match");
        };
        engine.load_routine("bedtime");
        assert!(!engine.on_match_confirmed(
            request.ticket,
            RewardArtifact::Stock {
                artwork_id: "img_brush_teeth".into(),
            },
        ));
        assert_eq!(engine.state().phase, SessionPhase::Instruction);
        assert_eq!(engine.routine().key, "bedtime");
        assert!(engine.state().artifact.is_none());
    }

    #[test]
    fn stale_ticket_after_abandon_is_dropped() {
        let (mut engine, _clock) = engine_with_clock("morning");
        let UtteranceOutcome::Matched { request, .. } =
            engine.on_recognized_utterance("done")
        else {
            panic!("expected match");
        };
        engine.abandon();
        assert!(!engine.on_match_confirmed(
            request.ticket,
            RewardArtifact::Generated { bytes: vec![1] },
        ));
    }

    #[test]
    fn silence_while_listening_returns_to_instruction() {
        let (mut engine, _clock) = engine_with_clock("morning");
        assert!(engine.begin_listening());
        let outcome = engine.on_recognizer_event(RecognizerEvent {
            is_speaking: false,
            transcript: String::new(),
        });
        assert!(matches!(outcome, UtteranceOutcome::Ignored));
        assert_eq!(engine.state().phase, SessionPhase::Instruction);
    }

    #[test]
    fn utterance_while_generating_is_ignored() {
        let (mut engine, _clock) = engine_with_clock("morning");
        let outcome = engine.on_recognized_utterance("done");
        assert!(matches!(outcome, UtteranceOutcome::Matched { .. }));
        // Recognizer keeps streaming while the reward is being fetched.
        let outcome = engine.on_recognized_utterance("done done");
        assert!(matches!(outcome, UtteranceOutcome::Ignored));
    }

    #[test]
    fn completing_every_task_reports_total_stars() {
        let (mut engine, clock) = engine_with_clock("meal");
        let task_count = engine.routine().tasks.len();
        let mut last = None;
        for i in 0..task_count {
            confirm_current(&mut engine, "done");
            // Every task confirmed fast: 2 stars each.
            clock.advance_ms(5_000);
            last = engine.advance();
            if i + 1 < task_count {
                assert!(matches!(last, Some(AdvanceOutcome::NextTask { .. })));
            }
        }
        match last {
            Some(AdvanceOutcome::RoutineComplete {
                routine_key,
                stars_total,
            }) => {
                assert_eq!(routine_key, "meal");
                assert_eq!(stars_total, 2 * task_count as u32);
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(engine.state().phase, SessionPhase::Completed);
    }

    #[test]
    fn advance_surfaces_next_next_artwork_for_prefetch() {
        let (mut engine, _clock) = engine_with_clock("morning");
        confirm_current(&mut engine, "done");
        match engine.advance() {
            Some(AdvanceOutcome::NextTask {
                task_index,
                prefetch_artwork_id,
            }) => {
                assert_eq!(task_index, 1);
                assert_eq!(prefetch_artwork_id.as_deref(), Some("img_dress_up"));
            }
            other => panic!("expected next task, got {other:?}"),
        }
    }

    #[test]
    fn snapshot_reflects_engine_state() {
        let (mut engine, _clock) = engine_with_clock("morning");
        engine.on_recognized_utterance("zebra");
        match engine.snapshot() {
            Event::RoutineSnapshot {
                phase,
                task_index,
                total_tasks,
                stars_collected,
                last_utterance,
                ..
            } => {
                assert_eq!(phase, SessionPhase::Instruction);
                assert_eq!(task_index, 0);
                assert_eq!(total_tasks, 4);
                assert_eq!(stars_collected, 0);
                assert_eq!(last_utterance, "zebra");
            }
            other => panic!("expected RoutineSnapshot, got {other:?}"),
        }
        assert_eq!(engine.progress(), 0.0);
    }

    #[test]
    fn presentation_resets_timer_for_each_task() {
        let (mut engine, clock) = engine_with_clock("morning");
        confirm_current(&mut engine, "done");
        clock.set_ms(30_000);
        engine.advance(); // 1 star, next task presented at t=30s
        confirm_current(&mut engine, "done");
        clock.set_ms(40_000); // 10s on the second task: fast
        engine.advance();
        assert_eq!(engine.state().stars_collected, 1 + 2);
    }
}
