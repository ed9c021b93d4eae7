//! Routine catalog and the per-session progression engine.

pub mod catalog;
pub mod engine;

pub use catalog::{all_routines, get_routine, Routine, Task};
pub use engine::{
    AdvanceOutcome, FetchRequest, FetchTicket, RecognizerEvent, RoutineProgressionEngine,
    SessionPhase, SessionState, StarRules, UtteranceOutcome,
};
