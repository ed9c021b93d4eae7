//! # Starpath Core Library
//!
//! Core business logic for Starpath, a guided-routine companion for young
//! children: bounded play sessions with a persisted cool-down, spoken-
//! utterance task confirmation with generated reward artwork, and a
//! tamper-resistant star ledger with weekly rollover. The CLI binary is a
//! thin layer over this crate; a GUI would sit on the same surface.
//!
//! ## Architecture
//!
//! - **Lockout controller**: wall-clock state machine bounding a play
//!   session and enforcing the cool-down; the caller owns the ticker
//! - **Routine engine**: per-session task traversal driven by recognizer
//!   events, with fuzzy speech matching and ticketed reward fetches
//! - **Star ledger**: atomic day-keyed progress aggregation over a
//!   document store, with ISO-week rollover
//! - **Storage**: SQLite device-local store and TOML configuration
//!
//! ## Key Components
//!
//! - [`SessionLockoutController`]: session window + cool-down state machine
//! - [`RoutineProgressionEngine`]: task traversal and star scoring
//! - [`StarLedger`]: transactional progress writes
//! - [`RewardFetcher`]: artwork generation with stock fallback
//! - [`EventBus`]: snapshot broadcast to observers

pub mod clock;
pub mod error;
pub mod events;
pub mod ledger;
pub mod lockout;
pub mod reward;
pub mod routine;
pub mod speech;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, RewardError, StorageError};
pub use events::{Event, EventBus};
pub use ledger::{ChildProgress, ProgressStore, StarLedger};
pub use lockout::{
    LockPhase, LockStatus, LockoutDurations, LockoutSnapshot, LockoutStore,
    SessionLockoutController, StartOutcome,
};
pub use reward::{HttpRewardFetcher, RewardArtifact, RewardFetcher, StockRewardFetcher};
pub use routine::{
    AdvanceOutcome, FetchRequest, FetchTicket, RecognizerEvent, Routine,
    RoutineProgressionEngine, SessionPhase, SessionState, StarRules, Task, UtteranceOutcome,
};
pub use speech::MatchDecision;
pub use storage::{Config, Database};
