use std::sync::Arc;
use std::time::Duration;

use clap::Subcommand;
use starpath_core::{
    Config, Database, EventBus, LockStatus, LockoutSnapshot, SessionLockoutController,
    StartOutcome, SystemClock,
};

use super::{describe_event, fmt_duration_ms};

/// kv key under which the countdown survives between CLI invocations.
const SNAPSHOT_KEY: &str = "session_snapshot";

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start a session if the cool-down allows it
    Start,
    /// Print lock/session state as JSON
    Status,
    /// Stop the active session without engaging the lock
    Stop,
    /// Drive the countdown with a 1s ticker until lock or --seconds elapse
    Run {
        /// Stop the session after this many seconds instead of running out
        #[arg(long)]
        seconds: Option<u64>,
    },
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let db = Arc::new(Database::open()?);
    let bus = EventBus::new(256);
    let mut controller = SessionLockoutController::new(
        Arc::new(SystemClock),
        db.clone(),
        config.lockout_durations(),
        bus.clone(),
    );
    restore_snapshot(&db, &mut controller);

    match action {
        SessionAction::Start => {
            match controller.start_session() {
                StartOutcome::Started { duration_ms } => {
                    save_snapshot(&db, &controller)?;
                    println!("Session started ({})", fmt_duration_ms(duration_ms));
                }
                StartOutcome::StillLocked { remaining_ms } => {
                    println!("Still locked for {}", fmt_duration_ms(remaining_ms));
                }
            }
            Ok(())
        }
        SessionAction::Status => {
            let status = controller.check_lock_status();
            let (locked, lock_remaining_ms) = match status {
                LockStatus::Locked { remaining_ms, .. } => (true, remaining_ms),
                LockStatus::Unlocked => (false, 0),
            };
            let state = serde_json::json!({
                "locked": locked,
                "lock_remaining_ms": lock_remaining_ms,
                "session_active": controller.session_active(),
                "session_remaining_ms": controller.remaining_session_ms(),
            });
            println!("{}", serde_json::to_string_pretty(&state)?);
            if controller.session_active() {
                save_snapshot(&db, &controller)?;
            } else {
                db.kv_delete(SNAPSHOT_KEY)?;
            }
            Ok(())
        }
        SessionAction::Stop => {
            controller.stop_session();
            db.kv_delete(SNAPSHOT_KEY)?;
            println!("Session stopped");
            Ok(())
        }
        SessionAction::Run { seconds } => run_countdown(&db, controller, &bus, seconds),
    }
}

/// Resume a previous invocation's countdown; the persisted lock always wins.
fn restore_snapshot(db: &Database, controller: &mut SessionLockoutController) {
    match db.kv_get(SNAPSHOT_KEY) {
        Ok(Some(raw)) => match serde_json::from_str::<LockoutSnapshot>(&raw) {
            Ok(snapshot) => controller.restore(&snapshot),
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable session snapshot");
                controller.initialize();
            }
        },
        Ok(None) => {
            controller.initialize();
        }
        Err(e) => {
            tracing::warn!(error = %e, "session snapshot unavailable");
            controller.initialize();
        }
    }
}

fn save_snapshot(
    db: &Database,
    controller: &SessionLockoutController,
) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = serde_json::to_string(&controller.snapshot())?;
    db.kv_set(SNAPSHOT_KEY, &snapshot)?;
    Ok(())
}

/// Own the 1-second ticker. The interval lives inside the loop scope, so
/// breaking out of it (lock engaged, time cap, session gone) tears the
/// ticker down with it.
fn run_countdown(
    db: &Database,
    mut controller: SessionLockoutController,
    bus: &EventBus,
    seconds: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    if !controller.session_active() {
        match controller.start_session() {
            StartOutcome::Started { duration_ms } => {
                println!("Session started ({})", fmt_duration_ms(duration_ms));
            }
            StartOutcome::StillLocked { remaining_ms } => {
                println!("Still locked for {}", fmt_duration_ms(remaining_ms));
                return Ok(());
            }
        }
    }

    let mut events = bus.subscribe();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.tick().await; // first tick completes immediately
        let mut elapsed_secs = 0u64;
        loop {
            ticker.tick().await;
            controller.tick(1_000);
            elapsed_secs += 1;

            while let Ok(event) = events.try_recv() {
                if let Some(line) = describe_event(&event) {
                    println!("{line}");
                }
            }

            if controller.is_locked() {
                break;
            }
            if seconds.is_some_and(|cap| elapsed_secs >= cap) {
                controller.stop_session();
                println!(
                    "Time cap reached, session stopped with {} remaining",
                    fmt_duration_ms(controller.remaining_session_ms())
                );
                break;
            }
        }
    });

    if controller.is_locked() {
        db.kv_delete(SNAPSHOT_KEY)?;
    } else {
        save_snapshot(db, &controller)?;
    }
    Ok(())
}
