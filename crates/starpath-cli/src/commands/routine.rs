use std::io::{self, BufRead, Write};
use std::sync::Arc;

use clap::Subcommand;
use starpath_core::routine::{all_routines, get_routine};
use starpath_core::{
    AdvanceOutcome, Config, Database, EventBus, RecognizerEvent, RewardFetcher,
    RoutineProgressionEngine, SessionLockoutController, StarLedger, StartOutcome,
    StockRewardFetcher, SystemClock, UtteranceOutcome,
};

use super::fmt_duration_ms;

#[derive(Subcommand)]
pub enum RoutineAction {
    /// List routines with their unlock state for a child
    List {
        #[arg(long)]
        child: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show a routine's tasks
    Show { key: String },
    /// Walk a routine interactively, reading utterances from stdin
    Run {
        key: String,
        #[arg(long)]
        child: Option<String>,
        /// Serve stock artwork instead of calling the generator
        #[arg(long)]
        offline: bool,
    },
}

pub fn run(action: RoutineAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        RoutineAction::List { child, json } => list(child, json),
        RoutineAction::Show { key } => show(&key),
        RoutineAction::Run {
            key,
            child,
            offline,
        } => run_interactive(&key, child, offline),
    }
}

fn child_or_default(child: Option<String>, config: &Config) -> String {
    child.unwrap_or_else(|| config.default_child.clone())
}

fn list(child: Option<String>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let child = child_or_default(child, &config);
    let db = Arc::new(Database::open()?);
    let ledger = StarLedger::new(db, Arc::new(SystemClock));
    let unlocked = ledger.progress(&child)?.unlocked_routines;

    if json {
        let entries: Vec<_> = all_routines()
            .into_iter()
            .map(|r| {
                serde_json::json!({
                    "key": r.key,
                    "display_name": r.display_name,
                    "tasks": r.tasks.len(),
                    "unlocked": unlocked.iter().any(|u| u == &r.key),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for r in all_routines() {
        let marker = if unlocked.iter().any(|u| u == &r.key) {
            "open"
        } else {
            "locked"
        };
        println!(
            "{:<10} {:<24} {} tasks  [{marker}]",
            r.key,
            r.display_name,
            r.tasks.len()
        );
    }
    Ok(())
}

fn show(key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let routine = get_routine(key);
    println!("{} ({})", routine.display_name, routine.key);
    for (i, task) in routine.tasks.iter().enumerate() {
        println!(
            "  {}. {} -- \"{}\" (say: \"{}\")",
            i + 1,
            task.title,
            task.instruction,
            task.expected_speech
        );
    }
    Ok(())
}

fn run_interactive(
    key: &str,
    child: Option<String>,
    offline: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let child = child_or_default(child, &config);
    let db = Arc::new(Database::open()?);
    let clock = Arc::new(SystemClock);
    let bus = EventBus::new(256);

    // The lockout controller gates entry into any routine.
    let mut gate = SessionLockoutController::new(
        clock.clone(),
        db.clone(),
        config.lockout_durations(),
        bus.clone(),
    );
    gate.initialize();
    if let StartOutcome::StillLocked { remaining_ms } = gate.start_session() {
        println!(
            "Playtime is locked for another {}",
            fmt_duration_ms(remaining_ms)
        );
        return Ok(());
    }

    let fetcher: Box<dyn RewardFetcher> = if offline {
        Box::new(StockRewardFetcher)
    } else {
        Box::new(config.reward_fetcher())
    };
    let mut engine =
        RoutineProgressionEngine::new(clock.clone(), config.star_rules(), bus.clone(), key);
    let ledger = StarLedger::new(db.clone(), clock.clone());

    println!(
        "{} -- {} tasks. Type what the child says; Ctrl-D to leave.",
        engine.routine().display_name,
        engine.routine().tasks.len()
    );
    print_task(&engine);

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("say> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            engine.abandon();
            gate.stop_session();
            println!("\nLeaving the routine -- progress so far is kept.");
            return Ok(());
        };
        let transcript = line?;

        let outcome = engine.on_recognizer_event(RecognizerEvent {
            is_speaking: false,
            transcript,
        });
        match outcome {
            UtteranceOutcome::Matched { request, decision } => {
                println!("Matched (score {})! Fetching your reward...", decision.best_score);
                let artifact = fetcher.fetch(&request.prompt, &request.fallback_artwork_id);
                engine.on_match_confirmed(request.ticket, artifact);
                match engine.advance() {
                    Some(AdvanceOutcome::NextTask { .. }) => {
                        println!("Stars so far: {}", engine.state().stars_collected);
                        print_task(&engine);
                    }
                    Some(AdvanceOutcome::RoutineComplete {
                        routine_key,
                        stars_total,
                    }) => {
                        ledger.record_routine_completion(&child, &routine_key, stars_total);
                        gate.stop_session();
                        println!("All done! {stars_total} stars earned.");
                        return Ok(());
                    }
                    None => {}
                }
            }
            UtteranceOutcome::Rejected { decision } => {
                println!(
                    "Not quite (score {}) -- try saying \"{}\"",
                    decision.best_score,
                    engine
                        .current_task()
                        .map(|t| t.expected_speech.as_str())
                        .unwrap_or_default()
                );
            }
            UtteranceOutcome::Ignored => {}
        }
    }
}

fn print_task(engine: &RoutineProgressionEngine) {
    if let Some(task) = engine.current_task() {
        println!(
            "[{} / {}] {}: {}",
            engine.state().task_index + 1,
            engine.routine().tasks.len(),
            task.title,
            task.instruction
        );
    }
}
