use std::sync::Arc;

use clap::Subcommand;
use starpath_core::{Config, Database, StarLedger, SystemClock};

/// Weekday order for the weekly report.
const DAY_ORDER: [&str; 7] = ["MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

#[derive(Subcommand)]
pub enum StarsAction {
    /// Print a child's progress document as JSON
    Show {
        #[arg(long)]
        child: Option<String>,
    },
    /// Print this week's per-day star counts
    Weekly {
        #[arg(long)]
        child: Option<String>,
    },
    /// Credit stars manually (parent adjustment)
    Add {
        n: i64,
        #[arg(long)]
        child: Option<String>,
    },
}

pub fn run(action: StarsAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let db = Arc::new(Database::open()?);
    let ledger = StarLedger::new(db, Arc::new(SystemClock));

    let child_of = |child: Option<String>| child.unwrap_or_else(|| config.default_child.clone());

    match action {
        StarsAction::Show { child } => {
            let progress = ledger.progress(&child_of(child))?;
            println!("{}", serde_json::to_string_pretty(&progress)?);
        }
        StarsAction::Weekly { child } => {
            let progress = ledger.progress(&child_of(child))?;
            let week_total: i64 = progress.weekly_stars.values().sum();
            for day in DAY_ORDER {
                let count = progress.weekly_stars.get(day).copied().unwrap_or(0);
                println!("{day}  {count}");
            }
            println!("week total: {week_total}  (all time: {})", progress.total_stars);
        }
        StarsAction::Add { n, child } => {
            // Parent tooling wants the error, unlike the in-app flow.
            let progress = ledger.try_add_stars(&child_of(child), n)?;
            println!("total stars: {}", progress.total_stars);
        }
    }
    Ok(())
}
