pub mod auth;
pub mod config;
pub mod routine;
pub mod session;
pub mod stars;

use starpath_core::Event;

/// Minutes/seconds display for countdowns.
pub(crate) fn fmt_duration_ms(ms: u64) -> String {
    let total_secs = ms / 1000;
    format!("{:02}m {:02}s", total_secs / 60, total_secs % 60)
}

/// One-line human rendering of a core event.
pub(crate) fn describe_event(event: &Event) -> Option<String> {
    match event {
        Event::SessionStarted { duration_ms, .. } => {
            Some(format!("Session started ({})", fmt_duration_ms(*duration_ms)))
        }
        Event::SessionWarning { remaining_ms, .. } => Some(format!(
            "Almost done! {} of playtime left",
            fmt_duration_ms(*remaining_ms)
        )),
        Event::SessionLocked { .. } => {
            Some("Playtime is over -- see you after the break!".to_string())
        }
        Event::SessionStopped { remaining_ms, .. } => Some(format!(
            "Session stopped with {} remaining",
            fmt_duration_ms(*remaining_ms)
        )),
        Event::TaskPresented { title, .. } => Some(format!("Next up: {title}")),
        Event::UtteranceMatched { score, .. } => Some(format!("Heard you! (score {score})")),
        Event::RewardReady { generated, .. } => Some(if *generated {
            "Fresh artwork is ready!".to_string()
        } else {
            "Here is your picture!".to_string()
        }),
        Event::TaskCompleted { stars, .. } => Some(format!("You earned {stars} star(s)!")),
        Event::RoutineCompleted { stars_total, .. } => {
            Some(format!("Routine complete -- {stars_total} stars total!"))
        }
        _ => None,
    }
}
