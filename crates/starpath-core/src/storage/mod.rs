//! Device-local persistence: data directory, TOML config, SQLite database.

mod config;
pub mod database;

pub use config::{Config, RewardConfig, ScoringConfig, SessionConfig};
pub use database::Database;

use std::path::PathBuf;

/// Returns `~/.config/starpath[-dev]/` based on STARPATH_ENV.
///
/// Set STARPATH_ENV=dev to use a development data directory.
///
/// # Errors
/// Returns an error if the config directory cannot be created.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("STARPATH_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("starpath-dev")
    } else {
        base_dir.join("starpath")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
