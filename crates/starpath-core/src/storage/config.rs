//! TOML-based application configuration.
//!
//! Stores the tunable knobs of the core engines:
//! - Session window, warning threshold and cool-down length
//! - Star scoring threshold and amounts
//! - Reward-generation endpoint, image parameters and request timeout
//!
//! Configuration is stored at `~/.config/starpath/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;
use crate::lockout::LockoutDurations;
use crate::reward::HttpRewardFetcher;
use crate::routine::StarRules;

/// Session window configuration, in minutes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_minutes")]
    pub session_minutes: u64,
    #[serde(default = "default_warning_minutes")]
    pub warning_minutes: u64,
    #[serde(default = "default_lockout_minutes")]
    pub lockout_minutes: u64,
}

/// Star scoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Completions faster than this earn the bonus amount.
    #[serde(default = "default_fast_bonus_seconds")]
    pub fast_bonus_seconds: u64,
    #[serde(default = "default_fast_stars")]
    pub fast_stars: u32,
    #[serde(default = "default_base_stars")]
    pub base_stars: u32,
}

/// Reward-generation endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardConfig {
    #[serde(default = "default_reward_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_reward_model")]
    pub model: String,
    #[serde(default = "default_image_size")]
    pub width: u32,
    #[serde(default = "default_image_size")]
    pub height: u32,
    #[serde(default = "default_reward_timeout_secs")]
    pub timeout_secs: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/starpath/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub reward: RewardConfig,
    /// Child whose ledger the CLI writes when none is named.
    #[serde(default = "default_child")]
    pub default_child: String,
}

// Default functions
fn default_session_minutes() -> u64 {
    15
}
fn default_warning_minutes() -> u64 {
    5
}
fn default_lockout_minutes() -> u64 {
    15
}
fn default_fast_bonus_seconds() -> u64 {
    20
}
fn default_fast_stars() -> u32 {
    2
}
fn default_base_stars() -> u32 {
    1
}
fn default_reward_endpoint() -> String {
    "https://gen.pollinations.ai/image".into()
}
fn default_reward_model() -> String {
    "turbo".into()
}
fn default_image_size() -> u32 {
    512
}
fn default_reward_timeout_secs() -> u64 {
    10
}
fn default_child() -> String {
    "default".into()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_minutes: default_session_minutes(),
            warning_minutes: default_warning_minutes(),
            lockout_minutes: default_lockout_minutes(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            fast_bonus_seconds: default_fast_bonus_seconds(),
            fast_stars: default_fast_stars(),
            base_stars: default_base_stars(),
        }
    }
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            endpoint: default_reward_endpoint(),
            model: default_reward_model(),
            width: default_image_size(),
            height: default_image_size(),
            timeout_secs: default_reward_timeout_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            scoring: ScoringConfig::default(),
            reward: RewardConfig::default(),
            default_child: default_child(),
        }
    }
}

impl Config {
    pub fn path() -> std::io::Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or write and return the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/starpath"),
            message: e.to_string(),
        })?;
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path,
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path().map_err(|e| ConfigError::SaveFailed {
            path: PathBuf::from("~/.config/starpath"),
            message: e.to_string(),
        })?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    pub fn lockout_durations(&self) -> LockoutDurations {
        LockoutDurations {
            session_ms: self.session.session_minutes * 60 * 1000,
            warning_ms: self.session.warning_minutes * 60 * 1000,
            lockout_ms: self.session.lockout_minutes * 60 * 1000,
        }
    }

    pub fn star_rules(&self) -> StarRules {
        StarRules {
            fast_threshold_ms: self.scoring.fast_bonus_seconds * 1000,
            fast_stars: self.scoring.fast_stars,
            base_stars: self.scoring.base_stars,
        }
    }

    /// Build the HTTP reward fetcher, picking up the keyring credential.
    pub fn reward_fetcher(&self) -> HttpRewardFetcher {
        HttpRewardFetcher::new(&self.reward.endpoint)
            .with_image_params(&self.reward.model, self.reward.width, self.reward.height)
            .with_timeout(std::time::Duration::from_secs(self.reward.timeout_secs))
            .with_keyring_credentials()
    }
}
