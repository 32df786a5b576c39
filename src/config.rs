//! Application-level configuration loading: reveal timings, scoring constants
//! and collaborator endpoints.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};
use validator::{Validate, ValidationError};

use crate::state::{board::BoardRules, word::WordRules};

/// Default location on disk where the console looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/showrunner.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SHOWRUNNER_CONFIG_PATH";

/// Cadence of both reveal strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealTimings {
    /// Time for the continuous reveal to go from hidden to fully shown.
    pub image_duration: Duration,
    /// Sampling step of the continuous reveal.
    pub image_step: Duration,
    /// Bounding timeout of the stepped reveal.
    pub word_deadline: Duration,
    /// Interval between two uncovered letters.
    pub word_step: Duration,
}

impl Default for RevealTimings {
    fn default() -> Self {
        Self {
            image_duration: Duration::from_secs(30),
            image_step: Duration::from_millis(100),
            word_deadline: Duration::from_secs(60),
            word_step: Duration::from_secs(6),
        }
    }
}

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Reveal timer cadence.
    pub timings: RevealTimings,
    /// Points suggested for a correct image answer.
    pub image_points: i32,
    /// Word reveal scoring.
    pub word: WordRules,
    /// Board/lottery constants.
    pub board: BoardRules,
    /// Base URL shared by the catalog and score services.
    pub api_base_url: String,
    /// JSON file holding resume snapshots.
    pub snapshot_path: PathBuf,
    /// Upper bound of one collaborator call.
    pub call_timeout: Duration,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "invalid config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse and validate a JSON document. Missing keys keep their default.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(contents)?;
        raw.validate()?;
        Ok(raw.into())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

/// Why a configuration document was refused.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON syntax or shape error.
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    /// A value broke a validation rule.
    #[error("invalid config: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
#[derive(Debug, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
#[validate(schema(function = "validate_pick_range"))]
struct RawConfig {
    #[validate(range(min = 1))]
    image_reveal_ms: u64,
    #[validate(range(min = 1))]
    image_step_ms: u64,
    #[validate(range(min = 1))]
    word_deadline_ms: u64,
    #[validate(range(min = 1))]
    word_step_ms: u64,
    #[validate(range(min = 0))]
    image_points: i32,
    #[validate(range(min = 1))]
    points_per_letter: i32,
    #[validate(range(min = 0))]
    round_bonus: i32,
    #[validate(range(min = 0))]
    lottery_gain: i32,
    #[validate(range(min = 0))]
    lottery_loss: i32,
    #[validate(range(min = 0))]
    heavy_penalty: i32,
    #[validate(range(min = 0))]
    jackpot: i32,
    #[validate(range(min = 1))]
    pick_min: i32,
    #[validate(range(min = 1))]
    pick_max: i32,
    #[validate(range(min = 1))]
    pick_step: i32,
    #[validate(url)]
    api_base_url: String,
    #[validate(length(min = 1))]
    snapshot_path: String,
    #[validate(range(min = 1))]
    call_timeout_ms: u64,
}

impl Default for RawConfig {
    fn default() -> Self {
        let timings = RevealTimings::default();
        let word = WordRules::default();
        let board = BoardRules::default();
        Self {
            image_reveal_ms: timings.image_duration.as_millis() as u64,
            image_step_ms: timings.image_step.as_millis() as u64,
            word_deadline_ms: timings.word_deadline.as_millis() as u64,
            word_step_ms: timings.word_step.as_millis() as u64,
            image_points: 10,
            points_per_letter: word.points_per_letter,
            round_bonus: board.round_bonus,
            lottery_gain: board.lottery_gain,
            lottery_loss: board.lottery_loss,
            heavy_penalty: board.heavy_penalty,
            jackpot: board.jackpot,
            pick_min: board.pick_min,
            pick_max: board.pick_max,
            pick_step: board.pick_step,
            api_base_url: "http://localhost:3001".into(),
            snapshot_path: "data/showrunner-state.json".into(),
            call_timeout_ms: 5_000,
        }
    }
}

fn validate_pick_range(raw: &RawConfig) -> Result<(), ValidationError> {
    if raw.pick_min > raw.pick_max {
        let mut err = ValidationError::new("pick_range");
        err.message = Some(
            format!(
                "pickMin ({}) must not exceed pickMax ({})",
                raw.pick_min, raw.pick_max
            )
            .into(),
        );
        return Err(err);
    }
    Ok(())
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            timings: RevealTimings {
                image_duration: Duration::from_millis(value.image_reveal_ms),
                image_step: Duration::from_millis(value.image_step_ms),
                word_deadline: Duration::from_millis(value.word_deadline_ms),
                word_step: Duration::from_millis(value.word_step_ms),
            },
            image_points: value.image_points,
            word: WordRules {
                points_per_letter: value.points_per_letter,
            },
            board: BoardRules {
                round_bonus: value.round_bonus,
                lottery_gain: value.lottery_gain,
                lottery_loss: value.lottery_loss,
                heavy_penalty: value.heavy_penalty,
                jackpot: value.jackpot,
                pick_min: value.pick_min,
                pick_max: value.pick_max,
                pick_step: value.pick_step,
            },
            api_base_url: value.api_base_url,
            snapshot_path: PathBuf::from(value.snapshot_path),
            call_timeout: Duration::from_millis(value.call_timeout_ms),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = AppConfig::default();
        assert_eq!(config.timings.image_duration, Duration::from_secs(30));
        assert_eq!(config.timings.word_step, Duration::from_secs(6));
        assert_eq!(config.word.points_per_letter, 10);
        assert_eq!(config.board.jackpot, 100);
        assert_eq!(config.call_timeout, Duration::from_secs(5));
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let config = AppConfig::parse(r#"{"wordStepMs": 2000, "jackpot": 150}"#).unwrap();
        assert_eq!(config.timings.word_step, Duration::from_secs(2));
        assert_eq!(config.board.jackpot, 150);
        assert_eq!(config.board.round_bonus, 20);
    }

    #[test]
    fn zero_duration_is_rejected() {
        let err = AppConfig::parse(r#"{"imageRevealMs": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn inverted_pick_range_is_rejected() {
        let err = AppConfig::parse(r#"{"pickMin": 60, "pickMax": 50}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            AppConfig::parse("{"),
            Err(ConfigError::Parse(_))
        ));
    }
}
