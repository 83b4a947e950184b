//! Engine configuration
//!
//! Configuration can be built from defaults, a JSON document, or environment
//! variables. Every field has a default, so partial JSON documents are fine.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Default cap on samples buffered during one behavioral window
pub const DEFAULT_MAX_SAMPLES: usize = 10_000;

/// Scoring constants used by the default scoring policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoringConfig {
    /// Traditional challenge succeeds when the score is strictly above this
    pub traditional_threshold: f64,
    /// Behavioral challenge succeeds when the score is strictly above this
    pub behavioral_threshold: f64,
    /// Starting score for a traditional challenge
    pub traditional_base: f64,
    /// Awarded when the session config carries a non-empty `siteKey`
    pub site_key_bonus: f64,
    /// Awarded when the verify call names a non-empty `action`
    pub action_bonus: f64,
    /// Starting score for a behavioral window
    pub behavioral_base: f64,
    /// Shortest plausible human interaction (ms)
    pub min_dwell_ms: i64,
    /// Longest plausible human interaction (ms)
    pub max_dwell_ms: i64,
    /// Awarded when the window lasted longer than `min_dwell_ms`
    pub dwell_bonus: f64,
    /// Awarded when the window also closed before `max_dwell_ms`
    pub pace_bonus: f64,
    /// Samples needed (strictly more than) for the engagement bonus
    pub min_samples: usize,
    /// Awarded for sufficient interaction data
    pub engagement_bonus: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            traditional_threshold: 0.8,
            behavioral_threshold: 0.6,
            traditional_base: 0.7,
            site_key_bonus: 0.15,
            action_bonus: 0.1,
            behavioral_base: 0.5,
            min_dwell_ms: 1_000,
            max_dwell_ms: 10_000,
            dwell_bonus: 0.2,
            pace_bonus: 0.2,
            min_samples: 5,
            engagement_bonus: 0.1,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub scoring: ScoringConfig,
    /// Samples beyond this count are dropped for the rest of the window
    pub max_samples: usize,
    /// Overrides the platform name reported in result metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_label: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            max_samples: DEFAULT_MAX_SAMPLES,
            platform_label: None,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EngineError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = ScoringConfig::default();

        let scoring = ScoringConfig {
            traditional_threshold: env_parse("RECAPTCHA_TRADITIONAL_THRESHOLD")
                .unwrap_or(defaults.traditional_threshold),
            behavioral_threshold: env_parse("RECAPTCHA_BEHAVIORAL_THRESHOLD")
                .unwrap_or(defaults.behavioral_threshold),
            min_dwell_ms: env_parse("RECAPTCHA_MIN_DWELL_MS").unwrap_or(defaults.min_dwell_ms),
            max_dwell_ms: env_parse("RECAPTCHA_MAX_DWELL_MS").unwrap_or(defaults.max_dwell_ms),
            min_samples: env_parse("RECAPTCHA_MIN_SAMPLES").unwrap_or(defaults.min_samples),
            ..defaults
        };

        let platform_label = std::env::var("RECAPTCHA_PLATFORM_LABEL")
            .ok()
            .filter(|s| !s.trim().is_empty());

        Self {
            scoring,
            max_samples: env_parse("RECAPTCHA_MAX_SAMPLES").unwrap_or(DEFAULT_MAX_SAMPLES),
            platform_label,
        }
    }

    /// Check that thresholds and windows are usable
    pub fn validate(&self) -> Result<(), EngineError> {
        let s = &self.scoring;

        for (name, value) in [
            ("traditionalThreshold", s.traditional_threshold),
            ("behavioralThreshold", s.behavioral_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::ConfigError(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if s.min_dwell_ms < 0 || s.min_dwell_ms >= s.max_dwell_ms {
            return Err(EngineError::ConfigError(format!(
                "dwell window must satisfy 0 <= minDwellMs < maxDwellMs, got {}..{}",
                s.min_dwell_ms, s.max_dwell_ms
            )));
        }

        if self.max_samples == 0 {
            return Err(EngineError::ConfigError(
                "maxSamples must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
