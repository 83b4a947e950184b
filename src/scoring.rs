//! Verification scoring
//!
//! Maps session signals to a score in `[0, 1]`. Scoring is pure: identical
//! inputs always produce identical scores, so results can be reproduced and
//! tested. Hosts can swap in their own [`ScoringPolicy`].

use serde_json::{Map, Value};

use crate::config::ScoringConfig;
use crate::types::ChallengeType;

/// Scoring policy injected into the engine
pub trait ScoringPolicy: Send + Sync {
    /// Score a one-shot traditional challenge from the effective config
    fn score_traditional(&self, config: &Map<String, Value>) -> f64;

    /// Score a closed behavioral window
    fn score_behavioral(&self, elapsed_ms: i64, sample_count: usize) -> f64;

    /// Whether `score` passes for the given challenge type
    fn passes(&self, challenge: ChallengeType, score: f64) -> bool;
}

/// Default policy driven by [`ScoringConfig`]
#[derive(Debug, Clone, Default)]
pub struct DefaultScoringPolicy {
    config: ScoringConfig,
}

impl DefaultScoringPolicy {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }
}

impl ScoringPolicy for DefaultScoringPolicy {
    /// Formula:
    /// ```text
    /// score = traditional_base
    ///       + site_key_bonus  (siteKey is a non-empty string)
    ///       + action_bonus    (action is a non-empty string)
    /// ```
    fn score_traditional(&self, config: &Map<String, Value>) -> f64 {
        let c = &self.config;
        let mut score = c.traditional_base;

        if has_text(config, "siteKey") {
            score += c.site_key_bonus;
        }
        if has_text(config, "action") {
            score += c.action_bonus;
        }

        clamp_score(score)
    }

    /// Formula:
    /// ```text
    /// score = behavioral_base
    ///       + dwell_bonus       (elapsed > min_dwell)
    ///       + pace_bonus        (min_dwell < elapsed < max_dwell)
    ///       + engagement_bonus  (samples > min_samples)
    /// ```
    /// An instant window earns neither time bonus; a slow one keeps the dwell
    /// bonus but loses the pace bonus.
    fn score_behavioral(&self, elapsed_ms: i64, sample_count: usize) -> f64 {
        let c = &self.config;
        let mut score = c.behavioral_base;

        let dwelled = elapsed_ms > c.min_dwell_ms;
        if dwelled {
            score += c.dwell_bonus;
        }
        if dwelled && elapsed_ms < c.max_dwell_ms {
            score += c.pace_bonus;
        }
        if sample_count > c.min_samples {
            score += c.engagement_bonus;
        }

        clamp_score(score)
    }

    fn passes(&self, challenge: ChallengeType, score: f64) -> bool {
        match challenge {
            ChallengeType::Traditional => score > self.config.traditional_threshold,
            ChallengeType::Behavioral => score > self.config.behavioral_threshold,
            // The platform prompt is the verifier; the engine trusts its verdict
            ChallengeType::Biometric => score > 0.0,
        }
    }
}

/// Policy returning constant scores, for pinned tests and host overrides
#[derive(Debug, Clone)]
pub struct FixedScoringPolicy {
    traditional: f64,
    behavioral: f64,
    thresholds: DefaultScoringPolicy,
}

impl FixedScoringPolicy {
    /// Both challenge types score `score`; default thresholds apply
    pub fn new(score: f64) -> Self {
        Self::with_scores(score, score)
    }

    pub fn with_scores(traditional: f64, behavioral: f64) -> Self {
        Self {
            traditional: clamp_score(traditional),
            behavioral: clamp_score(behavioral),
            thresholds: DefaultScoringPolicy::default(),
        }
    }
}

impl ScoringPolicy for FixedScoringPolicy {
    fn score_traditional(&self, _config: &Map<String, Value>) -> f64 {
        self.traditional
    }

    fn score_behavioral(&self, _elapsed_ms: i64, _sample_count: usize) -> f64 {
        self.behavioral
    }

    fn passes(&self, challenge: ChallengeType, score: f64) -> bool {
        self.thresholds.passes(challenge, score)
    }
}

/// Clamp to `[0, 1]`; NaN collapses to 0
fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}

fn has_text(config: &Map<String, Value>, key: &str) -> bool {
    config
        .get(key)
        .and_then(Value::as_str)
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_traditional_is_pure() {
        let policy = DefaultScoringPolicy::default();
        let config = map(json!({ "siteKey": "6Lc-key", "action": "login" }));

        let first = policy.score_traditional(&config);
        let second = policy.score_traditional(&config);
        assert_eq!(first, second);
    }

    #[test]
    fn test_traditional_signals() {
        let policy = DefaultScoringPolicy::default();

        assert!(approx(policy.score_traditional(&Map::new()), 0.7));
        assert!(approx(
            policy.score_traditional(&map(json!({ "siteKey": "6Lc-key" }))),
            0.85
        ));
        assert!(approx(
            policy.score_traditional(&map(json!({ "siteKey": "6Lc-key", "action": "login" }))),
            0.95
        ));
    }

    #[test]
    fn test_traditional_ignores_blank_and_non_string_signals() {
        let policy = DefaultScoringPolicy::default();
        let config = map(json!({ "siteKey": "   ", "action": 42 }));
        assert!(approx(policy.score_traditional(&config), 0.7));
    }

    #[test]
    fn test_traditional_threshold() {
        let policy = DefaultScoringPolicy::default();
        assert!(!policy.passes(ChallengeType::Traditional, 0.7));
        assert!(!policy.passes(ChallengeType::Traditional, 0.8));
        assert!(policy.passes(ChallengeType::Traditional, 0.85));
    }

    #[test]
    fn test_behavioral_instant_window_gets_base_only() {
        let policy = DefaultScoringPolicy::default();
        let score = policy.score_behavioral(0, 0);
        assert!(approx(score, 0.5));
        assert!(!policy.passes(ChallengeType::Behavioral, score));
    }

    #[test]
    fn test_behavioral_full_marks() {
        let policy = DefaultScoringPolicy::default();
        let score = policy.score_behavioral(2_000, 6);
        assert!(approx(score, 1.0));
        assert!(policy.passes(ChallengeType::Behavioral, score));
    }

    #[test]
    fn test_behavioral_slow_window_loses_pace_bonus() {
        let policy = DefaultScoringPolicy::default();
        assert!(approx(policy.score_behavioral(15_000, 0), 0.7));
        assert!(approx(policy.score_behavioral(15_000, 10), 0.8));
    }

    #[test]
    fn test_behavioral_window_edges_are_exclusive() {
        let policy = DefaultScoringPolicy::default();
        assert!(approx(policy.score_behavioral(1_000, 0), 0.5));
        assert!(approx(policy.score_behavioral(1_001, 0), 0.9));
        assert!(approx(policy.score_behavioral(10_000, 0), 0.7));
        assert!(approx(policy.score_behavioral(2_000, 5), 0.9));
    }

    #[test]
    fn test_scores_stay_in_unit_interval() {
        let generous = DefaultScoringPolicy::new(ScoringConfig {
            behavioral_base: 0.9,
            traditional_base: 0.95,
            ..ScoringConfig::default()
        });
        let config = map(json!({ "siteKey": "k", "action": "a" }));

        for elapsed in [-5_000, 0, 999, 1_500, 9_999, 60_000] {
            for samples in [0, 6, 10_000] {
                let score = generous.score_behavioral(elapsed, samples);
                assert!((0.0..=1.0).contains(&score));
            }
        }
        assert_eq!(generous.score_traditional(&config), 1.0);
    }

    #[test]
    fn test_fixed_policy() {
        let policy = FixedScoringPolicy::new(0.85);
        assert_eq!(policy.score_traditional(&Map::new()), 0.85);
        assert_eq!(policy.score_behavioral(0, 0), 0.85);
        assert!(policy.passes(ChallengeType::Traditional, 0.85));

        let clamped = FixedScoringPolicy::with_scores(3.0, f64::NAN);
        assert_eq!(clamped.score_traditional(&Map::new()), 1.0);
        assert_eq!(clamped.score_behavioral(0, 0), 0.0);
    }
}
