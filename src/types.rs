//! Core types for verification sessions
//!
//! This module defines the values that flow between the session store, the
//! scoring policy and the method-channel boundary. Everything that crosses the
//! boundary serializes with the camelCase keys the platform plugins expect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a verification session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// No behavioral window open. Initial state and the target of `reset`.
    #[default]
    Idle,
    /// Behavioral window open; samples are being collected
    BehavioralActive,
}

/// Kind of interaction captured during a behavioral window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SampleKind {
    PointerMove,
    KeyTiming,
    Tap,
}

impl std::str::FromStr for SampleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pointer-move" | "pointerMove" | "pointer_move" => Ok(SampleKind::PointerMove),
            "key-timing" | "keyTiming" | "key_timing" => Ok(SampleKind::KeyTiming),
            "tap" => Ok(SampleKind::Tap),
            other => Err(format!("unknown sample kind: {}", other)),
        }
    }
}

/// A single behavioral interaction sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// When the interaction happened (epoch milliseconds on the wire)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Interaction kind
    pub kind: SampleKind,
    /// Kind-specific magnitude (pointer speed, inter-key interval, tap pressure)
    pub magnitude: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, kind: SampleKind, magnitude: f64) -> Self {
        Self {
            timestamp,
            kind,
            magnitude,
        }
    }
}

/// Category of verification performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChallengeType {
    /// One-shot check scored from the session configuration
    Traditional,
    /// Timed interaction sampling
    Behavioral,
    /// Platform biometric prompt
    Biometric,
}

impl ChallengeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeType::Traditional => "traditional",
            ChallengeType::Behavioral => "behavioral",
            ChallengeType::Biometric => "biometric",
        }
    }
}

impl std::fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to every verification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    /// Reporting platform (e.g. "linux", "windows")
    pub platform: String,
    /// Result creation time in epoch milliseconds
    pub timestamp: i64,
    /// Action name supplied to `verify`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Behavioral window length in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    /// Number of samples collected during the behavioral window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_points: Option<usize>,
    /// Biometric modality reported by the platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biometric_type: Option<String>,
}

impl ResultMetadata {
    pub fn new(platform: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            platform: platform.into(),
            timestamp: at.timestamp_millis(),
            action: None,
            duration: None,
            data_points: None,
            biometric_type: None,
        }
    }
}

/// Outcome of a `verify`, `stopBehavioralAnalysis` or biometric call.
///
/// `token` is present exactly when `success` is true, and `score` is always
/// within `[0, 1]`. Results are built once by the engine and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub success: bool,
    pub score: f64,
    #[serde(default)]
    pub token: Option<String>,
    pub challenge_type: ChallengeType,
    pub metadata: ResultMetadata,
}

/// Failure payload returned when biometric authentication cannot complete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricFailure {
    pub success: bool,
    pub error_message: String,
}

impl BiometricFailure {
    pub fn new(error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: error_message.into(),
        }
    }
}

/// Result of `authenticateWithBiometric`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BiometricResult {
    Verified(VerificationResult),
    Failed(BiometricFailure),
}

impl BiometricResult {
    pub fn success(&self) -> bool {
        match self {
            BiometricResult::Verified(result) => result.success,
            BiometricResult::Failed(_) => false,
        }
    }
}
