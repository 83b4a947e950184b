//! Verification engine
//!
//! Composes the session store, scoring policy, token issuer and platform
//! capabilities into the operations exposed over the method channel.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::platform::{current_platform, PlatformInfo};
use crate::scoring::{DefaultScoringPolicy, ScoringPolicy};
use crate::session::{Session, SessionStore};
use crate::token::TokenIssuer;
use crate::types::{
    BiometricFailure, BiometricResult, ChallengeType, ResultMetadata, Sample, SampleKind,
    SessionState, VerificationResult,
};

/// Stateful verification engine, one per plugin instance
pub struct VerificationEngine {
    sessions: SessionStore,
    policy: Box<dyn ScoringPolicy>,
    tokens: TokenIssuer,
    platform: Arc<dyn PlatformInfo>,
    clock: Arc<dyn Clock>,
    platform_label: Option<String>,
}

impl Default for VerificationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl VerificationEngine {
    /// Engine for the current OS with default configuration
    pub fn new() -> Self {
        Self::from_validated(EngineConfig::default())
    }

    /// Engine for the current OS with the given configuration.
    ///
    /// Fails with `ConfigError` when `config` does not pass
    /// [`EngineConfig::validate`].
    pub fn with_config(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: EngineConfig) -> Self {
        Self {
            sessions: SessionStore::new(config.max_samples),
            policy: Box::new(DefaultScoringPolicy::new(config.scoring)),
            tokens: TokenIssuer::new(),
            platform: current_platform(),
            clock: Arc::new(SystemClock),
            platform_label: config.platform_label,
        }
    }

    /// Replace the scoring policy
    pub fn with_policy(mut self, policy: impl ScoringPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Replace the platform capabilities
    pub fn with_platform(mut self, platform: Arc<dyn PlatformInfo>) -> Self {
        self.platform = platform;
        self
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Platform name reported in metadata
    pub fn platform_name(&self) -> &str {
        self.platform_label
            .as_deref()
            .unwrap_or_else(|| self.platform.name())
    }

    pub fn platform_version(&self) -> String {
        self.platform.version()
    }

    pub fn device_fingerprint(&self) -> String {
        self.platform.fingerprint()
    }

    /// Start a new session with `config`, discarding any existing one
    pub fn initialize(&self, config: Map<String, Value>) -> bool {
        tracing::debug!(keys = config.len(), "session initialized");
        self.sessions.initialize(config)
    }

    /// Run a traditional challenge.
    ///
    /// `arguments` are layered over the session config for this call only.
    pub fn verify(&self, arguments: Option<&Map<String, Value>>) -> VerificationResult {
        let (score, effective) = self
            .sessions
            .score_config(arguments, |config| self.policy.score_traditional(config));

        let mut metadata = ResultMetadata::new(self.platform_name(), self.clock.now());
        metadata.action = effective
            .get("action")
            .and_then(Value::as_str)
            .map(str::to_string);

        self.build_result(ChallengeType::Traditional, score, metadata)
    }

    /// Open a behavioral window
    pub fn start_behavioral(&self) -> Result<(), EngineError> {
        self.sessions
            .start_behavioral(self.clock.now())
            .inspect_err(|e| tracing::warn!(error = %e, "start behavioral rejected"))?;
        tracing::debug!("behavioral window opened");
        Ok(())
    }

    /// Buffer a sample; dropped silently when no window is open
    pub fn record_sample(&self, sample: Sample) -> bool {
        self.sessions.ingest_sample(sample)
    }

    /// Buffer a sample stamped with the engine clock
    pub fn record_sample_now(&self, kind: SampleKind, magnitude: f64) -> bool {
        self.record_sample(Sample::new(self.clock.now(), kind, magnitude))
    }

    /// Close the behavioral window and score it
    pub fn stop_behavioral(&self) -> Result<VerificationResult, EngineError> {
        let now = self.clock.now();
        let window = self
            .sessions
            .stop_behavioral(now, |elapsed_ms, sample_count| {
                self.policy.score_behavioral(elapsed_ms, sample_count)
            })
            .inspect_err(|e| tracing::warn!(error = %e, "stop behavioral rejected"))?;

        let mut metadata = ResultMetadata::new(self.platform_name(), now);
        metadata.duration = Some(window.elapsed_ms());
        metadata.data_points = Some(window.samples.len());

        Ok(self.build_result(ChallengeType::Behavioral, window.score, metadata))
    }

    /// Tear the session down. Idempotent.
    pub fn reset(&self) {
        self.sessions.reset();
        tracing::debug!("session reset");
    }

    pub fn is_biometric_available(&self) -> bool {
        self.platform.biometric_available()
    }

    /// Run the platform biometric prompt, if there is one
    pub fn authenticate_with_biometric(&self) -> BiometricResult {
        if !self.platform.biometric_available() {
            return BiometricResult::Failed(BiometricFailure::new(
                self.platform.biometric_unavailable_message(),
            ));
        }

        match self.platform.authenticate_biometric() {
            Ok(biometric_type) => {
                let mut metadata = ResultMetadata::new(self.platform_name(), self.clock.now());
                metadata.biometric_type = Some(biometric_type);
                BiometricResult::Verified(self.build_result(
                    ChallengeType::Biometric,
                    1.0,
                    metadata,
                ))
            }
            Err(message) => BiometricResult::Failed(BiometricFailure::new(message)),
        }
    }

    pub fn session_state(&self) -> SessionState {
        self.sessions.state()
    }

    /// Copy of the current session, for diagnostics
    pub fn session(&self) -> Session {
        self.sessions.snapshot()
    }

    fn build_result(
        &self,
        challenge: ChallengeType,
        score: f64,
        metadata: ResultMetadata,
    ) -> VerificationResult {
        let success = self.policy.passes(challenge, score);
        let token = success.then(|| self.tokens.issue(challenge));

        tracing::debug!(challenge = %challenge, score, success, "verification scored");

        VerificationResult {
            success,
            score,
            token,
            challenge_type: challenge,
            metadata,
        }
    }
}
