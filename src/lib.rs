//! reCAPTCHA Native - verification-session engine for the flutter_recaptcha plugins
//!
//! One engine serves every host platform. Platform shims forward their
//! method-channel calls (over the C ABI in [`ffi`] or the Rust API in
//! [`channel`]) and get exactly one response envelope back.
//!
//! Lifecycle: `initialize` → `verify` / `startBehavioralAnalysis` → samples →
//! `stopBehavioralAnalysis` → `reset`.
//!
//! ## Modules
//!
//! - **Session**: lifecycle state and the behavioral sample buffer
//! - **Scoring**: deterministic, injectable scoring policies
//! - **Token**: unguessable success tokens
//! - **Channel**: method-name dispatch and response envelopes
//! - **Platform**: per-OS version, fingerprint and biometric capabilities

pub mod channel;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod platform;
pub mod scoring;
pub mod session;
pub mod token;
pub mod types;

#[cfg(feature = "cli")]
pub mod logging;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use channel::{Dispatcher, Method, MethodCall, MethodResponse};
pub use config::{EngineConfig, ScoringConfig};
pub use engine::VerificationEngine;
pub use error::EngineError;
pub use platform::{current_platform, PlatformInfo};
pub use scoring::{DefaultScoringPolicy, FixedScoringPolicy, ScoringPolicy};
pub use types::{
    BiometricResult, ChallengeType, ResultMetadata, Sample, SampleKind, SessionState,
    VerificationResult,
};

/// Library version
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Method channel name shared with the Dart side of the plugin
pub const CHANNEL_NAME: &str = "flutter_recaptcha";
