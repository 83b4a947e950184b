//! Method-channel dispatch
//!
//! Hosts deliver named method invocations with an optional argument payload;
//! the [`Dispatcher`] routes each one to exactly one engine operation and
//! answers with exactly one [`MethodResponse`]. JSON only appears at this
//! boundary.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::engine::VerificationEngine;
use crate::error::EngineError;
use crate::types::{Sample, SampleKind};

/// Methods understood by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GetPlatformVersion,
    Initialize,
    Verify,
    IsBiometricAvailable,
    AuthenticateWithBiometric,
    StartBehavioralAnalysis,
    RecordBehavioralSample,
    StopBehavioralAnalysis,
    GetDeviceFingerprint,
    Reset,
}

impl Method {
    pub const ALL: [Method; 10] = [
        Method::GetPlatformVersion,
        Method::Initialize,
        Method::Verify,
        Method::IsBiometricAvailable,
        Method::AuthenticateWithBiometric,
        Method::StartBehavioralAnalysis,
        Method::RecordBehavioralSample,
        Method::StopBehavioralAnalysis,
        Method::GetDeviceFingerprint,
        Method::Reset,
    ];

    /// Look up a method by its channel name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.name() == name)
    }

    /// Channel name of the method
    pub fn name(&self) -> &'static str {
        match self {
            Method::GetPlatformVersion => "getPlatformVersion",
            Method::Initialize => "initialize",
            Method::Verify => "verify",
            Method::IsBiometricAvailable => "isBiometricAvailable",
            Method::AuthenticateWithBiometric => "authenticateWithBiometric",
            Method::StartBehavioralAnalysis => "startBehavioralAnalysis",
            Method::RecordBehavioralSample => "recordBehavioralSample",
            Method::StopBehavioralAnalysis => "stopBehavioralAnalysis",
            Method::GetDeviceFingerprint => "getDeviceFingerprint",
            Method::Reset => "reset",
        }
    }
}

/// A single method invocation from the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Option<Value>) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

/// Response envelope: exactly one per method call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum MethodResponse {
    Success {
        value: Value,
    },
    Error {
        code: String,
        message: String,
        #[serde(default)]
        details: Option<Value>,
    },
    NotImplemented,
}

impl MethodResponse {
    pub fn success(value: Value) -> Self {
        MethodResponse::Success { value }
    }

    /// Success carrying no value (`null` on the wire)
    pub fn empty() -> Self {
        Self::success(Value::Null)
    }

    /// Serialize `value` into a success response
    pub fn from_serializable<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Self::success(value),
            Err(e) => Self::error("INTERNAL_ERROR", e.to_string(), None),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>, details: Option<Value>) -> Self {
        MethodResponse::Error {
            code: code.into(),
            message: message.into(),
            details,
        }
    }

    pub fn not_implemented() -> Self {
        MethodResponse::NotImplemented
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MethodResponse::Success { .. })
    }

    /// Success value, if any
    pub fn value(&self) -> Option<&Value> {
        match self {
            MethodResponse::Success { value } => Some(value),
            _ => None,
        }
    }

    pub fn to_json(&self) -> String {
        // An enum of JSON values and strings always serializes
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"outcome":"error","code":"INTERNAL_ERROR","message":"serialization failed"}"#
                .to_string()
        })
    }
}

impl From<EngineError> for MethodResponse {
    fn from(e: EngineError) -> Self {
        MethodResponse::error(e.code(), e.to_string(), None)
    }
}

/// Routes method calls to a [`VerificationEngine`]
pub struct Dispatcher {
    engine: VerificationEngine,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(VerificationEngine::new())
    }
}

impl Dispatcher {
    pub fn new(engine: VerificationEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &VerificationEngine {
        &self.engine
    }

    /// Handle one invocation by name
    pub fn handle(&self, method: &str, arguments: Option<&Value>) -> MethodResponse {
        let Some(method) = Method::from_name(method) else {
            tracing::debug!(method, "method not implemented");
            return MethodResponse::not_implemented();
        };

        tracing::debug!(method = method.name(), "method call");
        match self.dispatch(method, arguments) {
            Ok(response) => response,
            Err(e) => MethodResponse::from(e),
        }
    }

    pub fn handle_call(&self, call: &MethodCall) -> MethodResponse {
        self.handle(&call.method, call.arguments.as_ref())
    }

    /// Handle a JSON-encoded [`MethodCall`] and return the JSON response
    pub fn handle_json(&self, json: &str) -> String {
        let response = match serde_json::from_str::<MethodCall>(json) {
            Ok(call) => self.handle_call(&call),
            Err(e) => MethodResponse::from(EngineError::from(e)),
        };
        response.to_json()
    }

    fn dispatch(
        &self,
        method: Method,
        arguments: Option<&Value>,
    ) -> Result<MethodResponse, EngineError> {
        let engine = &self.engine;

        let response = match method {
            Method::GetPlatformVersion => MethodResponse::success(engine.platform_version().into()),
            Method::Initialize => {
                let config = config_arguments(method, arguments)?.ok_or_else(|| {
                    EngineError::MalformedArguments(
                        "initialize requires a configuration map".to_string(),
                    )
                })?;
                MethodResponse::success(engine.initialize(config).into())
            }
            Method::Verify => {
                let arguments = config_arguments(method, arguments)?;
                MethodResponse::from_serializable(&engine.verify(arguments.as_ref()))
            }
            Method::IsBiometricAvailable => {
                MethodResponse::success(engine.is_biometric_available().into())
            }
            Method::AuthenticateWithBiometric => {
                MethodResponse::from_serializable(&engine.authenticate_with_biometric())
            }
            Method::StartBehavioralAnalysis => {
                engine.start_behavioral()?;
                MethodResponse::empty()
            }
            Method::RecordBehavioralSample => {
                let accepted = match sample_argument(arguments)? {
                    SampleArgument::Stamped(sample) => engine.record_sample(sample),
                    SampleArgument::Unstamped(kind, magnitude) => {
                        engine.record_sample_now(kind, magnitude)
                    }
                };
                MethodResponse::success(accepted.into())
            }
            Method::StopBehavioralAnalysis => {
                MethodResponse::from_serializable(&engine.stop_behavioral()?)
            }
            Method::GetDeviceFingerprint => {
                MethodResponse::success(engine.device_fingerprint().into())
            }
            Method::Reset => {
                engine.reset();
                MethodResponse::empty()
            }
        };

        Ok(response)
    }
}

/// Keys that must be strings when present in a configuration map
const STRING_KEYS: [&str; 2] = ["siteKey", "action"];

/// Accept `null`/absent or a map; reject anything else
fn config_arguments(
    method: Method,
    arguments: Option<&Value>,
) -> Result<Option<Map<String, Value>>, EngineError> {
    let map = match arguments {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(EngineError::MalformedArguments(format!(
                "{} expects a map, got {}",
                method.name(),
                json_type(other)
            )))
        }
    };

    for key in STRING_KEYS {
        if let Some(value) = map.get(key) {
            if !value.is_string() && !value.is_null() {
                return Err(EngineError::MalformedArguments(format!(
                    "{} must be a string, got {}",
                    key,
                    json_type(value)
                )));
            }
        }
    }

    Ok(Some(map.clone()))
}

enum SampleArgument {
    Stamped(Sample),
    Unstamped(SampleKind, f64),
}

#[derive(Deserialize)]
struct RawSample {
    kind: String,
    magnitude: f64,
    #[serde(default)]
    timestamp: Option<i64>,
}

fn sample_argument(arguments: Option<&Value>) -> Result<SampleArgument, EngineError> {
    let value = arguments.ok_or_else(|| {
        EngineError::MalformedArguments("recordBehavioralSample requires a sample map".to_string())
    })?;

    let raw: RawSample = serde_json::from_value(value.clone())
        .map_err(|e| EngineError::MalformedArguments(format!("invalid sample: {}", e)))?;

    let kind: SampleKind = raw.kind.parse().map_err(EngineError::MalformedArguments)?;

    if !raw.magnitude.is_finite() {
        return Err(EngineError::MalformedArguments(
            "sample magnitude must be finite".to_string(),
        ));
    }

    match raw.timestamp {
        None => Ok(SampleArgument::Unstamped(kind, raw.magnitude)),
        Some(ms) => {
            let timestamp = Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
                EngineError::MalformedArguments(format!("timestamp out of range: {}", ms))
            })?;
            Ok(SampleArgument::Stamped(Sample::new(timestamp, kind, raw.magnitude)))
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::platform::StaticPlatform;
    use crate::scoring::FixedScoringPolicy;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn test_dispatcher() -> (Dispatcher, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap(),
        ));
        let engine = VerificationEngine::new()
            .with_platform(Arc::new(
                StaticPlatform::new("linux", "Linux 6.8.0")
                    .with_identity(vec!["test-host".to_string()]),
            ))
            .with_clock(clock.clone());
        (Dispatcher::new(engine), clock)
    }

    fn error_code(response: &MethodResponse) -> Option<&str> {
        match response {
            MethodResponse::Error { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    #[test]
    fn test_method_names_round_trip() {
        for method in Method::ALL {
            assert_eq!(Method::from_name(method.name()), Some(method));
        }
        assert_eq!(Method::from_name("launchMissiles"), None);
    }

    #[test]
    fn test_unknown_method_not_implemented() {
        let (dispatcher, _) = test_dispatcher();
        let response = dispatcher.handle("launchMissiles", None);
        assert_eq!(response, MethodResponse::NotImplemented);
    }

    #[test]
    fn test_platform_version_and_fingerprint() {
        let (dispatcher, _) = test_dispatcher();

        let version = dispatcher.handle("getPlatformVersion", None);
        assert_eq!(version, MethodResponse::success(json!("Linux 6.8.0")));

        let fingerprint = dispatcher.handle("getDeviceFingerprint", None);
        assert_eq!(fingerprint.value().and_then(Value::as_str).map(str::len), Some(64));
    }

    #[test]
    fn test_initialize_requires_map() {
        let (dispatcher, _) = test_dispatcher();

        let ok = dispatcher.handle("initialize", Some(&json!({ "siteKey": "6Lc-key" })));
        assert_eq!(ok, MethodResponse::success(json!(true)));

        let missing = dispatcher.handle("initialize", None);
        assert_eq!(error_code(&missing), Some("MALFORMED_ARGUMENTS"));

        let wrong_type = dispatcher.handle("initialize", Some(&json!("6Lc-key")));
        assert_eq!(error_code(&wrong_type), Some("MALFORMED_ARGUMENTS"));

        let bad_key = dispatcher.handle("initialize", Some(&json!({ "siteKey": 7 })));
        assert_eq!(error_code(&bad_key), Some("MALFORMED_ARGUMENTS"));
    }

    #[test]
    fn test_verify_shape() {
        let (dispatcher, clock) = test_dispatcher();
        dispatcher.handle("initialize", Some(&json!({ "siteKey": "6Lc-key" })));

        let response = dispatcher.handle("verify", Some(&json!({ "action": "login" })));
        let value = response.value().unwrap();

        assert_eq!(value["success"], true);
        assert_eq!(value["challengeType"], "traditional");
        assert!(value["token"].as_str().unwrap().starts_with("traditional_"));
        assert_eq!(value["metadata"]["platform"], "linux");
        assert_eq!(value["metadata"]["action"], "login");
        assert_eq!(value["metadata"]["timestamp"], clock.now().timestamp_millis());
    }

    #[test]
    fn test_verify_failure_has_null_token() {
        let engine = VerificationEngine::new().with_policy(FixedScoringPolicy::new(0.75));
        let dispatcher = Dispatcher::new(engine);

        let response = dispatcher.handle("verify", None);
        let value = response.value().unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["token"], Value::Null);
        assert_eq!(value["score"], 0.75);
    }

    #[test]
    fn test_behavioral_flow() {
        let (dispatcher, clock) = test_dispatcher();

        let started = dispatcher.handle("startBehavioralAnalysis", None);
        assert_eq!(started, MethodResponse::empty());

        clock.advance_ms(2000);
        for i in 0..6 {
            let accepted = dispatcher.handle(
                "recordBehavioralSample",
                Some(&json!({ "kind": "pointer-move", "magnitude": 120.0 + i as f64 })),
            );
            assert_eq!(accepted, MethodResponse::success(json!(true)));
        }

        let response = dispatcher.handle("stopBehavioralAnalysis", None);
        let value = response.value().unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["challengeType"], "behavioral");
        assert_eq!(value["metadata"]["duration"], 2000);
        assert_eq!(value["metadata"]["dataPoints"], 6);
    }

    #[test]
    fn test_behavioral_out_of_sequence() {
        let (dispatcher, _) = test_dispatcher();

        let stop = dispatcher.handle("stopBehavioralAnalysis", None);
        assert_eq!(error_code(&stop), Some("INVALID_STATE"));

        dispatcher.handle("startBehavioralAnalysis", None);
        let again = dispatcher.handle("startBehavioralAnalysis", None);
        assert_eq!(error_code(&again), Some("INVALID_STATE"));
    }

    #[test]
    fn test_sample_outside_window_is_dropped_not_error() {
        let (dispatcher, _) = test_dispatcher();
        let response = dispatcher.handle(
            "recordBehavioralSample",
            Some(&json!({ "kind": "tap", "magnitude": 1.0 })),
        );
        assert_eq!(response, MethodResponse::success(json!(false)));
    }

    #[test]
    fn test_malformed_samples() {
        let (dispatcher, _) = test_dispatcher();
        dispatcher.handle("startBehavioralAnalysis", None);

        for args in [
            None,
            Some(json!({ "kind": "swipe", "magnitude": 1.0 })),
            Some(json!({ "kind": "tap" })),
            Some(json!({ "kind": "tap", "magnitude": 1.0, "timestamp": i64::MAX })),
        ] {
            let response = dispatcher.handle("recordBehavioralSample", args.as_ref());
            assert_eq!(error_code(&response), Some("MALFORMED_ARGUMENTS"));
        }
    }

    #[test]
    fn test_stamped_sample() {
        let (dispatcher, _) = test_dispatcher();
        dispatcher.handle("startBehavioralAnalysis", None);

        let response = dispatcher.handle(
            "recordBehavioralSample",
            Some(&json!({ "kind": "key-timing", "magnitude": 85.0, "timestamp": 1_705_327_200_500i64 })),
        );
        assert_eq!(response, MethodResponse::success(json!(true)));

        let session = dispatcher.engine().session();
        assert_eq!(session.samples[0].timestamp.timestamp_millis(), 1_705_327_200_500);
    }

    #[test]
    fn test_biometric_methods_on_desktop() {
        let (dispatcher, _) = test_dispatcher();

        let available = dispatcher.handle("isBiometricAvailable", None);
        assert_eq!(available, MethodResponse::success(json!(false)));

        let auth = dispatcher.handle("authenticateWithBiometric", None);
        assert_eq!(
            auth,
            MethodResponse::success(json!({
                "success": false,
                "errorMessage": "Biometric authentication not available on Linux"
            }))
        );
    }

    #[test]
    fn test_reset_returns_null() {
        let (dispatcher, _) = test_dispatcher();
        dispatcher.handle("startBehavioralAnalysis", None);

        assert_eq!(dispatcher.handle("reset", None), MethodResponse::empty());
        assert_eq!(dispatcher.handle("reset", None), MethodResponse::empty());

        // Window was torn down, so a new one can start
        assert!(dispatcher.handle("startBehavioralAnalysis", None).is_success());
    }

    #[test]
    fn test_handle_json() {
        let (dispatcher, _) = test_dispatcher();

        let response: Value =
            serde_json::from_str(&dispatcher.handle_json(r#"{"method":"isBiometricAvailable"}"#))
                .unwrap();
        assert_eq!(response, json!({ "outcome": "success", "value": false }));

        let unknown: Value =
            serde_json::from_str(&dispatcher.handle_json(r#"{"method":"nope","arguments":null}"#))
                .unwrap();
        assert_eq!(unknown, json!({ "outcome": "notImplemented" }));

        let garbage: Value = serde_json::from_str(&dispatcher.handle_json("not json")).unwrap();
        assert_eq!(garbage["outcome"], "error");
        assert_eq!(garbage["code"], "MALFORMED_ARGUMENTS");
    }

    #[test]
    fn test_error_envelope_shape() {
        let response = MethodResponse::from(EngineError::InvalidState(
            "behavioral analysis not started".to_string(),
        ));
        let value: Value = serde_json::from_str(&response.to_json()).unwrap();
        assert_eq!(
            value,
            json!({
                "outcome": "error",
                "code": "INVALID_STATE",
                "message": "Invalid state: behavioral analysis not started",
                "details": null
            })
        );
    }
}
