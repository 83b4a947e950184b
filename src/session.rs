//! Verification session store
//!
//! Holds the single session owned by an engine instance and enforces its
//! lifecycle:
//!
//! ```text
//! Idle --initialize--> Idle
//! Idle --start_behavioral--> BehavioralActive
//! BehavioralActive --stop_behavioral--> Idle
//! any --reset--> Idle
//! ```
//!
//! Every operation takes the session lock exactly once, so sample ingestion
//! and window transitions are atomic with respect to each other.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::{Mutex, MutexGuard};

use crate::config::DEFAULT_MAX_SAMPLES;
use crate::error::EngineError;
use crate::types::{Sample, SessionState};

/// Mutable state for one verification attempt
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub state: SessionState,
    pub config: Map<String, Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub samples: Vec<Sample>,
    pub last_score: Option<f64>,
}

/// A behavioral window that has just been closed and scored
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedWindow {
    /// Time between start and stop, never negative
    pub elapsed: Duration,
    /// Samples collected in arrival order
    pub samples: Vec<Sample>,
    /// Score recorded as the session's last score
    pub score: f64,
}

impl ClosedWindow {
    pub fn elapsed_ms(&self) -> i64 {
        self.elapsed.num_milliseconds()
    }
}

/// Store owning the zero-or-one active session of an engine
#[derive(Debug)]
pub struct SessionStore {
    session: Mutex<Session>,
    max_samples: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SAMPLES)
    }
}

impl SessionStore {
    /// Create a store that buffers at most `max_samples` per window
    pub fn new(max_samples: usize) -> Self {
        Self {
            session: Mutex::new(Session::default()),
            max_samples,
        }
    }

    // Session is plain data, so a panic elsewhere cannot leave it half-updated.
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace any existing session with a fresh one holding `config`
    pub fn initialize(&self, config: Map<String, Value>) -> bool {
        let mut session = self.lock();
        if session.state == SessionState::BehavioralActive {
            tracing::debug!("initialize discarded an open behavioral window");
        }
        *session = Session {
            config,
            ..Session::default()
        };
        true
    }

    /// Clear config, samples and scores. Safe to call in any state.
    pub fn reset(&self) {
        *self.lock() = Session::default();
    }

    /// Open a behavioral window at `now`
    pub fn start_behavioral(&self, now: DateTime<Utc>) -> Result<(), EngineError> {
        let mut session = self.lock();
        if session.state == SessionState::BehavioralActive {
            return Err(EngineError::InvalidState(
                "behavioral analysis already active".to_string(),
            ));
        }
        session.state = SessionState::BehavioralActive;
        session.started_at = Some(now);
        session.samples.clear();
        Ok(())
    }

    /// Append a sample to the open window.
    ///
    /// Returns `false` when the sample was dropped because no window is open
    /// or the window is full.
    pub fn ingest_sample(&self, sample: Sample) -> bool {
        let mut session = self.lock();
        if session.state != SessionState::BehavioralActive {
            tracing::debug!(kind = ?sample.kind, "sample dropped outside behavioral window");
            return false;
        }
        if session.samples.len() >= self.max_samples {
            tracing::debug!(max_samples = self.max_samples, "sample dropped, window full");
            return false;
        }
        session.samples.push(sample);
        true
    }

    /// Score the session config layered with `overlay`.
    ///
    /// The overlay applies to this call only. The score is recorded as the
    /// session's last score under the same lock it was computed under, so a
    /// concurrent `reset` cannot leave a stale score behind. Returns the score
    /// and the effective config.
    pub fn score_config<F>(
        &self,
        overlay: Option<&Map<String, Value>>,
        score: F,
    ) -> (f64, Map<String, Value>)
    where
        F: FnOnce(&Map<String, Value>) -> f64,
    {
        let mut session = self.lock();

        let mut effective = session.config.clone();
        if let Some(overlay) = overlay {
            for (key, value) in overlay {
                effective.insert(key.clone(), value.clone());
            }
        }

        let score = score(&effective);
        session.last_score = Some(score);
        (score, effective)
    }

    /// Close the open window at `now`, score it and hand out its samples.
    ///
    /// `score` receives the elapsed milliseconds and the sample count. It runs
    /// under the session lock and must not call back into the store.
    pub fn stop_behavioral<F>(
        &self,
        now: DateTime<Utc>,
        score: F,
    ) -> Result<ClosedWindow, EngineError>
    where
        F: FnOnce(i64, usize) -> f64,
    {
        let mut session = self.lock();
        if session.state != SessionState::BehavioralActive {
            return Err(EngineError::InvalidState(
                "behavioral analysis not started".to_string(),
            ));
        }

        let started_at = session.started_at.take().unwrap_or(now);
        let elapsed = (now - started_at).max(Duration::zero());
        let samples = std::mem::take(&mut session.samples);
        let score = score(elapsed.num_milliseconds(), samples.len());

        session.state = SessionState::Idle;
        session.last_score = Some(score);

        Ok(ClosedWindow {
            elapsed,
            samples,
            score,
        })
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Copy of the stored session configuration
    pub fn config(&self) -> Map<String, Value> {
        self.lock().config.clone()
    }

    pub fn sample_count(&self) -> usize {
        self.lock().samples.len()
    }

    /// Copy of the whole session, for diagnostics
    pub fn snapshot(&self) -> Session {
        self.lock().clone()
    }
}
