//! Structured outcome of one stage invocation.

use crate::errors::StageError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the three failure shapes a stage failure came from.
///
/// Only used for logging and events. The orchestrator branches on the stage's
/// criticality, never on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The stage returned a declared [`StageError`].
    Declared,
    /// The stage exceeded its timeout.
    Timeout,
    /// The stage returned an unexpected error or panicked.
    Unexpected,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declared => write!(f, "declared"),
            Self::Timeout => write!(f, "timeout"),
            Self::Unexpected => write!(f, "unexpected"),
        }
    }
}

/// A stage that returned normally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSuccess {
    /// Stage name.
    pub stage: String,
    /// Optional diagnostic data returned by the stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
}

/// A stage that failed, normalized from any of the failure shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Stage name.
    pub stage: String,
    /// Failure message.
    pub message: String,
    /// Failure shape.
    pub kind: FailureKind,
    /// Whether the failure was flagged as transient.
    pub recoverable: bool,
    /// Wall-clock duration in milliseconds, up to the raise or cancellation.
    pub duration_ms: f64,
}

impl StageFailure {
    /// Normalizes a stage error.
    #[must_use]
    pub fn from_error(stage: impl Into<String>, err: &StageError, duration_ms: f64) -> Self {
        let kind = if err.is_declared() {
            FailureKind::Declared
        } else {
            FailureKind::Unexpected
        };
        let message = match err {
            StageError::Declared { message, .. } => message.clone(),
            StageError::Unexpected { .. } => err.to_string(),
        };

        Self {
            stage: stage.into(),
            message,
            kind,
            recoverable: err.is_recoverable(),
            duration_ms,
        }
    }

    /// Builds the failure for a stage that ran out of time.
    #[must_use]
    pub fn timeout(stage: impl Into<String>, timeout_seconds: f64, duration_ms: f64) -> Self {
        Self {
            stage: stage.into(),
            message: format!("stage timed out after {timeout_seconds}s"),
            kind: FailureKind::Timeout,
            recoverable: true,
            duration_ms,
        }
    }
}

/// Outcome of one stage invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    /// The stage returned normally.
    Success(StageSuccess),
    /// The stage failed.
    Failure(StageFailure),
}

impl StageOutcome {
    /// Creates a success outcome.
    #[must_use]
    pub fn success(
        stage: impl Into<String>,
        data: Option<serde_json::Value>,
        duration_ms: f64,
    ) -> Self {
        Self::Success(StageSuccess {
            stage: stage.into(),
            data,
            duration_ms,
        })
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage(&self) -> &str {
        match self {
            Self::Success(s) => &s.stage,
            Self::Failure(f) => &f.stage,
        }
    }

    /// Returns the measured duration.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        match self {
            Self::Success(s) => s.duration_ms,
            Self::Failure(f) => f.duration_ms,
        }
    }

    /// Returns true on success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the failure, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&StageFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(f) => Some(f),
        }
    }
}

impl From<StageFailure> for StageOutcome {
    fn from(failure: StageFailure) -> Self {
        Self::Failure(failure)
    }
}
