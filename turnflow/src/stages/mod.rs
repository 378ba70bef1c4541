//! Stage trait and the runner that wraps every invocation.
//!
//! Stages are the units of post-conversation work. Each declares a name, a
//! criticality, and a timeout; the [`StageRunner`] enforces the timeout,
//! classifies failures, and compensates the stage's isolation scope.

mod outcome;
mod runner;

pub use outcome::{FailureKind, StageFailure, StageOutcome, StageSuccess};
pub use runner::StageRunner;

use crate::context::TurnContext;
use crate::errors::{PipelineValidationError, StageError};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Timeout applied when a stage does not declare one.
pub const DEFAULT_TIMEOUT_SECONDS: f64 = 30.0;

/// What a stage's `run` returns: optional diagnostic data, or an error.
pub type StageRunResult = Result<Option<serde_json::Value>, StageError>;

/// Trait for pipeline stages.
///
/// Stages hold configuration and injected collaborators only. All per-run
/// state lives in the [`TurnContext`] they are handed.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Whether a failure of this stage aborts the run.
    fn is_critical(&self) -> bool {
        false
    }

    /// Hard limit on how long `run` may take.
    fn timeout_seconds(&self) -> f64 {
        DEFAULT_TIMEOUT_SECONDS
    }

    /// Executes the stage against the shared context.
    ///
    /// Writes made by earlier stages are visible here; slots of stages that
    /// failed or have not run yet are empty.
    async fn run(&self, ctx: &mut TurnContext) -> StageRunResult;
}

/// A stage as configured in one pipeline: the implementation plus the
/// effective name, criticality, and timeout.
#[derive(Debug, Clone)]
pub struct StageDefinition {
    name: String,
    critical: bool,
    timeout_seconds: f64,
    timeout: Duration,
    stage: Arc<dyn Stage>,
}

impl StageDefinition {
    /// Takes name, criticality, and timeout from the stage itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the declared timeout is not positive and finite.
    pub fn from_stage(stage: Arc<dyn Stage>) -> Result<Self, PipelineValidationError> {
        let name = stage.name().to_string();
        let critical = stage.is_critical();
        let timeout_seconds = stage.timeout_seconds();
        let timeout = validate_timeout(&name, timeout_seconds)?;

        Ok(Self {
            name,
            critical,
            timeout_seconds,
            timeout,
            stage,
        })
    }

    /// Overrides the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Overrides the criticality.
    #[must_use]
    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Overrides the timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout is not positive and finite.
    pub fn with_timeout_seconds(mut self, seconds: f64) -> Result<Self, PipelineValidationError> {
        self.timeout = validate_timeout(&self.name, seconds)?;
        self.timeout_seconds = seconds;
        Ok(self)
    }

    /// Returns the effective name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the effective criticality.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.critical
    }

    /// Returns the timeout in seconds.
    #[must_use]
    pub fn timeout_seconds(&self) -> f64 {
        self.timeout_seconds
    }

    /// Returns the timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the stage implementation.
    #[must_use]
    pub fn stage(&self) -> &Arc<dyn Stage> {
        &self.stage
    }
}

fn validate_timeout(name: &str, seconds: f64) -> Result<Duration, PipelineValidationError> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(PipelineValidationError::invalid_timeout(name, seconds));
    }
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| PipelineValidationError::invalid_timeout(name, seconds))
}
