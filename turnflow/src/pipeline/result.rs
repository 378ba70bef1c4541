//! Outcome of a whole run.

use crate::context::TurnContext;
use serde::Serialize;

/// Immutable summary returned by [`crate::pipeline::Orchestrator::process`].
///
/// `success == true` means no *critical* stage failed. Non-critical stages
/// may still have failed; those failures are only visible through
/// `context().stage_errors()` (see [`PipelineResult::is_partial`]).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    success: bool,
    context: TurnContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    total_duration_ms: f64,
    stages_completed: usize,
    stages_total: usize,
}

impl PipelineResult {
    /// Result of a run that finished without a critical abort.
    #[must_use]
    pub fn completed(context: TurnContext, stages_completed: usize, stages_total: usize) -> Self {
        Self {
            success: true,
            total_duration_ms: context.total_duration_ms(),
            context,
            error_stage: None,
            error_message: None,
            stages_completed,
            stages_total,
        }
    }

    /// Result of a run stopped by a critical stage failure.
    #[must_use]
    pub fn aborted(
        context: TurnContext,
        error_stage: impl Into<String>,
        error_message: impl Into<String>,
        stages_completed: usize,
        stages_total: usize,
    ) -> Self {
        Self {
            success: false,
            total_duration_ms: context.total_duration_ms(),
            context,
            error_stage: Some(error_stage.into()),
            error_message: Some(error_message.into()),
            stages_completed,
            stages_total,
        }
    }

    /// True when no critical stage failed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.success
    }

    /// The context as of the end of the run.
    #[must_use]
    pub fn context(&self) -> &TurnContext {
        &self.context
    }

    /// Consumes the result, returning the context.
    #[must_use]
    pub fn into_context(self) -> TurnContext {
        self.context
    }

    /// The critical stage that aborted the run.
    #[must_use]
    pub fn error_stage(&self) -> Option<&str> {
        self.error_stage.as_deref()
    }

    /// Why the critical stage failed.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Sum of the recorded stage timings.
    #[must_use]
    pub fn total_duration_ms(&self) -> f64 {
        self.total_duration_ms
    }

    /// Number of stages attempted, including failed ones.
    #[must_use]
    pub fn stages_completed(&self) -> usize {
        self.stages_completed
    }

    /// Number of stages configured.
    #[must_use]
    pub fn stages_total(&self) -> usize {
        self.stages_total
    }

    /// Names of the stages that failed, in execution order.
    #[must_use]
    pub fn failed_stages(&self) -> Vec<&str> {
        self.context.stage_errors().keys().map(String::as_str).collect()
    }

    /// True when the run succeeded but some non-critical stage failed.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.success && self.context.has_errors()
    }

    /// Serializes the result to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if a slot holds a value serde cannot represent.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TurnIdentity;

    fn test_context() -> TurnContext {
        TurnContext::new(TurnIdentity::new("conv", "user", "web"))
    }

    #[test]
    fn test_completed_result() {
        let mut ctx = test_context();
        ctx.record_stage_timing("a", 2.0);
        ctx.record_stage_timing("b", 3.0);

        let result = PipelineResult::completed(ctx, 2, 2);

        assert!(result.success());
        assert!(result.error_stage().is_none());
        assert!(result.error_message().is_none());
        assert!((result.total_duration_ms() - 5.0).abs() < f64::EPSILON);
        assert!(!result.is_partial());
    }

    #[test]
    fn test_partial_result() {
        let mut ctx = test_context();
        ctx.record_stage_error("mood_generation", "quota");

        let result = PipelineResult::completed(ctx, 3, 3);

        assert!(result.success());
        assert!(result.is_partial());
        assert_eq!(result.failed_stages(), vec!["mood_generation"]);
    }

    #[test]
    fn test_aborted_result() {
        let mut ctx = test_context();
        ctx.record_stage_error("fact_extraction", "boom");

        let result = PipelineResult::aborted(ctx, "fact_extraction", "boom", 1, 9);

        assert!(!result.success());
        assert_eq!(result.error_stage(), Some("fact_extraction"));
        assert_eq!(result.error_message(), Some("boom"));
        assert_eq!(result.stages_completed(), 1);
        assert_eq!(result.stages_total(), 9);
        assert!(!result.is_partial());
    }

    #[test]
    fn test_to_json() {
        let result = PipelineResult::aborted(test_context(), "a", "b", 1, 1);
        let json = result.to_json().unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["error_stage"], "a");
        assert!(json["context"].is_object());

        let ok = PipelineResult::completed(test_context(), 0, 0).to_json().unwrap();
        assert!(ok.get("error_stage").is_none());
    }
}
