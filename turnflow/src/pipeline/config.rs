//! Pipeline configuration.

use crate::errors::TurnflowError;
use crate::stages::DEFAULT_TIMEOUT_SECONDS;
use serde::{Deserialize, Serialize};

/// Configuration of one stage slot in the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Registry id of the stage implementation.
    pub id: String,
    /// Name used in timings, errors, and events. Defaults to `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Overrides the stage's declared criticality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<bool>,
    /// Overrides the stage's declared timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,
    /// Disabled stages are left out of the run entirely.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl StageConfig {
    /// Creates a stage slot using the implementation's declared settings.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            critical: None,
            timeout_seconds: None,
            enabled: true,
        }
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the criticality.
    #[must_use]
    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = Some(critical);
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: f64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Disables the stage.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// The effective stage name.
    #[must_use]
    pub fn effective_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Ordered configuration of a pipeline.
///
/// Stages without a configured timeout use the one they declare, which is
/// [`DEFAULT_TIMEOUT_SECONDS`] unless the implementation says otherwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Stages in execution order.
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

/// Stage ids of the standard post-conversation pipeline.
pub mod stage_ids {
    /// Extracts facts from the conversation.
    pub const FACT_EXTRACTION: &str = "fact_extraction";
    /// Writes extracted facts to long-term memory.
    pub const MEMORY_WRITE: &str = "memory_write";
    /// Computes the mood for the turn.
    pub const MOOD_GENERATION: &str = "mood_generation";
    /// Generates events from the conversation.
    pub const EVENT_GENERATION: &str = "event_generation";
    /// Computes engagement and relationship scores.
    pub const SCORING: &str = "scoring";
    /// Evaluates conflicts between new and stored facts.
    pub const CONFLICT_EVALUATION: &str = "conflict_evaluation";
    /// Decides follow-up touchpoints.
    pub const TOUCHPOINT_EVALUATION: &str = "touchpoint_evaluation";
    /// Summarizes the conversation.
    pub const SUMMARIZATION: &str = "summarization";
    /// Assembles the prompt for the next turn.
    pub const PROMPT_ASSEMBLY: &str = "prompt_assembly";
}

impl PipelineConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: StageConfig) -> Self {
        self.stages.push(stage);
        self
    }

    /// The standard nine-stage post-conversation pipeline.
    ///
    /// Fact extraction and memory write are critical; everything after them
    /// degrades gracefully.
    #[must_use]
    pub fn post_conversation() -> Self {
        use stage_ids::{
            CONFLICT_EVALUATION, EVENT_GENERATION, FACT_EXTRACTION, MEMORY_WRITE, MOOD_GENERATION,
            PROMPT_ASSEMBLY, SCORING, SUMMARIZATION, TOUCHPOINT_EVALUATION,
        };

        let stage = |id: &str, critical: bool, timeout: f64| {
            StageConfig::new(id)
                .with_critical(critical)
                .with_timeout_seconds(timeout)
        };

        Self::new()
            .with_stage(stage(FACT_EXTRACTION, true, 60.0))
            .with_stage(stage(MEMORY_WRITE, true, 15.0))
            .with_stage(stage(MOOD_GENERATION, false, 60.0))
            .with_stage(stage(EVENT_GENERATION, false, 60.0))
            .with_stage(stage(SCORING, false, 15.0))
            .with_stage(stage(CONFLICT_EVALUATION, false, 60.0))
            .with_stage(stage(TOUCHPOINT_EVALUATION, false, 60.0))
            .with_stage(stage(SUMMARIZATION, false, 120.0))
            .with_stage(stage(PROMPT_ASSEMBLY, false, 15.0))
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not match the configuration shape.
    pub fn from_json_str(json: &str) -> Result<Self, TurnflowError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Stages that take part in a run.
    pub fn enabled_stages(&self) -> impl Iterator<Item = &StageConfig> {
        self.stages.iter().filter(|s| s.enabled)
    }
}
