//! The mutable record threaded through every stage of a run.

use super::{TurnIdentity, TurnSlots};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-run context.
///
/// Created once per run, mutated by one stage at a time, and finally moved
/// into the [`crate::pipeline::PipelineResult`]. It is not designed for
/// concurrent writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnContext {
    identity: TurnIdentity,
    /// Stage-written outputs.
    pub slots: TurnSlots,
    /// Duration in milliseconds of every attempted stage, in execution order.
    stage_timings: IndexMap<String, f64>,
    /// Failure message of every failed stage, in execution order.
    stage_errors: IndexMap<String, String>,
}

impl TurnContext {
    /// Creates an empty context for the given identity.
    #[must_use]
    pub fn new(identity: TurnIdentity) -> Self {
        Self {
            identity,
            slots: TurnSlots::new(),
            stage_timings: IndexMap::new(),
            stage_errors: IndexMap::new(),
        }
    }

    /// Returns the identity.
    #[must_use]
    pub fn identity(&self) -> &TurnIdentity {
        &self.identity
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.identity.run_id
    }

    /// Returns the conversation id.
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.identity.conversation_id
    }

    /// Returns the user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    /// Returns the platform.
    #[must_use]
    pub fn platform(&self) -> &str {
        &self.identity.platform
    }

    /// Returns the start time.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.identity.started_at
    }

    /// Records how long a stage took. Last write wins; the original position
    /// of the entry is kept.
    pub fn record_stage_timing(&mut self, stage: impl Into<String>, duration_ms: f64) {
        self.stage_timings.insert(stage.into(), duration_ms);
    }

    /// Records a stage failure message. Last write wins.
    pub fn record_stage_error(&mut self, stage: impl Into<String>, message: impl Into<String>) {
        self.stage_errors.insert(stage.into(), message.into());
    }

    /// Returns true if any stage failed.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.stage_errors.is_empty()
    }

    /// Sum of all recorded stage timings.
    #[must_use]
    pub fn total_duration_ms(&self) -> f64 {
        self.stage_timings.values().sum()
    }

    /// Stage timings in execution order.
    #[must_use]
    pub fn stage_timings(&self) -> &IndexMap<String, f64> {
        &self.stage_timings
    }

    /// Stage errors in execution order.
    #[must_use]
    pub fn stage_errors(&self) -> &IndexMap<String, String> {
        &self.stage_errors
    }

    /// Returns the timing for a stage.
    #[must_use]
    pub fn stage_timing(&self, stage: &str) -> Option<f64> {
        self.stage_timings.get(stage).copied()
    }

    /// Returns the error for a stage.
    #[must_use]
    pub fn stage_error(&self, stage: &str) -> Option<&str> {
        self.stage_errors.get(stage).map(String::as_str)
    }
}
