//! Structured observability events.
//!
//! The engine emits one event per stage start, success, failure, and timeout,
//! plus pipeline-level start and end events. Sinks are injected into the
//! orchestrator explicitly; there is no process-wide sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the engine.
pub mod event_types {
    /// A run began.
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    /// A run finished without a critical abort.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    /// A critical stage failed and the run stopped.
    pub const PIPELINE_ABORTED: &str = "pipeline.aborted";
    /// A stage is about to run.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage returned successfully.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage raised a declared or unexpected error.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// A stage exceeded its timeout.
    pub const STAGE_TIMED_OUT: &str = "stage.timed_out";
    /// Compensation of a failed stage's scope itself failed.
    pub const STAGE_ROLLBACK_FAILED: &str = "stage.rollback_failed";
}
