//! Testing utilities for turnflow pipelines.
//!
//! Mock stages covering every outcome the runner distinguishes: success,
//! declared failure, unexpected failure, panic, and timeout.

mod mocks;

pub use mocks::{
    call_log, CallLog, FailingStage, PanickingStage, RecordingStage, RuntimeError, SlowStage,
    SuccessStage,
};
