//! Pipeline configuration, building, and execution.
//!
//! This module provides:
//! - Pipeline configuration and the standard post-conversation layout
//! - A stage registry and a factory that validates configuration at startup
//! - The sequential orchestrator and its run result

mod config;
mod factory;
mod orchestrator;
mod registry;
mod result;

pub use config::{stage_ids, PipelineConfig, StageConfig};
pub use factory::PipelineFactory;
pub use orchestrator::Orchestrator;
pub use registry::{StageConstructor, StageDeps, StageRegistry};
pub use result::PipelineResult;
