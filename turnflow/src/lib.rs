//! # Turnflow
//!
//! A post-conversation processing engine.
//!
//! After every conversation turn, Turnflow runs an ordered list of stages
//! (fact extraction, memory write, mood, events, scoring, and so on) against
//! one shared context:
//!
//! - **Sequential execution**: each stage sees everything earlier stages wrote
//! - **Critical vs. non-critical stages**: a failing critical stage aborts the
//!   run; a failing non-critical stage is recorded and the run continues
//! - **Hard timeouts**: a stage running past its limit is abandoned and
//!   treated exactly like a raised error
//! - **Per-stage isolation**: each stage's persistence writes are rolled back
//!   when it fails, without touching earlier stages
//! - **Event-driven observability**: lifecycle events plus `tracing` spans
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use turnflow::prelude::*;
//!
//! let registry = StageRegistry::new()
//!     .with("fact_extraction", |deps| Arc::new(FactExtraction::new(deps)))?
//!     .with("memory_write", |deps| Arc::new(MemoryWrite::new(deps)))?;
//! let factory = PipelineFactory::new(registry, config)?;
//!
//! let orchestrator = factory.build(persistence, sink)?;
//! let result = orchestrator.process("conv-1", "user-1", "ios").await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod context;
pub mod errors;
pub mod events;
pub mod logging;
pub mod persistence;
pub mod pipeline;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::context::{TurnContext, TurnIdentity, TurnSlots};
    pub use crate::errors::{
        ContractErrorInfo, PersistenceError, PipelineValidationError, StageError, TurnflowError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::logging::{init_logging, LogFormat};
    pub use crate::persistence::{InMemoryPersistence, NoOpPersistence, Persistence, ScopeHandle};
    pub use crate::pipeline::{
        stage_ids, Orchestrator, PipelineConfig, PipelineFactory, PipelineResult, StageConfig,
        StageDeps, StageRegistry,
    };
    pub use crate::stages::{
        FailureKind, Stage, StageDefinition, StageOutcome, StageRunResult, StageRunner,
    };
}
