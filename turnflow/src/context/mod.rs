//! Context management for pipeline runs.
//!
//! This module provides:
//! - The run identity set once at creation
//! - Stage-written slots
//! - The mutable per-run context with timing and error bookkeeping

mod identity;
mod slots;
mod turn;

pub use identity::TurnIdentity;
pub use slots::TurnSlots;
pub use turn::TurnContext;
