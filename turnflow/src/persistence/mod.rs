//! Isolation scopes for stage side effects.
//!
//! Every stage runs inside its own compensable scope on the run's persistence
//! handle. A failed stage's scope is rolled back; a successful stage's scope is
//! released into its parent. The storage engine behind the handle is up to
//! the caller.

mod memory;

pub use memory::InMemoryPersistence;

use crate::errors::PersistenceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle to one open scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeHandle {
    /// Backend assigned scope id.
    pub id: u64,
    /// Stage the scope was opened for.
    pub stage: String,
}

impl ScopeHandle {
    /// Creates a new scope handle.
    #[must_use]
    pub fn new(id: u64, stage: impl Into<String>) -> Self {
        Self {
            id,
            stage: stage.into(),
        }
    }
}

/// Begin-nested-scope / compensate primitives used by the stage runner.
///
/// One handle is shared by all stages of a run. Concurrent runs must use
/// independent handles.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Opens a nested scope for a stage.
    async fn begin_scope(&self, stage: &str) -> Result<ScopeHandle, PersistenceError>;

    /// Closes a scope, keeping its writes.
    async fn release_scope(&self, scope: ScopeHandle) -> Result<(), PersistenceError>;

    /// Closes a scope, undoing its writes.
    async fn rollback_scope(&self, scope: ScopeHandle) -> Result<(), PersistenceError>;
}

/// Persistence for pipelines without transactional state.
#[derive(Debug, Default)]
pub struct NoOpPersistence {
    next_id: AtomicU64,
}

impl NoOpPersistence {
    /// Creates a new no-op persistence handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persistence for NoOpPersistence {
    async fn begin_scope(&self, stage: &str) -> Result<ScopeHandle, PersistenceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(ScopeHandle::new(id, stage))
    }

    async fn release_scope(&self, _scope: ScopeHandle) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn rollback_scope(&self, _scope: ScopeHandle) -> Result<(), PersistenceError> {
        Ok(())
    }
}
