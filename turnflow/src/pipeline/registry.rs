//! Static registry of stage constructors.

use crate::errors::PipelineValidationError;
use crate::events::EventSink;
use crate::persistence::Persistence;
use crate::stages::Stage;
use std::collections::HashMap;
use std::sync::Arc;

/// Collaborators handed to every stage constructor.
#[derive(Clone)]
pub struct StageDeps {
    /// Persistence backend of the run.
    pub persistence: Arc<dyn Persistence>,
    /// Event sink of the run.
    pub sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for StageDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageDeps").finish_non_exhaustive()
    }
}

impl StageDeps {
    /// Bundles the collaborators.
    #[must_use]
    pub fn new(persistence: Arc<dyn Persistence>, sink: Arc<dyn EventSink>) -> Self {
        Self { persistence, sink }
    }
}

/// Constructor function type for stages.
pub type StageConstructor = Arc<dyn Fn(&StageDeps) -> Arc<dyn Stage> + Send + Sync>;

/// Maps stage ids to constructors.
///
/// Filled once at startup; the factory resolves configured ids against it.
#[derive(Clone, Default)]
pub struct StageRegistry {
    constructors: HashMap<String, StageConstructor>,
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor under `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is malformed or already registered.
    pub fn register<F>(&mut self, id: impl Into<String>, ctor: F) -> Result<(), PipelineValidationError>
    where
        F: Fn(&StageDeps) -> Arc<dyn Stage> + Send + Sync + 'static,
    {
        let id = id.into();
        if !is_valid_stage_id(&id) {
            return Err(PipelineValidationError::invalid_id(&id));
        }
        if self.constructors.contains_key(&id) {
            return Err(PipelineValidationError::duplicate(&id));
        }
        self.constructors.insert(id, Arc::new(ctor));
        Ok(())
    }

    /// Registers a constructor, consuming and returning the registry.
    ///
    /// # Errors
    ///
    /// Same as [`StageRegistry::register`].
    pub fn with<F>(mut self, id: impl Into<String>, ctor: F) -> Result<Self, PipelineValidationError>
    where
        F: Fn(&StageDeps) -> Arc<dyn Stage> + Send + Sync + 'static,
    {
        self.register(id, ctor)?;
        Ok(self)
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.constructors.contains_key(id)
    }

    /// Registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// True if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    /// Builds the stage registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not registered.
    pub fn construct(&self, id: &str, deps: &StageDeps) -> Result<Arc<dyn Stage>, PipelineValidationError> {
        self.constructors
            .get(id)
            .map(|ctor| ctor(deps))
            .ok_or_else(|| PipelineValidationError::unknown_stage(id))
    }
}

/// `^[a-z][a-z0-9_]*$`
pub(crate) fn is_valid_stage_id(id: &str) -> bool {
    let mut chars = id.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
