//! Error types for the turnflow engine.
//!
//! Stage authors only ever deal with [`StageError`]. The engine itself reports
//! startup misconfiguration through [`PipelineValidationError`] and isolation
//! scope problems through [`PersistenceError`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for turnflow operations.
#[derive(Debug, Error)]
pub enum TurnflowError {
    /// A pipeline validation error occurred.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A persistence collaborator failed.
    #[error("{0}")]
    Persistence(#[from] PersistenceError),

    /// Logging could not be initialised.
    #[error("Logging initialisation failed: {0}")]
    Logging(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure raised by a stage's `run`.
///
/// There are exactly two shapes. A *declared* error is one the stage
/// classified itself; everything else is *unexpected* and keeps the short
/// type name of the original error for diagnosability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    /// An explicitly classified failure.
    #[error("{message}")]
    Declared {
        /// Human readable message.
        message: String,
        /// Whether the condition is transient.
        recoverable: bool,
    },

    /// Any other failure.
    #[error("{type_name}: {message}")]
    Unexpected {
        /// Short type name of the original error (or `panic`).
        type_name: String,
        /// The original error message.
        message: String,
    },
}

impl StageError {
    /// Creates a declared error.
    #[must_use]
    pub fn declared(message: impl Into<String>, recoverable: bool) -> Self {
        Self::Declared {
            message: message.into(),
            recoverable,
        }
    }

    /// Creates a declared, recoverable error.
    #[must_use]
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self::declared(message, true)
    }

    /// Creates a declared, non-recoverable error.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::declared(message, false)
    }

    /// Wraps an arbitrary error, capturing its type name.
    #[must_use]
    pub fn unexpected<E>(err: E) -> Self
    where
        E: std::error::Error,
    {
        Self::Unexpected {
            type_name: short_type_name(std::any::type_name::<E>()).to_string(),
            message: err.to_string(),
        }
    }

    /// Builds the error for a stage that panicked.
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "<non-string panic payload>".to_string());

        Self::Unexpected {
            type_name: "panic".to_string(),
            message,
        }
    }

    /// Returns true if this is a declared error.
    #[must_use]
    pub fn is_declared(&self) -> bool {
        matches!(self, Self::Declared { .. })
    }

    /// Returns the recoverable flag. Unexpected errors are never recoverable.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Declared { recoverable, .. } => *recoverable,
            Self::Unexpected { .. } => false,
        }
    }
}

impl From<anyhow::Error> for StageError {
    fn from(err: anyhow::Error) -> Self {
        Self::Unexpected {
            type_name: "Error".to_string(),
            message: format!("{err:#}"),
        }
    }
}

/// Strips module paths and generic arguments from a type name.
fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Errors returned by a [`crate::persistence::Persistence`] collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    /// The scope could not be opened.
    #[error("Failed to open isolation scope for stage '{stage}': {reason}")]
    BeginFailed {
        /// The stage the scope was for.
        stage: String,
        /// Backend specific reason.
        reason: String,
    },

    /// The handle does not refer to the innermost open scope.
    #[error("Scope {scope_id} is not the innermost open scope")]
    ScopeMismatch {
        /// The offending scope id.
        scope_id: u64,
    },

    /// The scope was already closed.
    #[error("Scope {scope_id} is not open")]
    ScopeNotOpen {
        /// The offending scope id.
        scope_id: u64,
    },

    /// Generic backend failure.
    #[error("Persistence backend error: {0}")]
    Backend(String),
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-004-UNKNOWN_STAGE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a pipeline configuration is rejected at startup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }

    /// Stage id that is not present in the registry.
    #[must_use]
    pub fn unknown_stage(id: &str) -> Self {
        Self::new(format!("Stage '{id}' is not registered"))
            .with_stages(vec![id.to_string()])
            .with_error_info(
                ContractErrorInfo::new(
                    codes::UNKNOWN_STAGE,
                    format!("No constructor registered for '{id}'"),
                )
                .with_fix_hint(
                    ContractSuggestions::get(codes::UNKNOWN_STAGE).unwrap_or_default(),
                ),
            )
    }

    /// Two stages share a name.
    #[must_use]
    pub fn duplicate(name: &str) -> Self {
        Self::new(format!("Stage name '{name}' is used more than once"))
            .with_stages(vec![name.to_string()])
            .with_error_info(
                ContractErrorInfo::new(codes::DUPLICATE, format!("Duplicate stage '{name}'"))
                    .with_fix_hint(ContractSuggestions::get(codes::DUPLICATE).unwrap_or_default()),
            )
    }

    /// A stage id does not follow the naming rules.
    #[must_use]
    pub fn invalid_id(id: &str) -> Self {
        Self::new(format!(
            "Stage id '{id}' must start with a lowercase letter and contain only [a-z0-9_]"
        ))
        .with_stages(vec![id.to_string()])
        .with_error_info(ContractErrorInfo::new(
            codes::INVALID_ID,
            format!("Invalid stage id '{id}'"),
        ))
    }

    /// A stage timeout is not a positive, finite number of seconds.
    #[must_use]
    pub fn invalid_timeout(name: &str, seconds: f64) -> Self {
        Self::new(format!(
            "Stage '{name}' has invalid timeout {seconds}s; expected a positive finite value"
        ))
        .with_stages(vec![name.to_string()])
        .with_error_info(
            ContractErrorInfo::new(codes::INVALID_TIMEOUT, format!("Invalid timeout for '{name}'"))
                .with_context_entry("timeout_seconds", seconds.to_string()),
        )
    }
}

/// Contract error codes.
pub mod codes {
    /// Config references an id missing from the registry.
    pub const UNKNOWN_STAGE: &str = "CONTRACT-004-UNKNOWN_STAGE";
    /// Stage name or registry id used twice.
    pub const DUPLICATE: &str = "CONTRACT-004-DUPLICATE";
    /// Stage id with illegal characters.
    pub const INVALID_ID: &str = "CONTRACT-004-INVALID_ID";
    /// Non-positive or non-finite timeout.
    pub const INVALID_TIMEOUT: &str = "CONTRACT-004-INVALID_TIMEOUT";
}

/// Provides default suggestions for common contract error codes.
pub struct ContractSuggestions;

impl ContractSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            codes::UNKNOWN_STAGE => Some(
                "Register a constructor for the stage id before building the factory. \
                 Check for typos in the pipeline configuration.",
            ),
            codes::DUPLICATE => Some(
                "Give every configured stage a unique name; use the `name` field to \
                 run the same stage id twice.",
            ),
            codes::INVALID_TIMEOUT => Some("Use a positive number of seconds, e.g. 30."),
            _ => None,
        }
    }
}
