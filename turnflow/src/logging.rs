//! Process-wide `tracing` subscriber setup.

use crate::errors::TurnflowError;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOG_INIT: OnceLock<LogFormat> = OnceLock::new();

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line, including the active span list.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = TurnflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(TurnflowError::Logging(format!("unknown log format '{other}'"))),
        }
    }
}

/// Installs the global subscriber.
///
/// Calling it again after a successful install is a no-op.
///
/// # Errors
///
/// Returns an error if some other global subscriber is already installed.
pub fn init_logging(format: LogFormat) -> Result<(), TurnflowError> {
    if LOG_INIT.get().is_some() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init(),
    };
    installed.map_err(|e| TurnflowError::Logging(e.to_string()))?;

    let _ = LOG_INIT.set(format);
    Ok(())
}

/// The format installed by [`init_logging`], if any.
#[must_use]
pub fn installed_format() -> Option<LogFormat> {
    LOG_INIT.get().copied()
}
