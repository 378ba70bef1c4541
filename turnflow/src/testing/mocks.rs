//! Mock stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::context::TurnContext;
use crate::errors::StageError;
use crate::persistence::InMemoryPersistence;
use crate::stages::{Stage, StageRunResult, DEFAULT_TIMEOUT_SECONDS};

/// Shared, ordered log of stage invocations.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Creates an empty call log.
#[must_use]
pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Error type used by [`FailingStage::unexpected`].
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct RuntimeError(pub String);

#[derive(Debug, Clone)]
struct Declared {
    name: String,
    critical: bool,
    timeout_seconds: f64,
}

impl Declared {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            critical: false,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

macro_rules! declared_builders {
    () => {
        /// Marks the stage as critical.
        #[must_use]
        pub fn critical(mut self) -> Self {
            self.declared.critical = true;
            self
        }

        /// Sets the criticality.
        #[must_use]
        pub fn with_critical(mut self, critical: bool) -> Self {
            self.declared.critical = critical;
            self
        }

        /// Sets the timeout in seconds.
        #[must_use]
        pub fn with_timeout(mut self, seconds: f64) -> Self {
            self.declared.timeout_seconds = seconds;
            self
        }
    };
}

macro_rules! declared_accessors {
    () => {
        fn name(&self) -> &str {
            &self.declared.name
        }

        fn is_critical(&self) -> bool {
            self.declared.critical
        }

        fn timeout_seconds(&self) -> f64 {
            self.declared.timeout_seconds
        }
    };
}

/// A stage that always succeeds with optional data.
#[derive(Debug)]
pub struct SuccessStage {
    declared: Declared,
    data: Option<serde_json::Value>,
    calls: AtomicUsize,
}

impl SuccessStage {
    /// Creates a new success stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            declared: Declared::new(name),
            data: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sets the diagnostic data to return.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Returns the number of times the stage ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    declared_builders!();
}

#[async_trait]
impl Stage for SuccessStage {
    declared_accessors!();

    async fn run(&self, _ctx: &mut TurnContext) -> StageRunResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.data.clone())
    }
}

/// A stage that always fails.
#[derive(Debug)]
pub struct FailingStage {
    declared: Declared,
    error: StageError,
    write: Option<(InMemoryPersistence, String)>,
}

impl FailingStage {
    /// Fails with a declared error.
    #[must_use]
    pub fn declared(name: impl Into<String>, message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            declared: Declared::new(name),
            error: StageError::declared(message, recoverable),
            write: None,
        }
    }

    /// Fails with an unexpected [`RuntimeError`].
    #[must_use]
    pub fn unexpected(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            declared: Declared::new(name),
            error: StageError::unexpected(RuntimeError(message.into())),
            write: None,
        }
    }

    /// Writes `key` to the store before failing.
    #[must_use]
    pub fn writing_to(mut self, store: InMemoryPersistence, key: impl Into<String>) -> Self {
        self.write = Some((store, key.into()));
        self
    }

    declared_builders!();
}

#[async_trait]
impl Stage for FailingStage {
    declared_accessors!();

    async fn run(&self, _ctx: &mut TurnContext) -> StageRunResult {
        if let Some((store, key)) = &self.write {
            store.put(key.clone(), serde_json::json!(self.declared.name));
        }
        Err(self.error.clone())
    }
}

/// A stage that panics.
#[derive(Debug)]
pub struct PanickingStage {
    declared: Declared,
    message: String,
}

impl PanickingStage {
    /// Creates a stage panicking with `message`.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            declared: Declared::new(name),
            message: message.into(),
        }
    }

    declared_builders!();
}

#[async_trait]
impl Stage for PanickingStage {
    declared_accessors!();

    #[allow(clippy::panic)]
    async fn run(&self, _ctx: &mut TurnContext) -> StageRunResult {
        panic!("{}", self.message);
    }
}

/// A stage that takes time to execute.
#[derive(Debug)]
pub struct SlowStage {
    declared: Declared,
    delay: Duration,
    finished: Arc<AtomicBool>,
}

impl SlowStage {
    /// Creates a new slow stage.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            declared: Declared::new(name),
            delay,
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a slow stage with delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(name: impl Into<String>, ms: u64) -> Self {
        Self::new(name, Duration::from_millis(ms))
    }

    /// Flag set once the stage's sleep completed. Stays false when the stage
    /// was abandoned by a timeout.
    #[must_use]
    pub fn finished_flag(&self) -> Arc<AtomicBool> {
        self.finished.clone()
    }

    declared_builders!();
}

#[async_trait]
impl Stage for SlowStage {
    declared_accessors!();

    async fn run(&self, _ctx: &mut TurnContext) -> StageRunResult {
        tokio::time::sleep(self.delay).await;
        self.finished.store(true, Ordering::SeqCst);
        Ok(None)
    }
}

/// A stage that logs its invocation, remembers which extras it could see,
/// and optionally writes one extra for later stages.
#[derive(Debug)]
pub struct RecordingStage {
    declared: Declared,
    log: CallLog,
    write: Option<(String, serde_json::Value)>,
    observed: Mutex<Vec<String>>,
}

impl RecordingStage {
    /// Creates a new recording stage appending to `log`.
    #[must_use]
    pub fn new(name: impl Into<String>, log: CallLog) -> Self {
        Self {
            declared: Declared::new(name),
            log,
            write: None,
            observed: Mutex::new(Vec::new()),
        }
    }

    /// Writes `key = value` into the context extras when run.
    #[must_use]
    pub fn writes(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.write = Some((key.into(), value));
        self
    }

    /// Sorted extras keys present when the stage last ran.
    #[must_use]
    pub fn observed_keys(&self) -> Vec<String> {
        self.observed.lock().clone()
    }

    declared_builders!();
}

#[async_trait]
impl Stage for RecordingStage {
    declared_accessors!();

    async fn run(&self, ctx: &mut TurnContext) -> StageRunResult {
        self.log.lock().push(self.declared.name.clone());

        let mut keys: Vec<String> = ctx.slots.extras.keys().cloned().collect();
        keys.sort();
        *self.observed.lock() = keys;

        if let Some((key, value)) = &self.write {
            ctx.slots.set_extra(key.clone(), value.clone());
        }
        Ok(None)
    }
}
