//! Uniform wrapper around a single stage invocation.

use super::{FailureKind, StageDefinition, StageFailure, StageOutcome};
use crate::context::TurnContext;
use crate::errors::StageError;
use crate::events::{event_types, EventSink};
use crate::persistence::{Persistence, ScopeHandle};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Runs one stage with timeout enforcement, failure classification, and
/// isolation rollback.
///
/// Nothing a stage does can make `execute` return early or panic: a timeout,
/// a declared error, an unexpected error, and a panic all come back as
/// [`StageOutcome::Failure`].
#[derive(Clone)]
pub struct StageRunner {
    persistence: Arc<dyn Persistence>,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRunner").finish_non_exhaustive()
    }
}

impl StageRunner {
    /// Creates a runner over the run's persistence handle and event sink.
    #[must_use]
    pub fn new(persistence: Arc<dyn Persistence>, sink: Arc<dyn EventSink>) -> Self {
        Self { persistence, sink }
    }

    /// Executes a stage inside an already opened scope.
    ///
    /// On success the scope is released; on any failure it is rolled back,
    /// best effort. The measured duration runs from just before `run` to just
    /// after it returns, raises, or is cancelled by the timeout.
    pub async fn execute(
        &self,
        definition: &StageDefinition,
        ctx: &mut TurnContext,
        scope: ScopeHandle,
    ) -> StageOutcome {
        let name = definition.name();
        let critical = definition.is_critical();

        self.sink.try_emit(
            event_types::STAGE_STARTED,
            Some(serde_json::json!({
                "stage": name,
                "critical": critical,
                "timeout_seconds": definition.timeout_seconds(),
            })),
        );
        debug!(stage = %name, critical, "Stage started");

        let start = Instant::now();
        let invocation = AssertUnwindSafe(definition.stage().run(ctx)).catch_unwind();
        let result = tokio::time::timeout(definition.timeout(), invocation).await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        let outcome = match result {
            Ok(Ok(Ok(data))) => StageOutcome::success(name, data, duration_ms),
            Ok(Ok(Err(err))) => StageFailure::from_error(name, &err, duration_ms).into(),
            Ok(Err(payload)) => {
                let err = StageError::from_panic(payload.as_ref());
                StageFailure::from_error(name, &err, duration_ms).into()
            }
            Err(_elapsed) => {
                StageFailure::timeout(name, definition.timeout_seconds(), duration_ms).into()
            }
        };

        let outcome = match outcome {
            StageOutcome::Success(success) => match self.persistence.release_scope(scope.clone()).await {
                Ok(()) => StageOutcome::Success(success),
                Err(err) => {
                    let err = StageError::unexpected(err);
                    let failure = StageFailure::from_error(name, &err, success.duration_ms);
                    self.compensate(scope).await;
                    StageOutcome::Failure(failure)
                }
            },
            StageOutcome::Failure(failure) => {
                self.compensate(scope).await;
                StageOutcome::Failure(failure)
            }
        };

        self.report(&outcome, critical);
        outcome
    }

    /// Rolls back a failed stage's scope. Errors are logged and swallowed.
    async fn compensate(&self, scope: ScopeHandle) {
        let stage = scope.stage.clone();
        let scope_id = scope.id;
        if let Err(err) = self.persistence.rollback_scope(scope).await {
            error!(stage = %stage, scope_id, error = %err, "Rollback of stage scope failed");
            self.sink.try_emit(
                event_types::STAGE_ROLLBACK_FAILED,
                Some(serde_json::json!({
                    "stage": stage,
                    "scope_id": scope_id,
                    "error": err.to_string(),
                })),
            );
        }
    }

    fn report(&self, outcome: &StageOutcome, critical: bool) {
        match outcome {
            StageOutcome::Success(success) => {
                info!(
                    stage = %success.stage,
                    critical,
                    duration_ms = success.duration_ms,
                    "Stage completed"
                );
                self.sink.try_emit(
                    event_types::STAGE_COMPLETED,
                    Some(serde_json::json!({
                        "stage": success.stage,
                        "critical": critical,
                        "duration_ms": success.duration_ms,
                    })),
                );
            }
            StageOutcome::Failure(failure) => {
                match failure.kind {
                    FailureKind::Declared => warn!(
                        stage = %failure.stage,
                        critical,
                        recoverable = failure.recoverable,
                        duration_ms = failure.duration_ms,
                        error = %failure.message,
                        "Stage failed"
                    ),
                    FailureKind::Timeout => warn!(
                        stage = %failure.stage,
                        critical,
                        duration_ms = failure.duration_ms,
                        error = %failure.message,
                        "Stage timed out"
                    ),
                    FailureKind::Unexpected => error!(
                        stage = %failure.stage,
                        critical,
                        duration_ms = failure.duration_ms,
                        error = %failure.message,
                        "Stage raised an unexpected error"
                    ),
                }

                let event_type = if failure.kind == FailureKind::Timeout {
                    event_types::STAGE_TIMED_OUT
                } else {
                    event_types::STAGE_FAILED
                };
                self.sink.try_emit(
                    event_type,
                    Some(serde_json::json!({
                        "stage": failure.stage,
                        "critical": critical,
                        "duration_ms": failure.duration_ms,
                        "error": failure.message,
                        "kind": failure.kind,
                        "recoverable": failure.recoverable,
                    })),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TurnIdentity;
    use crate::errors::PersistenceError;
    use crate::events::{CollectingEventSink, NoOpEventSink};
    use crate::persistence::{InMemoryPersistence, MockPersistence};
    use crate::stages::StageDefinition;
    use crate::testing::{FailingStage, PanickingStage, SlowStage, SuccessStage};
    use std::time::Duration;

    fn test_context() -> TurnContext {
        TurnContext::new(TurnIdentity::new("conv", "user", "web"))
    }

    fn definition(stage: impl crate::stages::Stage + 'static) -> StageDefinition {
        StageDefinition::from_stage(Arc::new(stage)).unwrap()
    }

    fn mock_expecting(release: usize, rollback: usize) -> MockPersistence {
        let mut mock = MockPersistence::new();
        mock.expect_release_scope().times(release).returning(|_| Ok(()));
        mock.expect_rollback_scope().times(rollback).returning(|_| Ok(()));
        mock
    }

    #[tokio::test]
    async fn test_success_releases_scope() {
        let runner = StageRunner::new(Arc::new(mock_expecting(1, 0)), Arc::new(NoOpEventSink));
        let def = definition(SuccessStage::new("scoring").with_data(serde_json::json!({"n": 3})));
        let mut ctx = test_context();

        let outcome = runner.execute(&def, &mut ctx, ScopeHandle::new(1, "scoring")).await;

        match outcome {
            StageOutcome::Success(s) => {
                assert_eq!(s.stage, "scoring");
                assert_eq!(s.data, Some(serde_json::json!({"n": 3})));
                assert!(s.duration_ms >= 0.0);
            }
            StageOutcome::Failure(f) => panic!("unexpected failure: {f:?}"),
        }
    }

    #[tokio::test]
    async fn test_declared_failure_rolls_back() {
        let runner = StageRunner::new(Arc::new(mock_expecting(0, 1)), Arc::new(NoOpEventSink));
        let def = definition(FailingStage::declared("mood_generation", "quota", true));
        let mut ctx = test_context();

        let outcome = runner.execute(&def, &mut ctx, ScopeHandle::new(1, "mood_generation")).await;
        let failure = outcome.failure().unwrap();

        assert_eq!(failure.kind, FailureKind::Declared);
        assert_eq!(failure.message, "quota");
        assert!(failure.recoverable);
    }

    #[tokio::test]
    async fn test_unexpected_failure_carries_type_name() {
        let runner = StageRunner::new(Arc::new(mock_expecting(0, 1)), Arc::new(NoOpEventSink));
        let def = definition(FailingStage::unexpected("stage1", "boom"));
        let mut ctx = test_context();

        let outcome = runner.execute(&def, &mut ctx, ScopeHandle::new(1, "stage1")).await;
        let failure = outcome.failure().unwrap();

        assert_eq!(failure.kind, FailureKind::Unexpected);
        assert!(failure.message.contains("RuntimeError"));
        assert!(failure.message.contains("boom"));
        assert!(!failure.recoverable);
    }

    #[tokio::test]
    async fn test_panic_is_classified_unexpected() {
        let runner = StageRunner::new(Arc::new(mock_expecting(0, 1)), Arc::new(NoOpEventSink));
        let def = definition(PanickingStage::new("scoring", "index out of range"));
        let mut ctx = test_context();

        let outcome = runner.execute(&def, &mut ctx, ScopeHandle::new(1, "scoring")).await;
        let failure = outcome.failure().unwrap();

        assert_eq!(failure.kind, FailureKind::Unexpected);
        assert_eq!(failure.message, "panic: index out of range");
    }

    #[tokio::test]
    async fn test_timeout_measures_elapsed_time_and_abandons_work() {
        let sink = Arc::new(CollectingEventSink::new());
        let runner = StageRunner::new(Arc::new(mock_expecting(0, 1)), sink.clone());
        let slow = SlowStage::new("summarization", Duration::from_millis(500)).with_timeout(0.1);
        let finished = slow.finished_flag();
        let def = definition(slow);
        let mut ctx = test_context();

        let outcome = runner.execute(&def, &mut ctx, ScopeHandle::new(1, "summarization")).await;
        let failure = outcome.failure().unwrap();

        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(failure.message, "stage timed out after 0.1s");
        assert!(failure.duration_ms >= 100.0);
        assert!(failure.duration_ms < 400.0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!finished.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(sink.events_of_type(event_types::STAGE_TIMED_OUT).len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_failure_is_swallowed() {
        let mut mock = MockPersistence::new();
        mock.expect_rollback_scope()
            .times(1)
            .returning(|scope| Err(PersistenceError::ScopeNotOpen { scope_id: scope.id }));
        let sink = Arc::new(CollectingEventSink::new());
        let runner = StageRunner::new(Arc::new(mock), sink.clone());
        let def = definition(FailingStage::declared("conflict_evaluation", "bad", false));
        let mut ctx = test_context();

        let outcome = runner
            .execute(&def, &mut ctx, ScopeHandle::new(7, "conflict_evaluation"))
            .await;

        assert_eq!(outcome.failure().unwrap().message, "bad");
        assert_eq!(sink.events_of_type(event_types::STAGE_ROLLBACK_FAILED).len(), 1);
    }

    #[tokio::test]
    async fn test_release_failure_becomes_stage_failure() {
        let mut mock = MockPersistence::new();
        mock.expect_release_scope()
            .times(1)
            .returning(|_| Err(PersistenceError::Backend("disk full".to_string())));
        mock.expect_rollback_scope().times(1).returning(|_| Ok(()));
        let runner = StageRunner::new(Arc::new(mock), Arc::new(NoOpEventSink));
        let def = definition(SuccessStage::new("memory_write"));
        let mut ctx = test_context();

        let outcome = runner.execute(&def, &mut ctx, ScopeHandle::new(1, "memory_write")).await;
        let failure = outcome.failure().unwrap();

        assert_eq!(failure.kind, FailureKind::Unexpected);
        assert!(failure.message.contains("PersistenceError"));
        assert!(failure.message.contains("disk full"));
    }

    #[tokio::test]
    async fn test_rollback_undoes_stage_writes() {
        let store = InMemoryPersistence::new();
        let runner = StageRunner::new(Arc::new(store.clone()), Arc::new(NoOpEventSink));
        let def = definition(
            FailingStage::declared("memory_write", "constraint violated", false)
                .writing_to(store.clone(), "memory:1"),
        );
        let mut ctx = test_context();

        let scope = store.begin_scope("memory_write").await.unwrap();
        runner.execute(&def, &mut ctx, scope).await;

        assert_eq!(store.get("memory:1"), None);
        assert_eq!(store.open_scopes(), 0);
    }

    #[tokio::test]
    async fn test_events_for_success() {
        let sink = Arc::new(CollectingEventSink::new());
        let store = InMemoryPersistence::new();
        let runner = StageRunner::new(Arc::new(store.clone()), sink.clone());
        let def = definition(SuccessStage::new("prompt_assembly"));
        let mut ctx = test_context();

        let scope = store.begin_scope("prompt_assembly").await.unwrap();
        runner.execute(&def, &mut ctx, scope).await;

        assert_eq!(store.open_scopes(), 0);
        assert_eq!(
            sink.event_types(),
            vec![event_types::STAGE_STARTED, event_types::STAGE_COMPLETED]
        );
    }
}
