//! Sequential driver for one post-conversation run.

use super::PipelineResult;
use crate::context::{TurnContext, TurnIdentity};
use crate::errors::{PipelineValidationError, StageError};
use crate::events::{event_types, EventSink};
use crate::persistence::Persistence;
use crate::stages::{StageDefinition, StageFailure, StageOutcome, StageRunner};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

/// Owns the ordered stage list and drives it against one context per run.
///
/// Stages run strictly one after another: stage *N*'s writes are visible to
/// stage *N+1*. A failing critical stage stops the run; a failing
/// non-critical stage is recorded in `stage_errors` and the run continues.
pub struct Orchestrator {
    stages: Vec<StageDefinition>,
    persistence: Arc<dyn Persistence>,
    sink: Arc<dyn EventSink>,
    runner: StageRunner,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator over an ordered stage list.
    ///
    /// # Errors
    ///
    /// Returns an error if two stages share a name.
    pub fn new(
        stages: Vec<StageDefinition>,
        persistence: Arc<dyn Persistence>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, PipelineValidationError> {
        let mut seen = HashSet::new();
        for def in &stages {
            if !seen.insert(def.name()) {
                return Err(PipelineValidationError::duplicate(def.name()));
            }
        }

        Ok(Self {
            runner: StageRunner::new(persistence.clone(), sink.clone()),
            stages,
            persistence,
            sink,
        })
    }

    /// Number of configured stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Configured stages, in order.
    #[must_use]
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    /// Configured stage names, in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(StageDefinition::name).collect()
    }

    /// Processes one conversation turn, starting now.
    pub async fn process(
        &self,
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        platform: impl Into<String>,
    ) -> PipelineResult {
        self.process_turn(TurnIdentity::new(conversation_id, user_id, platform))
            .await
    }

    /// Processes one conversation turn with a caller-built identity.
    pub async fn process_turn(&self, identity: TurnIdentity) -> PipelineResult {
        let span = info_span!(
            "pipeline.run",
            run_id = %identity.run_id,
            conversation_id = %identity.conversation_id,
            user_id = %identity.user_id,
            platform = %identity.platform,
        );
        self.drive(TurnContext::new(identity)).instrument(span).await
    }

    async fn drive(&self, mut ctx: TurnContext) -> PipelineResult {
        let total = self.stages.len();
        self.sink.try_emit(
            event_types::PIPELINE_STARTED,
            Some(serde_json::json!({
                "identity": ctx.identity().to_dict(),
                "stages_total": total,
            })),
        );
        info!(stages_total = total, "Pipeline started");

        let mut attempted = 0;
        for def in &self.stages {
            attempted += 1;
            let span = info_span!("pipeline.stage", stage = %def.name(), critical = def.is_critical());
            let outcome = self.run_stage(def, &mut ctx).instrument(span).await;
            ctx.record_stage_timing(def.name(), outcome.duration_ms());

            let StageOutcome::Failure(failure) = outcome else {
                continue;
            };
            ctx.record_stage_error(def.name(), failure.message.clone());

            if def.is_critical() {
                warn!(
                    stage = %def.name(),
                    stages_completed = attempted,
                    error = %failure.message,
                    "Critical stage failed, aborting pipeline"
                );
                self.sink.try_emit(
                    event_types::PIPELINE_ABORTED,
                    Some(serde_json::json!({
                        "run_id": ctx.run_id().to_string(),
                        "error_stage": def.name(),
                        "error": failure.message,
                        "stages_completed": attempted,
                        "stages_total": total,
                        "duration_ms": ctx.total_duration_ms(),
                    })),
                );
                return PipelineResult::aborted(ctx, def.name(), failure.message, attempted, total);
            }
        }

        info!(
            stages_completed = attempted,
            failed_stages = ctx.stage_errors().len(),
            duration_ms = ctx.total_duration_ms(),
            "Pipeline completed"
        );
        self.sink.try_emit(
            event_types::PIPELINE_COMPLETED,
            Some(serde_json::json!({
                "run_id": ctx.run_id().to_string(),
                "stages_completed": attempted,
                "stages_total": total,
                "failed_stages": ctx.stage_errors().keys().collect::<Vec<_>>(),
                "duration_ms": ctx.total_duration_ms(),
            })),
        );
        PipelineResult::completed(ctx, attempted, total)
    }

    /// Opens the stage's isolation scope and hands it to the runner.
    async fn run_stage(&self, def: &StageDefinition, ctx: &mut TurnContext) -> StageOutcome {
        match self.persistence.begin_scope(def.name()).await {
            Ok(scope) => self.runner.execute(def, ctx, scope).await,
            Err(err) => {
                warn!(stage = %def.name(), error = %err, "Could not open isolation scope");
                let err = StageError::unexpected(err);
                let failure = StageFailure::from_error(def.name(), &err, 0.0);
                self.sink.try_emit(
                    event_types::STAGE_FAILED,
                    Some(serde_json::json!({
                        "stage": def.name(),
                        "critical": def.is_critical(),
                        "duration_ms": 0.0,
                        "error": failure.message,
                        "kind": failure.kind,
                        "recoverable": failure.recoverable,
                    })),
                );
                failure.into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{codes, PersistenceError};
    use crate::events::{CollectingEventSink, NoOpEventSink};
    use crate::persistence::{MockPersistence, NoOpPersistence, ScopeHandle};
    use crate::stages::Stage;
    use crate::testing::{FailingStage, SuccessStage};

    fn def(stage: impl Stage + 'static) -> StageDefinition {
        StageDefinition::from_stage(Arc::new(stage)).unwrap()
    }

    fn orchestrator(stages: Vec<StageDefinition>) -> Orchestrator {
        Orchestrator::new(stages, Arc::new(NoOpPersistence::new()), Arc::new(NoOpEventSink)).unwrap()
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Orchestrator::new(
            vec![def(SuccessStage::new("a")), def(SuccessStage::new("a"))],
            Arc::new(NoOpPersistence::new()),
            Arc::new(NoOpEventSink),
        )
        .unwrap_err();

        assert_eq!(err.code(), Some(codes::DUPLICATE));
    }

    #[test]
    fn test_stage_names() {
        let orch = orchestrator(vec![def(SuccessStage::new("a")), def(SuccessStage::new("b"))]);
        assert_eq!(orch.stage_names(), vec!["a", "b"]);
        assert_eq!(orch.stage_count(), 2);
        assert!(format!("{orch:?}").contains("Orchestrator"));
    }

    #[tokio::test]
    async fn test_identity_is_set_once() {
        let orch = orchestrator(vec![def(SuccessStage::new("a"))]);
        let result = orch.process("conv-9", "user-3", "ios").await;

        let ctx = result.context();
        assert_eq!(ctx.conversation_id(), "conv-9");
        assert_eq!(ctx.user_id(), "user-3");
        assert_eq!(ctx.platform(), "ios");
    }

    #[tokio::test]
    async fn test_scope_open_failure_counts_as_stage_failure() {
        let mut mock = MockPersistence::new();
        mock.expect_begin_scope().times(1).returning(|stage| {
            Err(PersistenceError::BeginFailed {
                stage: stage.to_string(),
                reason: "pool exhausted".to_string(),
            })
        });
        let orch = Orchestrator::new(
            vec![def(SuccessStage::new("fact_extraction").critical())],
            Arc::new(mock),
            Arc::new(NoOpEventSink),
        )
        .unwrap();

        let result = orch.process("c", "u", "web").await;

        assert!(!result.success());
        assert_eq!(result.error_stage(), Some("fact_extraction"));
        assert!(result.error_message().unwrap().contains("pool exhausted"));
        assert_eq!(result.stages_completed(), 1);
    }

    #[tokio::test]
    async fn test_every_stage_gets_its_own_scope() {
        let mut mock = MockPersistence::new();
        let mut next = 0_u64;
        mock.expect_begin_scope().times(3).returning(move |stage| {
            next += 1;
            Ok(ScopeHandle::new(next, stage))
        });
        mock.expect_release_scope().times(2).returning(|_| Ok(()));
        mock.expect_rollback_scope()
            .times(1)
            .withf(|scope: &ScopeHandle| scope.stage == "mood_generation")
            .returning(|_| Ok(()));

        let orch = Orchestrator::new(
            vec![
                def(SuccessStage::new("fact_extraction")),
                def(FailingStage::declared("mood_generation", "quota", true)),
                def(SuccessStage::new("scoring")),
            ],
            Arc::new(mock),
            Arc::new(NoOpEventSink),
        )
        .unwrap();

        let result = orch.process("c", "u", "web").await;
        assert!(result.success());
        assert_eq!(result.stages_completed(), 3);
    }

    #[tokio::test]
    async fn test_pipeline_events() {
        let sink = Arc::new(CollectingEventSink::new());
        let orch = Orchestrator::new(
            vec![
                def(SuccessStage::new("a")),
                def(FailingStage::declared("b", "nope", false).critical()),
                def(SuccessStage::new("c")),
            ],
            Arc::new(NoOpPersistence::new()),
            sink.clone(),
        )
        .unwrap();

        orch.process("c", "u", "web").await;

        assert_eq!(
            sink.event_types(),
            vec![
                event_types::PIPELINE_STARTED,
                event_types::STAGE_STARTED,
                event_types::STAGE_COMPLETED,
                event_types::STAGE_STARTED,
                event_types::STAGE_FAILED,
                event_types::PIPELINE_ABORTED,
            ]
        );
    }
}
