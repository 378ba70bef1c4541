//! Builds orchestrators from a configuration and a stage registry.

use super::{Orchestrator, PipelineConfig, StageDeps, StageRegistry};
use crate::errors::PipelineValidationError;
use crate::events::EventSink;
use crate::persistence::Persistence;
use crate::stages::StageDefinition;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// A validated configuration bound to its registry.
///
/// All configuration errors surface from [`PipelineFactory::new`], so a
/// service fails at startup rather than on the first conversation.
#[derive(Debug, Clone)]
pub struct PipelineFactory {
    registry: StageRegistry,
    config: PipelineConfig,
}

impl PipelineFactory {
    /// Validates `config` against `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if an enabled stage references an unregistered id,
    /// two enabled stages share a name, or a configured timeout is not a
    /// positive finite number.
    pub fn new(registry: StageRegistry, config: PipelineConfig) -> Result<Self, PipelineValidationError> {
        let mut names = HashSet::new();
        for stage in config.enabled_stages() {
            if !registry.contains(&stage.id) {
                return Err(PipelineValidationError::unknown_stage(&stage.id));
            }
            let name = stage.effective_name();
            if !names.insert(name) {
                return Err(PipelineValidationError::duplicate(name));
            }
            if let Some(seconds) = stage.timeout_seconds {
                if !seconds.is_finite() || seconds <= 0.0 {
                    return Err(PipelineValidationError::invalid_timeout(name, seconds));
                }
            }
        }

        Ok(Self { registry, config })
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The registry stages are constructed from.
    #[must_use]
    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Wires a fresh orchestrator over the enabled stages.
    ///
    /// # Errors
    ///
    /// Returns an error if a constructed stage declares an invalid timeout
    /// that the configuration does not override.
    pub fn build(
        &self,
        persistence: Arc<dyn Persistence>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Orchestrator, PipelineValidationError> {
        let deps = StageDeps::new(persistence.clone(), sink.clone());

        let mut stages = Vec::new();
        for cfg in self.config.enabled_stages() {
            let stage = self.registry.construct(&cfg.id, &deps)?;
            let mut def = StageDefinition::from_stage(stage)?.with_name(cfg.effective_name());
            if let Some(critical) = cfg.critical {
                def = def.with_critical(critical);
            }
            if let Some(seconds) = cfg.timeout_seconds {
                def = def.with_timeout_seconds(seconds)?;
            }
            stages.push(def);
        }

        debug!(stages = stages.len(), "Built pipeline");
        Orchestrator::new(stages, persistence, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::codes;
    use crate::events::NoOpEventSink;
    use crate::persistence::NoOpPersistence;
    use crate::pipeline::StageConfig;
    use crate::stages::Stage;
    use crate::testing::{SlowStage, SuccessStage};
    use pretty_assertions::assert_eq;

    fn registry() -> StageRegistry {
        StageRegistry::new()
            .with("scoring", |_: &StageDeps| -> Arc<dyn Stage> {
                Arc::new(SuccessStage::new("scoring"))
            })
            .unwrap()
            .with("summarization", |_: &StageDeps| -> Arc<dyn Stage> {
                Arc::new(SlowStage::with_delay_ms("summarization", 1).with_timeout(-1.0))
            })
            .unwrap()
    }

    fn build(factory: &PipelineFactory) -> Result<Orchestrator, PipelineValidationError> {
        factory.build(Arc::new(NoOpPersistence::new()), Arc::new(NoOpEventSink))
    }

    #[test]
    fn test_unknown_id_rejected() {
        let config = PipelineConfig::new().with_stage(StageConfig::new("fact_extraction"));
        let err = PipelineFactory::new(registry(), config).unwrap_err();
        assert_eq!(err.code(), Some(codes::UNKNOWN_STAGE));
    }

    #[test]
    fn test_unknown_id_ignored_when_disabled() {
        let config = PipelineConfig::new()
            .with_stage(StageConfig::new("fact_extraction").disabled())
            .with_stage(StageConfig::new("scoring"));
        let factory = PipelineFactory::new(registry(), config).unwrap();

        assert_eq!(build(&factory).unwrap().stage_names(), vec!["scoring"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let config = PipelineConfig::new()
            .with_stage(StageConfig::new("scoring"))
            .with_stage(StageConfig::new("summarization").with_name("scoring"));
        let err = PipelineFactory::new(registry(), config).unwrap_err();
        assert_eq!(err.code(), Some(codes::DUPLICATE));
    }

    #[test]
    fn test_same_id_under_two_names() {
        let config = PipelineConfig::new()
            .with_stage(StageConfig::new("scoring").with_name("engagement"))
            .with_stage(StageConfig::new("scoring").with_name("relationship"));
        let factory = PipelineFactory::new(registry(), config).unwrap();

        assert_eq!(build(&factory).unwrap().stage_names(), vec!["engagement", "relationship"]);
    }

    #[test]
    fn test_invalid_configured_timeout_rejected() {
        let config =
            PipelineConfig::new().with_stage(StageConfig::new("scoring").with_timeout_seconds(0.0));
        let err = PipelineFactory::new(registry(), config).unwrap_err();
        assert_eq!(err.code(), Some(codes::INVALID_TIMEOUT));
    }

    #[test]
    fn test_invalid_declared_timeout_fails_build() {
        let config = PipelineConfig::new().with_stage(StageConfig::new("summarization"));
        let factory = PipelineFactory::new(registry(), config).unwrap();

        let err = build(&factory).unwrap_err();
        assert_eq!(err.code(), Some(codes::INVALID_TIMEOUT));
    }

    #[tokio::test]
    async fn test_overrides_applied() {
        let config = PipelineConfig::new().with_stage(
            StageConfig::new("scoring")
                .with_critical(true)
                .with_timeout_seconds(0.5),
        );
        let factory = PipelineFactory::new(registry(), config).unwrap();
        let orch = build(&factory).unwrap();
        let def = &orch.stages()[0];
        assert!(def.is_critical());
        assert_eq!(def.timeout(), std::time::Duration::from_millis(500));

        let result = orch.process("c", "u", "web").await;
        assert!(result.success());
        assert_eq!(result.stages_total(), 1);
        assert_eq!(factory.config().stages.len(), 1);
        assert!(factory.registry().contains("scoring"));
    }
}
