//! Conditional trigger engine.
//!
//! A trigger watches one or more upstream execution units. Each completion
//! event is evaluated once: when every condition holds the engine starts one
//! catalog crawl over the project's final stage, otherwise it does nothing.
//! There is no polling and no retry; the workflow that delivered the event
//! decides whether to deliver another.
//!
//! Without deduplication the engine is not idempotent: delivering the same
//! `SUCCEEDED` event twice starts two crawls.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

use pipeline_storage::{PipelineStorage, TriggerFiringRecord};

use crate::collaborators::{CatalogService, CrawlRun, ExecutionService, ExecutionState};
use crate::error::TriggerError;
use crate::registry::ResourceRegistry;
use crate::stage::{stage_parameter, Stage, StageLocation};

fn succeeded() -> ExecutionState {
    ExecutionState::Succeeded
}

/// Required state of one upstream unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub unit: String,
    #[serde(default = "succeeded")]
    pub state: ExecutionState,
}

impl Condition {
    pub fn succeeded(unit: &str) -> Self {
        Condition {
            unit: unit.to_string(),
            state: ExecutionState::Succeeded,
        }
    }
}

/// A crawl to start once all `conditions` hold. Conditions are ANDed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDefinition {
    pub name: String,
    pub project: String,
    pub crawler: String,
    pub conditions: Vec<Condition>,
}

impl TriggerDefinition {
    /// Whether an event for `unit` concerns this trigger.
    pub fn watches(&self, unit: &str) -> bool {
        self.conditions.iter().any(|c| c.unit == unit)
    }
}

/// An upstream unit finished a run (or otherwise changed state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub unit: String,
    pub run_id: String,
    pub state: ExecutionState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmetCondition {
    pub unit: String,
    pub expected: ExecutionState,
    pub observed: ExecutionState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// The crawl was started.
    Triggered(CrawlRun),
    /// At least one condition does not hold; nothing was started.
    Waiting { unmet: Vec<UnmetCondition> },
    /// This upstream run already fired the trigger. Only returned with
    /// deduplication on.
    Duplicate {
        upstream_run_id: String,
        crawl_run_id: Option<String>,
    },
}

pub struct TriggerEngine {
    storage: Arc<dyn PipelineStorage>,
    registry: ResourceRegistry,
    execution: Arc<dyn ExecutionService>,
    catalog: Arc<dyn CatalogService>,
    deduplicate: bool,
}

impl TriggerEngine {
    pub fn new(
        storage: Arc<dyn PipelineStorage>,
        registry: ResourceRegistry,
        execution: Arc<dyn ExecutionService>,
        catalog: Arc<dyn CatalogService>,
    ) -> Self {
        TriggerEngine {
            storage,
            registry,
            execution,
            catalog,
            deduplicate: false,
        }
    }

    /// Fire at most once per `(trigger, upstream run id)`.
    pub fn with_deduplication(mut self) -> Self {
        self.deduplicate = true;
        self
    }

    /// Evaluate `definition` against one completion event.
    #[tracing::instrument(
        skip(self, definition, event),
        fields(trigger = %definition.name, unit = %event.unit, run_id = %event.run_id, state = %event.state)
    )]
    pub async fn on_completion(
        &self,
        definition: &TriggerDefinition,
        event: &CompletionEvent,
    ) -> Result<TriggerOutcome, TriggerError> {
        if !definition.watches(&event.unit) {
            return Err(TriggerError::UnrelatedEvent {
                trigger: definition.name.clone(),
                unit: event.unit.clone(),
            });
        }

        let unmet = self.unmet_conditions(definition, event).await?;
        if !unmet.is_empty() {
            debug!(unmet = unmet.len(), "trigger conditions not met");
            return Ok(TriggerOutcome::Waiting { unmet });
        }

        let target = self.final_stage(definition).await?;

        if self.deduplicate {
            let claim = TriggerFiringRecord {
                trigger: definition.name.clone(),
                upstream_run_id: event.run_id.clone(),
                crawl_run_id: None,
                fired_at: now_rfc3339(),
            };
            let claimed = self
                .storage
                .claim_trigger_firing(claim)
                .await
                .map_err(|source| TriggerError::Storage {
                    trigger: definition.name.clone(),
                    source,
                })?;
            if !claimed {
                let previous = self
                    .storage
                    .get_trigger_firing(&definition.name, &event.run_id)
                    .await
                    .map_err(|source| TriggerError::Storage {
                        trigger: definition.name.clone(),
                        source,
                    })?;
                info!("upstream run already fired this trigger");
                return Ok(TriggerOutcome::Duplicate {
                    upstream_run_id: event.run_id.clone(),
                    crawl_run_id: previous.and_then(|f| f.crawl_run_id),
                });
            }
        }

        let run = match self.catalog.start_crawl(&definition.crawler, &target).await {
            Ok(run) => run,
            Err(source) => {
                if self.deduplicate {
                    // Let a redelivered event try again.
                    if let Err(e) = self
                        .storage
                        .release_trigger_firing(&definition.name, &event.run_id)
                        .await
                    {
                        warn!(error = %e, "could not release firing claim");
                    }
                }
                warn!(crawler = %definition.crawler, error = %source, "crawl start failed");
                return Err(TriggerError::StartFailed {
                    trigger: definition.name.clone(),
                    crawler: definition.crawler.clone(),
                    source,
                });
            }
        };

        if self.deduplicate {
            if let Err(e) = self
                .storage
                .complete_trigger_firing(&definition.name, &event.run_id, &run.crawl_run_id)
                .await
            {
                warn!(error = %e, "crawl started but firing record not completed");
            }
        }

        info!(
            crawler = %run.crawler,
            crawl_run_id = %run.crawl_run_id,
            target = %run.target,
            "crawl started"
        );
        Ok(TriggerOutcome::Triggered(run))
    }

    async fn unmet_conditions(
        &self,
        definition: &TriggerDefinition,
        event: &CompletionEvent,
    ) -> Result<Vec<UnmetCondition>, TriggerError> {
        let mut unmet = Vec::new();
        for condition in &definition.conditions {
            let observed = if condition.unit == event.unit {
                event.state
            } else {
                self.execution
                    .describe_unit(&condition.unit)
                    .await
                    .map_err(|source| TriggerError::DescribeFailed {
                        trigger: definition.name.clone(),
                        source,
                    })?
            };
            if observed != condition.state {
                unmet.push(UnmetCondition {
                    unit: condition.unit.clone(),
                    expected: condition.state,
                    observed,
                });
            }
        }
        Ok(unmet)
    }

    async fn final_stage(&self, definition: &TriggerDefinition) -> Result<StageLocation, TriggerError> {
        let container_name = self
            .registry
            .require(&stage_parameter(&definition.project, Stage::Final))
            .await
            .map_err(|source| TriggerError::Unresolved {
                trigger: definition.name.clone(),
                source,
            })?;
        Ok(StageLocation {
            project: definition.project.clone(),
            stage: Stage::Final,
            container_name,
        })
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{RecordingCatalog, StaticExecutionService};
    use crate::error::{CollaboratorError, RegistryError};
    use pipeline_storage::MemoryStorage;

    struct Fixture {
        storage: Arc<MemoryStorage>,
        execution: Arc<StaticExecutionService>,
        catalog: Arc<RecordingCatalog>,
        registry: ResourceRegistry,
    }

    impl Fixture {
        async fn new() -> Self {
            let storage = Arc::new(MemoryStorage::new());
            let registry = ResourceRegistry::new(storage.clone(), "prod");
            registry
                .publish(&stage_parameter("farm-records", Stage::Final), "fsa-farm-records-final")
                .await
                .unwrap();
            Fixture {
                storage,
                execution: Arc::new(StaticExecutionService::new()),
                catalog: Arc::new(RecordingCatalog::new()),
                registry,
            }
        }

        fn engine(&self) -> TriggerEngine {
            TriggerEngine::new(
                self.storage.clone(),
                self.registry.clone(),
                self.execution.clone(),
                self.catalog.clone(),
            )
        }
    }

    fn crawl_trigger() -> TriggerDefinition {
        TriggerDefinition {
            name: "crawl-final".to_string(),
            project: "farm-records".to_string(),
            crawler: "farm-records-final".to_string(),
            conditions: vec![Condition::succeeded("E-7")],
        }
    }

    fn event(state: ExecutionState) -> CompletionEvent {
        CompletionEvent {
            unit: "E-7".to_string(),
            run_id: "jr-1".to_string(),
            state,
        }
    }

    #[tokio::test]
    async fn success_starts_exactly_one_crawl_over_final_stage() {
        let fx = Fixture::new().await;
        let outcome = fx
            .engine()
            .on_completion(&crawl_trigger(), &event(ExecutionState::Succeeded))
            .await
            .unwrap();

        let started = fx.catalog.started();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].crawler, "farm-records-final");
        assert_eq!(started[0].target.container_name, "fsa-farm-records-final");
        assert_eq!(started[0].target.stage, Stage::Final);
        assert_eq!(outcome, TriggerOutcome::Triggered(started[0].clone()));
    }

    #[tokio::test]
    async fn non_success_states_start_nothing() {
        let fx = Fixture::new().await;
        let engine = fx.engine();
        for state in [ExecutionState::Failed, ExecutionState::Running, ExecutionState::Timeout] {
            let outcome = engine.on_completion(&crawl_trigger(), &event(state)).await.unwrap();
            match outcome {
                TriggerOutcome::Waiting { unmet } => {
                    assert_eq!(unmet.len(), 1);
                    assert_eq!(unmet[0].observed, state);
                }
                other => panic!("expected Waiting, got {:?}", other),
            }
        }
        assert_eq!(fx.catalog.start_count(), 0);
    }

    #[tokio::test]
    async fn repeated_success_without_dedup_starts_twice() {
        let fx = Fixture::new().await;
        let engine = fx.engine();
        let ev = event(ExecutionState::Succeeded);
        engine.on_completion(&crawl_trigger(), &ev).await.unwrap();
        engine.on_completion(&crawl_trigger(), &ev).await.unwrap();
        assert_eq!(fx.catalog.start_count(), 2);
    }

    #[tokio::test]
    async fn dedup_fires_once_per_upstream_run() {
        let fx = Fixture::new().await;
        let engine = fx.engine().with_deduplication();
        let ev = event(ExecutionState::Succeeded);

        let first = engine.on_completion(&crawl_trigger(), &ev).await.unwrap();
        let second = engine.on_completion(&crawl_trigger(), &ev).await.unwrap();

        assert!(matches!(first, TriggerOutcome::Triggered(_)));
        assert_eq!(
            second,
            TriggerOutcome::Duplicate {
                upstream_run_id: "jr-1".to_string(),
                crawl_run_id: Some("crawl-1".to_string()),
            }
        );
        assert_eq!(fx.catalog.start_count(), 1);

        let next_run = CompletionEvent {
            run_id: "jr-2".to_string(),
            ..ev
        };
        engine.on_completion(&crawl_trigger(), &next_run).await.unwrap();
        assert_eq!(fx.catalog.start_count(), 2);
    }

    #[tokio::test]
    async fn start_failure_is_terminal_and_not_retried() {
        let fx = Fixture::new().await;
        fx.catalog.fail_with(Some(CollaboratorError::Rejected {
            service: "catalog".to_string(),
            message: "crawler is already running".to_string(),
        }));

        let err = fx
            .engine()
            .on_completion(&crawl_trigger(), &event(ExecutionState::Succeeded))
            .await
            .unwrap_err();
        assert!(matches!(err, TriggerError::StartFailed { ref crawler, .. } if crawler == "farm-records-final"));
        assert_eq!(fx.catalog.start_count(), 0);
    }

    #[tokio::test]
    async fn failed_start_releases_dedup_claim() {
        let fx = Fixture::new().await;
        let engine = fx.engine().with_deduplication();
        let ev = event(ExecutionState::Succeeded);

        fx.catalog.fail_with(Some(CollaboratorError::Unavailable {
            service: "catalog".to_string(),
            message: "throttled".to_string(),
        }));
        assert!(engine.on_completion(&crawl_trigger(), &ev).await.is_err());
        assert!(fx
            .storage
            .get_trigger_firing("crawl-final", "jr-1")
            .await
            .unwrap()
            .is_none());

        fx.catalog.fail_with(None);
        let outcome = engine.on_completion(&crawl_trigger(), &ev).await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::Triggered(_)));
    }

    #[tokio::test]
    async fn unpublished_final_stage_is_a_deploy_ordering_error() {
        let fx = Fixture::new().await;
        let mut def = crawl_trigger();
        def.project = "not-deployed".to_string();

        let err = fx
            .engine()
            .on_completion(&def, &event(ExecutionState::Succeeded))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TriggerError::Unresolved {
                source: RegistryError::Unresolved { .. },
                ..
            }
        ));
        assert_eq!(fx.catalog.start_count(), 0);
    }

    #[tokio::test]
    async fn all_conditions_must_hold() {
        let fx = Fixture::new().await;
        let mut def = crawl_trigger();
        def.conditions.push(Condition::succeeded("E-8"));
        fx.execution.set_state("E-8", ExecutionState::Running);
        let engine = fx.engine();
        let ev = event(ExecutionState::Succeeded);

        let outcome = engine.on_completion(&def, &ev).await.unwrap();
        assert_eq!(
            outcome,
            TriggerOutcome::Waiting {
                unmet: vec![UnmetCondition {
                    unit: "E-8".to_string(),
                    expected: ExecutionState::Succeeded,
                    observed: ExecutionState::Running,
                }]
            }
        );

        fx.execution.set_state("E-8", ExecutionState::Succeeded);
        let outcome = engine.on_completion(&def, &ev).await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::Triggered(_)));
        assert_eq!(fx.catalog.start_count(), 1);
    }

    #[tokio::test]
    async fn unknown_sibling_unit_fails_evaluation() {
        let fx = Fixture::new().await;
        let mut def = crawl_trigger();
        def.conditions.push(Condition::succeeded("E-missing"));
        let err = fx
            .engine()
            .on_completion(&def, &event(ExecutionState::Succeeded))
            .await
            .unwrap_err();
        assert!(matches!(err, TriggerError::DescribeFailed { .. }));
    }

    #[tokio::test]
    async fn unrelated_event_is_refused() {
        let fx = Fixture::new().await;
        let ev = CompletionEvent {
            unit: "E-99".to_string(),
            run_id: "jr-1".to_string(),
            state: ExecutionState::Succeeded,
        };
        let err = fx.engine().on_completion(&crawl_trigger(), &ev).await.unwrap_err();
        assert!(matches!(err, TriggerError::UnrelatedEvent { .. }));
    }

    #[test]
    fn condition_state_defaults_to_succeeded() {
        let c: Condition = serde_json::from_str(r#"{"unit": "etl"}"#).unwrap();
        assert_eq!(c.state, ExecutionState::Succeeded);
    }
}
