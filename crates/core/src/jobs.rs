//! Job registry and the status update protocol.
//!
//! Workers report progress with [`JobRegistry::update_job_status`]. The
//! write is a conditional-free upsert keyed by `(job_id, project)` and is
//! best-effort: a store failure is logged and handed back as
//! [`StatusOutcome::RecordingFailed`], never as an error, so a worker whose
//! status cannot be written still finishes its real work.
//!
//! Redelivery of the same update is harmless (the record is overwritten with
//! identical values). Different updates are last-write-wins by arrival order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pipeline_storage::{JobRecord, JobState, PipelineStorage, StorageError};

use crate::outcome::StatusOutcome;

/// How the protocol treats a state change the lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionPolicy {
    /// Write whatever the worker sends.
    #[default]
    LastWriteWins,
    /// Only move forward through `PENDING → RUNNING → {SUCCEEDED, FAILED}`.
    /// Re-sending the current state is allowed. Anything else is refused.
    ///
    /// The check reads before it writes and is not atomic; it assumes one
    /// writer per job.
    Monotonic,
}

fn rank(state: JobState) -> u8 {
    match state {
        JobState::Pending => 0,
        JobState::Running => 1,
        JobState::Succeeded | JobState::Failed => 2,
    }
}

impl TransitionPolicy {
    /// Whether a job currently in `current` may be set to `requested`.
    pub fn permits(self, current: JobState, requested: JobState) -> bool {
        match self {
            TransitionPolicy::LastWriteWins => true,
            TransitionPolicy::Monotonic => {
                if current == requested {
                    true
                } else if current.is_terminal() {
                    false
                } else {
                    rank(requested) > rank(current)
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct JobRegistry {
    storage: Arc<dyn PipelineStorage>,
    policy: TransitionPolicy,
}

impl JobRegistry {
    pub fn new(storage: Arc<dyn PipelineStorage>) -> Self {
        JobRegistry {
            storage,
            policy: TransitionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: TransitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Record `state` and `response` for a job. Creates the record on first
    /// use.
    ///
    /// Never fails: the returned outcome says whether the write landed.
    #[tracing::instrument(skip(self, response), fields(state = %state))]
    pub async fn update_job_status(
        &self,
        job_id: &str,
        project: &str,
        response: serde_json::Value,
        state: JobState,
    ) -> StatusOutcome<JobRecord> {
        if self.policy == TransitionPolicy::Monotonic {
            match self.storage.get_job(job_id, project).await {
                Ok(Some(current)) if !self.policy.permits(current.job_state, state) => {
                    warn!(
                        current = %current.job_state,
                        "refusing job status regression"
                    );
                    return StatusOutcome::Rejected {
                        current: current.job_state.to_string(),
                        requested: state.to_string(),
                    };
                }
                Ok(_) => {}
                Err(e) => return recording_failed(e),
            }
        }

        let record = JobRecord {
            job_id: job_id.to_string(),
            project: project.to_string(),
            job_state: state,
            full_response: response,
        };
        match self.storage.put_job(record).await {
            Ok(stored) => {
                debug!("job status recorded");
                StatusOutcome::Recorded(stored)
            }
            Err(e) => recording_failed(e),
        }
    }

    /// Read a job record. Unlike the write path, errors surface here.
    pub async fn get_job(
        &self,
        job_id: &str,
        project: &str,
    ) -> Result<Option<JobRecord>, StorageError> {
        self.storage.get_job(job_id, project).await
    }

    /// Jobs of a project, optionally only those in `state`.
    pub async fn list_jobs(
        &self,
        project: &str,
        state: Option<JobState>,
    ) -> Result<Vec<JobRecord>, StorageError> {
        self.storage.list_jobs(project, state).await
    }

    /// A reporting handle bound to one job.
    pub fn reporter(&self, job_id: &str, project: &str) -> JobReporter {
        JobReporter {
            registry: self.clone(),
            job_id: job_id.to_string(),
            project: project.to_string(),
        }
    }
}

fn recording_failed<T>(e: StorageError) -> StatusOutcome<T> {
    warn!(error = %e, transient = e.is_transient(), "status update not recorded; continuing");
    StatusOutcome::RecordingFailed {
        reason: e.to_string(),
    }
}

/// Status reporting handle for the worker executing one job.
#[derive(Clone)]
pub struct JobReporter {
    registry: JobRegistry,
    job_id: String,
    project: String,
}

impl JobReporter {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub async fn report(&self, state: JobState, response: serde_json::Value) -> StatusOutcome<JobRecord> {
        self.registry
            .update_job_status(&self.job_id, &self.project, response, state)
            .await
    }

    pub async fn pending(&self) -> StatusOutcome<JobRecord> {
        self.report(JobState::Pending, serde_json::Value::Null).await
    }

    pub async fn running(&self, response: serde_json::Value) -> StatusOutcome<JobRecord> {
        self.report(JobState::Running, response).await
    }

    pub async fn succeeded(&self, response: serde_json::Value) -> StatusOutcome<JobRecord> {
        self.report(JobState::Succeeded, response).await
    }

    pub async fn failed(&self, response: serde_json::Value) -> StatusOutcome<JobRecord> {
        self.report(JobState::Failed, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_storage::{FlakyStorage, MemoryStorage};
    use serde_json::json;

    fn registry() -> JobRegistry {
        JobRegistry::new(Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn update_then_read_returns_latest_pair() {
        let jobs = registry();
        jobs.update_job_status("J-1", "p", json!({"step": 1}), JobState::Running)
            .await;
        jobs.update_job_status("J-1", "p", json!({"step": 2}), JobState::Succeeded)
            .await;

        let rec = jobs.get_job("J-1", "p").await.unwrap().unwrap();
        assert_eq!(rec.job_state, JobState::Succeeded);
        assert_eq!(rec.full_response, json!({"step": 2}));
    }

    #[tokio::test]
    async fn repeated_update_is_idempotent() {
        let jobs = registry();
        let first = jobs
            .update_job_status("J-1", "p", json!({"rows": 3}), JobState::Running)
            .await
            .into_record()
            .unwrap();
        let after_first = jobs.get_job("J-1", "p").await.unwrap();
        let second = jobs
            .update_job_status("J-1", "p", json!({"rows": 3}), JobState::Running)
            .await
            .into_record()
            .unwrap();
        let after_second = jobs.get_job("J-1", "p").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn record_invisible_before_first_write() {
        let jobs = registry();
        assert!(jobs.get_job("J-1", "p").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_failure_is_swallowed() {
        let storage = FlakyStorage::new();
        storage.set_down(true);
        let jobs = JobRegistry::new(Arc::new(storage.clone()));

        let outcome = jobs
            .update_job_status("J-1", "p", json!({}), JobState::Failed)
            .await;
        match outcome {
            StatusOutcome::RecordingFailed { reason } => {
                assert!(reason.contains("unavailable"), "reason: {reason}")
            }
            other => panic!("expected RecordingFailed, got {:?}", other),
        }

        storage.set_down(false);
        assert!(jobs.get_job("J-1", "p").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_path_surfaces_store_failure() {
        let storage = FlakyStorage::new();
        storage.set_down(true);
        let jobs = JobRegistry::new(Arc::new(storage));
        assert!(jobs.get_job("J-1", "p").await.is_err());
    }

    #[tokio::test]
    async fn last_write_wins_allows_regression() {
        let jobs = registry();
        jobs.update_job_status("J-1", "p", json!(null), JobState::Succeeded)
            .await;
        let outcome = jobs
            .update_job_status("J-1", "p", json!(null), JobState::Running)
            .await;
        assert!(outcome.is_recorded());
        assert_eq!(
            jobs.get_job("J-1", "p").await.unwrap().unwrap().job_state,
            JobState::Running
        );
    }

    #[tokio::test]
    async fn monotonic_policy_refuses_leaving_terminal_state() {
        let jobs = registry().with_policy(TransitionPolicy::Monotonic);
        jobs.update_job_status("J-1", "p", json!({"rows": 42}), JobState::Succeeded)
            .await;

        let outcome = jobs
            .update_job_status("J-1", "p", json!({}), JobState::Running)
            .await;
        assert_eq!(
            outcome,
            StatusOutcome::Rejected {
                current: "SUCCEEDED".to_string(),
                requested: "RUNNING".to_string(),
            }
        );
        let rec = jobs.get_job("J-1", "p").await.unwrap().unwrap();
        assert_eq!(rec.job_state, JobState::Succeeded);
        assert_eq!(rec.full_response, json!({"rows": 42}));
    }

    #[tokio::test]
    async fn monotonic_policy_allows_redelivery_of_terminal_state() {
        let jobs = registry().with_policy(TransitionPolicy::Monotonic);
        jobs.update_job_status("J-1", "p", json!({"rows": 1}), JobState::Failed)
            .await;
        let outcome = jobs
            .update_job_status("J-1", "p", json!({"rows": 1}), JobState::Failed)
            .await;
        assert!(outcome.is_recorded());
    }

    #[test]
    fn monotonic_transition_table() {
        use JobState::*;
        let p = TransitionPolicy::Monotonic;
        assert!(p.permits(Pending, Running));
        assert!(p.permits(Pending, Succeeded));
        assert!(p.permits(Running, Failed));
        assert!(p.permits(Running, Running));
        assert!(!p.permits(Running, Pending));
        assert!(!p.permits(Succeeded, Failed));
        assert!(!p.permits(Failed, Running));
        assert!(TransitionPolicy::LastWriteWins.permits(Succeeded, Pending));
    }

    #[tokio::test]
    async fn reporter_walks_a_job_through_its_lifecycle() {
        let jobs = registry();
        let reporter = jobs.reporter("J-9", "farm-records");
        assert!(reporter.pending().await.is_recorded());
        assert!(reporter.running(json!({"stage": "clean"})).await.is_recorded());
        assert!(reporter.succeeded(json!({"rows": 10})).await.is_recorded());

        let rec = jobs.get_job("J-9", "farm-records").await.unwrap().unwrap();
        assert_eq!(rec.job_state, JobState::Succeeded);
        assert_eq!(reporter.job_id(), "J-9");
    }

    #[tokio::test]
    async fn list_jobs_finds_jobs_still_running() {
        let jobs = registry();
        jobs.reporter("J-1", "p").running(json!(null)).await;
        jobs.reporter("J-2", "p").succeeded(json!(null)).await;
        let running = jobs.list_jobs("p", Some(JobState::Running)).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].job_id, "J-1");
    }
}
