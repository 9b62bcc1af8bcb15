//! Storage backend with failure injection, for exercising the transient
//! error paths of callers. Compiled only for tests and under the
//! `test-utils` feature.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::memory::MemoryStorage;
use crate::record::{
    JobRecord, JobState, ParameterRecord, ReportRecord, TopicRecord, TriggerFiringRecord,
};
use crate::traits::PipelineStorage;

/// In-memory storage that can be told to fail.
///
/// - [`fail_next`](Self::fail_next) makes the next `n` calls return
///   `StorageError::Unavailable`, after which calls succeed again.
/// - [`set_down`](Self::set_down) makes every call fail until cleared.
///
/// Clones share both the tables and the fault settings.
#[derive(Debug, Clone, Default)]
pub struct FlakyStorage {
    inner: MemoryStorage,
    pending_failures: Arc<AtomicU32>,
    down: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls with `Unavailable`.
    pub fn fail_next(&self, n: u32) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Fail every call while `down` is true.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Number of calls made, successful or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, op: &str) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!("{op}: store is down")));
        }
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StorageError::Unavailable(format!("{op}: injected failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl PipelineStorage for FlakyStorage {
    async fn put_job(&self, record: JobRecord) -> Result<JobRecord, StorageError> {
        self.check("put_job")?;
        self.inner.put_job(record).await
    }

    async fn get_job(
        &self,
        job_id: &str,
        project: &str,
    ) -> Result<Option<JobRecord>, StorageError> {
        self.check("get_job")?;
        self.inner.get_job(job_id, project).await
    }

    async fn list_jobs(
        &self,
        project: &str,
        state_filter: Option<JobState>,
    ) -> Result<Vec<JobRecord>, StorageError> {
        self.check("list_jobs")?;
        self.inner.list_jobs(project, state_filter).await
    }

    async fn put_report(&self, record: ReportRecord) -> Result<ReportRecord, StorageError> {
        self.check("put_report")?;
        self.inner.put_report(record).await
    }

    async fn get_report(
        &self,
        correlation_id: &str,
        report_type: &str,
    ) -> Result<Option<ReportRecord>, StorageError> {
        self.check("get_report")?;
        self.inner.get_report(correlation_id, report_type).await
    }

    async fn put_topic(&self, record: TopicRecord) -> Result<(), StorageError> {
        self.check("put_topic")?;
        self.inner.put_topic(record).await
    }

    async fn get_topic(&self, topic_id: &str) -> Result<Option<TopicRecord>, StorageError> {
        self.check("get_topic")?;
        self.inner.get_topic(topic_id).await
    }

    async fn put_parameter(&self, name: &str, value: &str) -> Result<(), StorageError> {
        self.check("put_parameter")?;
        self.inner.put_parameter(name, value).await
    }

    async fn get_parameter(&self, name: &str) -> Result<Option<String>, StorageError> {
        self.check("get_parameter")?;
        self.inner.get_parameter(name).await
    }

    async fn list_parameters(&self, prefix: &str) -> Result<Vec<ParameterRecord>, StorageError> {
        self.check("list_parameters")?;
        self.inner.list_parameters(prefix).await
    }

    async fn claim_trigger_firing(
        &self,
        record: TriggerFiringRecord,
    ) -> Result<bool, StorageError> {
        self.check("claim_trigger_firing")?;
        self.inner.claim_trigger_firing(record).await
    }

    async fn complete_trigger_firing(
        &self,
        trigger: &str,
        upstream_run_id: &str,
        crawl_run_id: &str,
    ) -> Result<(), StorageError> {
        self.check("complete_trigger_firing")?;
        self.inner
            .complete_trigger_firing(trigger, upstream_run_id, crawl_run_id)
            .await
    }

    async fn release_trigger_firing(
        &self,
        trigger: &str,
        upstream_run_id: &str,
    ) -> Result<(), StorageError> {
        self.check("release_trigger_firing")?;
        self.inner
            .release_trigger_firing(trigger, upstream_run_id)
            .await
    }

    async fn get_trigger_firing(
        &self,
        trigger: &str,
        upstream_run_id: &str,
    ) -> Result<Option<TriggerFiringRecord>, StorageError> {
        self.check("get_trigger_firing")?;
        self.inner.get_trigger_firing(trigger, upstream_run_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fail_next_fails_exactly_n_calls() {
        let s = FlakyStorage::new();
        s.fail_next(2);
        assert!(s.get_parameter("x").await.is_err());
        assert!(s.get_parameter("x").await.is_err());
        assert!(s.get_parameter("x").await.unwrap().is_none());
        assert_eq!(s.calls(), 3);
    }

    #[tokio::test]
    async fn down_store_errors_are_transient() {
        let s = FlakyStorage::new();
        s.set_down(true);
        let err = s.put_parameter("x", "1").await.unwrap_err();
        assert!(err.is_transient());
        s.set_down(false);
        s.put_parameter("x", "1").await.unwrap();
    }

    #[tokio::test]
    async fn healthy_flaky_storage_conforms() {
        let report =
            crate::conformance::run_conformance_suite(|| async { FlakyStorage::new() }).await;
        assert_eq!(report.failed, 0, "{report}");
    }
}
