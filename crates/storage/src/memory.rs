use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::record::{
    JobRecord, JobState, ParameterRecord, ReportRecord, TopicRecord, TriggerFiringRecord,
};
use crate::tables::Tables;
use crate::traits::PipelineStorage;

/// In-process storage backend.
///
/// Clones share the same tables, so a clone handed to each component sees
/// every write made through any other clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineStorage for MemoryStorage {
    async fn put_job(&self, record: JobRecord) -> Result<JobRecord, StorageError> {
        Ok(self.tables.write().await.put_job(record))
    }

    async fn get_job(
        &self,
        job_id: &str,
        project: &str,
    ) -> Result<Option<JobRecord>, StorageError> {
        Ok(self.tables.read().await.get_job(job_id, project))
    }

    async fn list_jobs(
        &self,
        project: &str,
        state_filter: Option<JobState>,
    ) -> Result<Vec<JobRecord>, StorageError> {
        Ok(self.tables.read().await.list_jobs(project, state_filter))
    }

    async fn put_report(&self, record: ReportRecord) -> Result<ReportRecord, StorageError> {
        Ok(self.tables.write().await.put_report(record))
    }

    async fn get_report(
        &self,
        correlation_id: &str,
        report_type: &str,
    ) -> Result<Option<ReportRecord>, StorageError> {
        Ok(self
            .tables
            .read()
            .await
            .get_report(correlation_id, report_type))
    }

    async fn put_topic(&self, record: TopicRecord) -> Result<(), StorageError> {
        self.tables.write().await.put_topic(record);
        Ok(())
    }

    async fn get_topic(&self, topic_id: &str) -> Result<Option<TopicRecord>, StorageError> {
        Ok(self.tables.read().await.get_topic(topic_id))
    }

    async fn put_parameter(&self, name: &str, value: &str) -> Result<(), StorageError> {
        self.tables.write().await.put_parameter(name, value);
        Ok(())
    }

    async fn get_parameter(&self, name: &str) -> Result<Option<String>, StorageError> {
        Ok(self.tables.read().await.get_parameter(name))
    }

    async fn list_parameters(&self, prefix: &str) -> Result<Vec<ParameterRecord>, StorageError> {
        Ok(self.tables.read().await.list_parameters(prefix))
    }

    async fn claim_trigger_firing(
        &self,
        record: TriggerFiringRecord,
    ) -> Result<bool, StorageError> {
        Ok(self.tables.write().await.claim_trigger_firing(record))
    }

    async fn complete_trigger_firing(
        &self,
        trigger: &str,
        upstream_run_id: &str,
        crawl_run_id: &str,
    ) -> Result<(), StorageError> {
        self.tables
            .write()
            .await
            .complete_trigger_firing(trigger, upstream_run_id, crawl_run_id);
        Ok(())
    }

    async fn release_trigger_firing(
        &self,
        trigger: &str,
        upstream_run_id: &str,
    ) -> Result<(), StorageError> {
        self.tables
            .write()
            .await
            .release_trigger_firing(trigger, upstream_run_id);
        Ok(())
    }

    async fn get_trigger_firing(
        &self,
        trigger: &str,
        upstream_run_id: &str,
    ) -> Result<Option<TriggerFiringRecord>, StorageError> {
        Ok(self
            .tables
            .read()
            .await
            .get_trigger_firing(trigger, upstream_run_id))
    }
}
