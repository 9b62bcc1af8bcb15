use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{
    JobRecord, JobState, ParameterRecord, ReportRecord, TopicRecord, TriggerFiringRecord,
};

/// The storage trait for the pipeline status core.
///
/// A `PipelineStorage` implementation is the key-value store collaborator:
/// conditional-free upserts by composite key and strongly-consistent reads.
/// Each table is independent; nothing here spans more than one key.
///
/// ## Write Semantics
///
/// `put_*` methods are last-write-wins. There is no version check and no
/// state-machine enforcement: two writers to the same key race, and the
/// later-arriving write replaces the earlier one in full. The only
/// conditional write is [`claim_trigger_firing`](Self::claim_trigger_firing).
///
/// ## Absence
///
/// Lookups return `Ok(None)` when no record exists. `Err` is reserved for
/// the store itself failing; [`StorageError::is_transient`] tells the caller
/// whether a retry may help.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so a single handle can
/// be shared across tokio tasks behind an `Arc`.
#[async_trait]
pub trait PipelineStorage: Send + Sync + 'static {
    // ── Job records ──────────────────────────────────────────────────────────

    /// Upsert a job record keyed by `(job_id, project)`.
    ///
    /// Returns the record as stored.
    async fn put_job(&self, record: JobRecord) -> Result<JobRecord, StorageError>;

    /// Read a job record.
    async fn get_job(&self, job_id: &str, project: &str)
        -> Result<Option<JobRecord>, StorageError>;

    /// List the jobs of a project, optionally filtered by state, ordered by
    /// `job_id`.
    async fn list_jobs(
        &self,
        project: &str,
        state_filter: Option<JobState>,
    ) -> Result<Vec<JobRecord>, StorageError>;

    // ── Report records ───────────────────────────────────────────────────────

    /// Upsert a report record keyed by `(correlation_id, report_type)`.
    ///
    /// The stored file list is replaced, not merged.
    async fn put_report(&self, record: ReportRecord) -> Result<ReportRecord, StorageError>;

    /// Read a report record.
    async fn get_report(
        &self,
        correlation_id: &str,
        report_type: &str,
    ) -> Result<Option<ReportRecord>, StorageError>;

    // ── Topic records ────────────────────────────────────────────────────────

    /// Write a topic record. Topics are owned by an external service; this
    /// exists so that service (and tests) can seed the table.
    async fn put_topic(&self, record: TopicRecord) -> Result<(), StorageError>;

    /// Strongly-consistent lookup by topic id.
    async fn get_topic(&self, topic_id: &str) -> Result<Option<TopicRecord>, StorageError>;

    // ── Parameters (resource registry) ───────────────────────────────────────

    /// Upsert a parameter. Last write wins.
    async fn put_parameter(&self, name: &str, value: &str) -> Result<(), StorageError>;

    /// Read a parameter value.
    async fn get_parameter(&self, name: &str) -> Result<Option<String>, StorageError>;

    /// List parameters whose name starts with `prefix`, ordered by name.
    async fn list_parameters(&self, prefix: &str) -> Result<Vec<ParameterRecord>, StorageError>;

    // ── Trigger firings ──────────────────────────────────────────────────────

    /// Insert a firing claim if none exists for
    /// `(record.trigger, record.upstream_run_id)`.
    ///
    /// Returns `true` if this call created the claim, `false` if a claim was
    /// already present (the existing claim is left untouched).
    async fn claim_trigger_firing(&self, record: TriggerFiringRecord)
        -> Result<bool, StorageError>;

    /// Attach the downstream run id to an existing claim.
    ///
    /// A missing claim is a no-op.
    async fn complete_trigger_firing(
        &self,
        trigger: &str,
        upstream_run_id: &str,
        crawl_run_id: &str,
    ) -> Result<(), StorageError>;

    /// Drop a claim so the same upstream run can fire again.
    async fn release_trigger_firing(
        &self,
        trigger: &str,
        upstream_run_id: &str,
    ) -> Result<(), StorageError>;

    /// Read a firing claim.
    async fn get_trigger_firing(
        &self,
        trigger: &str,
        upstream_run_id: &str,
    ) -> Result<Option<TriggerFiringRecord>, StorageError>;
}
