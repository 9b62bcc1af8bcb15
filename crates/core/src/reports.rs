//! Report registry: output artifacts of multi-part report workflows.
//!
//! [`ReportRegistry::append_report_result`] persists exactly what it is
//! given. It does not merge file lists or count parts; a second append for
//! the same key overwrites the first. Callers that assemble a report from
//! several parts do the merge themselves, or use [`ReportAccumulator`].

use std::sync::Arc;

use tracing::{debug, warn};

use pipeline_storage::{PipelineStorage, ReportRecord, ReportStatus, StorageError};

use crate::outcome::StatusOutcome;

#[derive(Clone)]
pub struct ReportRegistry {
    storage: Arc<dyn PipelineStorage>,
}

impl ReportRegistry {
    pub fn new(storage: Arc<dyn PipelineStorage>) -> Self {
        ReportRegistry { storage }
    }

    /// Overwrite the report record for `(correlation_id, report_type)`.
    ///
    /// Fire-and-forget: a store failure is logged and returned as
    /// [`StatusOutcome::RecordingFailed`].
    #[tracing::instrument(skip(self, file_list, subject), fields(status = %status, files = file_list.len()))]
    pub async fn append_report_result(
        &self,
        correlation_id: &str,
        report_type: &str,
        file_list: Vec<String>,
        status: ReportStatus,
        subject: &str,
    ) -> StatusOutcome<ReportRecord> {
        let record = ReportRecord {
            correlation_id: correlation_id.to_string(),
            report_type: report_type.to_string(),
            output_file_list: file_list,
            status,
            email_subject: subject.to_string(),
        };
        match self.storage.put_report(record).await {
            Ok(stored) => {
                debug!("report result recorded");
                StatusOutcome::Recorded(stored)
            }
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "report result not recorded; continuing");
                StatusOutcome::RecordingFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub async fn get_report(
        &self,
        correlation_id: &str,
        report_type: &str,
    ) -> Result<Option<ReportRecord>, StorageError> {
        self.storage.get_report(correlation_id, report_type).await
    }
}

/// Caller-side assembly of a report whose parts arrive separately.
///
/// Each [`add_part`](Self::add_part) reads the current record, appends the
/// new files it has not seen (keeping arrival order), and writes the merged
/// list back. The record is marked `COMPLETE` once it lists
/// `expected_files` files. A record that is already terminal is left alone.
///
/// The read-merge-write is not atomic. Two accumulators racing on one key
/// can lose a part; run one per report.
pub struct ReportAccumulator {
    registry: ReportRegistry,
    correlation_id: String,
    report_type: String,
    expected_files: usize,
}

impl ReportAccumulator {
    pub fn new(
        registry: ReportRegistry,
        correlation_id: impl Into<String>,
        report_type: impl Into<String>,
        expected_files: usize,
    ) -> Self {
        ReportAccumulator {
            registry,
            correlation_id: correlation_id.into(),
            report_type: report_type.into(),
            expected_files,
        }
    }

    /// Merge `files` into the report and write it back.
    ///
    /// Best-effort like every report write: a failed read is logged and
    /// returned as [`StatusOutcome::RecordingFailed`].
    pub async fn add_part(&self, files: Vec<String>, subject: &str) -> StatusOutcome<ReportRecord> {
        let mut merged = match self.open_record(ReportStatus::InProgress).await {
            Ok(files) => files,
            Err(outcome) => return outcome,
        };
        for file in files {
            if !merged.contains(&file) {
                merged.push(file);
            }
        }

        let status = if merged.len() >= self.expected_files {
            ReportStatus::Complete
        } else {
            ReportStatus::InProgress
        };
        self.registry
            .append_report_result(&self.correlation_id, &self.report_type, merged, status, subject)
            .await
    }

    /// Mark the report `FAILED`, keeping whatever files it already lists. A
    /// report that already finished is left alone.
    pub async fn fail(&self, subject: &str) -> StatusOutcome<ReportRecord> {
        let files = match self.open_record(ReportStatus::Failed).await {
            Ok(files) => files,
            Err(outcome) => return outcome,
        };
        self.registry
            .append_report_result(
                &self.correlation_id,
                &self.report_type,
                files,
                ReportStatus::Failed,
                subject,
            )
            .await
    }

    /// Files of the current record, if it may still change. Otherwise the
    /// outcome to hand back without writing.
    async fn open_record(
        &self,
        requested: ReportStatus,
    ) -> Result<Vec<String>, StatusOutcome<ReportRecord>> {
        match self
            .registry
            .get_report(&self.correlation_id, &self.report_type)
            .await
        {
            Ok(Some(rec)) if rec.status.is_terminal() => {
                warn!(
                    correlation_id = %self.correlation_id,
                    report_type = %self.report_type,
                    status = %rec.status,
                    requested = %requested,
                    "report already finished, left unchanged"
                );
                Err(StatusOutcome::Rejected {
                    current: rec.status.to_string(),
                    requested: requested.to_string(),
                })
            }
            Ok(Some(rec)) => Ok(rec.output_file_list),
            Ok(None) => Ok(Vec::new()),
            Err(e) => {
                warn!(
                    correlation_id = %self.correlation_id,
                    report_type = %self.report_type,
                    error = %e,
                    transient = e.is_transient(),
                    "report not readable, part not recorded; continuing"
                );
                Err(StatusOutcome::RecordingFailed {
                    reason: e.to_string(),
                })
            }
        }
    }
}
