use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a pipeline job as reported by its worker.
///
/// The store never checks transitions between these values; see the
/// status protocol in `pipeline-core` for the optional monotonic policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    /// `SUCCEEDED` and `FAILED` are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = UnknownStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(JobState::Pending),
            "RUNNING" => Ok(JobState::Running),
            "SUCCEEDED" => Ok(JobState::Succeeded),
            "FAILED" => Ok(JobState::Failed),
            _ => Err(UnknownStateError {
                kind: "job state",
                value: s.to_string(),
            }),
        }
    }
}

/// Status of a multi-part report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    InProgress,
    Complete,
    Failed,
}

impl ReportStatus {
    /// `COMPLETE` and `FAILED` are terminal; a terminal report is ready for
    /// notification dispatch.
    pub fn is_terminal(self) -> bool {
        matches!(self, ReportStatus::Complete | ReportStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::InProgress => "IN_PROGRESS",
            ReportStatus::Complete => "COMPLETE",
            ReportStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = UnknownStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "IN_PROGRESS" => Ok(ReportStatus::InProgress),
            "COMPLETE" => Ok(ReportStatus::Complete),
            "FAILED" => Ok(ReportStatus::Failed),
            _ => Err(UnknownStateError {
                kind: "report status",
                value: s.to_string(),
            }),
        }
    }
}

/// Returned when parsing a state or status name fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownStateError {
    pub kind: &'static str,
    pub value: String,
}

/// Current state of one pipeline execution, keyed by `(job_id, project)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub project: String,
    pub job_state: JobState,
    /// Last worker response, passed through without inspection.
    pub full_response: serde_json::Value,
}

/// Output artifacts of a report, keyed by `(correlation_id, report_type)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub correlation_id: String,
    pub report_type: String,
    pub output_file_list: Vec<String>,
    pub status: ReportStatus,
    pub email_subject: String,
}

/// A topic as stored by its owning service. Fields are opaque here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRecord {
    pub topic_id: String,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// One published resource identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterRecord {
    /// Fully qualified name, including the deployment scope.
    pub name: String,
    pub value: String,
}

/// A claim on firing a trigger for one upstream run, kept only when the
/// trigger asks for at-most-once firing.
///
/// The claim is written before the downstream start and completed with the
/// crawl run id once the start succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerFiringRecord {
    pub trigger: String,
    pub upstream_run_id: String,
    /// None while the downstream start is in flight.
    pub crawl_run_id: Option<String>,
    /// RFC 3339 timestamp string.
    pub fired_at: String,
}
