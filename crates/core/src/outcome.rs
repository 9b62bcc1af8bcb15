//! Best-effort result of a status or report write.
//!
//! Status reporting must never fail the job that reports it, so the write
//! paths return a [`StatusOutcome`] instead of a `Result`. Callers may log
//! it or ignore it; nothing forces them to branch on it.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum StatusOutcome<T> {
    /// The store accepted the write; carries the record as written.
    Recorded(T),
    /// The store failed. The failure has already been logged.
    RecordingFailed { reason: String },
    /// The active transition policy refused the state change. Nothing was
    /// written.
    Rejected { current: String, requested: String },
}

impl<T> StatusOutcome<T> {
    pub fn is_recorded(&self) -> bool {
        matches!(self, StatusOutcome::Recorded(_))
    }

    pub fn record(&self) -> Option<&T> {
        match self {
            StatusOutcome::Recorded(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<T> {
        match self {
            StatusOutcome::Recorded(r) => Some(r),
            _ => None,
        }
    }
}

impl<T> fmt::Display for StatusOutcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusOutcome::Recorded(_) => write!(f, "recorded"),
            StatusOutcome::RecordingFailed { reason } => write!(f, "recording failed: {}", reason),
            StatusOutcome::Rejected { current, requested } => {
                write!(f, "rejected: {} -> {} is not a forward transition", current, requested)
            }
        }
    }
}
