//! Conformance test suite for `PipelineStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `PipelineStorage` implementation can run to verify correctness. The suite
//! covers:
//!
//! - **Jobs**: upsert visibility, last-write-wins, composite-key independence
//! - **Reports**: create, overwrite-not-merge, key independence
//! - **Topics**: lookup by id, not-found as `None`
//! - **Parameters**: resolve before/after publish, overwrite, prefix listing
//! - **Firings**: insert-if-absent claims, completion, release
//! - **Error handling**: absence is `Ok(None)`, never an error
//! - **Concurrency**: parallel writers on distinct keys all land; parallel
//!   claims on one key produce exactly one winner
//! - **Shared store**: the same guarantees when every writer holds its own
//!   handle onto one store, as separate CLI processes do
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use pipeline_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn dynamo_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_table_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```
//!
//! Backends that can be opened more than once onto the same data (a
//! directory, a table name) also run [`run_shared_store_suite`]. Its factory
//! returns a new handle onto one shared, initially empty store on each call.

mod concurrent;
mod error;
mod firings;
mod jobs;
mod parameters;
mod reports;
mod topics;

use std::fmt;
use std::future::Future;

use crate::record::{JobRecord, JobState, ReportRecord, ReportStatus, TriggerFiringRecord};
use crate::PipelineStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "jobs", "reports", "firings").
    pub category: String,
    /// Test name (e.g. "put_job_then_get_returns_latest").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(jobs::run_job_tests(&factory).await);
    results.extend(reports::run_report_tests(&factory).await);
    results.extend(topics::run_topic_tests(&factory).await);
    results.extend(parameters::run_parameter_tests(&factory).await);
    results.extend(firings::run_firing_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    ConformanceReport::from_results(results)
}

/// Run the shared-store checks against a backend.
///
/// `open_handle` is called once per concurrent writer. Every handle it
/// returns must address the same store, and that store must start empty.
pub async fn run_shared_store_suite<S, F, Fut>(open_handle: F) -> ConformanceReport
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    ConformanceReport::from_results(concurrent::run_shared_store_tests(&open_handle).await)
}

impl ConformanceReport {
    fn from_results(results: Vec<TestResult>) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        let total = results.len();

        ConformanceReport {
            results,
            passed,
            failed: total - passed,
            total,
        }
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn make_job(job_id: &str, project: &str, state: JobState, response: serde_json::Value) -> JobRecord {
    JobRecord {
        job_id: job_id.to_string(),
        project: project.to_string(),
        job_state: state,
        full_response: response,
    }
}

fn make_report(
    correlation_id: &str,
    report_type: &str,
    files: &[&str],
    status: ReportStatus,
) -> ReportRecord {
    ReportRecord {
        correlation_id: correlation_id.to_string(),
        report_type: report_type.to_string(),
        output_file_list: files.iter().map(|f| f.to_string()).collect(),
        status,
        email_subject: format!("{} report", report_type),
    }
}

fn make_firing(trigger: &str, upstream_run_id: &str) -> TriggerFiringRecord {
    TriggerFiringRecord {
        trigger: trigger.to_string(),
        upstream_run_id: upstream_run_id.to_string(),
        crawl_run_id: None,
        fired_at: "2025-01-01T00:00:00Z".to_string(),
    }
}
