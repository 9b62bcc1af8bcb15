use std::future::Future;

use super::TestResult;
use crate::PipelineStorage;

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "error",
        "get_job_nonexistent_is_none",
        get_job_nonexistent_is_none(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_report_nonexistent_is_none",
        get_report_nonexistent_is_none(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_firing_nonexistent_is_none",
        get_firing_nonexistent_is_none(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "list_jobs_empty_for_unknown_project",
        list_jobs_empty_for_unknown_project(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "release_unknown_firing_is_noop",
        release_unknown_firing_is_noop(factory).await,
    ));

    results
}

// ── 1. absent job is Ok(None), not an error ─────────────────────────────────

async fn get_job_nonexistent_is_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_job("J-999", "farm-records").await {
        Ok(None) => Ok(()),
        other => Err(format!("expected Ok(None), got {:?}", other)),
    }
}

// ── 2. absent report ─────────────────────────────────────────────────────────

async fn get_report_nonexistent_is_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_report("corr-999", "acreage").await {
        Ok(None) => Ok(()),
        other => Err(format!("expected Ok(None), got {:?}", other)),
    }
}

// ── 3. absent firing ─────────────────────────────────────────────────────────

async fn get_firing_nonexistent_is_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_trigger_firing("crawl-final", "E-999").await {
        Ok(None) => Ok(()),
        other => Err(format!("expected Ok(None), got {:?}", other)),
    }
}

// ── 4. list on an empty project ──────────────────────────────────────────────

async fn list_jobs_empty_for_unknown_project<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let jobs = s
        .list_jobs("no-such-project", None)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if !jobs.is_empty() {
        return Err(format!("expected empty list, got {} jobs", jobs.len()));
    }
    Ok(())
}

// ── 5. release without claim ─────────────────────────────────────────────────

async fn release_unknown_firing_is_noop<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.release_trigger_firing("crawl-final", "E-999")
        .await
        .map_err(|e| format!("release should be a no-op, got {e}"))
}
