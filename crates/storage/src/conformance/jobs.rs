use std::future::Future;

use serde_json::json;

use super::{make_job, TestResult};
use crate::{JobState, PipelineStorage};

pub(super) async fn run_job_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "jobs",
        "put_job_then_get_returns_record",
        put_job_then_get_returns_record(factory).await,
    ));
    results.push(TestResult::from_result(
        "jobs",
        "put_job_returns_stored_record",
        put_job_returns_stored_record(factory).await,
    ));
    results.push(TestResult::from_result(
        "jobs",
        "second_put_overwrites_first",
        second_put_overwrites_first(factory).await,
    ));
    results.push(TestResult::from_result(
        "jobs",
        "terminal_state_can_be_overwritten_by_store",
        terminal_state_can_be_overwritten_by_store(factory).await,
    ));
    results.push(TestResult::from_result(
        "jobs",
        "same_job_id_different_projects_independent",
        same_job_id_different_projects_independent(factory).await,
    ));
    results.push(TestResult::from_result(
        "jobs",
        "list_jobs_filters_by_project_and_state",
        list_jobs_filters_by_project_and_state(factory).await,
    ));
    results.push(TestResult::from_result(
        "jobs",
        "list_jobs_ordered_by_job_id",
        list_jobs_ordered_by_job_id(factory).await,
    ));

    results
}

// ── 1. put then get returns the written pair ─────────────────────────────────

async fn put_job_then_get_returns_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put_job(make_job(
        "J-100",
        "farm-records",
        JobState::Succeeded,
        json!({"rows": 42}),
    ))
    .await
    .map_err(|e| format!("put: {e}"))?;

    let rec = s
        .get_job("J-100", "farm-records")
        .await
        .map_err(|e| format!("get: {e}"))?
        .ok_or("job not found after put")?;

    if rec.job_state != JobState::Succeeded {
        return Err(format!("expected SUCCEEDED, got {}", rec.job_state));
    }
    if rec.full_response != json!({"rows": 42}) {
        return Err(format!("unexpected full_response {}", rec.full_response));
    }
    Ok(())
}

// ── 2. put returns what it stored ────────────────────────────────────────────

async fn put_job_returns_stored_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let written = make_job("J-1", "p", JobState::Running, json!({"step": "clean"}));
    let returned = s
        .put_job(written.clone())
        .await
        .map_err(|e| format!("put: {e}"))?;
    if returned != written {
        return Err(format!("put returned {:?}, expected {:?}", returned, written));
    }
    Ok(())
}

// ── 3. last write wins ───────────────────────────────────────────────────────

async fn second_put_overwrites_first<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put_job(make_job("J-1", "p", JobState::Running, json!({"a": 1})))
        .await
        .map_err(|e| format!("put 1: {e}"))?;
    s.put_job(make_job("J-1", "p", JobState::Failed, json!({"b": 2})))
        .await
        .map_err(|e| format!("put 2: {e}"))?;

    let rec = s
        .get_job("J-1", "p")
        .await
        .map_err(|e| format!("get: {e}"))?
        .ok_or("job missing")?;
    if rec.job_state != JobState::Failed || rec.full_response != json!({"b": 2}) {
        return Err(format!("expected second write, got {:?}", rec));
    }
    Ok(())
}

// ── 4. the store does not enforce transitions ────────────────────────────────

async fn terminal_state_can_be_overwritten_by_store<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put_job(make_job("J-1", "p", JobState::Succeeded, json!(null)))
        .await
        .map_err(|e| format!("put 1: {e}"))?;
    s.put_job(make_job("J-1", "p", JobState::Running, json!(null)))
        .await
        .map_err(|e| format!("put 2: {e}"))?;

    let rec = s
        .get_job("J-1", "p")
        .await
        .map_err(|e| format!("get: {e}"))?
        .ok_or("job missing")?;
    if rec.job_state != JobState::Running {
        return Err(format!(
            "store must not enforce transitions; expected RUNNING, got {}",
            rec.job_state
        ));
    }
    Ok(())
}

// ── 5. composite key ─────────────────────────────────────────────────────────

async fn same_job_id_different_projects_independent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put_job(make_job("J-1", "alpha", JobState::Running, json!(1)))
        .await
        .map_err(|e| format!("put alpha: {e}"))?;
    s.put_job(make_job("J-1", "beta", JobState::Failed, json!(2)))
        .await
        .map_err(|e| format!("put beta: {e}"))?;

    let alpha = s
        .get_job("J-1", "alpha")
        .await
        .map_err(|e| format!("get alpha: {e}"))?
        .ok_or("alpha missing")?;
    let beta = s
        .get_job("J-1", "beta")
        .await
        .map_err(|e| format!("get beta: {e}"))?
        .ok_or("beta missing")?;

    if alpha.job_state != JobState::Running {
        return Err(format!("alpha clobbered: {:?}", alpha));
    }
    if beta.job_state != JobState::Failed {
        return Err(format!("beta wrong: {:?}", beta));
    }
    Ok(())
}

// ── 6. list filters ──────────────────────────────────────────────────────────

async fn list_jobs_filters_by_project_and_state<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for (id, project, state) in [
        ("J-1", "alpha", JobState::Running),
        ("J-2", "alpha", JobState::Succeeded),
        ("J-3", "alpha", JobState::Running),
        ("J-4", "beta", JobState::Running),
    ] {
        s.put_job(make_job(id, project, state, json!(null)))
            .await
            .map_err(|e| format!("put {id}: {e}"))?;
    }

    let all_alpha = s
        .list_jobs("alpha", None)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if all_alpha.len() != 3 {
        return Err(format!("expected 3 alpha jobs, got {}", all_alpha.len()));
    }

    let running_alpha = s
        .list_jobs("alpha", Some(JobState::Running))
        .await
        .map_err(|e| format!("list running: {e}"))?;
    let ids: Vec<&str> = running_alpha.iter().map(|r| r.job_id.as_str()).collect();
    if ids != ["J-1", "J-3"] {
        return Err(format!("expected [J-1, J-3], got {:?}", ids));
    }
    Ok(())
}

// ── 7. list ordering ─────────────────────────────────────────────────────────

async fn list_jobs_ordered_by_job_id<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for id in ["J-c", "J-a", "J-b"] {
        s.put_job(make_job(id, "p", JobState::Pending, json!(null)))
            .await
            .map_err(|e| format!("put {id}: {e}"))?;
    }
    let listed = s
        .list_jobs("p", None)
        .await
        .map_err(|e| format!("list: {e}"))?;
    let ids: Vec<&str> = listed.iter().map(|r| r.job_id.as_str()).collect();
    if ids != ["J-a", "J-b", "J-c"] {
        return Err(format!("expected sorted ids, got {:?}", ids));
    }
    Ok(())
}
