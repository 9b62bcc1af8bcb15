use std::future::Future;
use std::sync::Arc;

use serde_json::json;

use super::{make_firing, make_job, TestResult};
use crate::{JobState, PipelineStorage, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_writers_on_distinct_jobs_all_land",
        concurrent_writers_on_distinct_jobs_all_land(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_writers_on_one_job_leave_one_complete_write",
        concurrent_writers_on_one_job_leave_one_complete_write(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_claims_exactly_one_wins",
        concurrent_claims_exactly_one_wins(factory).await,
    ));

    results
}

// ── Distinct keys never interfere ────────────────────────────────────────────

/// N tasks each write their own job. Every record must be readable
/// afterwards with the state its writer chose.
async fn concurrent_writers_on_distinct_jobs_all_land<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            s.put_job(make_job(
                &format!("J-{i}"),
                "farm-records",
                JobState::Succeeded,
                json!({"worker": i}),
            ))
            .await
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    for i in 0..N {
        let rec = storage
            .get_job(&format!("J-{i}"), "farm-records")
            .await
            .map_err(|e| format!("get J-{i}: {e}"))?
            .ok_or_else(|| format!("J-{i} lost"))?;
        if rec.full_response != json!({"worker": i}) {
            return Err(format!("J-{i} has foreign payload {}", rec.full_response));
        }
    }
    Ok(())
}

// ── Same key: last write wins, whole records only ────────────────────────────

/// N tasks race on one key. Whichever arrives last wins, but the stored
/// record must be exactly one writer's record, never a mix.
async fn concurrent_writers_on_one_job_leave_one_complete_write<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        let state = if i % 2 == 0 {
            JobState::Running
        } else {
            JobState::Failed
        };
        handles.push(tokio::spawn(async move {
            s.put_job(make_job("J-1", "p", state, json!({"worker": i})))
                .await
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let rec = storage
        .get_job("J-1", "p")
        .await
        .map_err(|e| format!("get: {e}"))?
        .ok_or("J-1 missing")?;
    let worker = rec
        .full_response
        .get("worker")
        .and_then(|w| w.as_u64())
        .ok_or_else(|| format!("payload lost: {}", rec.full_response))?;
    let expected_state = if worker % 2 == 0 {
        JobState::Running
    } else {
        JobState::Failed
    };
    if rec.job_state != expected_state {
        return Err(format!(
            "torn write: payload from worker {worker} but state {}",
            rec.job_state
        ));
    }
    Ok(())
}

// ── Claims: exactly one winner ───────────────────────────────────────────────

/// N tasks try to claim the same firing. Exactly one must see `true`.
async fn concurrent_claims_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            s.claim_trigger_firing(make_firing("crawl-final", "E-7"))
                .await
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    Ok(())
}

// ── Shared store: one handle per writer ──────────────────────────────────────

pub(super) async fn run_shared_store_tests<S, F, Fut>(open_handle: &F) -> Vec<TestResult>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "shared",
            "writers_with_own_handles_on_distinct_jobs_all_land",
            writers_with_own_handles_on_distinct_jobs_all_land(open_handle).await,
        ),
        TestResult::from_result(
            "shared",
            "claims_through_own_handles_exactly_one_wins",
            claims_through_own_handles_exactly_one_wins(open_handle).await,
        ),
    ]
}

/// Like the distinct-key test above, but no two writers share a handle.
async fn writers_with_own_handles_on_distinct_jobs_all_land<S, F, Fut>(
    open_handle: &F,
) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut handles = Vec::new();
    for i in 0..N {
        let s = open_handle().await;
        handles.push(tokio::spawn(async move {
            s.put_job(make_job(
                &format!("J-{i}"),
                "shared-handles",
                JobState::Running,
                json!({"worker": i}),
            ))
            .await
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let reader = open_handle().await;
    let landed = reader
        .list_jobs("shared-handles", None)
        .await
        .map_err(|e| format!("list: {e}"))?;
    if landed.len() != N {
        return Err(format!("expected {N} jobs, found {}", landed.len()));
    }
    for rec in landed {
        let expected = rec
            .job_id
            .strip_prefix("J-")
            .and_then(|i| i.parse::<u64>().ok())
            .ok_or_else(|| format!("unexpected job id {}", rec.job_id))?;
        if rec.full_response != json!({"worker": expected}) {
            return Err(format!("{} has foreign payload {}", rec.job_id, rec.full_response));
        }
    }
    Ok(())
}

async fn claims_through_own_handles_exactly_one_wins<S, F, Fut>(
    open_handle: &F,
) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut handles = Vec::new();
    for _ in 0..N {
        let s = open_handle().await;
        handles.push(tokio::spawn(async move {
            s.claim_trigger_firing(make_firing("crawl-shared", "E-9"))
                .await
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    Ok(())
}
