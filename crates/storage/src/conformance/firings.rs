use std::future::Future;

use super::{make_firing, TestResult};
use crate::PipelineStorage;

pub(super) async fn run_firing_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "firings",
            "first_claim_wins_second_loses",
            first_claim_wins_second_loses(factory).await,
        ),
        TestResult::from_result(
            "firings",
            "complete_attaches_crawl_run_id",
            complete_attaches_crawl_run_id(factory).await,
        ),
        TestResult::from_result(
            "firings",
            "release_allows_new_claim",
            release_allows_new_claim(factory).await,
        ),
        TestResult::from_result(
            "firings",
            "claims_keyed_by_trigger_and_run",
            claims_keyed_by_trigger_and_run(factory).await,
        ),
    ]
}

async fn first_claim_wins_second_loses<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let first = s
        .claim_trigger_firing(make_firing("crawl-final", "E-7"))
        .await
        .map_err(|e| format!("claim 1: {e}"))?;
    let mut again = make_firing("crawl-final", "E-7");
    again.fired_at = "2025-06-01T00:00:00Z".to_string();
    let second = s
        .claim_trigger_firing(again)
        .await
        .map_err(|e| format!("claim 2: {e}"))?;

    if !first || second {
        return Err(format!("expected (true, false), got ({first}, {second})"));
    }
    let kept = s
        .get_trigger_firing("crawl-final", "E-7")
        .await
        .map_err(|e| format!("get: {e}"))?
        .ok_or("claim missing")?;
    if kept.fired_at != "2025-01-01T00:00:00Z" {
        return Err(format!("losing claim overwrote the winner: {:?}", kept));
    }
    Ok(())
}

async fn complete_attaches_crawl_run_id<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.claim_trigger_firing(make_firing("crawl-final", "E-7"))
        .await
        .map_err(|e| format!("claim: {e}"))?;
    s.complete_trigger_firing("crawl-final", "E-7", "crawl-001")
        .await
        .map_err(|e| format!("complete: {e}"))?;
    let rec = s
        .get_trigger_firing("crawl-final", "E-7")
        .await
        .map_err(|e| format!("get: {e}"))?
        .ok_or("claim missing")?;
    if rec.crawl_run_id.as_deref() != Some("crawl-001") {
        return Err(format!("expected crawl-001, got {:?}", rec.crawl_run_id));
    }

    // Completing an unknown claim is a no-op.
    s.complete_trigger_firing("crawl-final", "E-unknown", "crawl-002")
        .await
        .map_err(|e| format!("complete unknown: {e}"))?;
    if s.get_trigger_firing("crawl-final", "E-unknown")
        .await
        .map_err(|e| format!("get unknown: {e}"))?
        .is_some()
    {
        return Err("complete must not create a claim".to_string());
    }
    Ok(())
}

async fn release_allows_new_claim<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.claim_trigger_firing(make_firing("crawl-final", "E-7"))
        .await
        .map_err(|e| format!("claim: {e}"))?;
    s.release_trigger_firing("crawl-final", "E-7")
        .await
        .map_err(|e| format!("release: {e}"))?;
    let reclaimed = s
        .claim_trigger_firing(make_firing("crawl-final", "E-7"))
        .await
        .map_err(|e| format!("reclaim: {e}"))?;
    if !reclaimed {
        return Err("claim after release should succeed".to_string());
    }
    Ok(())
}

async fn claims_keyed_by_trigger_and_run<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = s
        .claim_trigger_firing(make_firing("crawl-final", "E-7"))
        .await
        .map_err(|e| format!("claim a: {e}"))?;
    let b = s
        .claim_trigger_firing(make_firing("crawl-final", "E-8"))
        .await
        .map_err(|e| format!("claim b: {e}"))?;
    let c = s
        .claim_trigger_firing(make_firing("crawl-clean", "E-7"))
        .await
        .map_err(|e| format!("claim c: {e}"))?;
    if !(a && b && c) {
        return Err(format!("distinct keys must all win, got ({a}, {b}, {c})"));
    }
    Ok(())
}
