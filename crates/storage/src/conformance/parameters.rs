use std::future::Future;

use super::TestResult;
use crate::PipelineStorage;

pub(super) async fn run_parameter_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "parameters",
            "get_before_put_is_none",
            get_before_put_is_none(factory).await,
        ),
        TestResult::from_result(
            "parameters",
            "put_then_get_then_overwrite",
            put_then_get_then_overwrite(factory).await,
        ),
        TestResult::from_result(
            "parameters",
            "list_by_prefix_sorted",
            list_by_prefix_sorted(factory).await,
        ),
    ]
}

async fn get_before_put_is_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_parameter("/prod/landing-bucket").await {
        Ok(None) => Ok(()),
        other => Err(format!("expected Ok(None), got {:?}", other)),
    }
}

async fn put_then_get_then_overwrite<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put_parameter("/prod/etl-role", "arn:role/v1")
        .await
        .map_err(|e| format!("put v1: {e}"))?;
    let v1 = s
        .get_parameter("/prod/etl-role")
        .await
        .map_err(|e| format!("get v1: {e}"))?;
    if v1.as_deref() != Some("arn:role/v1") {
        return Err(format!("expected v1, got {:?}", v1));
    }

    s.put_parameter("/prod/etl-role", "arn:role/v2")
        .await
        .map_err(|e| format!("put v2: {e}"))?;
    let v2 = s
        .get_parameter("/prod/etl-role")
        .await
        .map_err(|e| format!("get v2: {e}"))?;
    if v2.as_deref() != Some("arn:role/v2") {
        return Err(format!("expected v2 (last write wins), got {:?}", v2));
    }
    Ok(())
}

async fn list_by_prefix_sorted<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for (name, value) in [
        ("/prod/b", "2"),
        ("/dev/a", "0"),
        ("/prod/a", "1"),
        ("/production/x", "9"),
    ] {
        s.put_parameter(name, value)
            .await
            .map_err(|e| format!("put {name}: {e}"))?;
    }
    let listed = s
        .list_parameters("/prod/")
        .await
        .map_err(|e| format!("list: {e}"))?;
    let names: Vec<&str> = listed.iter().map(|p| p.name.as_str()).collect();
    if names != ["/prod/a", "/prod/b"] {
        return Err(format!("expected [/prod/a, /prod/b], got {:?}", names));
    }
    Ok(())
}
