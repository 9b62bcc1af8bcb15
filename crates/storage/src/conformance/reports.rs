use std::future::Future;

use super::{make_report, TestResult};
use crate::{PipelineStorage, ReportStatus};

pub(super) async fn run_report_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "reports",
        "first_put_creates_record",
        first_put_creates_record(factory).await,
    ));
    results.push(TestResult::from_result(
        "reports",
        "second_put_overwrites_file_list",
        second_put_overwrites_file_list(factory).await,
    ));
    results.push(TestResult::from_result(
        "reports",
        "report_types_are_independent",
        report_types_are_independent(factory).await,
    ));
    results.push(TestResult::from_result(
        "reports",
        "file_list_order_preserved",
        file_list_order_preserved(factory).await,
    ));

    results
}

async fn first_put_creates_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let written = make_report("corr-1", "acreage", &["s3://final/a.csv"], ReportStatus::InProgress);
    s.put_report(written.clone())
        .await
        .map_err(|e| format!("put: {e}"))?;

    let rec = s
        .get_report("corr-1", "acreage")
        .await
        .map_err(|e| format!("get: {e}"))?
        .ok_or("report missing after put")?;
    if rec != written {
        return Err(format!("expected {:?}, got {:?}", written, rec));
    }
    Ok(())
}

async fn second_put_overwrites_file_list<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put_report(make_report("corr-1", "acreage", &["a.csv"], ReportStatus::InProgress))
        .await
        .map_err(|e| format!("put 1: {e}"))?;
    let mut second = make_report("corr-1", "acreage", &["b.csv"], ReportStatus::Complete);
    second.email_subject = "Acreage ready".to_string();
    s.put_report(second.clone())
        .await
        .map_err(|e| format!("put 2: {e}"))?;

    let rec = s
        .get_report("corr-1", "acreage")
        .await
        .map_err(|e| format!("get: {e}"))?
        .ok_or("report missing")?;
    if rec.output_file_list != vec!["b.csv".to_string()] {
        return Err(format!(
            "file list must be overwritten, not merged; got {:?}",
            rec.output_file_list
        ));
    }
    if rec != second {
        return Err(format!("expected {:?}, got {:?}", second, rec));
    }
    Ok(())
}

async fn report_types_are_independent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put_report(make_report("corr-1", "acreage", &["a.csv"], ReportStatus::Complete))
        .await
        .map_err(|e| format!("put acreage: {e}"))?;
    s.put_report(make_report("corr-1", "yield", &["y.csv"], ReportStatus::InProgress))
        .await
        .map_err(|e| format!("put yield: {e}"))?;

    let acreage = s
        .get_report("corr-1", "acreage")
        .await
        .map_err(|e| format!("get acreage: {e}"))?
        .ok_or("acreage missing")?;
    if acreage.status != ReportStatus::Complete {
        return Err(format!("acreage clobbered: {:?}", acreage));
    }
    if s.get_report("corr-2", "acreage")
        .await
        .map_err(|e| format!("get corr-2: {e}"))?
        .is_some()
    {
        return Err("unrelated correlation id should be absent".to_string());
    }
    Ok(())
}

async fn file_list_order_preserved<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let files = ["z.csv", "a.csv", "m.csv"];
    s.put_report(make_report("corr-1", "acreage", &files, ReportStatus::InProgress))
        .await
        .map_err(|e| format!("put: {e}"))?;
    let rec = s
        .get_report("corr-1", "acreage")
        .await
        .map_err(|e| format!("get: {e}"))?
        .ok_or("report missing")?;
    if rec.output_file_list != files {
        return Err(format!("order changed: {:?}", rec.output_file_list));
    }
    Ok(())
}
