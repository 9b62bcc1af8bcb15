use std::future::Future;

use serde_json::json;

use super::TestResult;
use crate::{PipelineStorage, TopicRecord};

pub(super) async fn run_topic_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "topics",
            "unknown_topic_is_none",
            unknown_topic_is_none(factory).await,
        ),
        TestResult::from_result(
            "topics",
            "known_topic_returns_matching_record",
            known_topic_returns_matching_record(factory).await,
        ),
    ]
}

async fn unknown_topic_is_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_topic("topic-404").await {
        Ok(None) => Ok(()),
        other => Err(format!("expected Ok(None), got {:?}", other)),
    }
}

async fn known_topic_returns_matching_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PipelineStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for (id, name) in [("topic-1", "Acreage"), ("topic-2", "Yield")] {
        let mut fields = serde_json::Map::new();
        fields.insert("name".to_string(), json!(name));
        s.put_topic(TopicRecord {
            topic_id: id.to_string(),
            fields,
        })
        .await
        .map_err(|e| format!("put {id}: {e}"))?;
    }

    let rec = s
        .get_topic("topic-2")
        .await
        .map_err(|e| format!("get: {e}"))?
        .ok_or("topic-2 missing")?;
    if rec.topic_id != "topic-2" {
        return Err(format!("expected topic-2, got {}", rec.topic_id));
    }
    if rec.fields.get("name") != Some(&json!("Yield")) {
        return Err(format!("unexpected fields {:?}", rec.fields));
    }
    Ok(())
}
