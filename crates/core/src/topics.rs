use std::sync::Arc;

use pipeline_storage::{PipelineStorage, StorageError, TopicRecord};

/// Read-only lookup of topics owned by another service.
#[derive(Clone)]
pub struct TopicDirectory {
    storage: Arc<dyn PipelineStorage>,
}

impl TopicDirectory {
    pub fn new(storage: Arc<dyn PipelineStorage>) -> Self {
        TopicDirectory { storage }
    }

    /// The topic with this id, or `None`. Store errors surface.
    pub async fn get_topic(&self, topic_id: &str) -> Result<Option<TopicRecord>, StorageError> {
        self.storage.get_topic(topic_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_storage::MemoryStorage;
    use serde_json::json;

    #[tokio::test]
    async fn unknown_topic_is_none() {
        let dir = TopicDirectory::new(Arc::new(MemoryStorage::new()));
        assert!(dir.get_topic("T-404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn known_topic_returns_its_record() {
        let storage = MemoryStorage::new();
        let mut fields = serde_json::Map::new();
        fields.insert("title".to_string(), json!("Crop yields"));
        storage
            .put_topic(TopicRecord {
                topic_id: "T-1".to_string(),
                fields,
            })
            .await
            .unwrap();
        storage
            .put_topic(TopicRecord {
                topic_id: "T-2".to_string(),
                fields: serde_json::Map::new(),
            })
            .await
            .unwrap();

        let dir = TopicDirectory::new(Arc::new(storage));
        let topic = dir.get_topic("T-1").await.unwrap().unwrap();
        assert_eq!(topic.topic_id, "T-1");
        assert_eq!(topic.fields["title"], json!("Crop yields"));
    }
}
