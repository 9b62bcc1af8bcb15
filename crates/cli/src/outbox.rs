//! Catalog stand-in for the CLI: crawl requests are appended, one JSON
//! object per line, to `crawl-requests.jsonl` in the state directory. A
//! separate forwarder (or an operator) picks them up from there.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use pipeline_core::{CatalogService, CollaboratorError, CrawlRun, StageLocation};

pub(crate) const OUTBOX_FILE: &str = "crawl-requests.jsonl";

pub(crate) struct CrawlOutbox {
    path: PathBuf,
}

impl CrawlOutbox {
    pub(crate) fn new(state_dir: &Path) -> Self {
        CrawlOutbox {
            path: state_dir.join(OUTBOX_FILE),
        }
    }

    fn unavailable(&self, e: impl std::fmt::Display) -> CollaboratorError {
        CollaboratorError::Unavailable {
            service: format!("crawl outbox {}", self.path.display()),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl CatalogService for CrawlOutbox {
    async fn start_crawl(
        &self,
        crawler: &str,
        target: &StageLocation,
    ) -> Result<CrawlRun, CollaboratorError> {
        let run = CrawlRun {
            crawl_run_id: format!(
                "crawl-{}",
                time::OffsetDateTime::now_utc().unix_timestamp_nanos()
            ),
            crawler: crawler.to_string(),
            target: target.clone(),
        };
        let mut line = serde_json::to_string(&run).map_err(|e| self.unavailable(e))?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.unavailable(e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.unavailable(e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| self.unavailable(e))?;
        file.flush().await.map_err(|e| self.unavailable(e))?;
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_core::Stage;

    #[tokio::test]
    async fn each_start_appends_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = CrawlOutbox::new(dir.path());
        let target = StageLocation {
            project: "farm-records".to_string(),
            stage: Stage::Final,
            container_name: "fsa-farm-records-final".to_string(),
        };

        outbox.start_crawl("farm-records-final", &target).await.unwrap();
        outbox.start_crawl("farm-records-final", &target).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join(OUTBOX_FILE)).unwrap();
        let runs: Vec<CrawlRun> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].target, target);
    }
}
