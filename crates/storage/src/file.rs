//! JSON-file storage backend.
//!
//! All tables live in one document, `state.json`, inside the store
//! directory. Every operation reloads the document so separate processes
//! (one CLI invocation per worker step) observe each other's writes.
//!
//! Writers take an exclusive OS advisory lock on `state.lock` for the whole
//! load, modify, persist cycle, so two handles on one directory never
//! overwrite each other's keys, whether they share a process or not. The
//! new document goes to a uniquely named temp file in the same directory
//! and is renamed over `state.json`; readers see the old document or the
//! new one, never a partial write, and take no lock.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs4::fs_std::FileExt;
use tempfile::NamedTempFile;

use crate::error::StorageError;
use crate::record::{
    JobRecord, JobState, ParameterRecord, ReportRecord, TopicRecord, TriggerFiringRecord,
};
use crate::tables::{Tables, TablesDocument};
use crate::traits::PipelineStorage;

const STATE_FILE: &str = "state.json";
const LOCK_FILE: &str = "state.lock";

#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
    path: PathBuf,
}

impl FileStorage {
    /// Open (lazily) a store rooted at `dir`. Nothing touches the disk until
    /// the first operation; the directory is created on first write.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        FileStorage {
            path: dir.join(STATE_FILE),
            dir,
        }
    }

    /// Path of the backing JSON document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Tables) -> T + Send,
        T: Send,
    {
        let tables = match tokio::fs::read(&self.path).await {
            Ok(bytes) => decode(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Tables::default(),
            Err(e) => return Err(io_error(&self.path, e)),
        };
        Ok(f(&tables))
    }

    async fn write<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Tables) -> T + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.locked_update(f))
            .await
            .map_err(|e| StorageError::Backend(format!("state file writer did not finish: {}", e)))?
    }

    /// Load, apply `f` and persist while holding the directory lock. The lock
    /// is released when the lock file handle drops.
    fn locked_update<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> Result<T, StorageError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        let lock_path = self.dir.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| io_error(&lock_path, e))?;
        FileExt::lock_exclusive(&lock).map_err(|e| io_error(&lock_path, e))?;

        let mut tables = match std::fs::read(&self.path) {
            Ok(bytes) => decode(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Tables::default(),
            Err(e) => return Err(io_error(&self.path, e)),
        };
        let out = f(&mut tables);
        self.persist(&tables)?;
        drop(lock);
        Ok(out)
    }

    fn persist(&self, tables: &Tables) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(&TablesDocument::from(tables))?;
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        let written = tmp.write_all(&json).and_then(|()| tmp.as_file().sync_all());
        written.map_err(|e| io_error(&self.dir, e))?;
        tmp.persist(&self.path)
            .map_err(|e| io_error(&self.path, e.error))?;
        Ok(())
    }
}

fn decode(bytes: &[u8]) -> Result<Tables, StorageError> {
    let doc: TablesDocument = serde_json::from_slice(bytes)?;
    Ok(doc.into())
}

/// Map an I/O failure onto the storage taxonomy. Interruptions and timeouts
/// are transient; everything else needs an operator.
fn io_error(path: &Path, e: io::Error) -> StorageError {
    let msg = format!("{}: {}", path.display(), e);
    match e.kind() {
        io::ErrorKind::Interrupted | io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
            StorageError::Unavailable(msg)
        }
        _ => StorageError::Backend(msg),
    }
}

#[async_trait]
impl PipelineStorage for FileStorage {
    async fn put_job(&self, record: JobRecord) -> Result<JobRecord, StorageError> {
        self.write(move |t| t.put_job(record)).await
    }

    async fn get_job(
        &self,
        job_id: &str,
        project: &str,
    ) -> Result<Option<JobRecord>, StorageError> {
        self.read(|t| t.get_job(job_id, project)).await
    }

    async fn list_jobs(
        &self,
        project: &str,
        state_filter: Option<JobState>,
    ) -> Result<Vec<JobRecord>, StorageError> {
        self.read(|t| t.list_jobs(project, state_filter)).await
    }

    async fn put_report(&self, record: ReportRecord) -> Result<ReportRecord, StorageError> {
        self.write(move |t| t.put_report(record)).await
    }

    async fn get_report(
        &self,
        correlation_id: &str,
        report_type: &str,
    ) -> Result<Option<ReportRecord>, StorageError> {
        self.read(|t| t.get_report(correlation_id, report_type))
            .await
    }

    async fn put_topic(&self, record: TopicRecord) -> Result<(), StorageError> {
        self.write(move |t| t.put_topic(record)).await
    }

    async fn get_topic(&self, topic_id: &str) -> Result<Option<TopicRecord>, StorageError> {
        self.read(|t| t.get_topic(topic_id)).await
    }

    async fn put_parameter(&self, name: &str, value: &str) -> Result<(), StorageError> {
        let (name, value) = (name.to_owned(), value.to_owned());
        self.write(move |t| t.put_parameter(&name, &value)).await
    }

    async fn get_parameter(&self, name: &str) -> Result<Option<String>, StorageError> {
        self.read(|t| t.get_parameter(name)).await
    }

    async fn list_parameters(&self, prefix: &str) -> Result<Vec<ParameterRecord>, StorageError> {
        self.read(|t| t.list_parameters(prefix)).await
    }

    async fn claim_trigger_firing(
        &self,
        record: TriggerFiringRecord,
    ) -> Result<bool, StorageError> {
        self.write(move |t| t.claim_trigger_firing(record)).await
    }

    async fn complete_trigger_firing(
        &self,
        trigger: &str,
        upstream_run_id: &str,
        crawl_run_id: &str,
    ) -> Result<(), StorageError> {
        let (trigger, upstream_run_id, crawl_run_id) = (
            trigger.to_owned(),
            upstream_run_id.to_owned(),
            crawl_run_id.to_owned(),
        );
        self.write(move |t| t.complete_trigger_firing(&trigger, &upstream_run_id, &crawl_run_id))
            .await
    }

    async fn release_trigger_firing(
        &self,
        trigger: &str,
        upstream_run_id: &str,
    ) -> Result<(), StorageError> {
        let (trigger, upstream_run_id) = (trigger.to_owned(), upstream_run_id.to_owned());
        self.write(move |t| t.release_trigger_firing(&trigger, &upstream_run_id))
            .await
    }

    async fn get_trigger_firing(
        &self,
        trigger: &str,
        upstream_run_id: &str,
    ) -> Result<Option<TriggerFiringRecord>, StorageError> {
        self.read(|t| t.get_trigger_firing(trigger, upstream_run_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_state_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("never-written"));
        assert!(storage.get_job("J-1", "p").await.unwrap().is_none());
        assert!(!storage.path().exists());
    }

    #[tokio::test]
    async fn writes_are_visible_to_a_second_handle() {
        let dir = tempfile::tempdir().unwrap();
        let a = FileStorage::open(dir.path());
        let b = FileStorage::open(dir.path());

        a.put_parameter("/prod/bucket", "fsa-landing").await.unwrap();
        assert_eq!(
            b.get_parameter("/prod/bucket").await.unwrap().as_deref(),
            Some("fsa-landing")
        );
    }

    #[tokio::test]
    async fn separate_handles_writing_distinct_jobs_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let mut tasks = Vec::new();
        for i in 0..16 {
            let storage = FileStorage::open(dir.path());
            tasks.push(tokio::spawn(async move {
                storage
                    .put_job(JobRecord {
                        job_id: format!("J-{i}"),
                        project: "p".to_string(),
                        job_state: JobState::Running,
                        full_response: serde_json::json!({"worker": i}),
                    })
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let reader = FileStorage::open(dir.path());
        assert_eq!(reader.list_jobs("p", None).await.unwrap().len(), 16);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|name| name != STATE_FILE && name != LOCK_FILE)
            .collect();
        assert!(leftovers.is_empty(), "stray files: {:?}", leftovers);
    }

    #[tokio::test]
    async fn unusable_directory_is_a_backend_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"").unwrap();
        let storage = FileStorage::open(blocker.join("state"));
        match storage.put_parameter("x", "1").await {
            Err(StorageError::Backend(_)) => {}
            other => panic!("expected Backend, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn corrupted_state_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(STATE_FILE), b"not json").unwrap();
        let storage = FileStorage::open(dir.path());
        match storage.get_topic("t").await {
            Err(StorageError::Serialization(_)) => {}
            other => panic!("expected Serialization, got {:?}", other),
        }
    }
}
