//! Contracts of the external services the trigger engine drives, plus
//! in-process implementations used by tests and local runs.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use pipeline_storage::UnknownStateError;

use crate::error::CollaboratorError;
use crate::stage::StageLocation;

/// Run state of a batch execution unit as reported by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Succeeded,
    Failed,
    Timeout,
    Error,
    Waiting,
}

impl ExecutionState {
    pub const ALL: [ExecutionState; 9] = [
        ExecutionState::Starting,
        ExecutionState::Running,
        ExecutionState::Stopping,
        ExecutionState::Stopped,
        ExecutionState::Succeeded,
        ExecutionState::Failed,
        ExecutionState::Timeout,
        ExecutionState::Error,
        ExecutionState::Waiting,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionState::Starting => "STARTING",
            ExecutionState::Running => "RUNNING",
            ExecutionState::Stopping => "STOPPING",
            ExecutionState::Stopped => "STOPPED",
            ExecutionState::Succeeded => "SUCCEEDED",
            ExecutionState::Failed => "FAILED",
            ExecutionState::Timeout => "TIMEOUT",
            ExecutionState::Error => "ERROR",
            ExecutionState::Waiting => "WAITING",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionState {
    type Err = UnknownStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        ExecutionState::ALL
            .into_iter()
            .find(|state| state.as_str() == upper)
            .ok_or_else(|| UnknownStateError {
                kind: "execution state",
                value: s.to_string(),
            })
    }
}

/// Batch/ETL executor.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Start a run of `unit`; returns the run id.
    async fn start_unit(&self, unit: &str) -> Result<String, CollaboratorError>;

    /// State of the most recent run of `unit`.
    async fn describe_unit(&self, unit: &str) -> Result<ExecutionState, CollaboratorError>;
}

/// A crawl the catalog accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRun {
    pub crawl_run_id: String,
    pub crawler: String,
    pub target: StageLocation,
}

/// Catalog service that crawls a storage location.
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn start_crawl(
        &self,
        crawler: &str,
        target: &StageLocation,
    ) -> Result<CrawlRun, CollaboratorError>;
}

/// Executor with fixed, settable unit states.
#[derive(Debug, Default)]
pub struct StaticExecutionService {
    states: RwLock<HashMap<String, ExecutionState>>,
    runs: AtomicU64,
}

impl StaticExecutionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unit(self, unit: &str, state: ExecutionState) -> Self {
        self.set_state(unit, state);
        self
    }

    pub fn set_state(&self, unit: &str, state: ExecutionState) {
        self.states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(unit.to_string(), state);
    }
}

#[async_trait]
impl ExecutionService for StaticExecutionService {
    async fn start_unit(&self, unit: &str) -> Result<String, CollaboratorError> {
        let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_state(unit, ExecutionState::Starting);
        Ok(format!("{unit}-run-{n}"))
    }

    async fn describe_unit(&self, unit: &str) -> Result<ExecutionState, CollaboratorError> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(unit)
            .copied()
            .ok_or_else(|| CollaboratorError::UnknownUnit {
                unit: unit.to_string(),
            })
    }
}

/// Catalog that records every start request and can be told to refuse.
#[derive(Debug, Default)]
pub struct RecordingCatalog {
    started: Mutex<Vec<CrawlRun>>,
    failure: Mutex<Option<CollaboratorError>>,
}

impl RecordingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later start fail with `error` (or succeed again with `None`).
    pub fn fail_with(&self, error: Option<CollaboratorError>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// Crawls started so far, in call order.
    pub fn started(&self) -> Vec<CrawlRun> {
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn start_count(&self) -> usize {
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl CatalogService for RecordingCatalog {
    async fn start_crawl(
        &self,
        crawler: &str,
        target: &StageLocation,
    ) -> Result<CrawlRun, CollaboratorError> {
        if let Some(err) = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(err);
        }
        let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        let run = CrawlRun {
            crawl_run_id: format!("crawl-{}", started.len() + 1),
            crawler: crawler.to_string(),
            target: target.clone(),
        };
        started.push(run.clone());
        Ok(run)
    }
}
