//! pipeline-core: job orchestration and status tracking for a staged data
//! pipeline.
//!
//! Components share nothing in process. Each one is handed an
//! `Arc<dyn PipelineStorage>` (and, for the trigger engine, its external
//! collaborators) at construction and coordinates with the others only
//! through the store.
//!
//! - [`ResourceRegistry`] -- publish and resolve resource identifiers by name
//! - [`ProjectStages`] -- landing/clean/final containers and their grants
//! - [`JobRegistry`] -- job records and the best-effort status update path
//! - [`ReportRegistry`] -- report records, plus [`ReportAccumulator`]
//! - [`TopicDirectory`] -- topic lookup
//! - [`TriggerEngine`] -- start a crawl when upstream units succeed

pub mod collaborators;
pub mod error;
pub mod jobs;
pub mod outcome;
pub mod registry;
pub mod reports;
pub mod stage;
pub mod topics;
pub mod trigger;

// ── Convenience re-exports ───────────────────────────────────────────

pub use collaborators::{
    CatalogService, CrawlRun, ExecutionService, ExecutionState, RecordingCatalog,
    StaticExecutionService,
};
pub use error::{AccessError, CollaboratorError, RegistryError, TriggerError};
pub use jobs::{JobRegistry, JobReporter, TransitionPolicy};
pub use outcome::StatusOutcome;
pub use registry::{RegistryEntry, ResourceRegistry, RetryPolicy};
pub use reports::{ReportAccumulator, ReportRegistry};
pub use stage::{
    container_name, stage_parameter, Access, GrantOutcome, ProjectStages, Stage, StageContainer,
    StageLocation, UnknownStageError,
};
pub use topics::TopicDirectory;
pub use trigger::{
    CompletionEvent, Condition, TriggerDefinition, TriggerEngine, TriggerOutcome, UnmetCondition,
};

pub use pipeline_storage::{
    JobRecord, JobState, PipelineStorage, ReportRecord, ReportStatus, StorageError, TopicRecord,
};
