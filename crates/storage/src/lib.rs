pub mod conformance;
mod error;
mod file;
#[cfg(any(test, feature = "test-utils"))]
mod flaky;
mod memory;
mod record;
mod tables;
mod traits;

pub use error::StorageError;
pub use file::FileStorage;
#[cfg(any(test, feature = "test-utils"))]
pub use flaky::FlakyStorage;
pub use memory::MemoryStorage;
pub use record::{
    JobRecord, JobState, ParameterRecord, ReportRecord, ReportStatus, TopicRecord,
    TriggerFiringRecord, UnknownStateError,
};
pub use traits::PipelineStorage;
