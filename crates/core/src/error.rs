use pipeline_storage::StorageError;

use crate::stage::Stage;

/// Errors from the resource registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The name was never published in this scope. When this comes from
    /// `require`, the dependent component was deployed before its producer.
    #[error("resource '{name}' is not published (deploy its producer first)")]
    Unresolved { name: String },

    /// A logical name must be non-empty and free of whitespace.
    #[error("invalid resource name '{name}'")]
    InvalidName { name: String },

    /// The underlying store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RegistryError {
    /// Only store unavailability is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, RegistryError::Storage(e) if e.is_transient())
    }
}

/// Errors from the stage access-control model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("data cannot flow backwards from {from} to {to}")]
    Backwards { from: Stage, to: Stage },

    #[error("data cannot skip a stage going from {from} to {to}")]
    SkipsStage { from: Stage, to: Stage },

    #[error("source and destination are both {stage}")]
    SameStage { stage: Stage },

    #[error("principal '{principal}' has no {access} grant on {stage}")]
    NotGranted {
        principal: String,
        stage: Stage,
        access: &'static str,
    },
}

/// Errors returned by an external collaborator (batch executor, crawler).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{service} rejected the request: {message}")]
    Rejected { service: String, message: String },

    #[error("{service} is unavailable: {message}")]
    Unavailable { service: String, message: String },

    #[error("unknown execution unit '{unit}'")]
    UnknownUnit { unit: String },
}

/// Errors that end a trigger evaluation. None of them are retried by the
/// engine; re-evaluation is up to the workflow that delivered the event.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    /// The event is for a unit the trigger does not watch.
    #[error("trigger '{trigger}' does not observe unit '{unit}'")]
    UnrelatedEvent { trigger: String, unit: String },

    /// The final-stage location could not be resolved.
    #[error("trigger '{trigger}' cannot resolve its crawl target: {source}")]
    Unresolved {
        trigger: String,
        #[source]
        source: RegistryError,
    },

    /// Describing another upstream unit failed.
    #[error("trigger '{trigger}' could not describe upstream unit: {source}")]
    DescribeFailed {
        trigger: String,
        #[source]
        source: CollaboratorError,
    },

    /// The downstream start call failed. Terminal for this evaluation.
    #[error("trigger '{trigger}' failed to start crawler '{crawler}': {source}")]
    StartFailed {
        trigger: String,
        crawler: String,
        #[source]
        source: CollaboratorError,
    },

    /// Recording the firing claim failed.
    #[error("trigger '{trigger}' could not record its firing: {source}")]
    Storage {
        trigger: String,
        #[source]
        source: StorageError,
    },
}
