//! Error taxonomy for browser sessions, job transitions, and job outcomes.

use crate::registry::JobStatus;

/// Failures of a single browser session.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The page failed to load.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Navigation or the network-idle wait exceeded the bound.
    #[error("session timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The browser process could not be started.
    #[error("browser launch failed: {0}")]
    Launch(String),
}

/// Why a job ended in `Failed`. Never surfaced through polling.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum JobFailure {
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The session finished but produced no manifest candidates.
    #[error("no manifest candidates found")]
    ExtractionEmpty,

    /// The pipeline task panicked or was aborted.
    #[error("job task aborted: {0}")]
    Panicked(String),

    /// The session permits were closed, so the scheduler is shutting down.
    #[error("scheduler closed before the job could start")]
    SchedulerClosed,

    /// A newer search reset the tables before the job could run.
    #[error("job superseded by a newer search")]
    Superseded,
}

impl JobFailure {
    /// Short machine-readable reason used in events.
    pub fn reason(&self) -> &'static str {
        match self {
            JobFailure::Session(SessionError::Navigation(_)) => "navigation",
            JobFailure::Session(SessionError::Timeout { .. }) => "timeout",
            JobFailure::Session(SessionError::Launch(_)) => "launch",
            JobFailure::ExtractionEmpty => "extraction_empty",
            JobFailure::Panicked(_) => "panicked",
            JobFailure::SchedulerClosed => "scheduler_closed",
            JobFailure::Superseded => "superseded",
        }
    }
}

/// Rejected registry transitions.
///
/// `UnknownJob` and `InvalidTransition` indicate a programming defect and are
/// logged loudly. `Superseded` is the expected outcome of a late write after
/// a reset and is harmless.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no job registered for id {0}")]
    UnknownJob(u64),

    #[error("invalid transition for id {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: u64,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job {id} belongs to generation {generation}, which has been reset")]
    Superseded { id: u64, generation: u64 },
}

impl RegistryError {
    /// True when the error signals an internal consistency defect.
    pub fn is_inconsistency(&self) -> bool {
        !matches!(self, RegistryError::Superseded { .. })
    }
}
