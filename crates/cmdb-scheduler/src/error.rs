use cmdb_core::CoreError;
use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Malformed `week_days`, `time` or trace level setting. The scheduling
    /// decision for the affected process is abandoned.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A process-specific setting could not be read.
    #[error(transparent)]
    Config(#[from] CoreError),

    /// A scheduled process reported a failure while running.
    #[error("Process {module} failed: {reason}")]
    Process { module: String, reason: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
