//! Error types for the chime crate.
//!
//! All errors use stable string messages suitable for display to users
//! and programmatic handling. Failures inside a scheduled run never
//! surface here; the runner converts them into task statistics and a
//! log entry.

/// Errors that can occur during scheduling operations.
#[derive(Debug, thiserror::Error)]
pub enum ChimeError {
    /// A schedule phrase matched none of the accepted grammars.
    #[error("invalid schedule format: {0}")]
    InvalidSchedule(String),

    /// An operation referenced a task id that does not exist.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// Reading or writing a persisted task record failed.
    #[error("store error: {0}")]
    Store(String),

    /// The message processor returned a failure for a direct request.
    #[error("processor error: {0}")]
    Processor(String),

    /// Invalid scheduler configuration.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience type alias for chime results.
pub type Result<T> = std::result::Result<T, ChimeError>;
