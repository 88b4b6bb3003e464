//! Error types for the faire service.
//!
//! Execution faults are contained at the single-run boundary: a timeout
//! becomes a `partial` history record and any other engine fault becomes a
//! `failed` record, so neither variant escapes an executor into the
//! scheduler loop.

/// Top-level error type for the scheduled research system.
#[derive(Debug, thiserror::Error)]
pub enum FaireError {
    /// Invalid task or tier parameters; rejected before scheduling.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A run is already in flight for the task, or an executor pool is full.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Research exceeded its tier budget.
    #[error("execution timed out: {0}")]
    Timeout(String),

    /// Research or report synthesis failed outright.
    #[error("execution failed: {0}")]
    Execution(String),

    /// Research engine transport or protocol error.
    #[error("engine error: {0}")]
    Engine(String),

    /// Task / history / trend persistence error.
    #[error("store error: {0}")]
    Store(String),

    /// Referenced task or record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, FaireError>;

impl From<rusqlite::Error> for FaireError {
    fn from(e: rusqlite::Error) -> Self {
        FaireError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for FaireError {
    fn from(e: serde_json::Error) -> Self {
        FaireError::Store(format!("serialization: {e}"))
    }
}
