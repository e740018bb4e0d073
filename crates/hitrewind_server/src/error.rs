//! Server error types.

use hitrewind_core::RewindError;
use thiserror::Error;

/// Errors raised while setting up or running a scenario.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The rewind engine refused something.
    #[error(transparent)]
    Rewind(#[from] RewindError),

    /// Scenario values out of range or malformed.
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    /// Scenario file could not be read.
    #[error("failed to read scenario: {0}")]
    ScenarioIo(String),

    /// A worker thread could not be started.
    #[error("failed to spawn thread: {0}")]
    Thread(String),

    /// The other end of a channel went away.
    #[error("channel disconnected: {0}")]
    Disconnected(&'static str),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
