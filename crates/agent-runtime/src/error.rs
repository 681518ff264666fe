use std::time::Duration;
use thiserror::Error;

/// Errors from running scripts and external commands.
#[derive(Debug, Error)]
pub enum Error {
    /// The program could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program did not finish within its time budget and was killed.
    #[error("{program} timed out after {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    /// Cancellation was requested while the program was running; it was killed.
    #[error("{program} interrupted")]
    Cancelled { program: String },

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for agent-runtime operations.
pub type Result<T> = std::result::Result<T, Error>;
