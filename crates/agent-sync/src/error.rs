use crate::transport::TransportError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that end a command.
///
/// Recorded (non-fatal) failures never become a `SyncError`; they go to the
/// error ledger instead. Every variant maps to its own process exit status.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another instance of the same command holds the lock file.
    #[error("{command} is already running (lock file {})", .path.display())]
    AlreadyRunning { command: String, path: PathBuf },

    /// Key material is missing and the computer could not be registered.
    #[error("security keys are not present")]
    KeysMissing,

    /// Key material is present but unusable.
    #[error("invalid key material: {0}")]
    InvalidKeys(#[from] agent_envelope::Error),

    /// A required server request failed.
    #[error("{context}: {source}")]
    Server {
        context: &'static str,
        #[source]
        source: TransportError,
    },

    /// The server answered with data of an unexpected shape.
    #[error("unexpected response for {context}: {detail}")]
    UnexpectedResponse {
        context: &'static str,
        detail: String,
    },

    /// No supported package management system was found.
    #[error("no supported package management system found")]
    PmsNotFound,

    /// Cancellation was requested (SIGINT/SIGTERM).
    #[error("interrupted before completion")]
    Interrupted,

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// Local I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub(crate) fn server(context: &'static str, source: TransportError) -> Self {
        SyncError::Server { context, source }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::AlreadyRunning { .. } => libc::EALREADY,
            SyncError::KeysMissing | SyncError::InvalidKeys(_) => libc::EPERM,
            SyncError::Server { .. } | SyncError::UnexpectedResponse { .. } => libc::ENODATA,
            SyncError::PmsNotFound => libc::ENOENT,
            SyncError::Interrupted => libc::EINPROGRESS,
            SyncError::Config(_) => libc::EINVAL,
            SyncError::Io(_) => libc::EIO,
        }
    }
}

/// Exit status of a run that completed with package management failures.
pub const EXIT_PMS_FAILED: i32 = libc::EPROTO;

/// Result type for agent-sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
