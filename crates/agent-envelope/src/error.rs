use thiserror::Error;

/// Errors that can occur while building or opening an envelope.
///
/// These never cross the public `verify`/`decrypt`/`unwrap` boundary, which
/// reports every failure as `None`. They exist so the individual steps can be
/// tested and logged with their real cause.
#[derive(Debug, Error)]
pub enum Error {
    /// The compact token does not have the expected shape.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The token header names an algorithm this crate does not speak.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The signature does not match the signed content or key.
    #[error("signature mismatch")]
    SignatureMismatch,

    /// Key unwrapping or authenticated decryption failed.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Encryption of the content or the content key failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Key material could not be read or parsed.
    #[error("key error: {0}")]
    Key(String),

    /// Base64url decoding error.
    #[error("base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for envelope operations.
pub type Result<T> = std::result::Result<T, Error>;
