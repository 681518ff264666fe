//! Request/response seam between the agent and its server.

mod http;

pub use http::HttpTransport;

use serde_json::Value;
use std::fmt;

/// Server endpoints used by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ProjectKeys,
    RepositoriesKey,
    RepositoriesUrlTemplate,
    ComputerId,
    RegisterComputer,
    Properties,
    FaultDefinitions,
    Repositories,
    MandatoryPackages,
    Devices,
    HardwareRequired,
    UploadHardware,
    UploadAttributes,
    UploadFaults,
    UploadSoftware,
    UploadErrors,
    UploadSync,
    EndOfTransmission,
}

impl Endpoint {
    /// Path relative to the API base URL.
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::ProjectKeys => "public/keys/project/",
            Endpoint::RepositoriesKey => "public/keys/repositories/",
            Endpoint::RepositoriesUrlTemplate => "public/repository-url-template/",
            Endpoint::ComputerId => "safe/computers/id/",
            Endpoint::RegisterComputer => "safe/computers/",
            Endpoint::Properties => "safe/computers/properties/",
            Endpoint::FaultDefinitions => "safe/computers/faults/definitions/",
            Endpoint::Repositories => "safe/computers/repositories/",
            Endpoint::MandatoryPackages => "safe/computers/packages/mandatory/",
            Endpoint::Devices => "safe/computers/devices/",
            Endpoint::HardwareRequired => "safe/computers/hardware/required/",
            Endpoint::UploadHardware => "safe/computers/hardware/",
            Endpoint::UploadAttributes => "safe/computers/attributes/",
            Endpoint::UploadFaults => "safe/computers/faults/",
            Endpoint::UploadSoftware => "safe/computers/software/",
            Endpoint::UploadErrors => "safe/computers/errors/",
            Endpoint::UploadSync => "safe/synchronizations/",
            Endpoint::EndOfTransmission => "safe/eot/",
        }
    }

    /// Whether payloads travel inside an envelope.
    pub fn is_safe(self) -> bool {
        !matches!(
            self,
            Endpoint::ProjectKeys | Endpoint::RepositoriesKey | Endpoint::RepositoriesUrlTemplate
        )
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The server has no data for the request.
    NotFound,
    /// Any other non-success HTTP status.
    Http(u16),
    /// The server could not be reached.
    Connection,
    /// The response envelope did not open with the agent keys.
    Untrusted,
    /// The response body was not the expected JSON.
    Decode,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::NotFound => f.write_str("not found"),
            ErrorCode::Http(status) => write!(f, "http {status}"),
            ErrorCode::Connection => f.write_str("connection"),
            ErrorCode::Untrusted => f.write_str("untrusted"),
            ErrorCode::Decode => f.write_str("decode"),
        }
    }
}

/// A failed request: `{error: {code, info}}`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{info} ({code})")]
pub struct TransportError {
    pub code: ErrorCode,
    pub info: String,
}

impl TransportError {
    /// Create a new transport error.
    pub fn new(code: ErrorCode, info: impl Into<String>) -> Self {
        Self {
            code,
            info: info.into(),
        }
    }

    /// The server answered "no data".
    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::NotFound
    }

    /// Read an `{"error": {"code": .., "info": ..}}` body, if `body` is one.
    pub fn from_body(body: &Value) -> Option<Self> {
        let error = body.as_object()?.get("error")?;
        let info = match error.get("info") {
            Some(Value::String(info)) => info.clone(),
            Some(other) => other.to_string(),
            None => error.to_string(),
        };
        let code = match error.get("code") {
            Some(Value::Number(n)) => match n.as_u64() {
                Some(404) => ErrorCode::NotFound,
                Some(status) => ErrorCode::Http(u16::try_from(status).unwrap_or(u16::MAX)),
                None => ErrorCode::Decode,
            },
            Some(Value::String(s)) if s.eq_ignore_ascii_case("not found") => ErrorCode::NotFound,
            _ => ErrorCode::Decode,
        };
        Some(Self { code, info })
    }
}

/// Blocking request/response exchange with the server.
pub trait Transport {
    /// Send `data` to `endpoint` and return the decoded response.
    fn request(&self, endpoint: Endpoint, data: Value) -> Result<Value, TransportError>;
}
