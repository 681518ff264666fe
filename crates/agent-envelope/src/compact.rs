//! Compact token serialization: base64url segments joined by periods.

use crate::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Protected header shared by signed and encrypted tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Signature or key-management algorithm.
    pub alg: String,
    /// Content encryption algorithm (encrypted tokens only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enc: Option<String>,
    /// Token type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

pub(crate) fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

pub(crate) fn decode(segment: &str) -> Result<Vec<u8>> {
    Ok(URL_SAFE_NO_PAD.decode(segment)?)
}

pub(crate) fn encode_header(header: &Header) -> Result<String> {
    Ok(encode(&serde_json::to_vec(header)?))
}

pub(crate) fn decode_header(segment: &str) -> Result<Header> {
    Ok(serde_json::from_slice(&decode(segment)?)?)
}

/// Split a compact token into exactly `N` segments.
pub(crate) fn split<const N: usize>(token: &str) -> Result<[&str; N]> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    parts.try_into().map_err(|parts: Vec<&str>| {
        Error::Malformed(format!("expected {N} segments, got {}", parts.len()))
    })
}
