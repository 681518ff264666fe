use super::{Endpoint, ErrorCode, Transport, TransportError};
use crate::config::{Config, KeyPaths};
use crate::{Result, SyncError};
use agent_envelope::{keys, PrivateKey, PublicKey};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::cell::OnceCell;
use std::time::Duration;

struct AgentKeys {
    private: PrivateKey,
    server: PublicKey,
}

/// HTTP(S) transport to the server API.
///
/// Safe endpoints carry `{"msg": <envelope>, "project": <project>}` and answer
/// with `{"msg": <envelope>}`; public endpoints exchange plain JSON.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    project: String,
    key_paths: KeyPaths,
    keys: OnceCell<AgentKeys>,
}

impl HttpTransport {
    /// Build a transport from the client configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(concat!("fleet-agent/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.client.request_timeout_secs));

        if let Some(proxy) = &config.client.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| SyncError::Config(format!("invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }

        if let Some(cert) = &config.client.ssl_cert {
            let pem = std::fs::read(cert)?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                SyncError::Config(format!("invalid certificate {}: {e}", cert.display()))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            project: config.client.project.clone(),
            key_paths: config.key_paths(),
            keys: OnceCell::new(),
        })
    }

    /// Key files are read on first use so that a transport can be created
    /// before the computer is registered.
    fn keys(&self) -> std::result::Result<&AgentKeys, TransportError> {
        if let Some(keys) = self.keys.get() {
            return Ok(keys);
        }
        let untrusted =
            |e: agent_envelope::Error| TransportError::new(ErrorCode::Untrusted, e.to_string());
        let loaded = AgentKeys {
            private: keys::load_private_key(&self.key_paths.private).map_err(untrusted)?,
            server: keys::load_public_key(&self.key_paths.server_public).map_err(untrusted)?,
        };
        Ok(self.keys.get_or_init(|| loaded))
    }

    fn send(&self, endpoint: Endpoint, body: Value) -> std::result::Result<Response, TransportError> {
        let url = format!("{}{}", self.base_url, endpoint.path());
        let request = if body.is_null() {
            self.client.get(&url)
        } else {
            self.client.post(&url).json(&body)
        };
        request
            .send()
            .map_err(|e| TransportError::new(ErrorCode::Connection, e.to_string()))
    }
}

impl Transport for HttpTransport {
    fn request(&self, endpoint: Endpoint, data: Value) -> std::result::Result<Value, TransportError> {
        log::debug!("Request {endpoint}: {data}");

        let body = if endpoint.is_safe() {
            let keys = self.keys()?;
            let msg = agent_envelope::wrap(&data, &keys.private, &keys.server)
                .map_err(|e| TransportError::new(ErrorCode::Untrusted, e.to_string()))?;
            json!({"msg": msg, "project": self.project})
        } else {
            data
        };

        let response = self.send(endpoint, body)?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|e| TransportError::new(ErrorCode::Connection, e.to_string()))?;
        let value = parse_body(&text);

        if !status.is_success() {
            return Err(value
                .as_ref()
                .ok()
                .and_then(TransportError::from_body)
                .unwrap_or_else(|| status_error(status, &text)));
        }

        let value = value.map_err(|e| TransportError::new(ErrorCode::Decode, e.to_string()))?;
        if let Some(err) = TransportError::from_body(&value) {
            return Err(err);
        }

        let value = if endpoint.is_safe() {
            let token = value.get("msg").and_then(Value::as_str).ok_or_else(|| {
                TransportError::new(ErrorCode::Decode, "response without envelope")
            })?;
            let keys = self.keys()?;
            let data = agent_envelope::unwrap(token, &keys.private, &keys.server)
                .ok_or_else(|| TransportError::new(ErrorCode::Untrusted, "invalid response envelope"))?;
            if let Some(err) = TransportError::from_body(&data) {
                return Err(err);
            }
            data
        } else {
            value
        };

        log::debug!("Response {endpoint}: {value}");
        Ok(value)
    }
}

fn parse_body(text: &str) -> serde_json::Result<Value> {
    if text.trim().is_empty() {
        Ok(Value::Null)
    } else {
        serde_json::from_str(text)
    }
}

fn status_error(status: StatusCode, text: &str) -> TransportError {
    let info = match status.canonical_reason() {
        Some(reason) if text.trim().is_empty() => reason.to_string(),
        _ => text.trim().to_string(),
    };
    if status == StatusCode::NOT_FOUND {
        TransportError::new(ErrorCode::NotFound, info)
    } else {
        TransportError::new(ErrorCode::Http(status.as_u16()), info)
    }
}
