//! # agent-envelope
//!
//! Cryptographic envelopes exchanged between the agent and its server.
//!
//! This crate provides:
//! - RSA key loading from PEM files
//! - Signed compact tokens (`sign` / `verify`)
//! - Encrypted compact tokens (`encrypt` / `decrypt`)
//! - The sign-then-encrypt envelope (`wrap` / `unwrap`) used for every
//!   authenticated payload
//!
//! Opening operations return `Option`: a token that is malformed, tampered
//! with, or meant for another key is simply `None`.
//!
//! ## Example
//!
//! ```ignore
//! use agent_envelope::{keys, unwrap, wrap};
//!
//! let agent = keys::load_private_key("keys/project.pri".as_ref())?;
//! let server = keys::load_public_key("keys/server.pub".as_ref())?;
//!
//! let token = wrap(&serde_json::json!({"id": 42}), &agent, &server)?;
//! // ... the server answers with a token wrapped for the agent ...
//! let data = unwrap(&reply, &agent, &server);
//! ```

mod compact;
mod envelope;
mod error;
pub mod keys;

pub use compact::Header;
pub use envelope::{
    decrypt, encrypt, sign, unwrap, verify, wrap, CONTENT_ALGORITHM, DATA_CLAIM, KEY_ALGORITHM,
    SIGNATURE_ALGORITHM, SIGNATURE_CLAIM,
};
pub use error::{Error, Result};
pub use keys::{PrivateKey, PublicKey};
