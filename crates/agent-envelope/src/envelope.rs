//! Sign, verify, encrypt, decrypt, and the sign-then-encrypt composition.
//!
//! Signed tokens are compact JWS with `RS256` (RSASSA-PKCS1-v1_5 over
//! SHA-256). Encrypted tokens are compact JWE: the content key is wrapped with
//! `RSA-OAEP-256` and the claims are sealed with `A256GCM`, the protected
//! header acting as additional authenticated data.

use crate::compact::{self, Header};
use crate::{Error, Result};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde_json::{json, Value};
use sha2::Sha256;

/// Signature algorithm of signed tokens.
pub const SIGNATURE_ALGORITHM: &str = "RS256";
/// Key management algorithm of encrypted tokens.
pub const KEY_ALGORITHM: &str = "RSA-OAEP-256";
/// Content encryption algorithm of encrypted tokens.
pub const CONTENT_ALGORITHM: &str = "A256GCM";

/// Claim carrying the wrapped data.
pub const DATA_CLAIM: &str = "data";
/// Claim carrying the signed token of the wrapped data.
pub const SIGNATURE_CLAIM: &str = "sign";

const CONTENT_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Produce a signed compact token over `claims`.
pub fn sign(claims: &Value, key: &RsaPrivateKey) -> Result<String> {
    let header = compact::encode_header(&Header {
        alg: SIGNATURE_ALGORITHM.to_string(),
        enc: None,
        typ: Some("JWT".to_string()),
    })?;
    let payload = compact::encode(&serde_json::to_vec(claims)?);
    let signing_input = format!("{header}.{payload}");

    let signing_key = SigningKey::<Sha256>::new(key.clone());
    let signature: Signature = signing_key
        .try_sign(signing_input.as_bytes())
        .map_err(|e| Error::SigningFailed(e.to_string()))?;

    Ok(format!(
        "{signing_input}.{}",
        compact::encode(&signature.to_bytes())
    ))
}

/// Return the claims of a signed token if its signature matches `key`.
///
/// Every failure (malformed token, wrong key, tampering) yields `None`.
pub fn verify(token: &str, key: &RsaPublicKey) -> Option<Value> {
    try_verify(token, key).ok()
}

/// Encrypt `claims` so only the holder of the matching private key can read them.
pub fn encrypt(claims: &Value, key: &RsaPublicKey) -> Result<String> {
    let header = compact::encode_header(&Header {
        alg: KEY_ALGORITHM.to_string(),
        enc: Some(CONTENT_ALGORITHM.to_string()),
        typ: None,
    })?;

    let mut content_key = [0u8; CONTENT_KEY_LEN];
    OsRng.fill_bytes(&mut content_key);
    let mut iv = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut iv);

    let encrypted_key = key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &content_key)
        .map_err(|e| Error::EncryptionFailed(e.to_string()))?;

    let cipher = Aes256Gcm::new_from_slice(&content_key)
        .map_err(|e| Error::EncryptionFailed(e.to_string()))?;
    let plaintext = serde_json::to_vec(claims)?;
    let mut sealed = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &plaintext,
                aad: header.as_bytes(),
            },
        )
        .map_err(|e| Error::EncryptionFailed(e.to_string()))?;
    let tag = sealed.split_off(sealed.len() - TAG_LEN);

    Ok([
        header,
        compact::encode(&encrypted_key),
        compact::encode(&iv),
        compact::encode(&sealed),
        compact::encode(&tag),
    ]
    .join("."))
}

/// Decrypt a token produced by [`encrypt`].
///
/// Every failure (malformed token, wrong key, tampering) yields `None`.
pub fn decrypt(token: &str, key: &RsaPrivateKey) -> Option<Value> {
    try_decrypt(token, key).ok()
}

/// Sign `data` with `sign_key`, then encrypt `{data, sign}` for `encrypt_key`.
pub fn wrap(data: &Value, sign_key: &RsaPrivateKey, encrypt_key: &RsaPublicKey) -> Result<String> {
    let claims = json!({
        DATA_CLAIM: data,
        SIGNATURE_CLAIM: sign(data, sign_key)?,
    });
    encrypt(&claims, encrypt_key)
}

/// Open a token produced by [`wrap`].
///
/// Returns the data only when decryption and signature verification both
/// succeed and the signature covers exactly that data. Anything else yields
/// `None`, without saying which layer failed.
pub fn unwrap(token: &str, decrypt_key: &RsaPrivateKey, verify_key: &RsaPublicKey) -> Option<Value> {
    try_unwrap(token, decrypt_key, verify_key).ok()
}

pub(crate) fn try_verify(token: &str, key: &RsaPublicKey) -> Result<Value> {
    let [header_b64, payload_b64, signature_b64] = compact::split::<3>(token)?;
    let header = compact::decode_header(header_b64)?;
    if header.alg != SIGNATURE_ALGORITHM {
        return Err(Error::UnsupportedAlgorithm(header.alg));
    }

    let signature_bytes = compact::decode(signature_b64)?;
    let signature =
        Signature::try_from(signature_bytes.as_slice()).map_err(|_| Error::SignatureMismatch)?;
    let verifying_key = VerifyingKey::<Sha256>::new(key.clone());
    verifying_key
        .verify(format!("{header_b64}.{payload_b64}").as_bytes(), &signature)
        .map_err(|_| Error::SignatureMismatch)?;

    Ok(serde_json::from_slice(&compact::decode(payload_b64)?)?)
}

pub(crate) fn try_decrypt(token: &str, key: &RsaPrivateKey) -> Result<Value> {
    let [header_b64, key_b64, iv_b64, ciphertext_b64, tag_b64] = compact::split::<5>(token)?;
    let header = compact::decode_header(header_b64)?;
    if header.alg != KEY_ALGORITHM {
        return Err(Error::UnsupportedAlgorithm(header.alg));
    }
    if header.enc.as_deref() != Some(CONTENT_ALGORITHM) {
        return Err(Error::UnsupportedAlgorithm(header.enc.unwrap_or_default()));
    }

    let encrypted_key = compact::decode(key_b64)?;
    let iv = compact::decode(iv_b64)?;
    if iv.len() != NONCE_LEN {
        return Err(Error::Malformed(format!(
            "initialization vector must be {NONCE_LEN} bytes, got {}",
            iv.len()
        )));
    }
    let tag = compact::decode(tag_b64)?;
    if tag.len() != TAG_LEN {
        return Err(Error::Malformed(format!(
            "authentication tag must be {TAG_LEN} bytes, got {}",
            tag.len()
        )));
    }
    let mut sealed = compact::decode(ciphertext_b64)?;
    sealed.extend_from_slice(&tag);

    let content_key = key
        .decrypt(Oaep::new::<Sha256>(), &encrypted_key)
        .map_err(|e| Error::DecryptionFailed(e.to_string()))?;
    let cipher = Aes256Gcm::new_from_slice(&content_key)
        .map_err(|_| Error::DecryptionFailed("content key has wrong length".to_string()))?;
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &sealed,
                aad: header_b64.as_bytes(),
            },
        )
        .map_err(|_| Error::DecryptionFailed("authentication tag mismatch".to_string()))?;

    Ok(serde_json::from_slice(&plaintext)?)
}

pub(crate) fn try_unwrap(
    token: &str,
    decrypt_key: &RsaPrivateKey,
    verify_key: &RsaPublicKey,
) -> Result<Value> {
    let mut claims = try_decrypt(token, decrypt_key)?;

    let signature = claims
        .get(SIGNATURE_CLAIM)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Malformed("missing signature claim".to_string()))?;
    let signed = try_verify(signature, verify_key)?;

    let data = claims
        .get_mut(DATA_CLAIM)
        .map(Value::take)
        .ok_or_else(|| Error::Malformed("missing data claim".to_string()))?;
    if signed != data {
        return Err(Error::SignatureMismatch);
    }

    Ok(data)
}
