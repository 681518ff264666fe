//! RSA key material loading.
//!
//! Keys are PEM encoded. Both PKCS#1 (`BEGIN RSA PRIVATE KEY`) and PKCS#8 /
//! SPKI (`BEGIN PRIVATE KEY`, `BEGIN PUBLIC KEY`) encodings are accepted.

use crate::{Error, Result};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::path::Path;

pub use rsa::{RsaPrivateKey as PrivateKey, RsaPublicKey as PublicKey};

/// Parse a PEM encoded RSA private key.
pub fn private_key_from_pem(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
        .map_err(|e| Error::Key(format!("invalid RSA private key: {e}")))
}

/// Parse a PEM encoded RSA public key.
///
/// A private key is accepted too; its public half is returned.
pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey> {
    if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
        return Ok(key);
    }
    if let Ok(key) = RsaPublicKey::from_pkcs1_pem(pem) {
        return Ok(key);
    }
    private_key_from_pem(pem)
        .map(|key| key.to_public_key())
        .map_err(|_| Error::Key("invalid RSA public key".to_string()))
}

/// Read and parse a private key file.
pub fn load_private_key(path: &Path) -> Result<RsaPrivateKey> {
    let pem = std::fs::read_to_string(path)?;
    private_key_from_pem(&pem)
}

/// Read and parse a public key file.
pub fn load_public_key(path: &Path) -> Result<RsaPublicKey> {
    let pem = std::fs::read_to_string(path)?;
    public_key_from_pem(&pem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
    use rsa::pkcs8::EncodePublicKey;
    use std::io::Write;

    #[test]
    fn test_private_key_roundtrip_through_pkcs1_pem() {
        let key = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let pem = key.to_pkcs1_pem(LineEnding::LF).unwrap();

        let parsed = private_key_from_pem(&pem).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_public_key_from_spki_and_from_private() {
        let key = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let public = key.to_public_key();

        let spki = public.to_public_key_pem(LineEnding::LF).unwrap();
        assert_eq!(public_key_from_pem(&spki).unwrap(), public);

        let private_pem = key.to_pkcs1_pem(LineEnding::LF).unwrap();
        assert_eq!(public_key_from_pem(&private_pem).unwrap(), public);
    }

    #[test]
    fn test_garbage_is_a_key_error() {
        let result = public_key_from_pem("-----BEGIN PUBLIC KEY-----\nnope\n");
        assert!(matches!(result, Err(Error::Key(_))));
    }

    #[test]
    fn test_load_private_key_from_file() {
        let key = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let pem = key.to_pkcs1_pem(LineEnding::LF).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(pem.as_bytes()).unwrap();

        assert_eq!(load_private_key(file.path()).unwrap(), key);
        assert!(matches!(
            load_private_key(&file.path().with_extension("missing")),
            Err(Error::Io(_))
        ));
    }
}
