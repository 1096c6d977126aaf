//! Per-file key generation and RSA key wrapping
//!
//! Every object gets a fresh AES-128 key and IV. The key is stored only in
//! wrapped form: RSA PKCS#1 v1.5 under the recipient's public key.

use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use zeroize::{Zeroize, Zeroizing};

use cryptstore_core::KeyError;

use crate::{IV_SIZE, KEY_SIZE};

/// A per-file 128-bit encryption key. Zeroized on drop.
#[derive(Clone)]
pub struct FileKey {
    bytes: [u8; KEY_SIZE],
}

impl FileKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for FileKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Draw a random file key and IV from the OS CSPRNG.
///
/// A failing random source is returned, never retried.
pub fn generate_key() -> Result<(FileKey, [u8; IV_SIZE]), KeyError> {
    let mut key = [0u8; KEY_SIZE];
    OsRng
        .try_fill_bytes(&mut key)
        .map_err(|e| KeyError::Random(format!("init key failed: {e}")))?;
    let file_key = FileKey::from_bytes(key);
    key.zeroize();

    let mut iv = [0u8; IV_SIZE];
    OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| KeyError::Random(format!("init cipher IV failed: {e}")))?;

    Ok((file_key, iv))
}

/// Public half of a recipient key pair; wraps file keys.
#[derive(Clone)]
pub struct RecipientKey {
    key: RsaPublicKey,
}

impl RecipientKey {
    /// Parse a PEM public key (SubjectPublicKeyInfo, or PKCS#1 `RSA PUBLIC KEY`).
    pub fn from_pem(pem: &[u8]) -> Result<Self, KeyError> {
        let text = std::str::from_utf8(pem)
            .map_err(|_| KeyError::Format("public key is not PEM text".into()))?;
        let key = RsaPublicKey::from_public_key_pem(text)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(text))
            .map_err(|e| KeyError::Format(format!("public key: {e}")))?;
        Ok(Self { key })
    }

    pub fn wrap(&self, file_key: &FileKey) -> Result<Vec<u8>, KeyError> {
        self.key
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, file_key.as_bytes())
            .map_err(|e| KeyError::Wrap(e.to_string()))
    }
}

impl std::fmt::Debug for RecipientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use rsa::traits::PublicKeyParts;
        f.debug_struct("RecipientKey")
            .field("bits", &(self.key.size() * 8))
            .finish()
    }
}

/// Private half of a recipient key pair; unwraps file keys.
#[derive(Clone)]
pub struct IdentityKey {
    key: RsaPrivateKey,
}

impl IdentityKey {
    /// Parse a PEM private key (PKCS#1 `RSA PRIVATE KEY`, or PKCS#8).
    pub fn from_pem(pem: &[u8]) -> Result<Self, KeyError> {
        let text = std::str::from_utf8(pem)
            .map_err(|_| KeyError::Format("private key is not PEM text".into()))?;
        let key = RsaPrivateKey::from_pkcs1_pem(text)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(text))
            .map_err(|e| KeyError::Format(format!("private key: {e}")))?;
        Ok(Self { key })
    }

    pub fn unwrap(&self, wrapped: &[u8]) -> Result<FileKey, KeyError> {
        if wrapped.is_empty() {
            return Err(KeyError::Unwrap("header has no wrapped key".into()));
        }
        let plaintext = Zeroizing::new(
            self.key
                .decrypt(Pkcs1v15Encrypt, wrapped)
                .map_err(|_| {
                    KeyError::Unwrap("wrong private key or corrupted wrapped key".into())
                })?,
        );

        if plaintext.len() != KEY_SIZE {
            return Err(KeyError::Unwrap(format!(
                "unwrapped key has wrong size: {} bytes (expected {KEY_SIZE})",
                plaintext.len()
            )));
        }

        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(&plaintext);
        let file_key = FileKey::from_bytes(key_bytes);
        key_bytes.zeroize();
        Ok(file_key)
    }

    pub fn recipient(&self) -> RecipientKey {
        RecipientKey {
            key: RsaPublicKey::from(&self.key),
        }
    }
}

impl std::fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Wrap a file key under a PEM public key.
pub fn wrap_key(public_pem: &[u8], file_key: &FileKey) -> Result<Vec<u8>, KeyError> {
    RecipientKey::from_pem(public_pem)?.wrap(file_key)
}

/// Unwrap a file key with a PEM private key.
pub fn unwrap_key(private_pem: &[u8], wrapped: &[u8]) -> Result<FileKey, KeyError> {
    IdentityKey::from_pem(private_pem)?.unwrap(wrapped)
}

/// Generate an RSA key pair, returned as (PKCS#1 private PEM, SPKI public PEM).
pub fn generate_keypair(bits: usize) -> Result<(Zeroizing<String>, String), KeyError> {
    let private = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| KeyError::Format(format!("generating {bits}-bit RSA key: {e}")))?;
    let private_pem = private
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| KeyError::Format(format!("encoding private key: {e}")))?;
    let public_pem = RsaPublicKey::from(&private)
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| KeyError::Format(format!("encoding public key: {e}")))?;
    Ok((private_pem, public_pem))
}
