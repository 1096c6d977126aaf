//! AES-128-CFB as a byte-granular keystream
//!
//! Full-block CFB with internal buffering, so writes and reads of any length
//! (including a final partial block) stay aligned as long as they are applied
//! in stream order.

use aes::Aes128;
use cfb_mode::cipher::KeyIvInit;
use cfb_mode::{BufDecryptor, BufEncryptor};

use cryptstore_core::{Error, Result};

use crate::keys::FileKey;

pub struct StreamEncryptor {
    inner: BufEncryptor<Aes128>,
}

impl StreamEncryptor {
    pub fn new(key: &FileKey, iv: &[u8]) -> Result<Self> {
        let inner = BufEncryptor::<Aes128>::new_from_slices(key.as_bytes(), iv)
            .map_err(|_| init_error(iv))?;
        Ok(Self { inner })
    }

    /// Encrypt `buf` in place, continuing the keystream.
    #[inline]
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.inner.encrypt(buf);
    }
}

pub struct StreamDecryptor {
    inner: BufDecryptor<Aes128>,
}

impl StreamDecryptor {
    pub fn new(key: &FileKey, iv: &[u8]) -> Result<Self> {
        let inner = BufDecryptor::<Aes128>::new_from_slices(key.as_bytes(), iv)
            .map_err(|_| init_error(iv))?;
        Ok(Self { inner })
    }

    /// Decrypt `buf` in place, continuing the keystream.
    #[inline]
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.inner.decrypt(buf);
    }
}

fn init_error(iv: &[u8]) -> Error {
    Error::CipherInit(format!(
        "AES-128-CFB needs a {}-byte IV, header has {} bytes",
        crate::IV_SIZE,
        iv.len()
    ))
}
