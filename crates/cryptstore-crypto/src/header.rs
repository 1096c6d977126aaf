//! The per-object encryption header
//!
//! Only persisted fields live here. The plaintext file key is held by the
//! reader/writer that owns it and never reaches a codec.

use std::fmt;

use cryptstore_core::{Error, Result};

use crate::hash::HashAlgorithm;
use crate::{MAX_ENC_KEY_SIZE, MAX_HASH_SIZE, MAX_IV_SIZE};

/// Where a header was found when its object was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderVersion {
    /// Binary header embedded at the start of the data object.
    Legacy,
    /// JSON record in a `<name>.<suffix>` sidecar object.
    Current,
}

impl fmt::Display for HeaderVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderVersion::Legacy => f.write_str("legacy"),
            HeaderVersion::Current => f.write_str("current"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    hash: Vec<u8>,
    hash_algorithm: HashAlgorithm,
    wrapped_key: Vec<u8>,
    iv: Vec<u8>,
}

impl Header {
    /// A fresh, unfinalized header (empty digest).
    pub fn new(hash_algorithm: HashAlgorithm, wrapped_key: Vec<u8>, iv: Vec<u8>) -> Result<Self> {
        Self::from_parts(Vec::new(), hash_algorithm, wrapped_key, iv)
    }

    /// Rebuild a header from decoded fields, enforcing the size ceilings.
    pub fn from_parts(
        hash: Vec<u8>,
        hash_algorithm: HashAlgorithm,
        wrapped_key: Vec<u8>,
        iv: Vec<u8>,
    ) -> Result<Self> {
        check_size("hash digest", hash.len(), MAX_HASH_SIZE)?;
        check_size("wrapped key", wrapped_key.len(), MAX_ENC_KEY_SIZE)?;
        check_size("iv", iv.len(), MAX_IV_SIZE)?;
        Ok(Self {
            hash,
            hash_algorithm,
            wrapped_key,
            iv,
        })
    }

    pub fn hash(&self) -> &[u8] {
        &self.hash
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    pub fn wrapped_key(&self) -> &[u8] {
        &self.wrapped_key
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    /// An empty digest means the writer never reached `close`.
    pub fn is_finalized(&self) -> bool {
        !self.hash.is_empty()
    }

    /// Record the content digest. Allowed exactly once.
    pub fn finalize(&mut self, digest: Vec<u8>) -> Result<()> {
        if self.is_finalized() {
            return Err(Error::format("header digest is already finalized"));
        }
        if digest.is_empty() {
            return Err(Error::format("cannot finalize header with an empty digest"));
        }
        check_size("hash digest", digest.len(), MAX_HASH_SIZE)?;
        self.hash = digest;
        Ok(())
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hash: {}, hash_type: {}, enc_key: {}, iv: {}",
            hex::encode(&self.hash),
            self.hash_algorithm,
            hex::encode(&self.wrapped_key),
            hex::encode(&self.iv)
        )
    }
}

pub(crate) fn check_size(field: &'static str, len: usize, max: usize) -> Result<()> {
    if len > max {
        return Err(Error::SizeLimitExceeded { field, len, max });
    }
    Ok(())
}
