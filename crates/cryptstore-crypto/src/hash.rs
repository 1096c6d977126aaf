//! Content hash selection and running hash state
//!
//! The set of algorithms is closed; names are the ones stored in the sidecar
//! header's `hash_type` field.

use std::fmt;
use std::str::FromStr;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use cryptstore_core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Crc32,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 4] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
        HashAlgorithm::Crc32,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Crc32 => "crc32",
        }
    }

    /// Digest length in bytes.
    pub fn digest_size(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => 16,
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Crc32 => 4,
        }
    }

    /// Recover the algorithm from a digest length.
    ///
    /// Legacy binary headers never recorded the algorithm name; the four
    /// digest sizes are distinct so the length identifies it.
    pub fn from_digest_len(len: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.digest_size() == len)
    }

    pub fn hasher(&self) -> RunningHash {
        match self {
            HashAlgorithm::Md5 => RunningHash::Md5(Md5::new()),
            HashAlgorithm::Sha1 => RunningHash::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => RunningHash::Sha256(Sha256::new()),
            HashAlgorithm::Crc32 => RunningHash::Crc32(crc32fast::Hasher::new()),
        }
    }
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Md5
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "crc32" => Ok(HashAlgorithm::Crc32),
            other => Err(Error::config(format!("unknown hash algorithm: {other:?}"))),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incremental hash over plaintext.
#[derive(Clone)]
pub enum RunningHash {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Crc32(crc32fast::Hasher),
}

impl RunningHash {
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        match self {
            RunningHash::Md5(h) => h.update(data),
            RunningHash::Sha1(h) => h.update(data),
            RunningHash::Sha256(h) => h.update(data),
            RunningHash::Crc32(h) => h.update(data),
        }
    }

    /// Digest of everything fed so far. The running state is left untouched.
    pub fn digest(&self) -> Vec<u8> {
        match self.clone() {
            RunningHash::Md5(h) => h.finalize().to_vec(),
            RunningHash::Sha1(h) => h.finalize().to_vec(),
            RunningHash::Sha256(h) => h.finalize().to_vec(),
            // Big-endian, as hash/crc32 appends it
            RunningHash::Crc32(h) => h.finalize().to_be_bytes().to_vec(),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            RunningHash::Md5(_) => HashAlgorithm::Md5,
            RunningHash::Sha1(_) => HashAlgorithm::Sha1,
            RunningHash::Sha256(_) => HashAlgorithm::Sha256,
            RunningHash::Crc32(_) => HashAlgorithm::Crc32,
        }
    }
}

impl fmt::Debug for RunningHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RunningHash").field(&self.algorithm()).finish()
    }
}
