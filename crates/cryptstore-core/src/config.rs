use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Top-level configuration (loaded from cryptstore.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptstoreConfig {
    pub crypto: CryptoConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
}

/// Key material and header options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// PEM RSA private key; only needed to open (decrypt) objects
    pub private_key_file: Option<PathBuf>,
    /// PEM RSA public key; only needed to create (encrypt) objects
    pub public_key_file: Option<PathBuf>,
    /// Suffix of the sidecar header object (default: crypto)
    pub suffix: String,
    /// Content hash: md5, sha1, sha256 or crc32 (default: md5)
    pub hash_algorithm: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend kind: "fs" or "s3"
    pub backend: String,
    /// Root directory (fs) or key prefix (s3)
    pub root: String,
    /// S3-compatible endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Refuse plaintext HTTP endpoints
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            private_key_file: None,
            public_key_file: None,
            suffix: "crypto".into(),
            hash_algorithm: "md5".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "fs".into(),
            root: "./data".into(),
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "cryptstore".into(),
            enforce_tls: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl CryptoConfig {
    /// Read whichever key files are configured.
    ///
    /// Returns `(private, public)` PEM bytes. Having neither is a config error
    /// because the store could neither read nor write.
    pub fn load_key_material(&self) -> Result<(Option<Vec<u8>>, Option<Vec<u8>>)> {
        let private = self
            .private_key_file
            .as_deref()
            .map(|p| read_key_file(p, "private"))
            .transpose()?;
        let public = self
            .public_key_file
            .as_deref()
            .map(|p| read_key_file(p, "public"))
            .transpose()?;
        if private.is_none() && public.is_none() {
            return Err(Error::config(
                "one of crypto.private_key_file or crypto.public_key_file must be set",
            ));
        }
        Ok((private, public))
    }
}

fn read_key_file(path: &Path, which: &str) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| Error::io(format!("reading {which} key {}", path.display()), e))
}

impl CryptstoreConfig {
    /// Load from a TOML file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading config {}", path.display()), e))?;
        toml::from_str(&content)
            .map_err(|e| Error::config(format!("parsing config {}: {e}", path.display())))
    }
}
