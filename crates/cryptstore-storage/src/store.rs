//! Store orchestrator
//!
//! Every logical file is a data object plus, for everything written by this
//! crate, a header object named `<name>.<suffix>`. Which header governs a file
//! is decided at open time by probing for that header object:
//!
//! ```text
//! <name>.<suffix> exists  -> current: JSON sidecar, data object is pure ciphertext
//! otherwise               -> legacy:  binary header at the front of the data object
//! ```
//!
//! The pair is not transactional. A failure between the two halves of a
//! `create` or `rename` leaves them mismatched and is reported, never rolled
//! back.

use std::io::{Read, Write};

use tracing::{debug, info};

use cryptstore_core::config::CryptoConfig;
use cryptstore_core::{BlobStore, Error, Result};
use cryptstore_crypto::{
    legacy, sidecar, CryptoReader, CryptoWriter, HashAlgorithm, Header, HeaderVersion,
    IdentityKey, RecipientKey, MAX_ENC_KEY_SIZE,
};

pub const DEFAULT_SUFFIX: &str = "crypto";

/// Largest sidecar object accepted. A record at every field ceiling stays
/// well under this once base64 and JSON overhead are added.
const MAX_SIDECAR_SIZE: u64 = 2 * MAX_ENC_KEY_SIZE as u64;

/// Key material and header options for a [`CryptoStore`].
#[derive(Clone)]
pub struct CryptoStoreOptions {
    private_key: Option<Vec<u8>>,
    public_key: Option<Vec<u8>>,
    suffix: String,
    hash_algorithm: String,
}

impl CryptoStoreOptions {
    /// `private_key` is needed to open objects, `public_key` to create them.
    /// At least one is required. An empty suffix or hash name takes the
    /// default (`crypto`, `md5`).
    pub fn new(
        private_key: Option<Vec<u8>>,
        public_key: Option<Vec<u8>>,
        suffix: impl Into<String>,
        hash_algorithm: impl Into<String>,
    ) -> Result<Self> {
        let private_key = private_key.filter(|k| !k.is_empty());
        let public_key = public_key.filter(|k| !k.is_empty());
        if private_key.is_none() && public_key.is_none() {
            return Err(Error::config(
                "no key material: a private key, a public key, or both must be supplied",
            ));
        }

        let mut suffix = suffix.into();
        if suffix.is_empty() {
            suffix = DEFAULT_SUFFIX.to_string();
        }
        let mut hash_algorithm = hash_algorithm.into();
        if hash_algorithm.is_empty() {
            hash_algorithm = HashAlgorithm::default().as_str().to_string();
        }

        Ok(Self {
            private_key,
            public_key,
            suffix,
            hash_algorithm,
        })
    }

    /// Read the configured key files and header options.
    pub fn from_config(cfg: &CryptoConfig) -> Result<Self> {
        let (private_key, public_key) = cfg.load_key_material()?;
        Self::new(private_key, public_key, cfg.suffix.clone(), cfg.hash_algorithm.clone())
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

impl std::fmt::Debug for CryptoStoreOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoStoreOptions")
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .field("public_key", &self.public_key.is_some())
            .field("suffix", &self.suffix)
            .field("hash_algorithm", &self.hash_algorithm)
            .finish()
    }
}

/// Transparent encryption over a [`BlobStore`].
pub struct CryptoStore<S> {
    store: S,
    identity: Option<IdentityKey>,
    recipient: Option<RecipientKey>,
    suffix: String,
    hash_algorithm: HashAlgorithm,
}

impl<S: BlobStore> CryptoStore<S> {
    /// Parse the keys and hash algorithm up front so misconfiguration fails
    /// here rather than on first use.
    pub fn new(store: S, options: CryptoStoreOptions) -> Result<Self> {
        let hash_algorithm: HashAlgorithm = options.hash_algorithm.parse()?;
        let identity = options
            .private_key
            .as_deref()
            .map(IdentityKey::from_pem)
            .transpose()?;
        let recipient = options
            .public_key
            .as_deref()
            .map(RecipientKey::from_pem)
            .transpose()?;

        info!(
            suffix = %options.suffix,
            hash_type = %hash_algorithm,
            can_read = identity.is_some(),
            can_write = recipient.is_some(),
            "crypto store ready"
        );

        Ok(Self {
            store,
            identity,
            recipient,
            suffix: options.suffix,
            hash_algorithm,
        })
    }

    /// The wrapped blob store.
    pub fn inner(&self) -> &S {
        &self.store
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    /// Name of the sidecar header object paired with `name`.
    pub fn header_name(&self, name: &str) -> String {
        format!("{name}.{}", self.suffix)
    }

    /// Open `name` for decrypting reads.
    pub fn open(&self, name: &str) -> Result<CryptoReader> {
        let identity = self.identity.as_ref().ok_or_else(|| {
            Error::config(format!("cannot open {name}: no private key configured"))
        })?;

        let mut data = self
            .store
            .open(name)
            .map_err(|e| Error::io(format!("opening data object {name}"), e))?;

        let located = match self.read_sidecar(name) {
            Ok(Some(header)) => Ok((header, HeaderVersion::Current)),
            Ok(None) => legacy::read_from(&mut data)
                .map(|header| (header, HeaderVersion::Legacy))
                .map_err(|e| in_object(name, e)),
            Err(e) => Err(e),
        };
        let (header, version) = match located {
            Ok(found) => found,
            Err(e) => {
                if let Err(close_err) = data.close() {
                    debug!(name, error = %close_err, "close after failed header read");
                }
                return Err(e);
            }
        };
        debug!(name, %version, "header version selected");

        CryptoReader::new(name, data, identity, header, version)
    }

    /// Create (or overwrite) `name` for encrypting writes.
    ///
    /// New files always use the sidecar header; both objects are created
    /// before any data is written.
    pub fn create(&self, name: &str) -> Result<CryptoWriter> {
        let recipient = self.recipient.as_ref().ok_or_else(|| {
            Error::config(format!("cannot create {name}: no public key configured"))
        })?;

        let data = self
            .store
            .create(name)
            .map_err(|e| Error::io(format!("creating data object {name}"), e))?;
        let header_name = self.header_name(name);
        let header = self
            .store
            .create(&header_name)
            .map_err(|e| Error::io(format!("creating header object {header_name}"), e))?;

        CryptoWriter::new(name, recipient, self.hash_algorithm, data, header)
    }

    /// Rename the data object, then its sidecar when it has one.
    ///
    /// A legacy file is refused when `dst` already has a sidecar, since that
    /// header would govern the moved data and cannot be deleted here. If the
    /// sidecar rename fails the data object has already moved; the error says
    /// so and nothing is undone.
    pub fn rename(&self, src: &str, dst: &str) -> Result<()> {
        let src_header = self.header_name(src);
        let has_sidecar = self
            .store
            .exists(&src_header)
            .map_err(|e| Error::io(format!("checking header object {src_header}"), e))?;

        if !has_sidecar {
            let dst_header = self.header_name(dst);
            let stale = self
                .store
                .exists(&dst_header)
                .map_err(|e| Error::io(format!("checking header object {dst_header}"), e))?;
            if stale {
                return Err(Error::io(
                    format!("renaming legacy object {src} to {dst}"),
                    std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        format!("stale header object {dst_header} would govern {dst}"),
                    ),
                ));
            }
        }

        self.store
            .rename(src, dst)
            .map_err(|e| Error::io(format!("renaming data object {src} to {dst}"), e))?;

        if has_sidecar {
            let dst_header = self.header_name(dst);
            self.store.rename(&src_header, &dst_header).map_err(|e| {
                Error::io(
                    format!(
                        "renaming header object {src_header} to {dst_header} \
                         (data object already renamed to {dst})"
                    ),
                    e,
                )
            })?;
        }
        debug!(src, dst, has_sidecar, "renamed");
        Ok(())
    }

    /// Whether the data object `name` exists.
    pub fn file_exists(&self, name: &str) -> Result<bool> {
        self.store
            .exists(name)
            .map_err(|e| Error::io(format!("checking {name}"), e))
    }

    pub fn close(&self) -> Result<()> {
        self.store
            .close()
            .map_err(|e| Error::io("closing blob store", e))
    }

    /// Locate and decode the header of `name` without unwrapping its key.
    pub fn read_header(&self, name: &str) -> Result<(Header, HeaderVersion)> {
        if let Some(header) = self.read_sidecar(name)? {
            return Ok((header, HeaderVersion::Current));
        }

        let mut data = self
            .store
            .open(name)
            .map_err(|e| Error::io(format!("opening data object {name}"), e))?;
        let header = match legacy::read_from(&mut data) {
            Ok(header) => header,
            Err(e) => {
                if let Err(close_err) = data.close() {
                    debug!(name, error = %close_err, "close after failed header read");
                }
                return Err(in_object(name, e));
            }
        };
        data.close()
            .map_err(|e| Error::io(format!("closing data object {name}"), e))?;
        Ok((header, HeaderVersion::Legacy))
    }

    /// Encrypt `contents` into `name` in one call.
    pub fn write_file(&self, name: &str, contents: &[u8]) -> Result<()> {
        let mut writer = self.create(name)?;
        if let Err(e) = writer.write_all(contents) {
            // Close both sinks anyway; the write error is what the caller needs
            if let Err(close_err) = writer.close() {
                debug!(name, error = %close_err, "close after failed write");
            }
            return Err(Error::io(format!("writing {name}"), e));
        }
        writer.close()
    }

    /// Decrypt all of `name` and verify it against the header digest.
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let mut reader = self.open(name)?;
        let mut contents = Vec::new();
        reader
            .read_to_end(&mut contents)
            .map_err(|e| Error::io(format!("reading {name}"), e))?;
        reader.check_sum()?;
        reader.close()?;
        Ok(contents)
    }

    fn read_sidecar(&self, name: &str) -> Result<Option<Header>> {
        let header_name = self.header_name(name);
        let exists = self
            .store
            .exists(&header_name)
            .map_err(|e| Error::io(format!("checking header object {header_name}"), e))?;
        if !exists {
            return Ok(None);
        }

        let mut source = self
            .store
            .open(&header_name)
            .map_err(|e| Error::io(format!("opening header object {header_name}"), e))?;
        let mut buf = Vec::new();
        source
            .by_ref()
            .take(MAX_SIDECAR_SIZE + 1)
            .read_to_end(&mut buf)
            .map_err(|e| Error::io(format!("reading header object {header_name}"), e))?;
        source
            .close()
            .map_err(|e| Error::io(format!("closing header object {header_name}"), e))?;

        if buf.len() as u64 > MAX_SIDECAR_SIZE {
            return Err(Error::SizeLimitExceeded {
                field: "header object",
                len: buf.len(),
                max: MAX_SIDECAR_SIZE as usize,
            });
        }

        let header = sidecar::decode(&buf).map_err(|e| in_object(&header_name, e))?;
        debug!(name, %header, "sidecar header decoded");
        Ok(Some(header))
    }
}

impl<S> std::fmt::Debug for CryptoStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoStore")
            .field("suffix", &self.suffix)
            .field("hash_algorithm", &self.hash_algorithm)
            .field("can_read", &self.identity.is_some())
            .field("can_write", &self.recipient.is_some())
            .finish()
    }
}

/// Prefix a decode error with the object it came from.
fn in_object(name: &str, e: Error) -> Error {
    match e {
        Error::Format(msg) => Error::Format(format!("{name}: {msg}")),
        other => other,
    }
}
