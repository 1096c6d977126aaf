//! Streaming decrypt + verify reader
//!
//! The source is positioned at the first ciphertext byte before the reader is
//! built (past the embedded header for legacy objects). Decryption happens in
//! the caller's buffer, and the running hash sees exactly the plaintext handed
//! out, so [`CryptoReader::check_sum`] is only meaningful once the stream has
//! been read to the end.

use std::io::{self, Read};

use tracing::{debug, trace, warn};

use cryptstore_core::{BlobReader, Error, Result};

use crate::cipher::StreamDecryptor;
use crate::hash::RunningHash;
use crate::header::{Header, HeaderVersion};
use crate::keys::IdentityKey;

pub struct CryptoReader {
    name: String,
    source: Box<dyn BlobReader>,
    header: Header,
    version: HeaderVersion,
    cipher: StreamDecryptor,
    hash: RunningHash,
    read: u64,
    eof: bool,
}

impl CryptoReader {
    /// Unwrap the file key from `header` and prepare the decrypting stream.
    pub fn new(
        name: impl Into<String>,
        source: Box<dyn BlobReader>,
        identity: &IdentityKey,
        header: Header,
        version: HeaderVersion,
    ) -> Result<Self> {
        let name = name.into();
        let file_key = identity.unwrap(header.wrapped_key())?;
        let cipher = StreamDecryptor::new(&file_key, header.iv())?;
        let hash = header.hash_algorithm().hasher();
        debug!(%name, %version, hash_type = %header.hash_algorithm(), "opened encrypted object");

        Ok(Self {
            name,
            source,
            header,
            version,
            cipher,
            hash,
            read: 0,
            eof: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Which codec the header was decoded with.
    pub fn header_version(&self) -> HeaderVersion {
        self.version
    }

    /// Plaintext bytes returned so far.
    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    /// Compare the digest of everything read so far with the header's.
    pub fn check_sum(&self) -> Result<()> {
        if !self.eof {
            debug!(name = %self.name, bytes = self.read, "checksum requested before end of stream");
        }
        let actual = self.hash.digest();
        if actual.as_slice() != self.header.hash() {
            warn!(name = %self.name, "content digest does not match header");
            return Err(Error::IntegrityMismatch {
                name: self.name.clone(),
                expected: hex::encode(self.header.hash()),
                actual: hex::encode(&actual),
            });
        }
        Ok(())
    }

    /// Release the source. No checksum verification happens here.
    pub fn close(mut self) -> Result<()> {
        self.source
            .close()
            .map_err(|e| Error::io(format!("closing data object {}", self.name), e))
    }
}

impl Read for CryptoReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.source.read(buf)?;
        if n == 0 {
            if !buf.is_empty() {
                self.eof = true;
            }
            return Ok(0);
        }
        trace!(name = %self.name, len = n, "read");

        let plaintext = &mut buf[..n];
        self.cipher.apply(plaintext);
        self.hash.update(plaintext);
        self.read += n as u64;
        Ok(n)
    }
}

impl std::fmt::Debug for CryptoReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoReader")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("read", &self.read)
            .field("eof", &self.eof)
            .finish()
    }
}
