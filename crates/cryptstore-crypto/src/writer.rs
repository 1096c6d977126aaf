//! Streaming encrypt + hash writer
//!
//! Plaintext goes in through [`std::io::Write`]; ciphertext goes to the data
//! sink in call order. The header is only written by [`CryptoWriter::close`],
//! once the digest over the whole plaintext is known.
//!
//! A writer is single-owner: calls must not be interleaved across threads.

use std::io::{self, Write};

use tracing::{debug, trace, warn};

use cryptstore_core::{BlobWriter, Error, Result};

use crate::cipher::StreamEncryptor;
use crate::hash::{HashAlgorithm, RunningHash};
use crate::header::Header;
use crate::keys::{generate_key, RecipientKey};
use crate::sidecar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    Writing,
    /// A data-sink write failed; the keystream no longer matches the object.
    Failed,
    Closed,
}

pub struct CryptoWriter {
    name: String,
    data: Box<dyn BlobWriter>,
    header_sink: Box<dyn BlobWriter>,
    header: Header,
    cipher: StreamEncryptor,
    hash: RunningHash,
    /// Ciphertext scratch; grows to the largest write seen, never shrinks.
    buf: Vec<u8>,
    state: WriterState,
    written: u64,
}

impl CryptoWriter {
    /// Draw a fresh key + IV, wrap the key for `recipient`, and bind the sinks.
    pub fn new(
        name: impl Into<String>,
        recipient: &RecipientKey,
        hash_algorithm: HashAlgorithm,
        data: Box<dyn BlobWriter>,
        header_sink: Box<dyn BlobWriter>,
    ) -> Result<Self> {
        let (file_key, iv) = generate_key()?;
        let wrapped_key = recipient.wrap(&file_key)?;
        let header = Header::new(hash_algorithm, wrapped_key, iv.to_vec())?;
        let cipher = StreamEncryptor::new(&file_key, header.iv())?;

        Ok(Self {
            name: name.into(),
            data,
            header_sink,
            header,
            cipher,
            hash: hash_algorithm.hasher(),
            buf: Vec::new(),
            state: WriterState::Open,
            written: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The header as it stands; the digest is empty until `close`.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Plaintext bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Finalize the digest, persist the header, then close the header sink
    /// and the data sink, in that order.
    ///
    /// Both sinks are always closed; the first error encountered is returned.
    pub fn close(mut self) -> Result<()> {
        let mut first_err = match self.state {
            WriterState::Failed => Some(Error::io(
                format!("finalizing {}", self.name),
                io::Error::other("an earlier data write failed; header not written"),
            )),
            _ => self.write_header().err(),
        };

        if let Err(e) = self.header_sink.close() {
            first_err.get_or_insert(Error::io(
                format!("closing header object for {}", self.name),
                e,
            ));
        }
        if let Err(e) = self.data.close() {
            first_err.get_or_insert(Error::io(format!("closing data object {}", self.name), e));
        }
        self.state = WriterState::Closed;

        match first_err {
            Some(e) => Err(e),
            None => {
                debug!(name = %self.name, bytes = self.written, "encrypted object closed");
                Ok(())
            }
        }
    }

    fn write_header(&mut self) -> Result<()> {
        self.header.finalize(self.hash.digest())?;
        debug!(name = %self.name, header = %self.header, "write header");
        let encoded = sidecar::encode(&self.header)?;
        self.header_sink
            .write_all(&encoded)
            .map_err(|e| Error::io(format!("writing header object for {}", self.name), e))
    }
}

impl Write for CryptoWriter {
    fn write(&mut self, p: &[u8]) -> io::Result<usize> {
        if self.state == WriterState::Failed {
            return Err(io::Error::other(format!(
                "{}: writer is unusable after a failed write",
                self.name
            )));
        }
        if p.is_empty() {
            return Ok(0);
        }
        trace!(name = %self.name, len = p.len(), "write");

        let n = p.len();
        if self.buf.len() < n {
            self.buf.resize(n, 0);
        }
        let buf = &mut self.buf[..n];

        // Integrity covers the plaintext, not the ciphertext
        self.hash.update(p);
        buf.copy_from_slice(p);
        self.cipher.apply(buf);

        if let Err(e) = self.data.write_all(buf) {
            self.state = WriterState::Failed;
            return Err(Error::io(format!("writing data object {}", self.name), e).into());
        }
        self.state = WriterState::Writing;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.data.flush()
    }
}

impl Drop for CryptoWriter {
    fn drop(&mut self) {
        if self.state != WriterState::Closed {
            warn!(
                name = %self.name,
                bytes = self.written,
                "encrypted writer dropped without close; object has no usable header"
            );
        }
    }
}

impl std::fmt::Debug for CryptoWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoWriter")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("written", &self.written)
            .finish()
    }
}
