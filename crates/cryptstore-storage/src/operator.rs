//! OpenDAL-backed blob store
//!
//! The crypto layer is synchronous; OpenDAL is async. [`OpendalStore`] drives
//! the operator on a caller-supplied tokio runtime handle, so it must be used
//! from a thread that is not itself running async tasks (a plain thread or
//! `spawn_blocking`), otherwise `block_on` panics.

use std::future::Future;
use std::io::{self, Read, Seek, SeekFrom, Write};

use anyhow::{Context, Result};
use opendal::Operator;
use tokio::runtime::Handle;
use tracing::debug;

use cryptstore_core::{BlobReader, BlobStore, BlobWriter};

/// Bytes fetched per ranged read; small header reads are served from it.
const READ_AHEAD: usize = 256 * 1024;

/// OpenDAL buffers writes up to this size before sending a part.
const WRITE_CHUNK: usize = 8 * 1024 * 1024;

/// Connection settings for an S3-compatible endpoint
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    /// Key prefix every object name is resolved under
    pub root: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Build an OpenDAL Operator over a local directory.
pub fn build_fs_operator(root: &str) -> Result<Operator> {
    let builder = opendal::services::Fs::default().root(root);

    let op = Operator::new(builder)
        .with_context(|| format!("creating OpenDAL fs operator at {root}"))?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();

    Ok(op)
}

/// Build an OpenDAL Operator for an S3-compatible endpoint
///
/// Uses path-style addressing (default in opendal 0.55), which MinIO and
/// SeaweedFS require.
pub fn build_s3_operator(cfg: &S3Config) -> Result<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .root(&cfg.root)
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(&cfg.secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// Build the operator selected by `storage.backend`.
///
/// S3 needs `credentials` as (access key id, secret access key). If
/// `enforce_tls` is set, a plaintext HTTP endpoint is an error; otherwise it
/// is only logged.
pub fn build_from_core_config(
    storage: &cryptstore_core::config::StorageConfig,
    credentials: Option<(&str, &str)>,
) -> Result<Operator> {
    match storage.backend.as_str() {
        "fs" => build_fs_operator(&storage.root),
        "s3" => {
            if storage.endpoint.starts_with("http://") {
                if storage.enforce_tls {
                    anyhow::bail!(
                        "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                         Use an HTTPS endpoint or set storage.enforce_tls = false \
                         for local development.",
                        storage.endpoint
                    );
                }
                tracing::warn!(
                    endpoint = %storage.endpoint,
                    "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted"
                );
            }
            let (access_key_id, secret_access_key) =
                credentials.context("S3 backend selected but no credentials were supplied")?;

            build_s3_operator(&S3Config {
                endpoint: storage.endpoint.clone(),
                region: storage.region.clone(),
                bucket: storage.bucket.clone(),
                root: storage.root.clone(),
                access_key_id: access_key_id.to_string(),
                secret_access_key: secret_access_key.to_string(),
            })
        }
        other => anyhow::bail!("unknown storage backend {other:?} (expected \"fs\" or \"s3\")"),
    }
}

/// Synchronous [`BlobStore`] over an OpenDAL [`Operator`].
#[derive(Debug, Clone)]
pub struct OpendalStore {
    op: Operator,
    handle: Handle,
}

impl OpendalStore {
    pub fn new(op: Operator, handle: Handle) -> Self {
        Self { op, handle }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.handle.block_on(fut)
    }
}

impl BlobStore for OpendalStore {
    fn open(&self, name: &str) -> io::Result<Box<dyn BlobReader>> {
        let meta = self
            .block_on(async { self.op.stat(name).await })
            .map_err(io::Error::from)?;
        debug!(name, size = meta.content_length(), "open object");

        Ok(Box::new(OpendalReader {
            op: self.op.clone(),
            handle: self.handle.clone(),
            path: name.to_string(),
            size: meta.content_length(),
            pos: 0,
            chunk: Vec::new(),
            chunk_start: 0,
        }))
    }

    fn create(&self, name: &str) -> io::Result<Box<dyn BlobWriter>> {
        let writer = self
            .block_on(async { self.op.writer_with(name).chunk(WRITE_CHUNK).await })
            .map_err(io::Error::from)?;

        Ok(Box::new(OpendalWriter {
            handle: self.handle.clone(),
            path: name.to_string(),
            inner: Some(writer),
        }))
    }

    fn exists(&self, name: &str) -> io::Result<bool> {
        self.block_on(async { self.op.exists(name).await })
            .map_err(io::Error::from)
    }

    fn rename(&self, src: &str, dst: &str) -> io::Result<()> {
        let cap = self.op.info().full_capability();
        if cap.rename {
            return self
                .block_on(async { self.op.rename(src, dst).await })
                .map_err(io::Error::from);
        }
        if !cap.copy {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{} supports neither rename nor copy", self.op.info().scheme()),
            ));
        }

        // Object stores without rename: copy then delete, not atomic
        debug!(src, dst, "rename via copy + delete");
        self.block_on(async {
            self.op.copy(src, dst).await?;
            self.op.delete(src).await
        })
        .map_err(io::Error::from)
    }
}

/// Lazy ranged reader with a local cursor.
struct OpendalReader {
    op: Operator,
    handle: Handle,
    path: String,
    size: u64,
    pos: u64,
    /// Read-ahead window covering `chunk_start..chunk_start + chunk.len()`
    chunk: Vec<u8>,
    chunk_start: u64,
}

impl OpendalReader {
    fn fill(&mut self) -> io::Result<()> {
        let end = self.size.min(self.pos + READ_AHEAD as u64);
        let range = self.pos..end;
        let buf = self
            .handle
            .block_on(async { self.op.read_with(&self.path).range(range).await })
            .map_err(io::Error::from)?;

        self.chunk = buf.to_vec();
        self.chunk_start = self.pos;
        if self.chunk.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} ended before its reported size of {} bytes", self.path, self.size),
            ));
        }
        Ok(())
    }
}

impl Read for OpendalReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.size {
            return Ok(0);
        }
        let chunk_end = self.chunk_start + self.chunk.len() as u64;
        if self.pos < self.chunk_start || self.pos >= chunk_end {
            self.fill()?;
        }

        let offset = (self.pos - self.chunk_start) as usize;
        let n = buf.len().min(self.chunk.len() - offset);
        buf[..n].copy_from_slice(&self.chunk[offset..offset + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for OpendalReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;
        self.pos = target;
        Ok(target)
    }
}

impl BlobReader for OpendalReader {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.size)
    }
}

struct OpendalWriter {
    handle: Handle,
    path: String,
    inner: Option<opendal::Writer>,
}

impl Write for OpendalWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let writer = self
            .inner
            .as_mut()
            .ok_or_else(|| io::Error::other(format!("write to closed object {}", self.path)))?;
        self.handle
            .block_on(async { writer.write(buf.to_vec()).await })
            .map_err(io::Error::from)?;
        Ok(buf.len())
    }

    /// OpenDAL only commits on close.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BlobWriter for OpendalWriter {
    fn close(&mut self) -> io::Result<()> {
        let Some(mut writer) = self.inner.take() else {
            return Ok(());
        };
        self.handle
            .block_on(async move { writer.close().await })
            .map(|_| ())
            .map_err(io::Error::from)
    }
}
