//! Blob store capability traits
//!
//! The crypto layer only ever talks to a backend through these three traits.
//! Durability, listing, retries and transport belong to the implementor.

use std::io;

/// A readable, seekable object opened from a [`BlobStore`].
pub trait BlobReader: io::Read + io::Seek + Send {
    /// Total size of the object in bytes.
    fn size(&mut self) -> io::Result<u64>;

    /// Release the underlying handle. Further reads are undefined.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A sink for a new object. The object is complete only after `close`.
pub trait BlobWriter: io::Write + Send {
    fn close(&mut self) -> io::Result<()>;
}

/// Minimal capability set of an underlying object store.
///
/// Implementations must be safe to share across threads; individual readers
/// and writers are not.
pub trait BlobStore: Send + Sync {
    fn open(&self, name: &str) -> io::Result<Box<dyn BlobReader>>;

    /// Create (or truncate) an object for writing.
    fn create(&self, name: &str) -> io::Result<Box<dyn BlobWriter>>;

    fn exists(&self, name: &str) -> io::Result<bool>;

    fn rename(&self, src: &str, dst: &str) -> io::Result<()>;

    /// Release store-wide resources.
    fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: BlobStore + ?Sized> BlobStore for std::sync::Arc<T> {
    fn open(&self, name: &str) -> io::Result<Box<dyn BlobReader>> {
        (**self).open(name)
    }

    fn create(&self, name: &str) -> io::Result<Box<dyn BlobWriter>> {
        (**self).create(name)
    }

    fn exists(&self, name: &str) -> io::Result<bool> {
        (**self).exists(name)
    }

    fn rename(&self, src: &str, dst: &str) -> io::Result<()> {
        (**self).rename(src, dst)
    }

    fn close(&self) -> io::Result<()> {
        (**self).close()
    }
}
