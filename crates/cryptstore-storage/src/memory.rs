//! In-memory blob store

use std::collections::HashMap;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, PoisonError, RwLock};

use cryptstore_core::{BlobReader, BlobStore, BlobWriter};

type Objects = Arc<RwLock<HashMap<String, Arc<[u8]>>>>;

/// A thread-safe map of object name to bytes.
///
/// Objects written through [`BlobStore::create`] become visible only when the
/// sink is closed. Clones share the same objects.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Objects,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored bytes of `name`.
    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|data| data.to_vec())
    }

    /// Store raw bytes under `name`, replacing any existing object.
    pub fn put(&self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        let data: Vec<u8> = data.into();
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::from(data));
    }

    pub fn remove(&self, name: &str) -> bool {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// All object names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn not_found(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("object not found: {name}"))
}

impl BlobStore for MemoryStore {
    fn open(&self, name: &str) -> io::Result<Box<dyn BlobReader>> {
        let data = self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(name))?;
        Ok(Box::new(MemoryReader {
            cursor: Cursor::new(data),
        }))
    }

    fn create(&self, name: &str) -> io::Result<Box<dyn BlobWriter>> {
        Ok(Box::new(MemoryWriter {
            name: name.to_string(),
            buf: Vec::new(),
            objects: Arc::clone(&self.objects),
            closed: false,
        }))
    }

    fn exists(&self, name: &str) -> io::Result<bool> {
        Ok(self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name))
    }

    fn rename(&self, src: &str, dst: &str) -> io::Result<()> {
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        let data = objects.remove(src).ok_or_else(|| not_found(src))?;
        objects.insert(dst.to_string(), data);
        Ok(())
    }
}

struct MemoryReader {
    cursor: Cursor<Arc<[u8]>>,
}

impl Read for MemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for MemoryReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl BlobReader for MemoryReader {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.cursor.get_ref().len() as u64)
    }
}

struct MemoryWriter {
    name: String,
    buf: Vec<u8>,
    objects: Objects,
    closed: bool,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::other(format!("write to closed object {}", self.name)));
        }
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BlobWriter for MemoryWriter {
    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let data: Arc<[u8]> = Arc::from(std::mem::take(&mut self.buf));
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(self.name.clone(), data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_visible_after_close() {
        let store = MemoryStore::new();
        let mut w = store.create("a").unwrap();
        w.write_all(b"hello").unwrap();
        assert!(!store.exists("a").unwrap(), "not visible before close");

        w.close().unwrap();
        assert!(store.exists("a").unwrap());
        assert_eq!(store.get("a").unwrap(), b"hello");
        assert!(w.write(b"more").is_err());
    }

    #[test]
    fn test_reader_seek_and_size() {
        let store = MemoryStore::new();
        store.put("a", b"0123456789".to_vec());

        let mut r = store.open("a").unwrap();
        assert_eq!(r.size().unwrap(), 10);
        r.seek(SeekFrom::Start(6)).unwrap();
        let mut rest = String::new();
        r.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "6789");
    }

    #[test]
    fn test_open_missing() {
        let err = MemoryStore::new().open("nope").err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_rename() {
        let store = MemoryStore::new();
        store.put("a", b"x".to_vec());
        store.put("b", b"old".to_vec());

        store.rename("a", "b").unwrap();
        assert_eq!(store.names(), ["b"]);
        assert_eq!(store.get("b").unwrap(), b"x");

        let err = store.rename("a", "c").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_clones_share_objects() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.put("k", b"v".to_vec());
        assert_eq!(other.get("k").unwrap(), b"v");
        assert!(other.remove("k"));
        assert!(store.is_empty());
    }
}
