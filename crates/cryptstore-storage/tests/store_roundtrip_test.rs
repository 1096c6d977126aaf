//! CryptoStore over the in-memory blob store: round trips, header version
//! dispatch, tamper detection, rename pairing and configuration errors.

mod common;

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use base64::Engine as _;
use cryptstore_core::{BlobReader, BlobStore, BlobWriter, Error};
use cryptstore_crypto::{generate_keypair, sidecar, HashAlgorithm, HeaderVersion};
use cryptstore_storage::{CryptoStore, CryptoStoreOptions, MemoryStore};
use proptest::prelude::*;

use common::{crypto_store, keypair, legacy_object, memory_store, options, sample_data};

#[test]
fn roundtrip_every_hash_algorithm() {
    let plaintext = sample_data(100_000);
    for alg in HashAlgorithm::ALL {
        let blobs = MemoryStore::new();
        let store = crypto_store(blobs.clone(), alg.as_str());

        store.write_file("dir/file.bin", &plaintext).unwrap();
        assert_eq!(blobs.names(), ["dir/file.bin", "dir/file.bin.crypto"]);
        assert_eq!(
            blobs.get("dir/file.bin").unwrap().len(),
            plaintext.len(),
            "data object is pure ciphertext under the sidecar layout"
        );

        let header = sidecar::decode(&blobs.get("dir/file.bin.crypto").unwrap()).unwrap();
        assert_eq!(header.hash_algorithm(), alg);

        assert_eq!(store.read_file("dir/file.bin").unwrap(), plaintext, "{alg}");
    }
}

#[test]
fn hello_world_md5_sidecar() {
    let (blobs, store) = memory_store();
    store.write_file("greeting", b"hello world").unwrap();

    let json: serde_json::Value =
        serde_json::from_slice(&blobs.get("greeting.crypto").unwrap()).unwrap();
    assert_eq!(json["hash_type"], "md5");
    let digest = base64::engine::general_purpose::STANDARD
        .decode(json["hash"].as_str().unwrap())
        .unwrap();
    assert_eq!(hex::encode(digest), "5eb63bbbe01eeed093cb22bb8f5acdc3");

    let mut reader = store.open("greeting").unwrap();
    assert_eq!(reader.header_version(), HeaderVersion::Current);
    let mut out = String::new();
    reader.read_to_string(&mut out).unwrap();
    assert_eq!(out, "hello world");
    reader.check_sum().unwrap();
    reader.close().unwrap();
}

#[test]
fn streaming_writes_of_uneven_sizes() {
    let (_, store) = memory_store();
    let plaintext = sample_data(10_007);

    let mut writer = store.create("stream").unwrap();
    let mut rest = plaintext.as_slice();
    for size in [1usize, 15, 16, 17, 4096, 3].iter().cycle() {
        if rest.is_empty() {
            break;
        }
        let n = (*size).min(rest.len());
        assert_eq!(writer.write(&rest[..n]).unwrap(), n);
        rest = &rest[n..];
    }
    assert!(!writer.header().is_finalized());
    writer.close().unwrap();

    let mut reader = store.open("stream").unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 333];
    loop {
        let n = reader.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out, plaintext);
    reader.check_sum().unwrap();
}

#[test]
fn empty_file() {
    let (blobs, store) = memory_store();
    store.write_file("empty", b"").unwrap();
    assert_eq!(blobs.get("empty").unwrap(), b"");
    assert!(store.read_file("empty").unwrap().is_empty());
}

#[test]
fn legacy_object_is_read_without_sidecar() {
    let (blobs, store) = memory_store();
    let plaintext = sample_data(5_000);
    blobs.put("old", legacy_object(HashAlgorithm::Sha1, &plaintext));

    let mut reader = store.open("old").unwrap();
    assert_eq!(reader.header_version(), HeaderVersion::Legacy);
    assert_eq!(reader.header().hash_algorithm(), HashAlgorithm::Sha1);
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    assert_eq!(out, plaintext, "reader starts at the first ciphertext byte");
    reader.check_sum().unwrap();

    let (header, version) = store.read_header("old").unwrap();
    assert_eq!(version, HeaderVersion::Legacy);
    assert_eq!(header.hash().len(), 20);
}

#[test]
fn legacy_object_with_every_digest_length() {
    let (blobs, store) = memory_store();
    for alg in HashAlgorithm::ALL {
        blobs.put("old", legacy_object(alg, b"legacy contents"));
        assert_eq!(store.read_file("old").unwrap(), b"legacy contents", "{alg}");
    }
}

#[test]
fn sidecar_presence_selects_current_decoder() {
    let (blobs, store) = memory_store();
    blobs.put("mixed", legacy_object(HashAlgorithm::Md5, b"legacy"));
    blobs.put("mixed.crypto", b"not json".to_vec());

    let err = store.open("mixed").unwrap_err();
    assert!(matches!(err, Error::Format(_)), "got {err:?}");
    assert!(err.to_string().contains("mixed.crypto"), "{err}");
}

#[test]
fn plain_object_without_header_is_rejected() {
    let (blobs, store) = memory_store();
    blobs.put("plain", b"just some plaintext, long enough to cover a magic".to_vec());

    let err = store.open("plain").unwrap_err();
    assert!(err.to_string().contains("magic"), "{err}");
}

#[test]
fn unfinalized_sidecar_is_rejected() {
    let (blobs, store) = memory_store();
    store.write_file("f", b"data").unwrap();
    blobs.put(
        "f.crypto",
        br#"{"hash":null,"hash_type":"md5","enc_key":"AAAA","iv":"AAAA"}"#.to_vec(),
    );

    let err = store.open("f").unwrap_err();
    assert!(err.to_string().contains("not finalized"), "{err}");
}

#[test]
fn unclosed_writer_leaves_no_readable_file() {
    let (blobs, store) = memory_store();
    let mut writer = store.create("partial").unwrap();
    writer.write_all(b"never finished").unwrap();
    drop(writer);

    assert!(blobs.is_empty(), "memory objects only appear on close");
    assert!(store.open("partial").is_err());
}

#[test]
fn tampered_ciphertext_is_detected() {
    let (blobs, store) = memory_store();
    store.write_file("doc", &sample_data(2_048)).unwrap();

    let mut data = blobs.get("doc").unwrap();
    data[1_000] ^= 0x80;
    blobs.put("doc", data);

    match store.read_file("doc").unwrap_err() {
        Error::IntegrityMismatch { name, expected, actual } => {
            assert_eq!(name, "doc");
            assert_ne!(expected, actual);
        }
        other => panic!("expected IntegrityMismatch, got {other:?}"),
    }
}

#[test]
fn tampered_header_digest_is_detected() {
    let (blobs, store) = memory_store();
    store.write_file("doc", b"important").unwrap();

    let mut json: serde_json::Value =
        serde_json::from_slice(&blobs.get("doc.crypto").unwrap()).unwrap();
    json["hash"] = base64::engine::general_purpose::STANDARD
        .encode([0u8; 16])
        .into();
    blobs.put("doc.crypto", serde_json::to_vec(&json).unwrap());

    assert!(matches!(
        store.read_file("doc"),
        Err(Error::IntegrityMismatch { .. })
    ));
}

#[test]
fn rename_moves_both_objects() {
    let (blobs, store) = memory_store();
    store.write_file("a", b"payload").unwrap();

    store.rename("a", "b").unwrap();
    assert_eq!(blobs.names(), ["b", "b.crypto"]);
    assert!(!store.file_exists("a").unwrap());
    assert!(store.file_exists("b").unwrap());
    assert_eq!(store.read_file("b").unwrap(), b"payload");
}

#[test]
fn rename_legacy_object_without_sidecar() {
    let (blobs, store) = memory_store();
    blobs.put("old", legacy_object(HashAlgorithm::Md5, b"legacy"));

    store.rename("old", "new").unwrap();
    assert_eq!(blobs.names(), ["new"]);
    assert_eq!(store.read_file("new").unwrap(), b"legacy");
}

#[test]
fn rename_legacy_object_onto_stale_sidecar_is_refused() {
    let (blobs, store) = memory_store();
    store.write_file("dst", b"previous contents").unwrap();
    blobs.remove("dst");
    blobs.put("src", legacy_object(HashAlgorithm::Md5, b"legacy"));

    let err = store.rename("src", "dst").unwrap_err();
    match &err {
        Error::Io { source, .. } => assert_eq!(source.kind(), io::ErrorKind::AlreadyExists),
        other => panic!("expected Io, got {other:?}"),
    }
    assert!(err.to_string().contains("dst.crypto"), "{err}");

    assert_eq!(blobs.names(), ["dst.crypto", "src"]);
    assert_eq!(store.read_file("src").unwrap(), b"legacy");
}

#[test]
fn rename_missing_source_fails() {
    let (_, store) = memory_store();
    let err = store.rename("ghost", "b").unwrap_err();
    match err {
        Error::Io { source, .. } => assert_eq!(source.kind(), io::ErrorKind::NotFound),
        other => panic!("expected Io, got {other:?}"),
    }
}

/// Fails every rename of a sidecar object.
struct SidecarRenameFails(MemoryStore);

impl BlobStore for SidecarRenameFails {
    fn open(&self, name: &str) -> io::Result<Box<dyn BlobReader>> {
        self.0.open(name)
    }

    fn create(&self, name: &str) -> io::Result<Box<dyn BlobWriter>> {
        self.0.create(name)
    }

    fn exists(&self, name: &str) -> io::Result<bool> {
        self.0.exists(name)
    }

    fn rename(&self, src: &str, dst: &str) -> io::Result<()> {
        if src.ends_with(".crypto") {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        }
        self.0.rename(src, dst)
    }
}

#[test]
fn rename_partial_failure_is_reported_not_rolled_back() {
    let blobs = MemoryStore::new();
    let store = crypto_store(SidecarRenameFails(blobs.clone()), "md5");
    store.write_file("a", b"payload").unwrap();

    let err = store.rename("a", "b").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("a.crypto"), "{msg}");
    assert!(msg.contains("already renamed"), "{msg}");
    assert_eq!(blobs.names(), ["a.crypto", "b"]);
}

/// Counts how many opened readers were closed.
struct CountsCloses {
    inner: MemoryStore,
    closed: Arc<AtomicUsize>,
}

struct CountedReader {
    inner: Box<dyn BlobReader>,
    closed: Arc<AtomicUsize>,
}

impl Read for CountedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for CountedReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl BlobReader for CountedReader {
    fn size(&mut self) -> io::Result<u64> {
        self.inner.size()
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }
}

impl BlobStore for CountsCloses {
    fn open(&self, name: &str) -> io::Result<Box<dyn BlobReader>> {
        Ok(Box::new(CountedReader {
            inner: self.inner.open(name)?,
            closed: self.closed.clone(),
        }))
    }

    fn create(&self, name: &str) -> io::Result<Box<dyn BlobWriter>> {
        self.inner.create(name)
    }

    fn exists(&self, name: &str) -> io::Result<bool> {
        self.inner.exists(name)
    }

    fn rename(&self, src: &str, dst: &str) -> io::Result<()> {
        self.inner.rename(src, dst)
    }
}

#[test]
fn open_closes_data_object_when_header_is_unreadable() {
    let blobs = MemoryStore::new();
    let closed = Arc::new(AtomicUsize::new(0));
    let store = crypto_store(
        CountsCloses {
            inner: blobs.clone(),
            closed: closed.clone(),
        },
        "md5",
    );

    blobs.put("plain", b"not an encrypted object".to_vec());
    assert!(matches!(store.open("plain"), Err(Error::Format(_))));
    assert_eq!(closed.load(Ordering::SeqCst), 1);

    blobs.put("broken", b"ciphertext".to_vec());
    blobs.put("broken.crypto", b"{not json".to_vec());
    assert!(matches!(store.open("broken"), Err(Error::Format(_))));
    // sidecar reader plus data reader
    assert_eq!(closed.load(Ordering::SeqCst), 3);

    assert!(matches!(store.read_header("plain"), Err(Error::Format(_))));
    assert_eq!(closed.load(Ordering::SeqCst), 4);
}

#[test]
fn header_name_and_suffix_defaults() {
    let (_, store) = memory_store();
    assert_eq!(store.header_name("x/y"), "x/y.crypto");
    assert_eq!(store.hash_algorithm(), HashAlgorithm::Md5);

    let (private_pem, public_pem) = keypair();
    let custom = CryptoStoreOptions::new(
        Some(private_pem.as_bytes().to_vec()),
        Some(public_pem.as_bytes().to_vec()),
        "hdr",
        "sha256",
    )
    .unwrap();
    let blobs = MemoryStore::new();
    let store = CryptoStore::new(blobs.clone(), custom).unwrap();
    store.write_file("f", b"x").unwrap();
    assert_eq!(blobs.names(), ["f", "f.hdr"]);
    assert_eq!(store.hash_algorithm(), HashAlgorithm::Sha256);
}

#[test]
fn missing_key_material_is_config_error() {
    let err = CryptoStoreOptions::new(None, None, "", "").unwrap_err();
    assert!(matches!(err, Error::Config(_)));

    let err = CryptoStoreOptions::new(Some(Vec::new()), Some(Vec::new()), "", "").unwrap_err();
    assert!(matches!(err, Error::Config(_)), "empty buffers count as absent");
}

#[test]
fn unknown_hash_algorithm_is_config_error() {
    let err = CryptoStore::new(MemoryStore::new(), options("whirlpool")).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");
}

#[test]
fn malformed_key_is_key_error() {
    let opts = CryptoStoreOptions::new(None, Some(b"not a pem".to_vec()), "", "").unwrap();
    let err = CryptoStore::new(MemoryStore::new(), opts).unwrap_err();
    assert!(matches!(err, Error::Key(_)), "got {err:?}");
}

#[test]
fn write_only_and_read_only_stores() {
    let (private_pem, public_pem) = keypair();
    let blobs = MemoryStore::new();

    let write_only = CryptoStore::new(
        blobs.clone(),
        CryptoStoreOptions::new(None, Some(public_pem.as_bytes().to_vec()), "", "").unwrap(),
    )
    .unwrap();
    write_only.write_file("f", b"secret").unwrap();
    assert!(matches!(write_only.open("f"), Err(Error::Config(_))));

    let read_only = CryptoStore::new(
        blobs.clone(),
        CryptoStoreOptions::new(Some(private_pem.as_bytes().to_vec()), None, "", "").unwrap(),
    )
    .unwrap();
    assert_eq!(read_only.read_file("f").unwrap(), b"secret");
    assert!(matches!(read_only.create("g"), Err(Error::Config(_))));
}

#[test]
fn wrong_private_key_cannot_open() {
    let (blobs, store) = memory_store();
    store.write_file("f", b"secret").unwrap();

    let (other_private, _) = generate_keypair(1024).unwrap();
    let other = CryptoStore::new(
        blobs,
        CryptoStoreOptions::new(Some(other_private.as_bytes().to_vec()), None, "", "").unwrap(),
    )
    .unwrap();
    assert!(matches!(other.open("f"), Err(Error::Key(_))));
}

#[test]
fn open_missing_object() {
    let (_, store) = memory_store();
    let err = store.open("nope").unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
    assert!(err.to_string().contains("nope"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn chunked_writes_roundtrip(
        plaintext in proptest::collection::vec(any::<u8>(), 0..4096),
        chunk in 1usize..512,
    ) {
        let (_, store) = memory_store();
        let mut writer = store.create("p").unwrap();
        for piece in plaintext.chunks(chunk) {
            writer.write_all(piece).unwrap();
        }
        writer.close().unwrap();

        prop_assert_eq!(store.read_file("p").unwrap(), plaintext);
    }
}
