//! CryptoStore over OpenDAL's fs service in a temporary directory.
//!
//! The store is synchronous, so every test drives it from the test thread
//! with a runtime it owns.

mod common;

use std::io::Read;

use cryptstore_core::BlobStore;
use cryptstore_crypto::{HashAlgorithm, HeaderVersion};
use cryptstore_storage::{build_fs_operator, CryptoStore, OpendalStore};
use tempfile::TempDir;

use common::{crypto_store, legacy_object, sample_data};

struct Fixture {
    store: CryptoStore<OpendalStore>,
    dir: TempDir,
    _rt: tokio::runtime::Runtime,
}

fn fixture() -> Fixture {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let dir = TempDir::new().expect("tempdir");
    let op = build_fs_operator(&dir.path().to_string_lossy()).expect("fs operator");
    let store = crypto_store(OpendalStore::new(op, rt.handle().clone()), "sha256");
    Fixture {
        store,
        dir,
        _rt: rt,
    }
}

#[test]
fn fs_roundtrip_writes_data_and_sidecar_files() {
    let fx = fixture();
    let plaintext = sample_data(700_000);

    fx.store.write_file("docs/report.pdf", &plaintext).unwrap();

    let data_path = fx.dir.path().join("docs/report.pdf");
    let header_path = fx.dir.path().join("docs/report.pdf.crypto");
    assert_eq!(
        std::fs::metadata(&data_path).unwrap().len(),
        plaintext.len() as u64
    );
    assert_ne!(std::fs::read(&data_path).unwrap(), plaintext);
    let header_json = std::fs::read_to_string(&header_path).unwrap();
    assert!(header_json.contains("\"hash_type\":\"sha256\""), "{header_json}");

    assert_eq!(fx.store.read_file("docs/report.pdf").unwrap(), plaintext);
}

#[test]
fn fs_reads_legacy_file_placed_on_disk() {
    let fx = fixture();
    let plaintext = sample_data(300_000);
    std::fs::write(
        fx.dir.path().join("archive.dat"),
        legacy_object(HashAlgorithm::Md5, &plaintext),
    )
    .unwrap();

    let mut reader = fx.store.open("archive.dat").unwrap();
    assert_eq!(reader.header_version(), HeaderVersion::Legacy);
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    assert_eq!(out, plaintext);
    reader.check_sum().unwrap();
    reader.close().unwrap();
}

#[test]
fn fs_rename_moves_pair() {
    let fx = fixture();
    fx.store.write_file("a.txt", b"move me").unwrap();

    fx.store.rename("a.txt", "sub/b.txt").unwrap();

    assert!(!fx.dir.path().join("a.txt").exists());
    assert!(!fx.dir.path().join("a.txt.crypto").exists());
    assert!(fx.dir.path().join("sub/b.txt").exists());
    assert!(fx.dir.path().join("sub/b.txt.crypto").exists());
    assert_eq!(fx.store.read_file("sub/b.txt").unwrap(), b"move me");
}

#[test]
fn fs_tamper_on_disk_is_detected() {
    let fx = fixture();
    fx.store.write_file("t", &sample_data(4_096)).unwrap();

    let path = fx.dir.path().join("t");
    let mut data = std::fs::read(&path).unwrap();
    data[4_000] ^= 0x01;
    std::fs::write(&path, data).unwrap();

    assert!(matches!(
        fx.store.read_file("t"),
        Err(cryptstore_core::Error::IntegrityMismatch { .. })
    ));
}

#[test]
fn fs_exists_passthrough() {
    let fx = fixture();
    assert!(!fx.store.file_exists("x").unwrap());
    fx.store.write_file("x", b"1").unwrap();
    assert!(fx.store.file_exists("x").unwrap());
    assert!(fx.store.inner().exists("x.crypto").unwrap());
    fx.store.close().unwrap();
}
