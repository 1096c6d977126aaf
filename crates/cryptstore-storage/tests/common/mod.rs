//! Shared fixtures for the storage integration tests.

#![allow(dead_code)]

use std::sync::OnceLock;

use cryptstore_core::BlobStore;
use cryptstore_crypto::cipher::StreamEncryptor;
use cryptstore_crypto::{
    generate_key, generate_keypair, legacy, HashAlgorithm, Header, RecipientKey,
};
use cryptstore_storage::{CryptoStore, CryptoStoreOptions, MemoryStore};

/// (private PEM, public PEM), generated once per test binary.
pub fn keypair() -> &'static (String, String) {
    static PAIR: OnceLock<(String, String)> = OnceLock::new();
    PAIR.get_or_init(|| {
        let (private_pem, public_pem) = generate_keypair(1024).expect("keypair");
        (private_pem.as_str().to_owned(), public_pem)
    })
}

pub fn options(hash: &str) -> CryptoStoreOptions {
    let (private_pem, public_pem) = keypair();
    CryptoStoreOptions::new(
        Some(private_pem.as_bytes().to_vec()),
        Some(public_pem.as_bytes().to_vec()),
        "",
        hash,
    )
    .expect("options")
}

pub fn crypto_store<S: BlobStore>(blobs: S, hash: &str) -> CryptoStore<S> {
    CryptoStore::new(blobs, options(hash)).expect("crypto store")
}

/// A memory-backed crypto store plus a handle on the raw objects.
pub fn memory_store() -> (MemoryStore, CryptoStore<MemoryStore>) {
    let blobs = MemoryStore::new();
    let store = crypto_store(blobs.clone(), "md5");
    (blobs, store)
}

/// Build a data object in the legacy layout: binary header then ciphertext.
pub fn legacy_object(alg: HashAlgorithm, plaintext: &[u8]) -> Vec<u8> {
    let recipient = RecipientKey::from_pem(keypair().1.as_bytes()).expect("recipient");
    let (file_key, iv) = generate_key().expect("file key");
    let wrapped_key = recipient.wrap(&file_key).expect("wrap");

    let mut hash = alg.hasher();
    hash.update(plaintext);
    let header = Header::from_parts(hash.digest(), alg, wrapped_key, iv.to_vec()).expect("header");

    let mut ciphertext = plaintext.to_vec();
    StreamEncryptor::new(&file_key, &iv)
        .expect("cipher")
        .apply(&mut ciphertext);

    let mut object = legacy::encode(&header).expect("encode");
    object.extend_from_slice(&ciphertext);
    object
}

pub fn sample_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i.wrapping_mul(31) ^ (i >> 5)) as u8).collect()
}
