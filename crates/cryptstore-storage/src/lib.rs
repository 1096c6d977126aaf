//! cryptstore-storage: encrypted object store over pluggable blob backends
//!
//! [`CryptoStore`] pairs every data object with its header and hands out
//! streaming readers and writers. Backends implement
//! [`cryptstore_core::BlobStore`]; two ship here:
//! - [`MemoryStore`] for tests and embedding
//! - [`OpendalStore`] for local disk and S3-compatible object storage

pub mod memory;
pub mod operator;
pub mod store;

pub use memory::MemoryStore;
pub use operator::{build_fs_operator, build_s3_operator, OpendalStore, S3Config};
pub use store::{CryptoStore, CryptoStoreOptions};
