pub mod blob;
pub mod config;
pub mod error;

pub use blob::{BlobReader, BlobStore, BlobWriter};
pub use error::{Error, KeyError, Result};
