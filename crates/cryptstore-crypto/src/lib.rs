//! cryptstore-crypto: per-object encryption and integrity for blob stores
//!
//! Each object is encrypted with its own random AES-128 key under
//! full-block CFB. The key is RSA-wrapped for a recipient and recorded in a
//! header next to the IV and a digest of the plaintext.
//!
//! Two header encodings exist:
//! ```text
//! legacy  : binary record at the start of the data object   (read only)
//! current : JSON record in a "<name>.<suffix>" sidecar object (read/write)
//! ```

pub mod cipher;
pub mod hash;
pub mod header;
pub mod keys;
pub mod legacy;
pub mod reader;
pub mod sidecar;
pub mod writer;

pub use hash::{HashAlgorithm, RunningHash};
pub use header::{Header, HeaderVersion};
pub use keys::{
    generate_key, generate_keypair, unwrap_key, wrap_key, FileKey, IdentityKey, RecipientKey,
};
pub use reader::CryptoReader;
pub use writer::CryptoWriter;

/// Size of a per-file AES-128 key in bytes
pub const KEY_SIZE: usize = 16;

/// Size of the CFB initialization vector (one AES block)
pub const IV_SIZE: usize = 16;

/// Ceiling on a stored hash digest; also the width of the legacy hash slot
pub const MAX_HASH_SIZE: usize = 64;

/// Ceiling on a stored wrapped key
pub const MAX_ENC_KEY_SIZE: usize = 1 << 16;

/// Ceiling on a stored IV
pub const MAX_IV_SIZE: usize = 1 << 8;
