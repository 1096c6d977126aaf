//! Legacy binary header, embedded at the front of the data object
//!
//! ```text
//! offset 0          : 16-byte magic "Encrypted&Hashed"
//! offset 16         : u8  hash digest length
//! offset 17         : u16 wrapped key length (little-endian)
//! offset 19         : u8  iv length
//! offset 20         : 64-byte hash slot (first `hash length` bytes meaningful)
//! offset 84         : wrapped key
//! offset 84 + wkLen : iv
//! ```
//!
//! A zero digest length marks a write that never finished. Objects in this
//! layout are read-only: new objects always get a sidecar header.

use std::io::{self, Read};

use cryptstore_core::{Error, Result};

use crate::hash::HashAlgorithm;
use crate::header::{check_size, Header};
use crate::MAX_HASH_SIZE;

pub const MAGIC_V1: &[u8; 16] = b"Encrypted&Hashed";

/// Reserved for a tagged variant that was never shipped. Nothing decodes it.
pub const MAGIC_V2: &[u8; 16] = b"EncryptVersion-2";

pub const MAGIC_SIZE: usize = MAGIC_V1.len();

/// hash length (1) + wrapped key length (2) + iv length (1)
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Bytes before the variable-length fields.
pub const FIXED_SIZE: usize = MAGIC_SIZE + LENGTH_PREFIX_SIZE + MAX_HASH_SIZE;

/// Total encoded size of `header`.
pub fn encoded_len(header: &Header) -> usize {
    FIXED_SIZE + header.wrapped_key().len() + header.iv().len()
}

/// Serialize into the legacy layout in a single buffer.
///
/// The length fields are narrower than the header ceilings, so an IV over
/// 255 bytes or a wrapped key over 65535 bytes cannot be represented.
pub fn encode(header: &Header) -> Result<Vec<u8>> {
    let hash = header.hash();
    let wrapped_key = header.wrapped_key();
    let iv = header.iv();
    check_size("wrapped key", wrapped_key.len(), u16::MAX as usize)?;
    check_size("iv", iv.len(), u8::MAX as usize)?;

    let mut buf = vec![0u8; encoded_len(header)];
    buf[..MAGIC_SIZE].copy_from_slice(MAGIC_V1);
    buf[MAGIC_SIZE] = hash.len() as u8;
    buf[MAGIC_SIZE + 1..MAGIC_SIZE + 3].copy_from_slice(&(wrapped_key.len() as u16).to_le_bytes());
    buf[MAGIC_SIZE + 3] = iv.len() as u8;

    let mut offset = MAGIC_SIZE + LENGTH_PREFIX_SIZE;
    buf[offset..offset + hash.len()].copy_from_slice(hash);
    offset += MAX_HASH_SIZE;
    buf[offset..offset + wrapped_key.len()].copy_from_slice(wrapped_key);
    offset += wrapped_key.len();
    buf[offset..offset + iv.len()].copy_from_slice(iv);

    Ok(buf)
}

/// Decode a header from the start of `buf`. Trailing bytes are ignored.
pub fn decode(mut buf: &[u8]) -> Result<Header> {
    read_from(&mut buf)
}

/// Decode a header from a stream, leaving it positioned at the first
/// ciphertext byte.
pub fn read_from<R: Read + ?Sized>(r: &mut R) -> Result<Header> {
    let mut magic = [0u8; MAGIC_SIZE];
    read_exact(r, &mut magic, "magic")?;
    if &magic != MAGIC_V1 {
        return Err(Error::format(format!(
            "invalid file: bad header magic {:?}",
            String::from_utf8_lossy(&magic)
        )));
    }

    let mut lengths = [0u8; LENGTH_PREFIX_SIZE];
    read_exact(r, &mut lengths, "length prefix")?;
    let hash_len = lengths[0] as usize;
    let enc_key_len = u16::from_le_bytes([lengths[1], lengths[2]]) as usize;
    let iv_len = lengths[3] as usize;

    if hash_len == 0 {
        return Err(Error::format(
            "header hash digest is empty: encryption was not finalized",
        ));
    }
    check_size("hash digest", hash_len, MAX_HASH_SIZE)?;

    let mut body = vec![0u8; MAX_HASH_SIZE + enc_key_len + iv_len];
    read_exact(r, &mut body, "header body")?;

    let hash = body[..hash_len].to_vec();
    let wrapped_key = body[MAX_HASH_SIZE..MAX_HASH_SIZE + enc_key_len].to_vec();
    let iv = body[MAX_HASH_SIZE + enc_key_len..].to_vec();

    let hash_algorithm = HashAlgorithm::from_digest_len(hash_len).ok_or_else(|| {
        Error::format(format!(
            "cannot infer hash algorithm from a {hash_len}-byte digest"
        ))
    })?;

    Header::from_parts(hash, hash_algorithm, wrapped_key, iv)
}

fn read_exact<R: Read + ?Sized>(r: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::format(format!("truncated header: missing {what}")),
        _ => Error::io(format!("reading legacy header {what}"), e),
    })
}
