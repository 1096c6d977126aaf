//! Current header encoding: a JSON record stored as the whole content of the
//! `<name>.<suffix>` sidecar object.
//!
//! ```json
//! {"hash":"<base64>","hash_type":"md5","enc_key":"<base64>","iv":"<base64>"}
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use cryptstore_core::{Error, Result};

use crate::hash::HashAlgorithm;
use crate::header::Header;

/// Wire shape of the sidecar. Byte fields may be `null` in records written
/// before the digest existed.
#[derive(Debug, Serialize, Deserialize)]
struct HeaderRecord {
    #[serde(default)]
    hash: Option<String>,
    hash_type: String,
    #[serde(default)]
    enc_key: Option<String>,
    #[serde(default)]
    iv: Option<String>,
}

pub fn encode(header: &Header) -> Result<Vec<u8>> {
    let record = HeaderRecord {
        hash: Some(STANDARD.encode(header.hash())),
        hash_type: header.hash_algorithm().as_str().to_string(),
        enc_key: Some(STANDARD.encode(header.wrapped_key())),
        iv: Some(STANDARD.encode(header.iv())),
    };
    serde_json::to_vec(&record).map_err(|e| Error::format(format!("header serialization: {e}")))
}

pub fn decode(data: &[u8]) -> Result<Header> {
    let record: HeaderRecord = serde_json::from_slice(data)
        .map_err(|e| Error::format(format!("header deserialization: {e}")))?;

    let hash_algorithm: HashAlgorithm = record.hash_type.parse()?;
    let hash = decode_field(record.hash.as_deref(), "hash")?;
    let wrapped_key = decode_field(record.enc_key.as_deref(), "enc_key")?;
    let iv = decode_field(record.iv.as_deref(), "iv")?;

    if hash.is_empty() {
        return Err(Error::format(
            "header hash digest is empty: encryption was not finalized",
        ));
    }
    if hash.len() != hash_algorithm.digest_size() {
        return Err(Error::format(format!(
            "{}-byte digest does not match hash_type {hash_algorithm}",
            hash.len()
        )));
    }

    Header::from_parts(hash, hash_algorithm, wrapped_key, iv)
}

fn decode_field(value: Option<&str>, field: &str) -> Result<Vec<u8>> {
    match value {
        None => Ok(Vec::new()),
        Some(s) => STANDARD
            .decode(s)
            .map_err(|e| Error::format(format!("header field {field}: base64 decode: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finalized(alg: HashAlgorithm) -> Header {
        let mut h = Header::new(alg, vec![0x11; 128], vec![0x22; 16]).unwrap();
        h.finalize(vec![0x33; alg.digest_size()]).unwrap();
        h
    }

    #[test]
    fn test_roundtrip_all_algorithms() {
        for alg in HashAlgorithm::ALL {
            let h = finalized(alg);
            assert_eq!(decode(&encode(&h).unwrap()).unwrap(), h);
        }
    }

    #[test]
    fn test_field_names() {
        let json: serde_json::Value =
            serde_json::from_slice(&encode(&finalized(HashAlgorithm::Sha1)).unwrap()).unwrap();
        let obj = json.as_object().unwrap();
        let mut keys: Vec<_> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["enc_key", "hash", "hash_type", "iv"]);
        assert_eq!(obj["hash_type"], "sha1");
        assert_eq!(obj["iv"], STANDARD.encode([0x22; 16]));
    }

    #[test]
    fn test_decodes_externally_written_record() {
        // Field order and spacing differ from what `encode` produces
        let data = br#"{ "iv": "AAECAwQFBgcICQoLDA0ODw==", "enc_key": "q6ur",
                         "hash_type": "crc32", "hash": "DUoRhQ==" }"#;
        let h = decode(data).unwrap();
        assert_eq!(h.hash(), &[0x0d, 0x4a, 0x11, 0x85]);
        assert_eq!(h.hash_algorithm(), HashAlgorithm::Crc32);
        assert_eq!(h.wrapped_key(), &[0xab, 0xab, 0xab]);
        assert_eq!(h.iv(), (0u8..16).collect::<Vec<_>>().as_slice());
    }

    #[test]
    fn test_malformed_json() {
        for data in [&b""[..], b"{", b"[]", b"{\"hash\": 5}"] {
            assert!(matches!(decode(data), Err(Error::Format(_))), "{data:?}");
        }
    }

    #[test]
    fn test_bad_base64() {
        let data = br#"{"hash":"!!!","hash_type":"md5","enc_key":"","iv":""}"#;
        let err = decode(data).unwrap_err();
        assert!(err.to_string().contains("hash"), "{err}");
    }

    #[test]
    fn test_unknown_hash_type_is_config_error() {
        let data = br#"{"hash":"AAAA","hash_type":"whirlpool","enc_key":"","iv":""}"#;
        assert!(matches!(decode(data), Err(Error::Config(_))));
    }

    #[test]
    fn test_null_hash_is_unfinalized() {
        let data = br#"{"hash":null,"hash_type":"md5","enc_key":"q6ur","iv":"q6ur"}"#;
        let err = decode(data).unwrap_err();
        assert!(err.to_string().contains("not finalized"), "{err}");
    }

    #[test]
    fn test_digest_length_must_match_algorithm() {
        let mut h = Header::new(HashAlgorithm::Sha256, vec![1; 8], vec![2; 16]).unwrap();
        h.finalize(vec![3; 16]).unwrap();
        assert!(matches!(decode(&encode(&h).unwrap()), Err(Error::Format(_))));
    }

    #[test]
    fn test_oversized_iv_rejected() {
        let data = format!(
            r#"{{"hash":"{}","hash_type":"md5","enc_key":"","iv":"{}"}}"#,
            STANDARD.encode([1u8; 16]),
            STANDARD.encode([0u8; 300])
        );
        assert!(matches!(
            decode(data.as_bytes()),
            Err(Error::SizeLimitExceeded { field: "iv", .. })
        ));
    }
}
