//! Digest helpers over JSON encoded payloads.

use crate::error::CoreError;
use md5::Md5;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

static MD5_HEX_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[a-fA-F0-9]{32}$").unwrap()
});

static SHA256_HEX_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[a-fA-F0-9]{64}$").unwrap()
});

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HashAlgo {
    Md5,
    #[default]
    Sha256,
}

impl HashAlgo {
    /// Hex digest of raw bytes.
    #[must_use]
    pub fn digest_hex(self, data: impl AsRef<[u8]>) -> String {
        match self {
            Self::Md5 => hex::encode(Md5::digest(data.as_ref())),
            Self::Sha256 => hex::encode(Sha256::digest(data.as_ref())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Hasher;

impl Hasher {
    #[must_use]
    pub fn is_formatted_md5(value: &str) -> bool {
        MD5_HEX_RE.is_match(value)
    }

    #[must_use]
    pub fn is_formatted_sha256(value: &str) -> bool {
        SHA256_HEX_RE.is_match(value)
    }

    /// MD5 hex digest of the compact JSON encoding of `payload`.
    pub fn md5_hex<T: Serialize + ?Sized>(payload: &T) -> Result<String, CoreError> {
        Ok(HashAlgo::Md5.digest_hex(serde_json::to_vec(payload)?))
    }

    /// SHA-256 hex digest of the compact JSON encoding of `payload`.
    pub fn sha256_hex<T: Serialize + ?Sized>(payload: &T) -> Result<String, CoreError> {
        Ok(HashAlgo::Sha256.digest_hex(serde_json::to_vec(payload)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_digests() {
        assert_eq!(HashAlgo::Md5.digest_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            HashAlgo::Sha256.digest_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_payload_hashes_are_formatted() {
        let payload = json!({"user": "alice", "roles": ["admin"]});
        let md5 = Hasher::md5_hex(&payload).unwrap();
        let sha = Hasher::sha256_hex(&payload).unwrap();

        assert!(Hasher::is_formatted_md5(&md5));
        assert!(Hasher::is_formatted_sha256(&sha));
        assert!(!Hasher::is_formatted_md5(&sha));
        assert!(!Hasher::is_formatted_sha256("xyz"));
        assert_eq!(md5, Hasher::md5_hex(&payload).unwrap());
    }
}
