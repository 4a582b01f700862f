//! Raw session keys as returned by the card
//!
//! A raw session key is `[algorithm][key bytes][checksum]`, the checksum being the
//! sum of the key bytes modulo 65536, big endian.

use pgp::composed::{PlainSessionKey, RawSessionKey};
use pgp::crypto::sym::SymmetricKeyAlgorithm;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Sum of `key` modulo 65536
pub fn checksum(key: &[u8]) -> u16 {
    key.iter()
        .fold(0u16, |sum, byte| sum.wrapping_add(u16::from(*byte)))
}

/// A validated session key
pub struct SessionKey {
    algorithm: SymmetricKeyAlgorithm,
    key: Zeroizing<Vec<u8>>,
}

impl SessionKey {
    /// Validate a raw session key
    ///
    /// Fails with [`Error::ChecksumMismatch`] when the trailing checksum does not
    /// match the key bytes. No key material is retained on failure.
    pub fn from_raw(raw: &[u8]) -> Result<Self> {
        let (&id, rest) = raw.split_first().ok_or(Error::MalformedSessionKey)?;
        if rest.len() < 2 {
            return Err(Error::MalformedSessionKey);
        }
        let (key, sum) = rest.split_at(rest.len() - 2);

        if checksum(key) != u16::from_be_bytes([sum[0], sum[1]]) {
            return Err(Error::ChecksumMismatch);
        }

        let algorithm = SymmetricKeyAlgorithm::from(id);
        if algorithm == SymmetricKeyAlgorithm::Plaintext || algorithm.key_size() == 0 {
            return Err(Error::UnsupportedAlgorithm(id));
        }
        if key.len() != algorithm.key_size() {
            return Err(Error::MalformedSessionKey);
        }

        Ok(Self {
            algorithm,
            key: Zeroizing::new(key.to_vec()),
        })
    }

    /// Symmetric algorithm the key is for
    pub const fn algorithm(&self) -> SymmetricKeyAlgorithm {
        self.algorithm
    }

    /// Key bytes
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub(crate) fn into_plain(self) -> PlainSessionKey {
        PlainSessionKey::V3_4 {
            sym_alg: self.algorithm,
            key: RawSessionKey::from(&self.key[..]),
        }
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}
