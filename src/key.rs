//! Transfer keys and content-address derivation.
//!
//! A transfer key is 32 bytes of CSPRNG output generated per send. It is
//! the sole secret of a share: it decrypts the blobs *and* names them,
//! because the blob's content address is the SHA-256 of the key rendered
//! in the share alphabet. Both sides derive the address independently;
//! the broker never sees the key.
//!
//! # Examples
//!
//! ```rust
//! use secretshare::key::TransferKey;
//!
//! let key = TransferKey::generate()?;
//!
//! // The human form round-trips through the share alphabet.
//! let parsed: TransferKey = key.to_human().parse()?;
//! assert_eq!(key, parsed);
//!
//! // Address derivation is deterministic.
//! assert_eq!(key.derive_address(), parsed.derive_address());
//! ```

use std::{fmt, ops::Deref, str::FromStr};

use sha2::{Digest, Sha256};

use crate::{
    encoding::{decode_human, encode_human},
    error::{Error, Result},
};

/// Length of transfer keys in bytes.
pub const KEY_LENGTH: usize = 32;

/// Raw key bytes.
pub type RawKey = [u8; KEY_LENGTH];

/// Validated transfer key.
///
/// Ensures keys are exactly [`KEY_LENGTH`] bytes, as required by
/// AES-256 and the address-derivation contract.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TransferKey(RawKey);

impl TransferKey {
    /// Generates a fresh key from the operating system CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns `Error::InsufficientRandomness` if the CSPRNG cannot
    /// produce the requested bytes.
    pub fn generate() -> Result<Self> {
        let mut key = RawKey::default();
        getrandom::getrandom(&mut key).map_err(Error::insufficient_randomness)?;
        Ok(Self(key))
    }

    /// Wraps raw key bytes.
    #[must_use]
    pub fn from_bytes(bytes: RawKey) -> Self {
        Self(bytes)
    }

    /// The key rendered in the share alphabet.
    ///
    /// This is the string conveyed out-of-band to the receiver.
    #[must_use]
    pub fn to_human(&self) -> String {
        encode_human(&self.0)
    }

    /// Derives the content address the blobs are stored under.
    ///
    /// The address is `encode_human(SHA-256(key))`: deterministic at both
    /// ends, and useless to anyone without the key itself.
    #[must_use]
    pub fn derive_address(&self) -> String {
        let digest = Sha256::digest(self.0);
        encode_human(&digest)
    }
}

/// Parses a key from its share-alphabet form.
///
/// # Errors
///
/// Returns `Error::MalformedEncoding` if the text is not valid in the
/// alphabet or does not decode to exactly [`KEY_LENGTH`] bytes.
impl FromStr for TransferKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = decode_human(s)?;
        let len = bytes.len();
        let raw: RawKey = bytes.try_into().map_err(|_| {
            Error::malformed_encoding(format!(
                "key decodes to {len} bytes but should be {KEY_LENGTH}"
            ))
        })?;
        Ok(Self(raw))
    }
}

/// Provides read-only access to the raw key bytes.
impl Deref for TransferKey {
    type Target = RawKey;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Displays the key in its share-alphabet form.
impl fmt::Display for TransferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_human())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        let a = TransferKey::generate().unwrap();
        let b = TransferKey::generate().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn human_form_round_trips() {
        let key = TransferKey::generate().unwrap();
        let parsed: TransferKey = key.to_human().parse().unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn rejects_wrong_length() {
        let short = encode_human(&[0u8; 16]);
        assert!(short.parse::<TransferKey>().is_err());
    }
}
