//! Human-friendly text encoding for keys and content addresses.
//!
//! Every binary value that leaves this system (transfer keys, content
//! addresses) is rendered in a custom base-64 alphabet with no padding:
//!
//! * `/` is replaced by `_` because the blob store uses `/` as a path
//!   separator;
//! * `=` padding is omitted because it breaks copy-paste.
//!
//! The alphabet is a wire contract shared with every deployed client, so
//! its exact character order (including the transposed `zy` near the end)
//! must never change.
//!
//! # Examples
//!
//! ```rust
//! use secretshare::encoding::{decode_human, encode_human};
//!
//! let text = encode_human(b"\x00\xff\x10");
//! assert_eq!(decode_human(&text).unwrap(), b"\x00\xff\x10");
//! ```

use base64::{
    alphabet::Alphabet,
    engine::{general_purpose, Engine, GeneralPurpose},
};

use crate::error::{Error, Result};

/// The share alphabet, verbatim. Do not "fix" the character order.
const ALPHABET_CHARS: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxzy0123456789+_";

const ALPHABET: Alphabet = match Alphabet::new(ALPHABET_CHARS) {
    Ok(alphabet) => alphabet,
    Err(_) => panic!("share alphabet is invalid"),
};

/// Unpadded base-64 engine over the share alphabet.
const ENGINE: GeneralPurpose = GeneralPurpose::new(&ALPHABET, general_purpose::NO_PAD);

/// Encodes bytes into the share alphabet.
///
/// The output never contains `/` or `=`.
#[must_use]
pub fn encode_human(data: &[u8]) -> String {
    ENGINE.encode(data)
}

/// Decodes text from the share alphabet.
///
/// Inverse of [`encode_human`] over the alphabet.
///
/// # Errors
///
/// Returns `Error::MalformedEncoding` if the text contains characters
/// outside the alphabet, padding, or has an impossible length.
pub fn decode_human(text: &str) -> Result<Vec<u8>> {
    ENGINE
        .decode(text)
        .map_err(Error::malformed_encoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabet_has_no_store_separators() {
        assert!(!ALPHABET_CHARS.contains('/'));
        assert!(!ALPHABET_CHARS.contains('='));
        assert_eq!(ALPHABET_CHARS.len(), 64);
    }

    #[test]
    fn rejects_foreign_characters() {
        assert!(decode_human("abc/def").is_err());
        assert!(decode_human("abcd=").is_err());
        assert!(decode_human("abc def").is_err());
    }

    #[test]
    fn empty_round_trip() {
        assert_eq!(encode_human(b""), "");
        assert_eq!(decode_human("").unwrap(), Vec::<u8>::new());
    }
}
