//! Streaming decryption for shared files.
//!
//! Counterpart to [`crate::encrypt`]: wraps an inner byte source carrying
//! the encrypted container and presents the plaintext as a byte source.
//! The container format is described in the [`crate::encrypt`] module
//! documentation.
//!
//! # Length Discipline
//!
//! The decrypter is constructed with the declared plaintext length. It
//! recomputes the expected padding from that length and cross-checks it
//! against the padding byte carried in the stream header *before* any
//! block is decrypted; a mismatch is reported as corruption. Trimming of
//! the final block always uses the computed value, never the header byte,
//! so a flipped header byte cannot change the output.
//!
//! For small payloads whose length is not known in advance (the metadata
//! blob), [`decrypt_buffer`] decrypts a complete in-memory container and
//! trims by the header byte instead.
//!
//! # Examples
//!
//! ```rust
//! use std::io::Read;
//!
//! use secretshare::{decrypt::Decrypter, encrypt::Encrypter, key::TransferKey};
//!
//! let key = TransferKey::generate()?;
//! let plaintext = b"attack at dawn";
//!
//! let encrypter = Encrypter::new(&plaintext[..], plaintext.len() as u64, &key)?;
//! let mut decrypter = Decrypter::new(encrypter, plaintext.len() as u64, &key)?;
//!
//! let mut recovered = Vec::new();
//! decrypter.read_to_end(&mut recovered)?;
//! assert_eq!(recovered, plaintext);
//! ```

use std::io::{self, Read};

use aes::Aes256;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};

use crate::{
    encrypt::{BLOCK_SIZE, HEADER_SIZE},
    error::{Error, Result},
    key::TransferKey,
};

/// Block-chained AES-256 decryptor.
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Streaming decrypter for shared files.
///
/// Reads the inner source exactly one 16-byte block at a time, decrypts
/// in place, and streams out up to the declared plaintext length. Owned
/// by one caller at a time; dropping it drops the inner source.
pub struct Decrypter<R> {
    /// Source of ciphertext data.
    inner: R,

    /// CBC state, advanced one block at a time.
    cbc: Aes256CbcDec,

    /// Current plaintext block being streamed out.
    block: [u8; BLOCK_SIZE],

    /// Valid bytes in `block` (0 when no block is pending).
    block_len: usize,

    /// Read position within `block`.
    block_pos: usize,

    /// Whether the inner source has reported end of stream.
    inner_eof: bool,

    /// Declared plaintext length.
    message_size: u64,

    /// Plaintext bytes delivered so far.
    total_out: u64,
}

impl<R> std::fmt::Debug for Decrypter<R>
where
    R: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decrypter")
            .field("inner", &self.inner)
            .field("block_len", &self.block_len)
            .field("block_pos", &self.block_pos)
            .field("inner_eof", &self.inner_eof)
            .field("message_size", &self.message_size)
            .field("total_out", &self.total_out)
            .finish_non_exhaustive()
    }
}

impl<R> Decrypter<R>
where
    R: Read,
{
    /// Creates a decrypter over `inner`.
    ///
    /// Reads and validates the 17-byte header immediately, then pre-reads
    /// the first body block. An empty body is legal only when
    /// `message_size` is zero.
    ///
    /// # Errors
    ///
    /// * `Error::BadBlockSize` — the computed padding does not fit in a
    ///   byte (invariant check).
    /// * `Error::UnexpectedEof` — the stream ended inside the header, or
    ///   before the first body block of a non-empty message.
    /// * `Error::DataCorruption` — the header padding byte does not match
    ///   the length-derived expectation, or the first block is partial.
    pub fn new(mut inner: R, message_size: u64, key: &TransferKey) -> Result<Self> {
        let remainder = message_size % BLOCK_SIZE as u64;
        let padding_len = if remainder > 0 {
            BLOCK_SIZE as u64 - remainder
        } else {
            0
        };
        if padding_len > u64::from(u8::MAX) {
            return Err(Error::bad_block_size(format!(
                "padding length {padding_len} does not fit in the header byte"
            )));
        }

        let mut header = [0; HEADER_SIZE];
        let mut filled = 0;
        while filled < HEADER_SIZE {
            let n = inner.read(&mut header[filled..]).map_err(Error::from)?;
            if n == 0 {
                return Err(Error::unexpected_eof(format!(
                    "stream ended after {filled} of {HEADER_SIZE} header bytes"
                )));
            }
            filled += n;
        }

        if u64::from(header[0]) != padding_len {
            return Err(Error::data_corruption(format!(
                "header says {} padding bytes, expected {padding_len} for a \
                 {message_size}-byte message",
                header[0]
            )));
        }

        let cbc = Aes256CbcDec::new_from_slices(&key[..], &header[1..])
            .map_err(|e| Error::internal(e.to_string()))?;

        let mut decrypter = Self {
            inner,
            cbc,
            block: [0; BLOCK_SIZE],
            block_len: 0,
            block_pos: 0,
            inner_eof: false,
            message_size,
            total_out: 0,
        };
        decrypter.fill_block().map_err(Error::from)?;
        if decrypter.block_len == 0 && message_size > 0 {
            return Err(Error::unexpected_eof(
                "stream has no body but the message is not empty",
            ));
        }
        Ok(decrypter)
    }

    /// Reads the next ciphertext block and decrypts it in place.
    ///
    /// Partial inner reads are drained until the block holds 16 bytes. A
    /// clean end of stream between blocks is fine; an end of stream inside
    /// a block means the ciphertext was truncated.
    fn fill_block(&mut self) -> io::Result<()> {
        self.block_pos = 0;
        self.block_len = 0;

        let mut filled = 0;
        while filled < BLOCK_SIZE {
            match self.inner.read(&mut self.block[filled..]) {
                Ok(0) => {
                    self.inner_eof = true;
                    if filled == 0 {
                        return Ok(());
                    }
                    return Err(Error::data_corruption(format!(
                        "final block is {filled} bytes, not a multiple of {BLOCK_SIZE}"
                    ))
                    .into());
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        self.cbc.decrypt_block_mut((&mut self.block).into());
        self.block_len = BLOCK_SIZE;
        Ok(())
    }
}

/// Streams plaintext into the caller's buffer.
///
/// Delivers exactly the declared number of plaintext bytes (the final
/// block is trimmed by the computed padding), then reports end of stream.
impl<R> Read for Decrypter<R>
where
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.total_out == self.message_size {
            return Ok(0);
        }

        let mut written = 0;

        loop {
            let remaining = usize::try_from(self.message_size - self.total_out)
                .unwrap_or(usize::MAX);
            let available = (self.block_len - self.block_pos).min(remaining);
            if available > 0 {
                let n = available.min(buf.len() - written);
                buf[written..written + n]
                    .copy_from_slice(&self.block[self.block_pos..self.block_pos + n]);
                written += n;
                self.block_pos += n;
                self.total_out += n as u64;
            }

            if written == buf.len() || self.total_out == self.message_size {
                break;
            }
            if self.block_pos >= self.block_len {
                if self.inner_eof {
                    break;
                }
                self.fill_block()?;
                if self.block_len == 0 {
                    break;
                }
            }
        }

        if written == 0 && !self.inner_eof {
            // A well-behaved caller must never be starved.
            return Err(Error::decrypter_weird_eof("wrote zero bytes with no end of stream").into());
        }
        Ok(written)
    }
}

/// Decrypts a complete in-memory container.
///
/// One-shot variant for small payloads (the metadata blob) whose
/// plaintext length is not known in advance: the number of padding bytes
/// to trim is taken from the container header.
///
/// # Errors
///
/// * `Error::UnexpectedEof` — the buffer is shorter than the header.
/// * `Error::DataCorruption` — the padding byte is out of range, exceeds
///   the body, or the body is not a whole number of blocks.
pub fn decrypt_buffer(ciphertext: &[u8], key: &TransferKey) -> Result<Vec<u8>> {
    if ciphertext.len() < HEADER_SIZE {
        return Err(Error::unexpected_eof(format!(
            "container is {} bytes, shorter than the {HEADER_SIZE}-byte header",
            ciphertext.len()
        )));
    }

    let padding_len = usize::from(ciphertext[0]);
    if padding_len >= BLOCK_SIZE {
        return Err(Error::data_corruption(format!(
            "padding length {padding_len} exceeds the cipher block size"
        )));
    }

    let iv = &ciphertext[1..HEADER_SIZE];
    let mut body = ciphertext[HEADER_SIZE..].to_vec();
    if body.len() % BLOCK_SIZE != 0 {
        return Err(Error::data_corruption(format!(
            "body is {} bytes, not a multiple of {BLOCK_SIZE}",
            body.len()
        )));
    }
    if padding_len > body.len() {
        return Err(Error::data_corruption(
            "padding length exceeds the container body",
        ));
    }

    let cbc = Aes256CbcDec::new_from_slices(&key[..], iv)
        .map_err(|e| Error::internal(e.to_string()))?;
    cbc.decrypt_padded_mut::<NoPadding>(&mut body)
        .map_err(|e| Error::data_corruption(e.to_string()))?;

    body.truncate(body.len() - padding_len);
    Ok(body)
}
