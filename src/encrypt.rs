//! Streaming encryption for shared files.
//!
//! This module provides pull-based encryption of a byte stream:
//! * Implements `std::io::Read` over any inner `Read`
//! * Encrypts with AES-256 in CBC mode, one 16-byte block at a time
//! * Never materializes the stream in memory
//!
//! # Container Format
//!
//! The produced stream is, byte for byte:
//!
//! * offset 0: one padding-length byte `p` in `[0, 15]`
//! * offsets 1..17: the 16 random IV bytes
//! * offset 17..: CBC ciphertext of the plaintext right-padded with `p`
//!   copies of the byte value `p` (no extra block when `p == 0`)
//!
//! Total length is `17 + ceil(N / 16) * 16` for a plaintext of `N` bytes,
//! and is known before the first byte is read — see
//! [`Encrypter::total_size`] — so callers can set an HTTP Content-Length
//! for a single-shot upload.
//!
//! # Buffering
//!
//! The 17-byte header is emitted in a single `read` call; a caller whose
//! buffer is smaller gets `ShortBuffer`. Wrap the encrypter in a buffered
//! reader of at least [`HEADER_SIZE`] bytes at every call site (the
//! clients in this crate pump it with 4096-byte buffers).
//!
//! # Security
//!
//! The container carries no authentication tag; tampering inside the body
//! is not detected. This is a wire-compatibility property of the format,
//! not a recommendation.
//!
//! # Examples
//!
//! ```rust
//! use std::io::Read;
//!
//! use secretshare::{encrypt::Encrypter, key::TransferKey};
//!
//! let key = TransferKey::generate()?;
//! let plaintext = b"attack at dawn";
//!
//! let mut encrypter = Encrypter::new(&plaintext[..], plaintext.len() as u64, &key)?;
//! assert_eq!(encrypter.total_size(), 17 + 16);
//!
//! let mut ciphertext = Vec::new();
//! encrypter.read_to_end(&mut ciphertext)?;
//! assert_eq!(ciphertext.len() as u64, 17 + 16);
//! ```

use std::io::{self, Read};

use aes::Aes256;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};

use crate::{
    error::{Error, Result},
    key::TransferKey,
};

/// Cipher block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Stream header size: one padding-length byte plus the IV.
pub const HEADER_SIZE: usize = 1 + BLOCK_SIZE;

/// Block-chained AES-256 encryptor.
type Aes256CbcEnc = cbc::Encryptor<Aes256>;

/// Streaming encrypter for shared files.
///
/// Wraps an inner byte source and presents the encrypted container as a
/// byte source itself. Owned by one caller at a time; dropping it drops
/// the inner source.
pub struct Encrypter<R> {
    /// Source of plaintext data.
    inner: R,

    /// CBC state, advanced one block at a time.
    cbc: Aes256CbcEnc,

    /// The padding-length byte followed by the IV.
    header: [u8; HEADER_SIZE],

    /// Whether the header has been emitted yet.
    header_sent: bool,

    /// Number of padding bytes the final block carries.
    padding_len: u8,

    /// Current ciphertext block being streamed out.
    block: [u8; BLOCK_SIZE],

    /// Valid bytes in `block` (0 when no block is pending).
    block_len: usize,

    /// Read position within `block`.
    block_pos: usize,

    /// Whether the inner source has been fully consumed.
    done: bool,

    /// Total container size, fixed at construction.
    total_size: u64,
}

impl<R> Encrypter<R>
where
    R: Read,
{
    /// Creates an encrypter over `inner`.
    ///
    /// `message_size` is the declared plaintext length; it determines the
    /// padding length and the published [`total_size`](Self::total_size).
    ///
    /// # Errors
    ///
    /// Returns `Error::InsufficientRandomness` if the CSPRNG cannot
    /// produce the IV, or `Error::BadBlockSize` if the computed padding
    /// exceeds a byte (impossible for a 16-byte block; kept as an
    /// invariant check).
    pub fn new(inner: R, message_size: u64, key: &TransferKey) -> Result<Self> {
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
        header[0] = padding_len as u8;
        getrandom::getrandom(&mut header[1..]).map_err(Error::insufficient_randomness)?;

        let cbc = Aes256CbcEnc::new_from_slices(&key[..], &header[1..])
            .map_err(|e| Error::internal(e.to_string()))?;

        Ok(Self {
            inner,
            cbc,
            header,
            header_sent: false,
            padding_len: padding_len as u8,
            block: [0; BLOCK_SIZE],
            block_len: 0,
            block_pos: 0,
            done: false,
            total_size: HEADER_SIZE as u64 + message_size + padding_len,
        })
    }

    /// Exact size of the encrypted container in bytes.
    ///
    /// Available before any byte has been read, so callers can set an
    /// HTTP Content-Length up front.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Collects the next plaintext block and encrypts it in place.
    ///
    /// Partial inner reads are drained until the block holds 16 bytes; a
    /// block is encrypted only once it is complete. When the inner source
    /// ends mid-block, the remainder is filled with the padding value.
    /// When it ends exactly on a block boundary, no trailing block is
    /// produced.
    fn fill_block(&mut self) -> io::Result<()> {
        self.block_pos = 0;
        self.block_len = 0;

        let mut filled = 0;
        while filled < BLOCK_SIZE {
            match self.inner.read(&mut self.block[filled..]) {
                Ok(0) => {
                    self.done = true;
                    if filled == 0 {
                        return Ok(());
                    }
                    for byte in &mut self.block[filled..] {
                        *byte = self.padding_len;
                    }
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        self.cbc.encrypt_block_mut((&mut self.block).into());
        self.block_len = BLOCK_SIZE;
        Ok(())
    }
}

/// Streams the encrypted container into the caller's buffer.
///
/// The first call emits the 17-byte header; subsequent calls stream
/// ciphertext blocks. `Ok(0)` is returned only after the last ciphertext
/// byte has been delivered.
impl<R> Read for Encrypter<R>
where
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut written = 0;

        if !self.header_sent {
            if buf.len() < HEADER_SIZE {
                return Err(Error::short_buffer(format!(
                    "needed a buffer of at least {HEADER_SIZE} bytes, got {}",
                    buf.len()
                ))
                .into());
            }
            buf[..HEADER_SIZE].copy_from_slice(&self.header);
            written = HEADER_SIZE;
            self.header_sent = true;
            self.fill_block()?;
        }

        loop {
            let available = self.block_len - self.block_pos;
            if available > 0 {
                let n = available.min(buf.len() - written);
                buf[written..written + n]
                    .copy_from_slice(&self.block[self.block_pos..self.block_pos + n]);
                written += n;
                self.block_pos += n;
            }

            if written == buf.len() {
                break;
            }
            if self.block_pos == self.block_len {
                if self.done {
                    break;
                }
                self.fill_block()?;
                if self.block_len == 0 {
                    break;
                }
            }
        }

        if written == 0 && !self.done {
            // A well-behaved caller must never be starved.
            return Err(Error::encrypter_weird_eof("read zero bytes with no end of stream").into());
        }
        Ok(written)
    }
}
