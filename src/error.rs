//! Error handling for secretshare.
//!
//! Provides a unified error type combining a transfer-taxonomy category
//! with the underlying error details.
//!
//! # Error Categories
//!
//! Errors are categorized by where in the pipeline they occur:
//! * Codec failures (corruption, sizing, starved reads)
//! * Key and address encoding failures
//! * Broker interaction failures (authentication, server errors)
//! * Blob-store transfer failures (upload/download, per direction)
//! * Local file access
//!
//! # Example
//!
//! ```rust
//! use secretshare::error::{Error, ErrorKind, Result};
//!
//! fn check(header: u8, expected: u8) -> Result<()> {
//!     if header != expected {
//!         return Err(Error::data_corruption("header padding byte mismatch"));
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;
use thiserror::Error as ThisError;

use crate::protocol::FileMetadata;

/// Main error type combining error kind and details.
///
/// Provides:
/// * Categorized error types ([`ErrorKind`])
/// * Underlying error details
/// * Conversion from common error types
/// * Round-tripping through [`std::io::Error`] for `Read` boundaries
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,

    /// Decoded file metadata, attached only to
    /// [`ErrorKind::RecvFileExists`] so the caller can prompt and retry.
    metadata: Option<Box<FileMetadata>>,
}

/// Standard result type for secretshare operations.
///
/// Wraps the standard `Result` type with our custom [`struct@Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for the transfer pipeline.
///
/// Each variant represents a distinct failure category and carries a
/// standard error message.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, ThisError, Hash, Ord, PartialEq, PartialOrd)]
pub enum ErrorKind {
    /// CSPRNG produced fewer bytes than requested for a key or IV.
    #[error("Not enough randomness available")]
    InsufficientRandomness,

    /// Invariant check on padding/block sizing failed.
    #[error("Invalid cipher block sizing")]
    BadBlockSize,

    /// Codec caller supplied a read buffer smaller than the stream header.
    #[error("Read buffer too small for stream header")]
    ShortBuffer,

    /// Inner source ended before a header or full final block.
    #[error("Stream ended unexpectedly")]
    UnexpectedEof,

    /// Ciphertext does not match its length-derived expectations.
    #[error("Encrypted data is corrupt")]
    DataCorruption,

    /// Encrypter produced zero bytes without end of stream.
    #[error("Encrypter read zero bytes with no end of stream")]
    EncrypterWeirdEof,

    /// Decrypter produced zero bytes without end of stream.
    #[error("Decrypter wrote zero bytes with no end of stream")]
    DecrypterWeirdEof,

    /// Text-form key or address is not valid in the share alphabet.
    #[error("Text is not a valid key or ID encoding")]
    MalformedEncoding,

    /// Broker rejected the shared authorization secret.
    #[error("Authentication failed; refresh your auth key with `secretshare config`")]
    Unauthorized,

    /// Broker returned a 5xx, an empty body, or an unexpected status.
    #[error("The secretshare server encountered an error")]
    ServerError,

    /// Network-level failure reaching the broker or the blob store.
    #[error("Connection failed")]
    ConnectionFailed,

    /// Blob store rejected the ciphertext upload.
    #[error("Failed to upload file data")]
    DataUploadFailed,

    /// Blob store rejected the metadata upload.
    #[error("Failed to upload file metadata")]
    MetadataUploadFailed,

    /// Blob store refused the metadata download.
    #[error("Failed to download file metadata")]
    MetadataDownloadFailed,

    /// Blob store refused the ciphertext download.
    #[error("Failed to download file data")]
    DataDownloadFailed,

    /// Decrypted metadata did not parse as JSON.
    #[error("Received malformed file metadata")]
    MalformedMetadata,

    /// Destination file exists and overwrite was not requested.
    #[error("Destination file already exists")]
    RecvFileExists,

    /// Cipher initialization or final write failed on the receive path.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Local file could not be opened, read, or created.
    #[error("File access failed")]
    FileAccess,

    /// Internal error that should not occur during normal operation.
    #[error("Internal error")]
    Internal,
}

impl Error {
    /// Creates a new error with specified kind and details.
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
            metadata: None,
        }
    }

    /// Attempts to downcast the underlying error to a concrete type.
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }

    /// File metadata attached to a [`ErrorKind::RecvFileExists`] error.
    ///
    /// `None` for every other kind.
    #[must_use]
    pub fn metadata(&self) -> Option<&FileMetadata> {
        self.metadata.as_deref()
    }

    /// Creates an error for a CSPRNG short read.
    pub fn insufficient_randomness<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InsufficientRandomness, error)
    }

    /// Creates an error for invalid padding or block sizing.
    pub fn bad_block_size<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::BadBlockSize, error)
    }

    /// Creates an error for a read buffer too small for the header.
    ///
    /// Callers avoid this by wrapping the codec in a buffered reader of at
    /// least header size; see the codec module documentation.
    pub fn short_buffer<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::ShortBuffer, error)
    }

    /// Creates an error for a source that ended before expected.
    pub fn unexpected_eof<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::UnexpectedEof, error)
    }

    /// Creates an error for corrupt ciphertext.
    pub fn data_corruption<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DataCorruption, error)
    }

    /// Creates an error for an encrypter that starved its caller.
    pub fn encrypter_weird_eof<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::EncrypterWeirdEof, error)
    }

    /// Creates an error for a decrypter that starved its caller.
    pub fn decrypter_weird_eof<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DecrypterWeirdEof, error)
    }

    /// Creates an error for text outside the share alphabet.
    pub fn malformed_encoding<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::MalformedEncoding, error)
    }

    /// Creates an error for a rejected authorization secret.
    pub fn unauthorized<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unauthorized, error)
    }

    /// Creates an error for a broker-side failure.
    pub fn server_error<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::ServerError, error)
    }

    /// Creates an error for a network-level failure.
    pub fn connection_failed<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::ConnectionFailed, error)
    }

    /// Creates an error for a failed ciphertext upload.
    pub fn data_upload_failed<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DataUploadFailed, error)
    }

    /// Creates an error for a failed metadata upload.
    pub fn metadata_upload_failed<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::MetadataUploadFailed, error)
    }

    /// Creates an error for a failed metadata download.
    pub fn metadata_download_failed<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::MetadataDownloadFailed, error)
    }

    /// Creates an error for a failed ciphertext download.
    pub fn data_download_failed<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DataDownloadFailed, error)
    }

    /// Creates an error for unparseable decrypted metadata.
    pub fn malformed_metadata<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::MalformedMetadata, error)
    }

    /// Creates an error for an existing destination file.
    ///
    /// Carries the decoded [`FileMetadata`] so the caller can show the
    /// remote file details and retry with overwrite enabled.
    pub fn recv_file_exists<E>(error: E, metadata: FileMetadata) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind: ErrorKind::RecvFileExists,
            error: error.into(),
            metadata: Some(Box::new(metadata)),
        }
    }

    /// Creates an error for a receive-path decryption failure.
    pub fn decryption_failed<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DecryptionFailed, error)
    }

    /// Creates an error for a local file access failure.
    pub fn file_access<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::FileAccess, error)
    }

    /// Creates an error for internal errors.
    pub fn internal<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Internal, error)
    }
}

impl std::error::Error for Error {
    /// Returns the underlying error source.
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

impl fmt::Display for Error {
    /// Formats the error for display, showing both kind and details.
    ///
    /// Format: "{kind}: {details}"
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

impl From<std::io::Error> for Error {
    /// Converts IO errors into appropriate error kinds.
    ///
    /// A codec error that crossed a `Read` boundary wrapped in an
    /// `io::Error` is unwrapped back to the original; plain IO errors are
    /// mapped by their IO kind.
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        let err = match err.downcast::<Self>() {
            Ok(inner) => return inner,
            Err(err) => err,
        };
        match err.kind() {
            UnexpectedEof => Self::unexpected_eof(err),
            AddrNotAvailable | BrokenPipe | ConnectionAborted | ConnectionRefused
            | ConnectionReset | NotConnected | TimedOut => Self::connection_failed(err),
            NotFound | PermissionDenied | AlreadyExists => Self::file_access(err),
            InvalidData => Self::data_corruption(err),
            _ => Self::internal(err),
        }
    }
}

impl From<Error> for std::io::Error {
    /// Wraps a secretshare error so it can cross `std::io::Read` seams.
    ///
    /// [`From<std::io::Error>`] recovers the original on the way back out.
    fn from(err: Error) -> Self {
        use ErrorKind::*;
        let kind = match err.kind {
            UnexpectedEof => std::io::ErrorKind::UnexpectedEof,
            ShortBuffer => std::io::ErrorKind::InvalidInput,
            DataCorruption | EncrypterWeirdEof | DecrypterWeirdEof | BadBlockSize => {
                std::io::ErrorKind::InvalidData
            }
            _ => std::io::ErrorKind::Other,
        };
        Self::new(kind, err)
    }
}

impl From<reqwest::Error> for Error {
    /// Converts HTTP client errors into appropriate error kinds.
    ///
    /// Connection-level failures map to `ConnectionFailed`; everything else
    /// is treated as a server-side problem.
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_redirect() {
            return Self::connection_failed(err);
        }

        if err.is_builder() {
            return Self::internal(err);
        }

        Self::server_error(err)
    }
}

impl From<url::ParseError> for Error {
    /// Converts URL parsing errors to `Internal`.
    fn from(e: url::ParseError) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    /// Converts invalid header errors to `Internal`.
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for Error {
    /// Converts invalid header-name errors to `Internal`.
    fn from(e: http::header::InvalidHeaderName) -> Self {
        Self::internal(e.to_string())
    }
}
