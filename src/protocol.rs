//! Wire types for the broker API and the encrypted file metadata.
//!
//! This module defines the request/response shapes exchanged with the
//! broker and the metadata document that travels beside every ciphertext
//! blob.
//!
//! # Wire Format
//!
//! `POST /upload` request:
//! ```json
//! {
//!     "ttl": 240,
//!     "secret_key": "shared auth secret",
//!     "object_id": "content address"
//! }
//! ```
//!
//! `POST /upload` response:
//! ```json
//! {
//!     "put_url": "https://...",
//!     "headers": {"Content-Type": ["application/octet-stream"]},
//!     "meta_put_url": "https://...",
//!     "meta_headers": {"Content-Type": ["application/octet-stream"]}
//! }
//! ```
//!
//! `GET /version` response:
//! ```json
//! {
//!     "server_version": 3,
//!     "api_version": 2,
//!     "server_source_location": "https://..."
//! }
//! ```
//!
//! Errors: `{"message": "..."}` with an HTTP status >= 400. Every broker
//! response additionally carries a `Secretshare-ReqId` header.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Protocol generation spoken by client and broker.
///
/// Generation 2 derives the object ID from the transfer key on the client;
/// earlier generations had the broker mint a random ID.
pub const API_VERSION: u32 = 2;

/// Broker implementation revision, reported by `GET /version`.
pub const SERVER_VERSION: u32 = 3;

/// Where the broker's source code lives.
///
/// Reported by `GET /version` so operators of a public broker can satisfy
/// source-disclosure obligations.
pub const SERVER_SOURCE_LOCATION: &str = env!("CARGO_PKG_REPOSITORY");

/// Response header carrying the per-request correlation identifier.
///
/// The value is 16 characters drawn from `[A-Za-z0-9]`. Clients echo it in
/// error messages so operators can match client reports to broker logs.
pub const REQUEST_ID_HEADER: &str = "Secretshare-ReqId";

/// HTTP headers as a name to ordered-values mapping.
///
/// Presigned URLs are only valid when the signed headers are replayed
/// verbatim, including multi-valued entries, so the map preserves every
/// value in order.
pub type Headers = HashMap<String, Vec<String>>;

/// Upload authorization request sent by the client to the broker.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct UploadRequest {
    /// Requested blob lifetime in minutes.
    ///
    /// Values `<= 0` ask for the broker default.
    pub ttl: i64,

    /// Shared authorization secret.
    pub secret_key: String,

    /// Content address the ciphertext will be stored under.
    pub object_id: String,
}

/// Upload authorization response returned by the broker.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct UploadResponse {
    /// Presigned PUT URL for the ciphertext blob.
    pub put_url: String,

    /// Headers that must accompany the ciphertext PUT.
    pub headers: Headers,

    /// Presigned PUT URL for the metadata blob.
    pub meta_put_url: String,

    /// Headers that must accompany the metadata PUT.
    pub meta_headers: Headers,
}

/// Error body returned by the broker for any HTTP status >= 400.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ErrorResponse {
    /// Human-readable description of the failure.
    pub message: String,
}

/// Payload of the unauthenticated `GET /version` endpoint.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct VersionResponse {
    /// Broker implementation revision.
    pub server_version: u32,

    /// Protocol generation; see [`API_VERSION`].
    pub api_version: u32,

    /// URL of the broker's source code.
    pub server_source_location: String,
}

/// Description of a shared file, stored encrypted beside the ciphertext.
///
/// Serialized as compact JSON, encrypted with the transfer key, and
/// uploaded to the `meta/` sibling of the data blob. The receiver decrypts
/// it first to learn the plaintext length before streaming the data blob.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct FileMetadata {
    /// Base name the file was shared under.
    pub filename: String,

    /// Plaintext size in bytes.
    pub filesize: u64,
}
