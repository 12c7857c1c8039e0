//! Client-side transfer orchestration.
//!
//! This module drives the two halves of a share:
//!
//! * **Send**: ask the broker for presigned PUT URLs, then pipe the file
//!   through the streaming encrypter into an HTTP PUT, followed by the
//!   encrypted metadata document.
//! * **Receive**: download and decrypt the metadata to learn the filename
//!   and plaintext length, then stream the data blob through the
//!   decrypter into the destination file.
//!
//! The codec is synchronous and pull-based; it runs on blocking worker
//! threads bridged to the async HTTP bodies with bounded channels, so no
//! transfer is ever materialized in memory.
//!
//! # Example
//!
//! ```rust
//! use secretshare::client::Client;
//!
//! let client = Client::new(
//!     "https://broker.example.com",
//!     "shares",
//!     "us-west-1",
//!     "shared auth secret",
//! )?;
//!
//! let receipt = client.send("notes.txt".as_ref(), 240, None).await?;
//! println!("give the receiver this key: {}", receipt.key);
//! ```

use std::{
    ffi::OsStr,
    fs,
    io::{self, Cursor, Read},
    path::Path,
    time::Duration,
};

use futures_util::StreamExt;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE},
    StatusCode,
};
use tokio::sync::mpsc;
use tokio_util::io::{StreamReader, SyncIoBridge};
use url::Url;

use crate::{
    decrypt::{decrypt_buffer, Decrypter},
    encrypt::Encrypter,
    error::{Error, ErrorKind, Result},
    http,
    key::TransferKey,
    progress::{CountingReader, SharedSink},
    protocol::{
        FileMetadata, Headers, UploadRequest, UploadResponse, VersionResponse, REQUEST_ID_HEADER,
    },
};

/// Time budget for a broker call.
///
/// Broker calls are small JSON exchanges; a broker that does not answer
/// within this window is treated like a failed server.
const BROKER_TIMEOUT: Duration = Duration::from_secs(30);

/// Chunk size used to pump the encrypter into the upload body.
///
/// Comfortably above the codec's 17-byte header requirement.
const UPLOAD_CHUNK_SIZE: usize = 4096;

/// Bound on in-flight upload chunks between the codec worker and HTTP.
const UPLOAD_CHANNEL_CAPACITY: usize = 16;

/// Outcome of a successful send.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SendReceipt {
    /// The transfer key in its share-alphabet form, to be conveyed
    /// out-of-band to the receiver.
    pub key: String,

    /// The content address the blobs were stored under.
    pub object_id: String,
}

/// Client for sending and receiving shares.
pub struct Client {
    /// HTTP client shared by broker and blob-store traffic.
    http: http::Client,

    /// Broker base URL, no trailing slash.
    endpoint: String,

    /// Bucket the broker serves.
    bucket: String,

    /// Blob-store base URL, no trailing slash.
    store_base: String,

    /// Shared authorization secret presented to the broker.
    auth_key: String,
}

impl Client {
    /// Creates a client for the given broker and bucket.
    ///
    /// The blob-store base URL is derived from the bucket region; use
    /// [`with_store_base`](Self::with_store_base) to point at a
    /// non-default store.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid URL or the HTTP
    /// client cannot be constructed.
    pub fn new(endpoint: &str, bucket: &str, bucket_region: &str, auth_key: &str) -> Result<Self> {
        let endpoint = endpoint.trim_end_matches('/');
        Url::parse(endpoint)?;

        Ok(Self {
            http: http::Client::new()?,
            endpoint: endpoint.to_string(),
            bucket: bucket.to_string(),
            store_base: format!("https://s3-{bucket_region}.amazonaws.com"),
            auth_key: auth_key.to_string(),
        })
    }

    /// Overrides the blob-store base URL.
    #[must_use]
    pub fn with_store_base(mut self, store_base: &str) -> Self {
        self.store_base = store_base.trim_end_matches('/').to_string();
        self
    }

    /// Sends a file, returning the transfer key and content address.
    ///
    /// Obtains presigned URLs from the broker, uploads the encrypted file
    /// data and then the encrypted metadata. `ttl` is the requested blob
    /// lifetime in minutes; values `<= 0` ask for the broker default. The
    /// progress sink, when given, receives `(transferred, total)` updates
    /// against the plaintext file size.
    ///
    /// # Errors
    ///
    /// * `Error::FileAccess` — the file cannot be statted or opened.
    /// * `Error::ConnectionFailed` — the broker or store is unreachable.
    /// * `Error::Unauthorized` / `Error::ServerError` — broker rejection.
    /// * `Error::DataUploadFailed` / `Error::MetadataUploadFailed` — the
    ///   blob store refused a PUT.
    pub async fn send(
        &self,
        file_path: &Path,
        ttl: i64,
        progress: Option<SharedSink>,
    ) -> Result<SendReceipt> {
        let stats = fs::metadata(file_path).map_err(|e| {
            Error::file_access(format!("can't read file {}: {e}", file_path.display()))
        })?;
        if !stats.is_file() {
            return Err(Error::file_access(format!(
                "{} is not a regular file",
                file_path.display()
            )));
        }
        let file_size = stats.len();
        let basename = file_path
            .file_name()
            .and_then(OsStr::to_str)
            .ok_or_else(|| {
                Error::file_access(format!(
                    "{} has no usable base name",
                    file_path.display()
                ))
            })?
            .to_string();

        let key = TransferKey::generate()?;
        let object_id = key.derive_address();

        let upload = self.request_upload(ttl, &object_id).await?;

        debug!("uploading {} ({file_size} bytes) as {object_id}", basename);
        let file = fs::File::open(file_path).map_err(|e| {
            Error::file_access(format!("can't read file {}: {e}", file_path.display()))
        })?;
        let reader = CountingReader::new(io::BufReader::new(file), file_size, progress.clone());
        self.upload_encrypted(
            reader,
            file_size,
            &upload.put_url,
            &upload.headers,
            &key,
            ErrorKind::DataUploadFailed,
        )
        .await?;

        let filemeta = FileMetadata {
            filename: basename,
            filesize: file_size,
        };
        let metabytes =
            serde_json::to_vec(&filemeta).map_err(|e| Error::internal(e.to_string()))?;
        let meta_size = metabytes.len() as u64;
        self.upload_encrypted(
            Cursor::new(metabytes),
            meta_size,
            &upload.meta_put_url,
            &upload.meta_headers,
            &key,
            ErrorKind::MetadataUploadFailed,
        )
        .await?;

        if let Some(sink) = &progress {
            sink.update(file_size, file_size);
        }

        Ok(SendReceipt {
            key: key.to_human(),
            object_id,
        })
    }

    /// Receives a share into `dest_dir`.
    ///
    /// Downloads and decrypts the metadata first, then streams the data
    /// blob through the decrypter into the destination file (created mode
    /// `0600`, truncated when overwriting). `new_name` overrides the
    /// filename carried in the metadata. The progress sink, when given,
    /// receives updates against the metadata's plaintext size.
    ///
    /// # Errors
    ///
    /// * `Error::RecvFileExists` — the destination exists and `overwrite`
    ///   is false; the error carries the decoded [`FileMetadata`] so the
    ///   caller can prompt and retry.
    /// * `Error::MetadataDownloadFailed` / `Error::DataDownloadFailed` —
    ///   the blob store refused a GET.
    /// * `Error::MalformedMetadata` — the metadata did not parse, or its
    ///   filename is not a plain base name.
    /// * `Error::DecryptionFailed` and the codec error kinds — the
    ///   ciphertext could not be decrypted or written out.
    pub async fn receive(
        &self,
        key: &TransferKey,
        dest_dir: &Path,
        new_name: Option<&str>,
        overwrite: bool,
        progress: Option<SharedSink>,
    ) -> Result<FileMetadata> {
        let object_id = key.derive_address();

        // Metadata first: it carries the plaintext length the data
        // decrypter needs.
        let meta_url = format!("{}/{}/meta/{}", self.store_base, self.bucket, object_id);
        let response = self
            .http
            .get(&meta_url)
            .timeout(BROKER_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                Error::metadata_download_failed(format!("failed to download metadata: {e}"))
            })?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::metadata_download_failed(format!(
                "blob store returned status {status} for the metadata blob"
            )));
        }
        let metabytes = response.bytes().await.map_err(|e| {
            Error::metadata_download_failed(format!("failed to read metadata: {e}"))
        })?;

        let plaintext = decrypt_buffer(&metabytes, key)
            .map_err(|e| Error::decryption_failed(format!("failed to decrypt metadata: {e}")))?;
        let filemeta: FileMetadata = serde_json::from_slice(&plaintext)
            .map_err(|e| Error::malformed_metadata(format!("metadata is not valid JSON: {e}")))?;

        if !is_plain_filename(&filemeta.filename) {
            return Err(Error::malformed_metadata(format!(
                "metadata filename {:?} is not a plain file name",
                filemeta.filename
            )));
        }

        let filename = new_name.unwrap_or(&filemeta.filename);
        let file_path = dest_dir.join(filename);
        if file_path.exists() && !overwrite {
            return Err(Error::recv_file_exists(
                format!("file already exists: {}", file_path.display()),
                filemeta,
            ));
        }

        let data_url = format!("{}/{}/{}", self.store_base, self.bucket, object_id);
        let response = self.http.get(&data_url).send().await.map_err(|e| {
            Error::data_download_failed(format!("failed to download file data: {e}"))
        })?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::data_download_failed(format!(
                "blob store returned status {status} for the data blob"
            )));
        }

        let stream = Box::pin(response.bytes_stream().map(|chunk| chunk.map_err(io::Error::other)));
        let reader = StreamReader::new(stream);

        let filesize = filemeta.filesize;
        let data_key = *key;
        let sink = progress.clone();
        let out_path = file_path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let bridge = SyncIoBridge::new(reader);
            let decrypter = Decrypter::new(bridge, filesize, &data_key)?;

            let mut options = fs::OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut out = options.open(&out_path).map_err(|e| {
                Error::file_access(format!("failed to create file {}: {e}", out_path.display()))
            })?;

            let mut counting = CountingReader::new(decrypter, filesize, sink);
            io::copy(&mut counting, &mut out).map_err(|e| {
                let e = Error::from(e);
                match e.kind {
                    ErrorKind::DataCorruption
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::DecrypterWeirdEof => e,
                    _ => Error::decryption_failed(format!("failed to save decrypted file: {e}")),
                }
            })?;
            Ok(())
        })
        .await
        .map_err(|e| Error::internal(e.to_string()))??;

        if let Some(sink) = &progress {
            sink.update(filemeta.filesize, filemeta.filesize);
        }

        Ok(filemeta)
    }

    /// Fetches the broker's version document.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectionFailed` if the broker is unreachable or
    /// `Error::ServerError` if it answers with anything but a valid
    /// version payload.
    pub async fn version(&self) -> Result<VersionResponse> {
        let response = self
            .http
            .get(format!("{}/version", self.endpoint))
            .timeout(BROKER_TIMEOUT)
            .send()
            .await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::server_error(format!(
                "version endpoint returned status {status}"
            )));
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| Error::server_error(format!("malformed version response: {e}")))
    }

    /// Asks the broker for presigned upload URLs.
    async fn request_upload(&self, ttl: i64, object_id: &str) -> Result<UploadResponse> {
        let request = UploadRequest {
            ttl,
            secret_key: self.auth_key.clone(),
            object_id: object_id.to_string(),
        };
        let body = serde_json::to_vec(&request).map_err(|e| Error::internal(e.to_string()))?;

        let response = self
            .http
            .post(format!("{}/upload", self.endpoint))
            .timeout(BROKER_TIMEOUT)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    Error::connection_failed(format!(
                        "failed to connect to secretshare server: {e}"
                    ))
                } else {
                    Error::from(e)
                }
            })?;

        let req_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let status = response.status();
        match status {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => {
                return Err(Error::unauthorized(with_req_id(
                    "failed to authenticate to secretshare server",
                    &req_id,
                )));
            }
            StatusCode::INTERNAL_SERVER_ERROR => {
                return Err(Error::server_error(with_req_id(
                    "the secretshare server encountered an internal error",
                    &req_id,
                )));
            }
            status => {
                return Err(Error::server_error(with_req_id(
                    &format!(
                        "the secretshare server responded with HTTP code {status}, \
                         so the file cannot be uploaded"
                    ),
                    &req_id,
                )));
            }
        }

        let body = response.bytes().await.map_err(|e| {
            Error::server_error(with_req_id(
                &format!("error reading response from secretshare server: {e}"),
                &req_id,
            ))
        })?;
        if body.is_empty() {
            return Err(Error::server_error(with_req_id(
                "empty reply received from secretshare server",
                &req_id,
            )));
        }

        serde_json::from_slice(&body).map_err(|e| {
            Error::server_error(with_req_id(
                &format!("malformed response received from secretshare server: {e}"),
                &req_id,
            ))
        })
    }

    /// Encrypts `stream` and PUTs it to a presigned URL.
    ///
    /// The encrypter runs on a blocking worker feeding a bounded channel;
    /// the HTTP body pulls chunks from the channel, so memory use is
    /// bounded regardless of file size. The broker-supplied headers are
    /// replayed verbatim, multi-valued entries included, and the
    /// Content-Length is the encrypter's published total size.
    async fn upload_encrypted<R>(
        &self,
        stream: R,
        message_size: u64,
        put_url: &str,
        headers: &Headers,
        key: &TransferKey,
        failure: ErrorKind,
    ) -> Result<()>
    where
        R: Read + Send + 'static,
    {
        let mut encrypter = Encrypter::new(stream, message_size, key)?;
        let total_size = encrypter.total_size();

        let (tx, rx) = mpsc::channel::<io::Result<Vec<u8>>>(UPLOAD_CHANNEL_CAPACITY);
        let pump = tokio::task::spawn_blocking(move || {
            let mut buf = vec![0; UPLOAD_CHUNK_SIZE];
            loop {
                match encrypter.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(Ok(buf[..n].to_vec())).is_err() {
                            // Receiver dropped: upload was aborted.
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.blocking_send(Err(e));
                        break;
                    }
                }
            }
        });

        let body = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        });

        let mut header_map = HeaderMap::new();
        for (name, values) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())?;
            for value in values {
                header_map.append(name.clone(), HeaderValue::from_str(value)?);
            }
        }

        debug!("uploading {total_size} bytes to {put_url}");
        let response = self
            .http
            .put(put_url)
            .headers(header_map)
            .header(CONTENT_LENGTH, total_size)
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    Error::connection_failed(format!("failed to reach the blob store: {e}"))
                } else {
                    Error::new(failure, e)
                }
            })?;

        pump.await.map_err(|e| Error::internal(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::new(
                failure,
                format!("blob store returned status {status}"),
            ));
        }
        Ok(())
    }
}

/// Whether `name` is a plain base name that stays inside its directory.
fn is_plain_filename(name: &str) -> bool {
    !name.is_empty() && Path::new(name).file_name() == Some(OsStr::new(name))
}

/// Appends the broker request ID to an error message when one is known.
fn with_req_id(message: &str, req_id: &str) -> String {
    if req_id.is_empty() {
        message.to_string()
    } else {
        format!("{message}; reqId={req_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::is_plain_filename;

    #[test]
    fn plain_filenames() {
        assert!(is_plain_filename("notes.txt"));
        assert!(is_plain_filename("no extension"));
        assert!(!is_plain_filename(""));
        assert!(!is_plain_filename(".."));
        assert!(!is_plain_filename("a/b.txt"));
        assert!(!is_plain_filename("/etc/passwd"));
    }
}
