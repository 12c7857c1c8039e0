//! The broker service: authorization and presigned-URL minting.
//!
//! The broker is the only trusted service in the system, and it is
//! deliberately small: after checking a shared authorization secret with
//! a constant-time comparison, it mints two short-lived presigned PUT
//! URLs (ciphertext and metadata) against a preconfigured bucket. It
//! never sees a transfer key; the content address proves nothing about
//! the content.
//!
//! # Endpoints
//!
//! * `GET /version` — `{server_version, api_version,
//!   server_source_location}`, no authentication.
//! * `POST /upload` — consumes `{ttl, secret_key, object_id}`, returns
//!   `{put_url, headers, meta_put_url, meta_headers}`; errors are
//!   `{message}` with a 4xx/5xx status.
//!
//! Every response carries a `Secretshare-ReqId` header with a 16-character
//! random identifier; the same identifier prefixes every log record
//! emitted while handling the request.
//!
//! # URL Minting
//!
//! The concrete blob-store SDK is abstracted behind
//! [`PresignedUrlMinter`], injected at router construction. Requests are
//! handled in parallel over a read-only shared state; the minter must be
//! safe to share.

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{rejection::JsonRejection, Extension, Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use subtle::ConstantTimeEq;

use crate::{
    encoding::decode_human,
    error::{Error, Result},
    protocol::{
        ErrorResponse, Headers, UploadRequest, UploadResponse, VersionResponse, API_VERSION,
        REQUEST_ID_HEADER, SERVER_SOURCE_LOCATION, SERVER_VERSION,
    },
};

/// Blob lifetime used when the client requests none.
pub const DEFAULT_TTL_MINUTES: i64 = 240;

/// Window in which a minted URL must be used.
///
/// Distinct from the blob TTL: the client has five minutes to start the
/// PUT, however long the blob itself lives.
pub const SIGNING_VALIDITY: Duration = Duration::from_secs(5 * 60);

/// Length of the request correlation identifier.
const REQUEST_ID_LEN: usize = 16;

/// A presigned PUT URL plus the headers the upload must replay.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PresignedPut {
    /// The URL to PUT to.
    pub url: String,

    /// Headers that are part of the signature and must accompany the PUT.
    pub headers: Headers,
}

/// Mints presigned PUT URLs against the blob store.
///
/// Implementations are shared read-only across requests.
pub trait PresignedUrlMinter: Send + Sync {
    /// Mints a presigned PUT URL for `key` in `bucket`.
    ///
    /// The stored object expires `ttl` from now; the URL itself is only
    /// valid for `signing_validity`. Objects are stored with content type
    /// `application/octet-stream` and a public-read ACL, so receivers can
    /// GET them without credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be signed.
    fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
        signing_validity: Duration,
    ) -> Result<PresignedPut>;
}

/// Broker configuration, fixed at startup.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct BrokerConfig {
    /// Address to listen on.
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Port to listen on.
    pub port: u16,

    /// Bucket presigned URLs are minted against.
    pub bucket: String,

    /// Region of the bucket.
    pub bucket_region: String,

    /// Shared authorization secret clients must present.
    #[serde(default)]
    pub secret_key: String,
}

fn default_addr() -> String {
    "0.0.0.0".to_string()
}

/// Read-only state shared by all request handlers.
struct BrokerState {
    config: BrokerConfig,
    minter: Arc<dyn PresignedUrlMinter>,
}

type SharedState = Arc<BrokerState>;

/// Per-request correlation identifier, injected by the middleware.
#[derive(Clone, Debug)]
struct RequestId(String);

/// Builds the broker router.
///
/// Exposed separately from [`serve`] so tests can drive the router
/// against an ephemeral listener with a fake minter.
pub fn router(config: BrokerConfig, minter: Arc<dyn PresignedUrlMinter>) -> Router {
    let state: SharedState = Arc::new(BrokerState { config, minter });
    Router::new()
        .route("/version", get(version))
        .route("/upload", post(upload))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Binds the configured address and serves the broker until interrupted.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(config: BrokerConfig, minter: Arc<dyn PresignedUrlMinter>) -> Result<()> {
    let addr = format!("{}:{}", config.addr, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::internal(format!("failed to bind {addr}: {e}")))?;
    info!("listening on {addr}");
    axum::serve(listener, router(config, minter))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .map_err(|e| Error::internal(e.to_string()))
}

/// Assigns a request ID and stamps it on the response.
///
/// The identifier is random but not secret, so the fast thread-local RNG
/// is fine here.
async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let id: String = std::iter::repeat_with(fastrand::alphanumeric)
        .take(REQUEST_ID_LEN)
        .collect();
    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).await;
    if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(REQUEST_ID_HEADER.as_bytes()),
        HeaderValue::from_str(&id),
    ) {
        response.headers_mut().insert(name, value);
    }
    response
}

/// `GET /version` — identify this broker. No authentication.
async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        server_version: SERVER_VERSION,
        api_version: API_VERSION,
        server_source_location: SERVER_SOURCE_LOCATION.to_string(),
    })
}

/// `POST /upload` — authorize an upload and mint its presigned URLs.
async fn upload(
    State(state): State<SharedState>,
    Extension(RequestId(req_id)): Extension<RequestId>,
    payload: std::result::Result<Json<UploadRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!("[{req_id}] rejecting unparseable upload request: {rejection}");
            return error_response(StatusCode::BAD_REQUEST, "Malformed JSON in request");
        }
    };

    if !secrets_match(&request.secret_key, &state.config.secret_key) {
        warn!("[{req_id}] authentication failed");
        return error_response(StatusCode::UNAUTHORIZED, "Authentication failed");
    }

    if request.object_id.is_empty() {
        warn!("[{req_id}] upload request without an object ID");
        return error_response(StatusCode::BAD_REQUEST, "No object ID provided in request");
    }
    if decode_human(&request.object_id).is_err() {
        warn!("[{req_id}] upload request with malformed object ID");
        return error_response(StatusCode::BAD_REQUEST, "Malformed object ID");
    }

    let ttl_minutes = if request.ttl <= 0 {
        DEFAULT_TTL_MINUTES
    } else {
        request.ttl
    };
    let ttl = Duration::from_secs(ttl_minutes.unsigned_abs() * 60);

    let data = match state.minter.presign_put(
        &state.config.bucket,
        &request.object_id,
        ttl,
        SIGNING_VALIDITY,
    ) {
        Ok(put) => put,
        Err(e) => {
            error!("[{req_id}] failed to presign data URL: {e}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate pre-signed upload URL",
            );
        }
    };
    let meta_key = format!("meta/{}", request.object_id);
    let meta = match state
        .minter
        .presign_put(&state.config.bucket, &meta_key, ttl, SIGNING_VALIDITY)
    {
        Ok(put) => put,
        Err(e) => {
            error!("[{req_id}] failed to presign metadata URL: {e}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate pre-signed upload URL",
            );
        }
    };

    info!(
        "[{req_id}] minted upload URLs for {} (ttl {ttl_minutes} minutes)",
        request.object_id
    );
    Json(UploadResponse {
        put_url: data.url,
        headers: data.headers,
        meta_put_url: meta.url,
        meta_headers: meta.headers,
    })
    .into_response()
}

/// Compares the presented secret against the configured one in constant
/// time. Length is not secret.
fn secrets_match(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    provided.len() == expected.len() && provided.ct_eq(expected).into()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            message: message.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::secrets_match;

    #[test]
    fn secret_comparison() {
        assert!(secrets_match("swordfish", "swordfish"));
        assert!(!secrets_match("swordfish", "swordfisH"));
        assert!(!secrets_match("swordfish", "swordfish "));
        assert!(!secrets_match("", "swordfish"));
        assert!(secrets_match("", ""));
    }
}
