use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use secretshare::{
    broker::{self, BrokerConfig, PresignedPut, PresignedUrlMinter, DEFAULT_TTL_MINUTES},
    encoding::encode_human,
    error::Result,
    protocol::{
        ErrorResponse, Headers, UploadRequest, UploadResponse, VersionResponse, API_VERSION,
        REQUEST_ID_HEADER, SERVER_VERSION,
    },
};

const SECRET: &str = "a very shared secret";

/// Minter that records its calls and returns recognizable URLs.
#[derive(Default)]
struct FakeMinter {
    calls: Mutex<Vec<(String, String, Duration, Duration)>>,
}

impl PresignedUrlMinter for FakeMinter {
    fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
        signing_validity: Duration,
    ) -> Result<PresignedPut> {
        self.calls.lock().unwrap().push((
            bucket.to_string(),
            key.to_string(),
            ttl,
            signing_validity,
        ));

        let mut headers = Headers::new();
        headers.insert(
            "Content-Type".to_string(),
            vec!["application/octet-stream".to_string()],
        );
        headers.insert(
            "X-Amz-Meta-Test".to_string(),
            vec!["one".to_string(), "two".to_string()],
        );
        Ok(PresignedPut {
            url: format!("https://store.invalid/{bucket}/{key}"),
            headers,
        })
    }
}

async fn spawn_broker(minter: Arc<FakeMinter>) -> SocketAddr {
    let config = BrokerConfig {
        addr: "127.0.0.1".to_string(),
        port: 0,
        bucket: "shares".to_string(),
        bucket_region: "us-west-1".to_string(),
        secret_key: SECRET.to_string(),
    };
    let router = broker::router(config, minter);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn object_id() -> String {
    encode_human(&[7; 32])
}

async fn post_upload(addr: SocketAddr, body: Vec<u8>) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/upload"))
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap()
}

async fn post_request(addr: SocketAddr, request: &UploadRequest) -> reqwest::Response {
    post_upload(addr, serde_json::to_vec(request).unwrap()).await
}

fn upload_request(ttl: i64, secret: &str, object_id: &str) -> UploadRequest {
    UploadRequest {
        ttl,
        secret_key: secret.to_string(),
        object_id: object_id.to_string(),
    }
}

async fn error_message(response: reqwest::Response) -> String {
    let body = response.bytes().await.unwrap();
    serde_json::from_slice::<ErrorResponse>(&body).unwrap().message
}

#[tokio::test]
async fn upload_mints_both_urls() {
    let minter = Arc::new(FakeMinter::default());
    let addr = spawn_broker(minter.clone()).await;
    let id = object_id();

    let response = post_request(addr, &upload_request(60, SECRET, &id)).await;
    assert_eq!(response.status(), 200);
    let body = response.bytes().await.unwrap();
    let upload: UploadResponse = serde_json::from_slice(&body).unwrap();

    assert_eq!(upload.put_url, format!("https://store.invalid/shares/{id}"));
    assert_eq!(
        upload.meta_put_url,
        format!("https://store.invalid/shares/meta/{id}")
    );
    // Multi-valued headers survive verbatim.
    assert_eq!(
        upload.headers.get("X-Amz-Meta-Test"),
        Some(&vec!["one".to_string(), "two".to_string()])
    );
    assert_eq!(upload.meta_headers.get("X-Amz-Meta-Test"), upload.headers.get("X-Amz-Meta-Test"));

    let calls = minter.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1, id);
    assert_eq!(calls[1].1, format!("meta/{id}"));
    assert_eq!(calls[0].2, Duration::from_secs(60 * 60));
    assert_eq!(calls[0].3, Duration::from_secs(300));
}

#[tokio::test]
async fn ttl_is_clamped_to_default() {
    for ttl in [0, -5] {
        let minter = Arc::new(FakeMinter::default());
        let addr = spawn_broker(minter.clone()).await;

        let response = post_request(addr, &upload_request(ttl, SECRET, &object_id())).await;
        assert_eq!(response.status(), 200);

        let calls = minter.calls.lock().unwrap();
        assert_eq!(
            calls[0].2,
            Duration::from_secs(DEFAULT_TTL_MINUTES as u64 * 60)
        );
    }
}

#[tokio::test]
async fn wrong_secret_is_unauthorized() {
    let addr = spawn_broker(Arc::new(FakeMinter::default())).await;

    // A timing-equivalent near-match: same length, one byte off.
    let mut near_match = SECRET.to_string();
    near_match.replace_range(0..1, "A");
    assert_eq!(near_match.len(), SECRET.len());

    for secret in ["", "wrong", near_match.as_str()] {
        let response = post_request(addr, &upload_request(60, secret, &object_id())).await;
        assert_eq!(response.status(), 401);
        assert_eq!(error_message(response).await, "Authentication failed");
    }
}

#[tokio::test]
async fn missing_object_id_is_rejected() {
    let addr = spawn_broker(Arc::new(FakeMinter::default())).await;

    let response = post_request(addr, &upload_request(60, SECRET, "")).await;
    assert_eq!(response.status(), 400);
    assert_eq!(
        error_message(response).await,
        "No object ID provided in request"
    );
}

#[tokio::test]
async fn malformed_object_id_is_rejected() {
    let addr = spawn_broker(Arc::new(FakeMinter::default())).await;

    let response = post_request(addr, &upload_request(60, SECRET, "not!an*id")).await;
    assert_eq!(response.status(), 400);
    assert_eq!(error_message(response).await, "Malformed object ID");
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let addr = spawn_broker(Arc::new(FakeMinter::default())).await;

    let response = post_upload(addr, b"{not json".to_vec()).await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn every_response_carries_a_request_id() {
    let addr = spawn_broker(Arc::new(FakeMinter::default())).await;

    let mut seen = Vec::new();
    for secret in [SECRET, "wrong"] {
        let response = post_request(addr, &upload_request(60, secret, &object_id())).await;
        let req_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .expect("missing request id header")
            .to_str()
            .unwrap()
            .to_string();
        assert_eq!(req_id.len(), 16);
        assert!(req_id.bytes().all(|b| b.is_ascii_alphanumeric()));
        seen.push(req_id);
    }
    assert_ne!(seen[0], seen[1], "request ids must be independent");
}

#[tokio::test]
async fn version_endpoint_needs_no_auth() {
    let addr = spawn_broker(Arc::new(FakeMinter::default())).await;

    let response = reqwest::get(format!("http://{addr}/version")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));

    let body = response.bytes().await.unwrap();
    let version: VersionResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(version.server_version, SERVER_VERSION);
    assert_eq!(version.api_version, API_VERSION);
    assert!(!version.server_source_location.is_empty());
}
