use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::put,
    Router,
};

use secretshare::{
    broker::{self, BrokerConfig, PresignedPut, PresignedUrlMinter},
    client::Client,
    error::{ErrorKind, Result},
    key::TransferKey,
    progress::{LatestProgress, SharedSink},
    protocol::Headers,
};

const SECRET: &str = "e2e shared secret";
const BUCKET: &str = "shares";

type Blobs = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// In-memory blob store speaking just enough HTTP PUT/GET.
async fn put_blob(
    State(blobs): State<Blobs>,
    Path(path): Path<String>,
    body: Bytes,
) -> StatusCode {
    blobs.lock().unwrap().insert(path, body.to_vec());
    StatusCode::OK
}

async fn get_blob(State(blobs): State<Blobs>, Path(path): Path<String>) -> Response {
    match blobs.lock().unwrap().get(&path) {
        Some(data) => data.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Minter handing out URLs that point at the in-memory store.
struct StoreMinter {
    base: String,
}

impl PresignedUrlMinter for StoreMinter {
    fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        _ttl: Duration,
        _signing_validity: Duration,
    ) -> Result<PresignedPut> {
        let mut headers = Headers::new();
        headers.insert(
            "Content-Type".to_string(),
            vec!["application/octet-stream".to_string()],
        );
        Ok(PresignedPut {
            url: format!("{}/{bucket}/{key}", self.base),
            headers,
        })
    }
}

struct Harness {
    client: Client,
    blobs: Blobs,
    endpoint: String,
}

async fn spawn(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn setup() -> Harness {
    let blobs: Blobs = Arc::new(Mutex::new(HashMap::new()));
    let store_router = Router::new()
        .route("/*path", put(put_blob).get(get_blob))
        .with_state(blobs.clone());
    let store_addr = spawn(store_router).await;
    let store_base = format!("http://{store_addr}");

    let config = BrokerConfig {
        addr: "127.0.0.1".to_string(),
        port: 0,
        bucket: BUCKET.to_string(),
        bucket_region: "us-west-1".to_string(),
        secret_key: SECRET.to_string(),
    };
    let minter = Arc::new(StoreMinter {
        base: store_base.clone(),
    });
    let broker_addr = spawn(broker::router(config, minter)).await;

    let endpoint = format!("http://{broker_addr}");
    let client = Client::new(&endpoint, BUCKET, "us-west-1", SECRET)
        .unwrap()
        .with_store_base(&store_base);

    Harness {
        client,
        blobs,
        endpoint,
    }
}

fn write_source(dir: &std::path::Path, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn sink(progress: &Arc<LatestProgress>) -> Option<SharedSink> {
    let shared: SharedSink = Arc::clone(progress) as SharedSink;
    Some(shared)
}

#[tokio::test]
async fn hello_round_trip() {
    let harness = setup().await;
    let src_dir = tempfile::tempdir().unwrap();
    let src = write_source(src_dir.path(), "hello.txt", b"hello");

    let progress = Arc::new(LatestProgress::new());
    let receipt = harness
        .client
        .send(&src, 60, sink(&progress))
        .await
        .unwrap();
    assert_eq!(progress.latest(), (5, 5));

    // The store holds both blobs, and the ciphertext has the documented
    // shape: header + one padded block.
    {
        let blobs = harness.blobs.lock().unwrap();
        let data = blobs
            .get(&format!("{BUCKET}/{}", receipt.object_id))
            .expect("data blob missing");
        assert_eq!(data.len(), 17 + 16);
        assert_eq!(data[0], 11);
        assert!(blobs.contains_key(&format!("{BUCKET}/meta/{}", receipt.object_id)));
    }

    let out_dir = tempfile::tempdir().unwrap();
    let key: TransferKey = receipt.key.parse().unwrap();
    let progress = Arc::new(LatestProgress::new());
    let filemeta = harness
        .client
        .receive(&key, out_dir.path(), None, false, sink(&progress))
        .await
        .unwrap();

    assert_eq!(filemeta.filename, "hello.txt");
    assert_eq!(filemeta.filesize, 5);
    assert_eq!(progress.latest(), (5, 5));
    assert_eq!(
        std::fs::read(out_dir.path().join("hello.txt")).unwrap(),
        b"hello"
    );
}

#[tokio::test]
async fn empty_file_round_trip() {
    let harness = setup().await;
    let src_dir = tempfile::tempdir().unwrap();
    let src = write_source(src_dir.path(), "empty.bin", b"");

    let receipt = harness.client.send(&src, 60, None).await.unwrap();

    {
        let blobs = harness.blobs.lock().unwrap();
        let data = blobs
            .get(&format!("{BUCKET}/{}", receipt.object_id))
            .unwrap();
        // Header only: no body blocks for an empty plaintext.
        assert_eq!(data.len(), 17);
    }

    let out_dir = tempfile::tempdir().unwrap();
    let key: TransferKey = receipt.key.parse().unwrap();
    let filemeta = harness
        .client
        .receive(&key, out_dir.path(), None, false, None)
        .await
        .unwrap();

    assert_eq!(filemeta.filesize, 0);
    assert_eq!(
        std::fs::read(out_dir.path().join("empty.bin")).unwrap(),
        b""
    );
}

#[tokio::test]
async fn block_aligned_file_round_trip() {
    let harness = setup().await;
    let src_dir = tempfile::tempdir().unwrap();
    let src = write_source(src_dir.path(), "block.bin", b"0123456789abcdef");

    let receipt = harness.client.send(&src, 60, None).await.unwrap();

    {
        let blobs = harness.blobs.lock().unwrap();
        let data = blobs
            .get(&format!("{BUCKET}/{}", receipt.object_id))
            .unwrap();
        assert_eq!(data.len(), 33);
        assert_eq!(data[0], 0);
    }

    let out_dir = tempfile::tempdir().unwrap();
    let key: TransferKey = receipt.key.parse().unwrap();
    harness
        .client
        .receive(&key, out_dir.path(), None, false, None)
        .await
        .unwrap();
    assert_eq!(
        std::fs::read(out_dir.path().join("block.bin")).unwrap(),
        b"0123456789abcdef"
    );
}

#[tokio::test]
async fn existing_destination_needs_overwrite() {
    let harness = setup().await;
    let src_dir = tempfile::tempdir().unwrap();
    let src = write_source(src_dir.path(), "collide.txt", b"fresh contents");
    let receipt = harness.client.send(&src, 60, None).await.unwrap();
    let key: TransferKey = receipt.key.parse().unwrap();

    let out_dir = tempfile::tempdir().unwrap();
    write_source(out_dir.path(), "collide.txt", b"something much older and longer");

    let err = harness
        .client
        .receive(&key, out_dir.path(), None, false, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::RecvFileExists);

    // The error carries the metadata so a frontend can prompt.
    let filemeta = err.metadata().expect("metadata missing from error");
    assert_eq!(filemeta.filename, "collide.txt");
    assert_eq!(filemeta.filesize, 14);

    // Retry with overwrite: the destination is truncated and replaced.
    harness
        .client
        .receive(&key, out_dir.path(), None, true, None)
        .await
        .unwrap();
    assert_eq!(
        std::fs::read(out_dir.path().join("collide.txt")).unwrap(),
        b"fresh contents"
    );
}

#[tokio::test]
async fn receive_honors_override_filename() {
    let harness = setup().await;
    let src_dir = tempfile::tempdir().unwrap();
    let src = write_source(src_dir.path(), "original.txt", b"contents");
    let receipt = harness.client.send(&src, 60, None).await.unwrap();
    let key: TransferKey = receipt.key.parse().unwrap();

    let out_dir = tempfile::tempdir().unwrap();
    let filemeta = harness
        .client
        .receive(&key, out_dir.path(), Some("renamed.bin"), false, None)
        .await
        .unwrap();

    // Metadata still reports the sender's name; the file lands renamed.
    assert_eq!(filemeta.filename, "original.txt");
    assert!(out_dir.path().join("renamed.bin").exists());
    assert!(!out_dir.path().join("original.txt").exists());
}

#[tokio::test]
async fn receive_with_unknown_key_fails() {
    let harness = setup().await;
    let out_dir = tempfile::tempdir().unwrap();

    let key = TransferKey::generate().unwrap();
    let err = harness
        .client
        .receive(&key, out_dir.path(), None, false, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::MetadataDownloadFailed);
}

#[tokio::test]
async fn send_with_wrong_auth_key_is_unauthorized() {
    let harness = setup().await;
    let src_dir = tempfile::tempdir().unwrap();
    let src = write_source(src_dir.path(), "denied.txt", b"data");

    // A second client with the wrong shared secret.
    let client = Client::new(&harness.endpoint, BUCKET, "us-west-1", "not the secret").unwrap();
    let err = client.send(&src, 60, None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unauthorized);
}
