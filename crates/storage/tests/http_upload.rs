//! Integration test: uploads through [`HttpArchiveStore`] against an
//! in-process axum server standing in for the blob store.

use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::put;
use axum::{Json, Router};
use pl_domain::config::StorageConfig;
use pl_domain::Error;
use pl_storage::{reference_token, ArchiveStore, ArtifactUpload, HttpArchiveStore};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
struct Received {
    folder: String,
    filename: String,
    authorization: Option<String>,
    body: Vec<u8>,
}

#[derive(Clone, Default)]
struct MockStore {
    received: Arc<Mutex<Vec<Received>>>,
}

async fn handle_put(
    State(mock): State<MockStore>,
    Path((folder, filename)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    mock.received.lock().unwrap().push(Received {
        folder: folder.clone(),
        filename: filename.clone(),
        authorization,
        body: body.to_vec(),
    });

    match filename.as_str() {
        "denied.json" => (StatusCode::FORBIDDEN, Json(json!({ "error": "nope" }))),
        "broken.json" => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "disk" }))),
        "garbled.json" => (StatusCode::OK, Json(json!({ "location": "?" }))),
        _ => (
            StatusCode::OK,
            Json(json!({ "url": "https://storage.example/file/ABC123" })),
        ),
    }
}

async fn start_mock_store() -> (String, MockStore) {
    let mock = MockStore::default();
    let app = Router::new()
        .route("/:folder/:filename", put(handle_put))
        .with_state(mock.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), mock)
}

fn store_for(base_url: &str) -> HttpArchiveStore {
    let cfg = StorageConfig {
        base_url: base_url.into(),
        api_key_env: "PL_TEST_UNSET_STORAGE_KEY".into(),
        folder: "sessions".into(),
        timeout_ms: 5_000,
        ..Default::default()
    };
    HttpArchiveStore::new(&cfg).unwrap()
}

#[tokio::test]
async fn upload_streams_artifact_and_returns_locator() {
    let (base, mock) = start_mock_store().await;
    let store = store_for(&base).with_api_key(Some("k3y".into()));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("creds.json");
    std::fs::write(&path, br#"{"noise_key":"abc"}"#).unwrap();

    let upload = ArtifactUpload::from_file(&path, "15551234567.json").await.unwrap();
    let locator = store.upload(upload).await.unwrap();
    assert_eq!(locator, "https://storage.example/file/ABC123");
    assert_eq!(reference_token(&locator, "https://storage.example/file/"), "ABC123");

    let received = mock.received.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].folder, "sessions");
    assert_eq!(received[0].filename, "15551234567.json");
    assert_eq!(received[0].authorization.as_deref(), Some("Bearer k3y"));
    assert_eq!(received[0].body, br#"{"noise_key":"abc"}"#);
}

#[tokio::test]
async fn upload_without_key_sends_no_authorization() {
    let (base, mock) = start_mock_store().await;
    let store = store_for(&base);

    let upload = ArtifactUpload::new("a.json", 2, &b"{}"[..]);
    store.upload(upload).await.unwrap();
    assert!(mock.received.lock().unwrap()[0].authorization.is_none());
}

#[tokio::test]
async fn forbidden_maps_to_auth_error() {
    let (base, _mock) = start_mock_store().await;
    let err = store_for(&base)
        .upload(ArtifactUpload::new("denied.json", 2, &b"{}"[..]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(_)), "got {err:?}");
}

#[tokio::test]
async fn server_error_and_bad_body_map_to_storage_error() {
    let (base, _mock) = start_mock_store().await;
    let store = store_for(&base);

    let err = store
        .upload(ArtifactUpload::new("broken.json", 2, &b"{}"[..]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Storage(_)), "got {err:?}");

    let err = store
        .upload(ArtifactUpload::new("garbled.json", 2, &b"{}"[..]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Storage(_)), "got {err:?}");
}

#[tokio::test]
async fn unreachable_store_is_http_error() {
    let store = store_for("http://127.0.0.1:9");
    let err = store
        .upload(ArtifactUpload::new("a.json", 2, &b"{}"[..]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Http(_) | Error::Timeout(_)), "got {err:?}");
}
