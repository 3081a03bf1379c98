//! HTTP collaborators against a local axum server

#![allow(clippy::unwrap_used)]

use assert_matches::assert_matches;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tandem_recovery::{
    upload_third_party_fragment, CoordinatorApi, FragmentHost, HttpCoordinatorApi,
    HttpFragmentHost, RecoveryError,
};
use tandem_testkit::sample_artifacts;

#[derive(Default)]
struct Recorded {
    authorization: Mutex<Vec<Option<String>>>,
    uploads: Mutex<Vec<(String, Value)>>,
}

type Shared = Arc<Recorded>;

fn record_auth(state: &Recorded, headers: &HeaderMap) {
    let auth = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    state.authorization.lock().push(auth);
}

async fn wallet(
    State(state): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, String) {
    record_auth(&state, &headers);
    match id.as_str() {
        "present" => (StatusCode::OK, json!({ "id": id }).to_string()),
        "retired" => (StatusCode::OK, json!({ "exists": false }).to_string()),
        "plain" => (StatusCode::OK, "yes".to_string()),
        "broken" => (StatusCode::INTERNAL_SERVER_ERROR, "db offline".to_string()),
        _ => (StatusCode::NOT_FOUND, String::new()),
    }
}

async fn recovery(
    State(state): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    record_auth(&state, &headers);
    if id != "ab" {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown wallet" })));
    }
    (
        StatusCode::OK,
        Json(json!({
            "ciphertext": {
                "kind": "device-backup",
                "curve": "secp256k1",
                "scheme": "stub-shamir",
                "keyId": "ab",
                "threshold": 2,
                "shareCount": 3,
                "label": "c2Vzc2lvbg==",
                "labelEncoding": "base64",
                "blob": "00ab",
                "blobEncoding": "hex"
            },
            "fragment": "AGZyYWdtZW50"
        })),
    )
}

async fn fetch_fragment(
    State(state): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    record_auth(&state, &headers);
    match id.as_str() {
        "ab" => (StatusCode::OK, Json(json!({ "fragment": "AmZyYWdtZW50" }))),
        "empty" => (StatusCode::OK, Json(json!({}))),
        _ => (StatusCode::NOT_FOUND, Json(json!({}))),
    }
}

async fn store_fragment(
    State(state): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    record_auth(&state, &headers);
    if id == "full" {
        return StatusCode::INSUFFICIENT_STORAGE;
    }
    state.uploads.lock().push((id, body));
    StatusCode::CREATED
}

async fn serve() -> (String, Shared) {
    let state = Shared::default();
    let app = Router::new()
        .route("/api/wallets/:id", get(wallet))
        .route("/api/wallets/:id/recovery", get(recovery))
        .route("/api/fragments/:id", get(fetch_fragment).post(store_fragment))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/api/"), state)
}

#[tokio::test]
async fn wallet_existence_follows_status_and_body() {
    let (base, state) = serve().await;
    let api = HttpCoordinatorApi::new(&base).unwrap();
    assert!(!api.base_url().ends_with('/'));

    assert!(api.wallet_exists("present", Some("t0k")).await.unwrap());
    assert!(!api.wallet_exists("retired", None).await.unwrap());
    assert!(api.wallet_exists("plain", None).await.unwrap());
    assert!(!api.wallet_exists("missing", None).await.unwrap());
    assert_matches!(
        api.wallet_exists("broken", None).await,
        Err(RecoveryError::Http { status: 500, body }) if body == "db offline"
    );

    let auth = state.authorization.lock().clone();
    assert_eq!(auth[0].as_deref(), Some("Bearer t0k"));
    assert_eq!(auth[1], None);
}

#[tokio::test]
async fn recovery_artifact_decodes_each_field_encoding() {
    let (base, _state) = serve().await;
    let api = HttpCoordinatorApi::new(&base).unwrap();

    let artifact = api.fetch_recovery_artifact("ab", None).await.unwrap();
    assert_eq!(artifact.ciphertext.key_id, vec![0xab]);
    assert_eq!(artifact.ciphertext.label, b"session".to_vec());
    assert_eq!(artifact.ciphertext.blob, vec![0x00, 0xab]);
    assert_eq!(artifact.ciphertext.threshold, 2);
    assert_eq!(artifact.fragment, b"\x00fragment".to_vec());

    assert_matches!(
        api.fetch_recovery_artifact("zz", None).await,
        Err(RecoveryError::Http { status: 404, .. })
    );
}

#[tokio::test]
async fn fragment_host_round_trips_through_http() {
    let (base, state) = serve().await;
    let host = HttpFragmentHost::new(&base, Some("host-token".to_string())).unwrap();

    assert_eq!(host.fetch_fragment("ab").await.unwrap(), b"\x02fragment".to_vec());
    assert_matches!(host.fetch_fragment("empty").await, Err(RecoveryError::InvalidPayload(_)));
    assert_matches!(host.fetch_fragment("nope").await, Err(RecoveryError::Http { status: 404, .. }));

    let backup = sample_artifacts(&[0xab]);
    assert!(upload_third_party_fragment(&host, "ab", &backup, 1).await.unwrap());
    let uploads = state.uploads.lock().clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, "ab");
    assert_eq!(uploads[0].1["fragment"], "AWZyYWdtZW50");
    assert!(state
        .authorization
        .lock()
        .iter()
        .all(|auth| auth.as_deref() == Some("Bearer host-token")));
}

#[tokio::test]
async fn third_party_upload_errors_and_skips() {
    let (base, state) = serve().await;
    let host = HttpFragmentHost::new(&base, None).unwrap();
    let backup = sample_artifacts(&[0xab]);

    assert!(!upload_third_party_fragment(&host, "ab", &backup, 9).await.unwrap());
    assert!(state.authorization.lock().is_empty());

    assert_matches!(
        upload_third_party_fragment(&host, "full", &backup, 1).await,
        Err(RecoveryError::Http { status: 507, .. })
    );
}

#[test]
fn malformed_base_url_is_rejected() {
    assert_matches!(
        HttpCoordinatorApi::new("::not-a-url"),
        Err(RecoveryError::InvalidUrl { .. })
    );
    assert_matches!(
        HttpFragmentHost::new("", None),
        Err(RecoveryError::InvalidUrl { .. })
    );
}
