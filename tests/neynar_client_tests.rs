//! Neynar client behavior against a mocked HTTP server

use base_colors_pfp::config::NeynarConfig;
use base_colors_pfp::http::{ProviderError, RetryConfig};
use base_colors_pfp::neynar::{AppSigner, NeynarClient};
use base_colors_pfp::profile::ProfileApi;
use base_colors_pfp::signer::{SignerProvider, SignerStatus};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "neynar-test-key";
const APP_KEY: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";
const APP_ADDRESS: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";
const APPROVAL_URL: &str = "https://client.warpcast.com/deeplinks/signed-key-request?token=0xfeed";

fn config_for(server: &MockServer) -> NeynarConfig {
    NeynarConfig {
        api_key: Some(API_KEY.to_string()),
        base_url: server.uri(),
        app_private_key: Some(APP_KEY.to_string()),
        app_fid: Some(1234),
        requests_per_second: 50,
        ..NeynarConfig::default()
    }
}

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
        jitter: false,
    }
}

fn client_for(server: &MockServer) -> NeynarClient {
    NeynarClient::new(&config_for(server))
        .expect("client should build")
        .with_retry(fast_retry(1))
}

fn public_key() -> String {
    format!("0x{}", "ab".repeat(32))
}

#[test]
fn test_missing_api_key_is_a_config_error() {
    let config = NeynarConfig::default();
    assert!(matches!(NeynarClient::new(&config), Err(ProviderError::Config(_))));
}

#[tokio::test]
async fn test_create_signer_sends_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/signer"))
        .and(header("x-api-key", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "signer_uuid": "uuid-1",
            "public_key": public_key(),
            "status": "generated"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let signer = client_for(&server).create_signer().await.unwrap();
    assert_eq!(signer.id, "uuid-1");
    assert_eq!(signer.status, SignerStatus::Generated);
    assert_eq!(signer.approval_url(), None);
}

#[tokio::test]
async fn test_fetch_signer_accepts_bare_and_wrapped_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/signer"))
        .and(query_param("signer_uuid", "bare"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "signer_uuid": "bare",
            "status": "pending_approval",
            "signer_approval_url": APPROVAL_URL
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/signer"))
        .and(query_param("signer_uuid", "wrapped"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"signer_uuid": "wrapped", "status": "approved", "fid": 77}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);

    let bare = SignerProvider::fetch_signer(&client, "bare").await.unwrap();
    assert_eq!(bare.id, "bare");
    assert_eq!(bare.status, Some(SignerStatus::PendingApproval));
    assert_eq!(bare.approval_url.as_deref(), Some(APPROVAL_URL));

    let wrapped = SignerProvider::fetch_signer(&client, "wrapped").await.unwrap();
    assert_eq!(wrapped.status, Some(SignerStatus::Approved));
    assert_eq!(wrapped.fid, Some(77));
}

#[tokio::test]
async fn test_fetch_signer_not_found_is_not_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/signer"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"message": "Signer not found"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = SignerProvider::fetch_signer(&client_for(&server), "missing")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(404));
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("Signer not found"));
}

#[tokio::test]
async fn test_register_signer_signs_and_adopts_new_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/signer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "signer_uuid": "fresh-uuid",
            "public_key": public_key(),
            "status": "generated"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/signer/signed_key"))
        .and(header("x-api-key", API_KEY))
        .and(body_partial_json(json!({
            "signer_uuid": "fresh-uuid",
            "app_fid": 1234,
            "sponsor": {"sponsored_by_neynar": true}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "signer_uuid": "fresh-uuid",
            "public_key": public_key(),
            "status": "pending_approval",
            "signer_approval_url": APPROVAL_URL
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let update = client.register_signer("stale-uuid").await.unwrap();

    assert_eq!(update.id, "fresh-uuid");
    assert_eq!(update.status, Some(SignerStatus::PendingApproval));
    assert_eq!(update.approval_url.as_deref(), Some(APPROVAL_URL));

    let requests = server.received_requests().await.unwrap();
    let register = requests
        .iter()
        .find(|r| r.url.path() == "/signer/signed_key")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&register.body).unwrap();
    let signature = body["signature"].as_str().unwrap();
    assert!(signature.starts_with("0x"));
    assert_eq!(signature.len(), 2 + 130);
    assert!(body["deadline"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_self_sponsorship_includes_app_signature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/signer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "signer_uuid": "fresh-uuid",
            "public_key": public_key(),
            "status": "generated"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/signer/signed_key"))
        .and(body_partial_json(json!({
            "sponsor": {"sponsored_by_neynar": false, "fid": 1234}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "signer_uuid": "fresh-uuid",
            "status": "pending_approval",
            "signer_approval_url": APPROVAL_URL
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = NeynarConfig {
        self_sponsor: true,
        ..config_for(&server)
    };
    let client = NeynarClient::new(&config).unwrap().with_retry(fast_retry(1));
    let registered = client.create_signed_key().await.unwrap();
    assert_eq!(registered.signer_approval_url.as_deref(), Some(APPROVAL_URL));
}

#[tokio::test]
async fn test_register_without_app_key_fails_before_any_request() {
    let server = MockServer::start().await;
    let config = NeynarConfig {
        app_private_key: None,
        ..config_for(&server)
    };
    let client = NeynarClient::new(&config).unwrap();

    let err = client.register_signer("uuid-1").await.unwrap_err();
    assert!(matches!(err, ProviderError::Config(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_app_fid_is_looked_up_once_by_custody_address() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/custody-address"))
        .and(query_param("custody_address", APP_ADDRESS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": {"fid": 99, "username": "colorapp"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = NeynarConfig {
        app_fid: None,
        ..config_for(&server)
    };
    let client = NeynarClient::new(&config).unwrap();

    assert_eq!(client.app_address().as_deref(), Some(APP_ADDRESS));
    assert_eq!(client.app_fid().await.unwrap(), 99);
    assert_eq!(client.app_fid().await.unwrap(), 99);
    assert_eq!(
        AppSigner::from_hex(APP_KEY).unwrap().address(),
        APP_ADDRESS
    );
}

#[tokio::test]
async fn test_profile_lookup_is_cached_until_pfp_update() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/bulk"))
        .and(query_param("fids", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{
                "fid": 42,
                "username": "alice",
                "display_name": "Alice",
                "pfp_url": "https://i.example/alice.png"
            }]
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/user"))
        .and(body_partial_json(json!({
            "signer_uuid": "uuid-1",
            "pfp_url": "https://colors.example/uploads/x.svg"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);

    let user = client.fetch_user(42).await.unwrap().unwrap();
    assert_eq!(user.username, "alice");
    assert_eq!(
        client.fetch_profile_picture(42).await.unwrap().as_deref(),
        Some("https://i.example/alice.png")
    );

    ProfileApi::update_pfp(&client, "uuid-1", "https://colors.example/uploads/x.svg", 42)
        .await
        .unwrap();

    // Cache entry was dropped by the update
    client.fetch_user(42).await.unwrap();
}

#[tokio::test]
async fn test_unknown_user_has_no_pfp() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"users": []})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert_eq!(client.fetch_profile_picture(5).await.unwrap(), None);
}

#[tokio::test]
async fn test_create_signer_retries_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/signer"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/signer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "signer_uuid": "uuid-after-retry",
            "public_key": public_key(),
            "status": "generated"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = NeynarClient::new(&config_for(&server))
        .unwrap()
        .with_retry(fast_retry(3));
    let signer = client.create_signer().await.unwrap();
    assert_eq!(signer.id, "uuid-after-retry");
}
