//! HTTP routes driven through `tower::ServiceExt::oneshot`.

mod common;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use common::{harness, recipient, Harness, AMOUNT};
use spigot_common::types::Address;
use spigot_crypto::KeyPair;
use spigot_faucet::api::{self, ApiState, ChallengeVerifier, FaucetResponse, TokenWhitelist};
use spigot_faucet::{
    EligibilityPolicy, FaucetMetrics, FaucetPackage, VocdoniFaucet, VocdoniNetwork, VocdoniSettings,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

/// Passes requests that carry `x-challenge: solved`.
struct HeaderChallenge;

#[async_trait]
impl ChallengeVerifier for HeaderChallenge {
    async fn verify(&self, headers: &HeaderMap, _recipient: &Address) -> bool {
        headers.get("x-challenge").map_or(false, |v| v == "solved")
    }
}

struct TestApi {
    h: Harness,
    vocdoni: Arc<VocdoniFaucet>,
    token: Uuid,
    app: Router,
}

fn build(route: &str, quota: u64, enable_evm: bool, challenge: bool) -> TestApi {
    let h = harness(2, |s| s.policy.challenge = challenge);
    let metrics = Arc::new(FaucetMetrics::new().unwrap());
    let vocdoni = Arc::new(
        VocdoniFaucet::new(
            VocdoniNetwork::Dev,
            KeyPair::random(),
            VocdoniSettings {
                amount: 100,
                policy: EligibilityPolicy {
                    max_recipient_balance: common::THRESHOLD,
                    challenge,
                },
            },
            Arc::clone(&metrics),
        )
        .unwrap(),
    );
    let token = Uuid::new_v4();
    let state = ApiState {
        evm: enable_evm.then(|| Arc::clone(&h.faucet)),
        vocdoni: Some(Arc::clone(&vocdoni)),
        whitelist: Arc::new(TokenWhitelist::new([token], quota)),
        challenge: Arc::new(HeaderChallenge),
        metrics,
        dispatch_timeout: Duration::from_millis(200),
    };
    let app = api::router(route, state).unwrap();
    TestApi { h, vocdoni, token, app }
}

fn get(uri: &str, token: Option<Uuid>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn evm_uri(network: &str, address: &Address) -> String {
    format!("/evm/{}/{}", network, address)
}

#[tokio::test]
async fn test_missing_or_unknown_token_is_unauthorized() {
    let t = build("/", 10, true, false);
    let uri = evm_uri("evmtest", &recipient(1));

    let (status, body) = send(&t.app, get(&uri, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "INVALID_TOKEN");

    let (status, _) = send(&t.app, get(&uri, Some(Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(t.h.ledger.submitted().is_empty());
}

#[tokio::test]
async fn test_token_quota_runs_out() {
    let t = build("/", 1, true, false);
    let uri = format!("/vocdoni/dev/{}", recipient(1));

    let (status, _) = send(&t.app, get(&uri, Some(t.token))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&t.app, get(&uri, Some(t.token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_bad_address_or_network_is_rejected() {
    let t = build("/", 10, true, false);
    let token = Some(t.token);

    let (status, body) = send(&t.app, get("/evm/evmtest/0x1234", token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_ADDRESS");

    let (status, _) = send(&t.app, get(&evm_uri("evmtest", &Address::ZERO), token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&t.app, get(&evm_uri("sepolia", &recipient(1)), token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_NETWORK");

    let (status, _) = send(&t.app, get(&evm_uri("nowhere", &recipient(1)), token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&t.app, get(&format!("/vocdoni/lts/{}", recipient(1)), token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_evm_request_returns_tx_hash() {
    let t = build("/", 10, true, false);

    let (status, body) = send(&t.app, get(&evm_uri("evmtest", &recipient(1)), Some(t.token))).await;
    assert_eq!(status, StatusCode::OK);
    let response: FaucetResponse = serde_json::from_value(body).unwrap();
    assert_eq!(response.amount, AMOUNT.to_string());
    assert!(response.faucet_package.is_none());

    let submitted = t.h.ledger.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(response.tx_hash, Some(submitted[0].hash.to_string()));
}

#[tokio::test]
async fn test_ineligible_recipient_is_forbidden() {
    let t = build("/", 10, true, false);
    t.h.ledger.set_balance(recipient(1), 10_000);

    let (status, body) = send(&t.app, get(&evm_uri("evmtest", &recipient(1)), Some(t.token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "ELIGIBILITY_DENIED");
}

#[tokio::test]
async fn test_busy_pool_times_out_with_service_unavailable() {
    let t = build("/", 10, true, false);
    let token = Some(t.token);

    for i in 1..=2 {
        let (status, _) = send(&t.app, get(&evm_uri("evmtest", &recipient(i)), token)).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = send(&t.app, get(&evm_uri("evmtest", &recipient(3)), token)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "POOL_EXHAUSTED");
}

#[tokio::test]
async fn test_challenge_header_is_consulted() {
    let t = build("/", 10, true, true);
    let uri = evm_uri("evmtest", &recipient(1));

    let (status, body) = send(&t.app, get(&uri, Some(t.token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "CHALLENGE_REQUIRED");

    let mut request = get(&uri, Some(t.token));
    request
        .headers_mut()
        .insert("x-challenge", "solved".parse().unwrap());
    let (status, _) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_vocdoni_request_returns_verifiable_package() {
    let t = build("/", 10, true, false);
    let to = recipient(7);

    let (status, body) = send(&t.app, get(&format!("/vocdoni/dev/{}", to), Some(t.token))).await;
    assert_eq!(status, StatusCode::OK);
    let response: FaucetResponse = serde_json::from_value(body).unwrap();
    assert_eq!(response.amount, "100");
    assert!(response.tx_hash.is_none());

    let encoded = response.faucet_package.unwrap();
    let bytes = hex::decode(encoded.trim_start_matches("0x")).unwrap();
    let package = FaucetPackage::from_bytes(&bytes).unwrap();
    assert!(package.verify(&t.vocdoni.address()));
    let payload = package.decode_payload().unwrap();
    assert_eq!(payload.to, to.as_bytes().to_vec());
    assert_eq!(payload.amount, 100);
}

#[tokio::test]
async fn test_base_route_and_disabled_mode() {
    let t = build("/v2/", 10, false, false);
    let token = Some(t.token);

    let (status, _) = send(&t.app, get(&format!("/v2/vocdoni/dev/{}", recipient(1)), token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&t.app, get(&format!("/v2{}", evm_uri("evmtest", &recipient(1))), token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&t.app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["evm"].is_null());
    assert_eq!(body["vocdoni"]["network"], "dev");
}

#[tokio::test]
async fn test_route_must_start_with_slash() {
    let t = build("/", 10, true, false);
    let state = ApiState {
        evm: Some(Arc::clone(&t.h.faucet)),
        vocdoni: None,
        whitelist: Arc::new(TokenWhitelist::new(Vec::<Uuid>::new(), 1)),
        challenge: Arc::new(HeaderChallenge),
        metrics: Arc::new(FaucetMetrics::new().unwrap()),
        dispatch_timeout: Duration::from_secs(1),
    };
    assert!(api::router("v2", state).is_err());
}

#[tokio::test]
async fn test_metrics_endpoint_reports_dispatches() {
    let t = build("/", 10, true, false);
    let (status, _) = send(&t.app, get(&evm_uri("evmtest", &recipient(1)), Some(t.token))).await;
    assert_eq!(status, StatusCode::OK);

    let response = t.app.clone().oneshot(get("/metrics", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("faucet_packages_total"));
    assert!(text.contains("faucet_signers_busy"));
}
