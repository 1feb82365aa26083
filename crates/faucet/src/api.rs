//! HTTP API for faucet service

use crate::error::{FaucetError, FaucetResult};
use crate::evm::{DispatchRequest, EvmFaucet};
use crate::metrics::FaucetMetrics;
use crate::network::{EvmNetwork, VocdoniNetwork};
use crate::vocdoni::VocdoniFaucet;
use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use spigot_common::types::Address;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

/// Requests each whitelisted token may make.
pub const MAX_REQUESTS_PER_TOKEN: u64 = 10_000;

/// Bearer tokens with their remaining request quota.
#[derive(Debug)]
pub struct TokenWhitelist {
    remaining: Mutex<HashMap<Uuid, u64>>,
}

impl TokenWhitelist {
    pub fn new(tokens: impl IntoIterator<Item = Uuid>, quota: u64) -> Self {
        Self {
            remaining: Mutex::new(tokens.into_iter().map(|t| (t, quota)).collect()),
        }
    }

    /// Parses UUID tokens; blank entries are ignored.
    pub fn parse(tokens: &[String]) -> FaucetResult<Self> {
        let tokens = tokens
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| {
                Uuid::parse_str(t)
                    .map_err(|e| FaucetError::InternalError(format!("invalid whitelist token {}: {}", t, e)))
            })
            .collect::<FaucetResult<Vec<_>>>()?;
        Ok(Self::new(tokens, MAX_REQUESTS_PER_TOKEN))
    }

    pub async fn len(&self) -> usize {
        self.remaining.lock().await.len()
    }

    pub async fn remaining(&self, token: &Uuid) -> Option<u64> {
        self.remaining.lock().await.get(token).copied()
    }

    /// Spends one request of `token`'s quota.
    pub async fn consume(&self, token: &Uuid) -> FaucetResult<u64> {
        let mut remaining = self.remaining.lock().await;
        match remaining.get_mut(token) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Ok(*left)
            }
            _ => Err(FaucetError::InvalidToken),
        }
    }
}

/// Decides whether a request solved the faucet challenge.
#[async_trait]
pub trait ChallengeVerifier: Send + Sync {
    async fn verify(&self, headers: &HeaderMap, recipient: &Address) -> bool;
}

/// Verifier for deployments without a challenge provider: nothing passes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoChallengeVerifier;

#[async_trait]
impl ChallengeVerifier for NoChallengeVerifier {
    async fn verify(&self, _headers: &HeaderMap, _recipient: &Address) -> bool {
        false
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub evm: Option<Arc<EvmFaucet>>,
    pub vocdoni: Option<Arc<VocdoniFaucet>>,
    pub whitelist: Arc<TokenWhitelist>,
    pub challenge: Arc<dyn ChallengeVerifier>,
    pub metrics: Arc<FaucetMetrics>,
    /// How long an EVM request may wait for a free signer.
    pub dispatch_timeout: Duration,
}

/// Success body. Exactly one of `tx_hash` and `faucet_package` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FaucetResponse {
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Hex of the protobuf-encoded package
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faucet_package: Option<String>,
}

/// Builds the router. Faucet routes live under `route`; routes for
/// disabled modes are not mounted.
pub fn router(route: &str, state: ApiState) -> FaucetResult<Router> {
    if !route.starts_with('/') {
        return Err(FaucetError::InternalError(format!(
            "invalid base route ({}), it must start with /",
            route
        )));
    }
    let base = route.trim_end_matches('/');

    let mut faucet = Router::new();
    if state.evm.is_some() {
        faucet = faucet.route("/evm/:network/:address", get(evm_handler));
    }
    if state.vocdoni.is_some() {
        faucet = faucet.route("/vocdoni/:network/:address", get(vocdoni_handler));
    }

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler));
    let app = if base.is_empty() {
        app.merge(faucet)
    } else {
        app.nest(base, faucet)
    };

    Ok(app.layer(TraceLayer::new_for_http()).with_state(state))
}

fn bearer_token(headers: &HeaderMap) -> FaucetResult<Uuid> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(FaucetError::InvalidToken)?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or(FaucetError::InvalidToken)?;
    Uuid::parse_str(token.trim()).map_err(|_| FaucetError::InvalidToken)
}

async fn authorize(state: &ApiState, headers: &HeaderMap) -> FaucetResult<()> {
    let token = bearer_token(headers)?;
    match state.whitelist.consume(&token).await {
        Ok(_) => Ok(()),
        Err(e) => {
            warn!(token = %token, "request with unknown or exhausted token");
            Err(e)
        }
    }
}

fn parse_recipient(address: &str) -> FaucetResult<Address> {
    let recipient: Address = address
        .parse()
        .map_err(|e| FaucetError::InvalidAddress(format!("{}: {}", address, e)))?;
    if recipient.is_zero() {
        return Err(FaucetError::InvalidAddress("zero address".to_string()));
    }
    Ok(recipient)
}

/// Transfers native tokens to `address`.
pub async fn evm_handler(
    State(state): State<ApiState>,
    Path((network, address)): Path<(String, String)>,
    headers: HeaderMap,
) -> FaucetResult<Json<FaucetResponse>> {
    authorize(&state, &headers).await?;
    let evm = state
        .evm
        .as_ref()
        .ok_or_else(|| FaucetError::Disabled("evm".to_string()))?;

    let network: EvmNetwork = network.parse()?;
    if network != evm.network() {
        return Err(FaucetError::InvalidNetwork(format!("{} is not served here", network)));
    }
    let recipient = parse_recipient(&address)?;
    info!(recipient = %recipient, network = %network, "evm faucet request");

    let challenge_passed = state.challenge.verify(&headers, &recipient).await;
    let request = DispatchRequest::new(recipient)
        .with_challenge(challenge_passed)
        .with_timeout(state.dispatch_timeout);

    match evm.dispatch(request).await {
        Ok(dispatched) => Ok(Json(FaucetResponse {
            amount: dispatched.amount.to_string(),
            tx_hash: Some(dispatched.tx_hash.to_string()),
            faucet_package: None,
        })),
        Err(e) => {
            warn!(recipient = %recipient, error = %e, "evm dispatch failed");
            Err(e)
        }
    }
}

/// Issues a signed package for `address`.
pub async fn vocdoni_handler(
    State(state): State<ApiState>,
    Path((network, address)): Path<(String, String)>,
    headers: HeaderMap,
) -> FaucetResult<Json<FaucetResponse>> {
    authorize(&state, &headers).await?;
    let vocdoni = state
        .vocdoni
        .as_ref()
        .ok_or_else(|| FaucetError::Disabled("vocdoni".to_string()))?;

    let network: VocdoniNetwork = network.parse()?;
    if network != vocdoni.network() {
        return Err(FaucetError::InvalidNetwork(format!("{} is not served here", network)));
    }
    let recipient = parse_recipient(&address)?;
    info!(recipient = %recipient, network = %network, "vocdoni faucet request");

    let challenge_passed = state.challenge.verify(&headers, &recipient).await;
    let package = vocdoni.dispense(&recipient, challenge_passed).await?;
    let amount = package.decode_payload()?.amount;

    Ok(Json(FaucetResponse {
        amount: amount.to_string(),
        tx_hash: None,
        faucet_package: Some(format!("0x{}", hex::encode(package.to_bytes()))),
    }))
}

/// Health check handler
pub async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let evm = state.evm.as_ref().map(|evm| {
        serde_json::json!({
            "network": evm.network().name(),
            "chainId": evm.network().chain_id(),
            "signers": evm.pool().len(),
            "busySigners": evm.pool().busy_count(),
        })
    });
    let vocdoni = state.vocdoni.as_ref().map(|v| {
        serde_json::json!({
            "network": v.network().name(),
            "address": v.address().to_string(),
        })
    });
    Json(serde_json::json!({
        "status": "ok",
        "evm": evm,
        "vocdoni": vocdoni,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub async fn metrics_handler(State(state): State<ApiState>) -> FaucetResult<impl IntoResponse> {
    let text = state
        .metrics
        .gather()
        .map_err(|e| FaucetError::InternalError(format!("cannot gather metrics: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_token_quota_runs_out() {
        let token = Uuid::new_v4();
        let whitelist = TokenWhitelist::new([token], 2);
        assert_eq!(whitelist.consume(&token).await.unwrap(), 1);
        assert_eq!(whitelist.consume(&token).await.unwrap(), 0);
        assert!(matches!(whitelist.consume(&token).await, Err(FaucetError::InvalidToken)));
        assert!(matches!(
            whitelist.consume(&Uuid::new_v4()).await,
            Err(FaucetError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_parse_whitelist() {
        let token = Uuid::new_v4();
        let whitelist = TokenWhitelist::parse(&[token.to_string(), " ".to_string()]).unwrap();
        assert_eq!(whitelist.len().await, 1);
        assert_eq!(whitelist.remaining(&token).await, Some(MAX_REQUESTS_PER_TOKEN));
        assert!(TokenWhitelist::parse(&["not-a-uuid".to_string()]).is_err());
    }

    #[test]
    fn test_bearer_token_parsing() {
        let token = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        assert_eq!(bearer_token(&headers).unwrap(), token);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_err());
    }

    #[test]
    fn test_parse_recipient_rejects_zero_and_malformed() {
        assert!(parse_recipient("0x00000000000000000000000000000000000000aa").is_ok());
        assert!(parse_recipient("00000000000000000000000000000000000000aa").is_ok());
        assert!(matches!(
            parse_recipient("0x0000000000000000000000000000000000000000"),
            Err(FaucetError::InvalidAddress(_))
        ));
        assert!(matches!(parse_recipient("0x1234"), Err(FaucetError::InvalidAddress(_))));
        assert!(matches!(parse_recipient("hello"), Err(FaucetError::InvalidAddress(_))));
    }
}
