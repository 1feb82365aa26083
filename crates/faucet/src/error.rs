//! Error types for the faucet service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use spigot_common::types::Address;
use spigot_crypto::{EcdsaError, TxError};
use thiserror::Error;

/// Faucet service errors
#[derive(Error, Debug)]
pub enum FaucetError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid signer: {0}")]
    InvalidSigner(String),

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("invalid network: {0}")]
    InvalidNetwork(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("recipient not eligible: {0}")]
    EligibilityDenied(String),

    #[error("challenge verification required")]
    ChallengeRequired,

    #[error("signer {signer} failed to submit: {reason}")]
    SubmitError { signer: Address, reason: String },

    #[error("no signer became available before the deadline")]
    PoolExhausted,

    #[error("invalid token")]
    InvalidToken,

    #[error("faucet mode disabled: {0}")]
    Disabled(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] EcdsaError),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl From<TxError> for FaucetError {
    fn from(err: TxError) -> Self {
        match err {
            TxError::Signature(e) => FaucetError::Crypto(e),
            other => FaucetError::InternalError(other.to_string()),
        }
    }
}

impl FaucetError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            FaucetError::InvalidEndpoint(_) => (StatusCode::SERVICE_UNAVAILABLE, "INVALID_ENDPOINT"),
            FaucetError::InvalidAmount(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INVALID_AMOUNT"),
            FaucetError::InvalidSigner(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INVALID_SIGNER"),
            FaucetError::InvalidTimeout(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INVALID_TIMEOUT"),
            FaucetError::InvalidNetwork(_) => (StatusCode::BAD_REQUEST, "INVALID_NETWORK"),
            FaucetError::InvalidAddress(_) => (StatusCode::BAD_REQUEST, "INVALID_ADDRESS"),
            FaucetError::EligibilityDenied(_) => (StatusCode::FORBIDDEN, "ELIGIBILITY_DENIED"),
            FaucetError::ChallengeRequired => (StatusCode::FORBIDDEN, "CHALLENGE_REQUIRED"),
            FaucetError::SubmitError { .. } => (StatusCode::BAD_GATEWAY, "SUBMIT_ERROR"),
            FaucetError::PoolExhausted => (StatusCode::SERVICE_UNAVAILABLE, "POOL_EXHAUSTED"),
            FaucetError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            FaucetError::Disabled(_) => (StatusCode::NOT_FOUND, "DISABLED"),
            FaucetError::RpcError(_) => (StatusCode::BAD_GATEWAY, "RPC_ERROR"),
            FaucetError::Crypto(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CRYPTO_ERROR"),
            FaucetError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for FaucetError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        let body = Json(json!({
            "error": error_code,
            "message": self.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));

        (status, body).into_response()
    }
}

pub type FaucetResult<T> = Result<T, FaucetError>;
