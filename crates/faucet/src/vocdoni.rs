//! Signed faucet packages.
//!
//! Instead of transferring anything, the package faucet signs a small
//! protobuf payload naming the recipient and amount. The recipient redeems it
//! on the target network, which checks the signature against the faucet's
//! known address and rejects reused identifiers.

use crate::eligibility::{Eligibility, EligibilityPolicy};
use crate::error::{FaucetError, FaucetResult};
use crate::metrics::FaucetMetrics;
use crate::network::VocdoniNetwork;
use prost::Message;
use rand::rngs::OsRng;
use rand::Rng;
use spigot_common::types::Address;
use spigot_crypto::ecdsa::recover_message_signer;
use spigot_crypto::KeyPair;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Body of a package.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FaucetPayload {
    /// Random per-package nonce used by the redeemer to reject replays.
    #[prost(uint64, tag = "1")]
    pub identifier: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub to: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub amount: u64,
}

/// Encoded payload plus the faucet's signature over it.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FaucetPackage {
    #[prost(bytes = "vec", tag = "1")]
    pub payload: ::prost::alloc::vec::Vec<u8>,
    /// 65 bytes, `r || s || v` with `v` in {0, 1}.
    #[prost(bytes = "vec", tag = "2")]
    pub signature: ::prost::alloc::vec::Vec<u8>,
}

impl FaucetPackage {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> FaucetResult<Self> {
        Self::decode(bytes).map_err(|e| FaucetError::InternalError(format!("invalid package: {}", e)))
    }

    pub fn decode_payload(&self) -> FaucetResult<FaucetPayload> {
        FaucetPayload::decode(self.payload.as_slice())
            .map_err(|e| FaucetError::InternalError(format!("invalid package payload: {}", e)))
    }

    /// Address that produced the signature.
    pub fn signer(&self) -> FaucetResult<Address> {
        Ok(recover_message_signer(&self.payload, &self.signature)?)
    }

    pub fn verify(&self, expected: &Address) -> bool {
        self.signer().map(|a| a == *expected).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VocdoniSettings {
    pub amount: u64,
    /// Only the challenge gate applies; there is no ledger to read balances from.
    pub policy: EligibilityPolicy,
}

pub struct VocdoniFaucet {
    network: VocdoniNetwork,
    keys: KeyPair,
    settings: RwLock<VocdoniSettings>,
    metrics: Arc<FaucetMetrics>,
}

impl VocdoniFaucet {
    pub fn new(
        network: VocdoniNetwork,
        keys: KeyPair,
        settings: VocdoniSettings,
        metrics: Arc<FaucetMetrics>,
    ) -> FaucetResult<Self> {
        if settings.amount == 0 {
            return Err(FaucetError::InvalidAmount("amount must be greater than zero".to_string()));
        }
        info!(
            network = %network,
            signer = %keys.address(),
            amount = settings.amount,
            "package faucet initialized"
        );
        Ok(Self {
            network,
            keys,
            settings: RwLock::new(settings),
            metrics,
        })
    }

    pub fn network(&self) -> VocdoniNetwork {
        self.network
    }

    /// Address redeemers verify packages against.
    pub fn address(&self) -> Address {
        self.keys.address()
    }

    pub async fn amount(&self) -> u64 {
        self.settings.read().await.amount
    }

    pub async fn set_amount(&self, amount: u64) -> FaucetResult<()> {
        if amount == 0 {
            return Err(FaucetError::InvalidAmount("amount must be greater than zero".to_string()));
        }
        self.settings.write().await.amount = amount;
        Ok(())
    }

    pub async fn set_policy(&self, policy: EligibilityPolicy) {
        self.settings.write().await.policy = policy;
    }

    /// Signs a package for `recipient` after applying the challenge gate.
    pub async fn dispense(&self, recipient: &Address, challenge_passed: bool) -> FaucetResult<FaucetPackage> {
        let policy = self.settings.read().await.policy;
        if let Eligibility::Deny(reason) = policy.check_challenge(challenge_passed) {
            debug!(recipient = %recipient, reason, "challenge gate refused package");
            return Err(FaucetError::ChallengeRequired);
        }
        self.generate_package(recipient).await
    }

    pub async fn generate_package(&self, recipient: &Address) -> FaucetResult<FaucetPackage> {
        let amount = self.amount().await;
        let payload = FaucetPayload {
            identifier: OsRng.gen_range(0..i64::MAX as u64),
            to: recipient.as_bytes().to_vec(),
            amount,
        };
        let payload = payload.encode_to_vec();
        let signature = self.keys.sign_message(&payload)?;

        self.metrics.packages_total.inc();
        info!(recipient = %recipient, amount, network = %self.network, "faucet package generated");
        Ok(FaucetPackage {
            payload,
            signature: signature.to_vec(),
        })
    }
}
