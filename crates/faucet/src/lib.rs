//! Multi-signer token faucet.
//!
//! Two dispensing modes share one HTTP surface:
//! - EVM: native-token transfers dispatched over a pool of signing accounts,
//!   each account holding at most one unconfirmed transfer at a time
//! - Vocdoni: signed packages the recipient redeems on the target network

pub mod api;
pub mod config;
pub mod eligibility;
pub mod endpoint;
pub mod error;
pub mod evm;
pub mod metrics;
pub mod network;
pub mod rpc;
pub mod signer;
pub mod tracker;
pub mod vocdoni;

pub use config::{ApiConfig, Config, FaucetConfig};
pub use eligibility::{Eligibility, EligibilityPolicy, SignerPolicy};
pub use error::{FaucetError, FaucetResult};
pub use evm::{DispatchRequest, Dispatched, EvmFaucet, EvmSettings, TxOptions};
pub use metrics::FaucetMetrics;
pub use network::{EvmNetwork, VocdoniNetwork};
pub use rpc::{Dialer, HttpDialer, JsonRpcClient, LedgerClient, Receipt};
pub use signer::{Signer, SignerLease, SignerPool};
pub use tracker::{ConfirmationTracker, InFlightTransfer, TrackOutcome};
pub use vocdoni::{FaucetPackage, FaucetPayload, VocdoniFaucet, VocdoniSettings};
