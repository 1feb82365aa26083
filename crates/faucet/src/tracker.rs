//! Confirmation tracking for submitted transfers.

use crate::metrics::FaucetMetrics;
use crate::rpc::{with_timeout, LedgerClient};
use crate::signer::SignerLease;
use spigot_common::types::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A submitted transfer whose signer is still held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlightTransfer {
    pub tx_hash: Hash,
    pub signer_index: usize,
    pub nonce: u64,
}

/// How tracking of a transfer ended. Every variant releases the signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Confirmed,
    Reverted,
    TrackingError(String),
    TimedOut,
    Shutdown,
}

impl TrackOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TrackOutcome::Confirmed => "confirmed",
            TrackOutcome::Reverted => "reverted",
            TrackOutcome::TrackingError(_) => "error",
            TrackOutcome::TimedOut => "timeout",
            TrackOutcome::Shutdown => "shutdown",
        }
    }
}

/// Polls the ledger for a receipt and releases the signer on a terminal state.
pub struct ConfirmationTracker {
    pub client: Arc<dyn LedgerClient>,
    pub poll_interval: Duration,
    pub rpc_timeout: Duration,
    /// `None` waits for as long as the transfer stays unmined.
    pub max_wait: Option<Duration>,
    pub shutdown: watch::Receiver<bool>,
    pub metrics: Arc<FaucetMetrics>,
}

impl ConfirmationTracker {
    pub fn spawn(self, transfer: InFlightTransfer, lease: SignerLease) -> JoinHandle<TrackOutcome> {
        tokio::spawn(self.track(transfer, lease))
    }

    pub async fn track(mut self, transfer: InFlightTransfer, lease: SignerLease) -> TrackOutcome {
        let signer = lease.signer().address();
        let tx_hash = transfer.tx_hash;
        let started = Instant::now();
        debug!(signer = %signer, tx = %tx_hash, nonce = transfer.nonce, "waiting for tx");

        let outcome = loop {
            if *self.shutdown.borrow() {
                break TrackOutcome::Shutdown;
            }

            match with_timeout(self.rpc_timeout, self.client.transaction_receipt(&tx_hash)).await {
                Ok(Some(receipt)) if receipt.succeeded() => {
                    info!(signer = %signer, tx = %tx_hash, "tx successfully executed");
                    break TrackOutcome::Confirmed;
                }
                Ok(Some(receipt)) => {
                    warn!(signer = %signer, tx = %tx_hash, status = receipt.status, "tx failed on execution");
                    break TrackOutcome::Reverted;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(signer = %signer, tx = %tx_hash, error = %e, "cannot check tx status");
                    break TrackOutcome::TrackingError(e.to_string());
                }
            }

            if let Some(max_wait) = self.max_wait {
                if started.elapsed() >= max_wait {
                    warn!(signer = %signer, tx = %tx_hash, "tx not mined in time, releasing signer");
                    break TrackOutcome::TimedOut;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = self.shutdown.changed() => {
                    // A dropped sender means the owning faucet is gone.
                    if changed.is_err() {
                        break TrackOutcome::Shutdown;
                    }
                }
            }
        };

        self.metrics.record_tracker(outcome.label());
        drop(lease);
        self.metrics.signers_busy.dec();
        outcome
    }
}
