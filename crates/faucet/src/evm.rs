//! EVM dispensing: signer-pool dispatch of native-token transfers.
//!
//! A dispatch checks the recipient against the eligibility policy, then scans
//! the signer pool in order. The first signer that can be claimed, holds
//! enough funds and accepts a signed transfer wins; its lease moves into a
//! [`ConfirmationTracker`] and the transfer hash is returned without waiting
//! for finality. When a full scan yields nothing the dispatch waits for a
//! tracker to release a signer, the retry backoff, or the request deadline,
//! whichever comes first.

use crate::eligibility::{Eligibility, EligibilityPolicy, SignerPolicy};
use crate::endpoint::{self, ConnectedClient};
use crate::error::{FaucetError, FaucetResult};
use crate::metrics::FaucetMetrics;
use crate::network::EvmNetwork;
use crate::rpc::{with_timeout, Dialer};
use crate::signer::{SignerLease, SignerPool};
use crate::tracker::{ConfirmationTracker, InFlightTransfer, TrackOutcome};
use spigot_common::types::{Address, Hash};
use spigot_crypto::LegacyTransfer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Wait between two full scans of a pool with no usable signer.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);
/// Receipt polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOptions {
    pub gas_limit: u64,
    /// Fixed gas price; the endpoint's suggestion is used when unset.
    pub gas_price: Option<u128>,
}

impl Default for TxOptions {
    fn default() -> Self {
        Self {
            gas_limit: 21_000,
            gas_price: None,
        }
    }
}

/// Runtime-adjustable dispatch settings.
#[derive(Debug, Clone)]
pub struct EvmSettings {
    pub endpoints: Vec<String>,
    /// Amount sent per dispatch, in wei.
    pub amount: u128,
    pub policy: EligibilityPolicy,
    pub signer_policy: SignerPolicy,
    pub tx_options: TxOptions,
    /// Bound on every individual ledger call.
    pub timeout: Duration,
    pub retry_interval: Duration,
    pub poll_interval: Duration,
    pub confirmation_timeout: Option<Duration>,
}

impl EvmSettings {
    pub fn validate(&self) -> FaucetResult<()> {
        validate_endpoints(&self.endpoints)?;
        if self.amount == 0 {
            return Err(FaucetError::InvalidAmount("amount must be greater than zero".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(FaucetError::InvalidTimeout("timeout must be positive".to_string()));
        }
        if self.retry_interval.is_zero() || self.poll_interval.is_zero() {
            return Err(FaucetError::InvalidTimeout(
                "retry and poll intervals must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_endpoints(endpoints: &[String]) -> FaucetResult<()> {
    if endpoints.is_empty() {
        return Err(FaucetError::InvalidEndpoint("no endpoints configured".to_string()));
    }
    if endpoints.iter().any(|e| e.trim().is_empty()) {
        return Err(FaucetError::InvalidEndpoint("empty endpoint".to_string()));
    }
    Ok(())
}

/// One inbound request to dispense to `recipient`.
#[derive(Debug, Clone, Copy)]
pub struct DispatchRequest {
    pub recipient: Address,
    pub challenge_passed: bool,
    /// Latest instant at which waiting for a free signer is abandoned.
    pub deadline: Option<Instant>,
}

impl DispatchRequest {
    pub fn new(recipient: Address) -> Self {
        Self {
            recipient,
            challenge_passed: false,
            deadline: None,
        }
    }

    pub fn with_challenge(mut self, passed: bool) -> Self {
        self.challenge_passed = passed;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }
}

/// Result of a successful dispatch.
#[derive(Debug)]
pub struct Dispatched {
    pub tx_hash: Hash,
    pub amount: u128,
    pub signer: Address,
    pub nonce: u64,
    /// Resolves when the signer has been released.
    pub tracker: JoinHandle<TrackOutcome>,
}

enum ScanOutcome {
    Dispatched(Dispatched),
    /// Carries how many signers were claimed and released again.
    NoSigner { attempted: usize },
    LedgerUnreachable,
}

pub struct EvmFaucet {
    network: EvmNetwork,
    settings: RwLock<EvmSettings>,
    pool: Arc<SignerPool>,
    dialer: Arc<dyn Dialer>,
    client: RwLock<Option<Arc<ConnectedClient>>>,
    metrics: Arc<FaucetMetrics>,
    shutdown: watch::Sender<bool>,
}

impl EvmFaucet {
    pub fn new(
        network: EvmNetwork,
        settings: EvmSettings,
        pool: SignerPool,
        dialer: Arc<dyn Dialer>,
        metrics: Arc<FaucetMetrics>,
    ) -> FaucetResult<Self> {
        settings.validate()?;
        if pool.is_empty() {
            return Err(FaucetError::InvalidSigner("no signer keys configured".to_string()));
        }
        info!(
            network = %network,
            chain_id = network.chain_id(),
            signers = pool.len(),
            amount = %settings.amount,
            "evm faucet initialized"
        );
        for signer in pool.iter() {
            debug!(signer = %signer.address(), "signer loaded");
        }
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            network,
            settings: RwLock::new(settings),
            pool: Arc::new(pool),
            dialer,
            client: RwLock::new(None),
            metrics,
            shutdown,
        })
    }

    pub fn network(&self) -> EvmNetwork {
        self.network
    }

    pub fn pool(&self) -> &Arc<SignerPool> {
        &self.pool
    }

    pub async fn amount(&self) -> u128 {
        self.settings.read().await.amount
    }

    pub async fn settings(&self) -> EvmSettings {
        self.settings.read().await.clone()
    }

    pub async fn set_amount(&self, amount: u128) -> FaucetResult<()> {
        if amount == 0 {
            return Err(FaucetError::InvalidAmount("amount must be greater than zero".to_string()));
        }
        self.settings.write().await.amount = amount;
        Ok(())
    }

    /// Replaces the endpoint list; the next dispatch reconnects.
    pub async fn set_endpoints(&self, endpoints: Vec<String>) -> FaucetResult<()> {
        validate_endpoints(&endpoints)?;
        self.settings.write().await.endpoints = endpoints;
        *self.client.write().await = None;
        Ok(())
    }

    pub async fn set_policy(&self, policy: EligibilityPolicy) {
        self.settings.write().await.policy = policy;
    }

    /// Connects (or reconnects) to the first working endpoint.
    pub async fn connect(&self) -> FaucetResult<Arc<ConnectedClient>> {
        let settings = self.settings().await;
        let connected = Arc::new(
            endpoint::connect(
                self.dialer.as_ref(),
                &settings.endpoints,
                self.network.chain_id(),
                settings.timeout,
            )
            .await?,
        );
        *self.client.write().await = Some(Arc::clone(&connected));
        Ok(connected)
    }

    async fn connected_client(&self, settings: &EvmSettings) -> FaucetResult<Arc<ConnectedClient>> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(Arc::clone(client));
        }
        let mut slot = self.client.write().await;
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }
        let connected = Arc::new(
            endpoint::connect(
                self.dialer.as_ref(),
                &settings.endpoints,
                self.network.chain_id(),
                settings.timeout,
            )
            .await?,
        );
        *slot = Some(Arc::clone(&connected));
        Ok(connected)
    }

    async fn invalidate_client(&self, stale: &Arc<ConnectedClient>) {
        let mut slot = self.client.write().await;
        if slot.as_ref().is_some_and(|c| Arc::ptr_eq(c, stale)) {
            warn!(endpoint = %stale.endpoint, "dropping ledger connection, will reconnect");
            *slot = None;
        }
    }

    /// Current balance of `address` on the connected ledger.
    pub async fn balance_at(&self, address: &Address) -> FaucetResult<u128> {
        let settings = self.settings().await;
        let connected = self.connected_client(&settings).await?;
        with_timeout(settings.timeout, connected.client.balance_at(address)).await
    }

    /// Sends the configured amount to `request.recipient`.
    pub async fn dispatch(&self, request: DispatchRequest) -> FaucetResult<Dispatched> {
        let settings = self.settings().await;
        let recipient = request.recipient;

        if let Eligibility::Deny(reason) = settings.policy.check_challenge(request.challenge_passed) {
            debug!(recipient = %recipient, reason, "challenge gate refused request");
            self.metrics.record_dispatch("denied");
            return Err(FaucetError::ChallengeRequired);
        }

        let connected = self.connected_client(&settings).await?;
        let balance = match with_timeout(settings.timeout, connected.client.balance_at(&recipient)).await {
            Ok(balance) => balance,
            Err(e) => {
                self.invalidate_client(&connected).await;
                self.metrics.record_dispatch("error");
                return Err(e);
            }
        };
        if let Eligibility::Deny(reason) = settings.policy.check(balance) {
            info!(recipient = %recipient, balance = %balance, "recipient not eligible");
            self.metrics.record_dispatch("denied");
            return Err(FaucetError::EligibilityDenied(reason));
        }

        let mut connected = Some(connected);
        loop {
            let released = self.pool.released();
            tokio::pin!(released);
            released.as_mut().enable();

            if connected.is_none() {
                match self.connected_client(&settings).await {
                    Ok(client) => connected = Some(client),
                    Err(e) => warn!(error = %e, "reconnect failed"),
                }
            }

            if let Some(client) = connected.clone() {
                let claimed_any = match self.scan(&client, &settings, &recipient).await {
                    ScanOutcome::Dispatched(dispatched) => {
                        self.metrics.record_dispatch("submitted");
                        return Ok(dispatched);
                    }
                    ScanOutcome::LedgerUnreachable => {
                        self.invalidate_client(&client).await;
                        connected = None;
                        true
                    }
                    ScanOutcome::NoSigner { attempted } => attempted > 0,
                };
                // Our own failed attempts released signers and woke `released`.
                if claimed_any {
                    released.set(self.pool.released());
                    released.as_mut().enable();
                }
            }

            debug!(recipient = %recipient, "no signer available, waiting");
            let deadline = async {
                match request.deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = released.as_mut() => {}
                _ = tokio::time::sleep(settings.retry_interval) => {}
                _ = deadline => {
                    warn!(recipient = %recipient, "gave up waiting for a free signer");
                    self.metrics.record_dispatch("exhausted");
                    return Err(FaucetError::PoolExhausted);
                }
            }
        }
    }

    /// One pass over the pool in stable order.
    async fn scan(
        &self,
        connected: &Arc<ConnectedClient>,
        settings: &EvmSettings,
        recipient: &Address,
    ) -> ScanOutcome {
        let mut attempted = 0usize;
        let mut unreachable = 0usize;

        for index in 0..self.pool.len() {
            let Some(lease) = SignerPool::try_claim(&self.pool, index) else {
                debug!(index, "signer has a pending tx");
                continue;
            };
            attempted += 1;

            match self.submit(&lease, connected, settings, recipient).await {
                Ok(transfer) => {
                    let signer = lease.signer().address();
                    info!(
                        signer = %signer,
                        tx = %transfer.tx_hash,
                        nonce = transfer.nonce,
                        "tx sent successfully"
                    );
                    let tracker = ConfirmationTracker {
                        client: Arc::clone(&connected.client),
                        poll_interval: settings.poll_interval,
                        rpc_timeout: settings.timeout,
                        max_wait: settings.confirmation_timeout,
                        shutdown: self.shutdown.subscribe(),
                        metrics: Arc::clone(&self.metrics),
                    };
                    self.metrics.signers_busy.inc();
                    return ScanOutcome::Dispatched(Dispatched {
                        tx_hash: transfer.tx_hash,
                        amount: settings.amount,
                        signer,
                        nonce: transfer.nonce,
                        tracker: tracker.spawn(transfer, lease),
                    });
                }
                Err(e) => {
                    if matches!(e, FaucetError::RpcError(_)) {
                        unreachable += 1;
                    }
                    warn!(signer = %lease.signer().address(), error = %e, "cannot send tx with signer");
                }
            }
        }

        if attempted > 0 && unreachable == attempted {
            ScanOutcome::LedgerUnreachable
        } else {
            ScanOutcome::NoSigner { attempted }
        }
    }

    async fn submit(
        &self,
        lease: &SignerLease,
        connected: &ConnectedClient,
        settings: &EvmSettings,
        recipient: &Address,
    ) -> FaucetResult<InFlightTransfer> {
        let signer = lease.signer();
        let address = signer.address();
        let client = connected.client.as_ref();
        let timeout = settings.timeout;

        let gas_price = match settings.tx_options.gas_price {
            Some(price) => price,
            None => with_timeout(timeout, client.suggest_gas_price()).await?,
        };
        let mut transfer = LegacyTransfer {
            nonce: 0,
            gas_price,
            gas_limit: settings.tx_options.gas_limit,
            to: *recipient,
            value: settings.amount,
            chain_id: connected.chain_id,
        };

        let balance = with_timeout(timeout, client.balance_at(&address)).await?;
        if !settings
            .signer_policy
            .is_sufficient(balance, settings.amount, transfer.max_fee())
        {
            return Err(FaucetError::SubmitError {
                signer: address,
                reason: format!(
                    "balance {} below required {}",
                    balance,
                    settings
                        .signer_policy
                        .required_balance(settings.amount, transfer.max_fee())
                ),
            });
        }

        transfer.nonce = with_timeout(timeout, client.pending_nonce_at(&address)).await?;
        let signed = transfer.sign(signer.keys())?;
        let tx_hash = with_timeout(timeout, client.send_raw_transaction(&signed.raw))
            .await
            .map_err(|e| FaucetError::SubmitError {
                signer: address,
                reason: format!("cannot send signed tx: {}", e),
            })?;
        if tx_hash != signed.hash {
            warn!(local = %signed.hash, remote = %tx_hash, "endpoint returned unexpected tx hash");
        }

        info!(
            amount = %settings.amount,
            to = %recipient,
            signer = %address,
            tx = %tx_hash,
            nonce = transfer.nonce,
            "sending tokens"
        );
        Ok(InFlightTransfer {
            tx_hash,
            signer_index: lease.index(),
            nonce: transfer.nonce,
        })
    }

    /// Stops all confirmation trackers; their signers are released.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}
