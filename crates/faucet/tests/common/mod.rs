//! In-memory ledger shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use spigot_common::types::{Address, Hash};
use spigot_crypto::{KeyPair, LegacyTransfer, SignedTransfer};
use spigot_faucet::{
    Dialer, EligibilityPolicy, EvmFaucet, EvmNetwork, EvmSettings, FaucetError, FaucetMetrics,
    FaucetResult, LedgerClient, Receipt, SignerPolicy, SignerPool, TxOptions,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FUNDED: u128 = 1_000_000_000;
pub const AMOUNT: u128 = 1_000;
pub const THRESHOLD: u128 = 100;

#[derive(Debug, Clone)]
pub struct SubmittedTx {
    pub hash: Hash,
    pub from: Address,
    pub transfer: LegacyTransfer,
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<Address, u128>,
    nonces: HashMap<Address, u64>,
    pending: Vec<Hash>,
    receipts: HashMap<Hash, Receipt>,
    submitted: Vec<SubmittedTx>,
    failing_senders: HashSet<Address>,
    fail_once: HashMap<Address, Duration>,
    balance_error: bool,
    receipt_error: bool,
}

pub struct MockLedger {
    chain_id: u64,
    gas_price: u128,
    state: Mutex<LedgerState>,
}

impl MockLedger {
    pub fn new(chain_id: u64) -> Arc<Self> {
        Arc::new(Self {
            chain_id,
            gas_price: 1,
            state: Mutex::new(LedgerState::default()),
        })
    }

    pub fn set_balance(&self, address: Address, balance: u128) {
        self.state.lock().unwrap().balances.insert(address, balance);
    }

    pub fn fail_sends_from(&self, address: Address) {
        self.state.lock().unwrap().failing_senders.insert(address);
    }

    /// The next send from `address` fails after `delay`.
    pub fn fail_next_send_from(&self, address: Address, delay: Duration) {
        self.state.lock().unwrap().fail_once.insert(address, delay);
    }

    pub fn set_balance_error(&self, fail: bool) {
        self.state.lock().unwrap().balance_error = fail;
    }

    pub fn set_receipt_error(&self, fail: bool) {
        self.state.lock().unwrap().receipt_error = fail;
    }

    pub fn submitted(&self) -> Vec<SubmittedTx> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Mines every pending transaction with the given status.
    pub fn mine_all_with_status(&self, status: u64) -> usize {
        let mut state = self.state.lock().unwrap();
        let pending = std::mem::take(&mut state.pending);
        let count = pending.len();
        for hash in pending {
            state.receipts.insert(
                hash,
                Receipt {
                    status,
                    block_number: Some(1),
                },
            );
        }
        count
    }

    pub fn mine_all(&self) -> usize {
        self.mine_all_with_status(1)
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn chain_id(&self) -> FaucetResult<u64> {
        Ok(self.chain_id)
    }

    async fn balance_at(&self, address: &Address) -> FaucetResult<u128> {
        let state = self.state.lock().unwrap();
        if state.balance_error {
            return Err(FaucetError::RpcError("balance unavailable".to_string()));
        }
        Ok(state.balances.get(address).copied().unwrap_or(0))
    }

    async fn pending_nonce_at(&self, address: &Address) -> FaucetResult<u64> {
        Ok(self.state.lock().unwrap().nonces.get(address).copied().unwrap_or(0))
    }

    async fn suggest_gas_price(&self) -> FaucetResult<u128> {
        Ok(self.gas_price)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> FaucetResult<Hash> {
        let (transfer, from) =
            SignedTransfer::decode(raw).map_err(|e| FaucetError::RpcError(e.to_string()))?;
        let delayed_failure = self.state.lock().unwrap().fail_once.remove(&from);
        if let Some(delay) = delayed_failure {
            tokio::time::sleep(delay).await;
            return Err(FaucetError::RpcError("rejected after delay".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        if state.failing_senders.contains(&from) {
            return Err(FaucetError::RpcError("rejected".to_string()));
        }
        if transfer.chain_id != self.chain_id {
            return Err(FaucetError::RpcError("wrong chain id".to_string()));
        }
        let expected = state.nonces.get(&from).copied().unwrap_or(0);
        if transfer.nonce != expected {
            return Err(FaucetError::RpcError(format!(
                "nonce {} does not match {}",
                transfer.nonce, expected
            )));
        }
        state.nonces.insert(from, expected + 1);

        let hash = Hash(keccak_hash::keccak(raw).0);
        state.pending.push(hash);
        state.submitted.push(SubmittedTx { hash, from, transfer });
        Ok(hash)
    }

    async fn transaction_receipt(&self, tx_hash: &Hash) -> FaucetResult<Option<Receipt>> {
        let state = self.state.lock().unwrap();
        if state.receipt_error {
            return Err(FaucetError::RpcError("receipt unavailable".to_string()));
        }
        Ok(state.receipts.get(tx_hash).copied())
    }
}

/// Resolves endpoint strings to mock ledgers; unknown endpoints refuse.
#[derive(Default)]
pub struct MockDialer {
    ledgers: Mutex<HashMap<String, Arc<MockLedger>>>,
    dials: AtomicUsize,
}

impl MockDialer {
    pub fn with(endpoint: &str, ledger: Arc<MockLedger>) -> Arc<Self> {
        let dialer = Self::default();
        dialer.add(endpoint, ledger);
        Arc::new(dialer)
    }

    pub fn add(&self, endpoint: &str, ledger: Arc<MockLedger>) {
        self.ledgers.lock().unwrap().insert(endpoint.to_string(), ledger);
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dialer for MockDialer {
    async fn dial(&self, endpoint: &str, _timeout: Duration) -> FaucetResult<Arc<dyn LedgerClient>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let ledger = self.ledgers.lock().unwrap().get(endpoint).cloned();
        match ledger {
            Some(ledger) => Ok(ledger as Arc<dyn LedgerClient>),
            None => Err(FaucetError::RpcError(format!("connection refused: {}", endpoint))),
        }
    }
}

pub const ENDPOINT: &str = "mock://ledger";

pub fn settings() -> EvmSettings {
    EvmSettings {
        endpoints: vec![ENDPOINT.to_string()],
        amount: AMOUNT,
        policy: EligibilityPolicy {
            max_recipient_balance: THRESHOLD,
            challenge: false,
        },
        signer_policy: SignerPolicy::default(),
        tx_options: TxOptions::default(),
        timeout: Duration::from_secs(1),
        retry_interval: Duration::from_millis(20),
        poll_interval: Duration::from_millis(5),
        confirmation_timeout: None,
    }
}

pub struct Harness {
    pub ledger: Arc<MockLedger>,
    pub dialer: Arc<MockDialer>,
    pub faucet: Arc<EvmFaucet>,
    pub signers: Vec<Address>,
}

/// Faucet on the local test chain with `signers` funded accounts.
pub fn harness(signers: usize, tweak: impl FnOnce(&mut EvmSettings)) -> Harness {
    spigot_common::utils::logging::init_test_logging();
    let network = EvmNetwork::EvmTest;
    let ledger = MockLedger::new(network.chain_id());
    let dialer = MockDialer::with(ENDPOINT, Arc::clone(&ledger));

    let keys: Vec<KeyPair> = (0..signers).map(|_| KeyPair::random()).collect();
    let addresses: Vec<Address> = keys.iter().map(|k| k.address()).collect();
    for address in &addresses {
        ledger.set_balance(*address, FUNDED);
    }

    let mut settings = settings();
    tweak(&mut settings);
    let faucet = EvmFaucet::new(
        network,
        settings,
        SignerPool::new(keys),
        dialer.clone(),
        Arc::new(FaucetMetrics::new().unwrap()),
    )
    .unwrap();

    Harness {
        ledger,
        dialer,
        faucet: Arc::new(faucet),
        signers: addresses,
    }
}

pub fn recipient(n: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = 0xaa;
    bytes[19] = n;
    Address(bytes)
}
