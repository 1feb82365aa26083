//! Signing accounts and the pool that hands them out.
//!
//! Each [`Signer`] carries a busy flag guarding its transaction-ordering
//! counter. A dispatch claims the flag with a non-blocking compare-and-swap and
//! receives a [`SignerLease`]; the flag is cleared exactly once, when the lease
//! is dropped.

use crate::error::{FaucetError, FaucetResult};
use spigot_common::types::Address;
use spigot_crypto::KeyPair;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::debug;

/// A signing identity plus its busy flag.
#[derive(Debug)]
pub struct Signer {
    keys: KeyPair,
    busy: AtomicBool,
}

impl Signer {
    pub fn new(keys: KeyPair) -> Self {
        Self {
            keys,
            busy: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> Address {
        self.keys.address()
    }

    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Ordered, fixed set of signers.
#[derive(Debug)]
pub struct SignerPool {
    signers: Vec<Signer>,
    released: Notify,
}

impl SignerPool {
    pub fn new(keys: Vec<KeyPair>) -> Self {
        Self {
            signers: keys.into_iter().map(Signer::new).collect(),
            released: Notify::new(),
        }
    }

    /// Builds a pool from hex private keys, preserving their order.
    pub fn from_private_keys(keys: &[String]) -> FaucetResult<Self> {
        if keys.is_empty() {
            return Err(FaucetError::InvalidSigner("no signer keys configured".to_string()));
        }
        let keys = keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                KeyPair::from_private_key_hex(key.trim())
                    .map_err(|e| FaucetError::InvalidSigner(format!("key #{}: {}", i, e)))
            })
            .collect::<FaucetResult<Vec<_>>>()?;
        Ok(Self::new(keys))
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Signer> {
        self.signers.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signer> {
        self.signers.iter()
    }

    pub fn busy_count(&self) -> usize {
        self.signers.iter().filter(|s| s.is_busy()).count()
    }

    /// Claims signer `index` if it is free. Never blocks.
    pub fn try_claim(pool: &Arc<Self>, index: usize) -> Option<SignerLease> {
        let signer = pool.signers.get(index)?;
        signer
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        debug!(signer = %signer.address(), index, "signer claimed");
        Some(SignerLease {
            pool: Arc::clone(pool),
            index,
        })
    }

    /// Resolves after the next release of any signer.
    ///
    /// Call [`Notified::enable`] on the pinned future before scanning so a
    /// release during the scan is not missed.
    pub fn released(&self) -> Notified<'_> {
        self.released.notified()
    }
}

/// Exclusive hold on one signer's ordering counter.
#[derive(Debug)]
pub struct SignerLease {
    pool: Arc<SignerPool>,
    index: usize,
}

impl SignerLease {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn signer(&self) -> &Signer {
        &self.pool.signers[self.index]
    }
}

impl Drop for SignerLease {
    fn drop(&mut self) {
        let signer = &self.pool.signers[self.index];
        signer.busy.store(false, Ordering::Release);
        debug!(signer = %signer.address(), index = self.index, "signer released");
        self.pool.released.notify_waiters();
    }
}
