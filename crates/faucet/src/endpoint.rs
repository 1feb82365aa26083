//! Endpoint selection: first reachable endpoint on the expected chain wins.

use crate::error::{FaucetError, FaucetResult};
use crate::rpc::{with_timeout, Dialer, LedgerClient};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A live ledger client validated against the expected chain.
pub struct ConnectedClient {
    pub client: Arc<dyn LedgerClient>,
    pub endpoint: String,
    pub chain_id: u64,
}

impl std::fmt::Debug for ConnectedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectedClient")
            .field("endpoint", &self.endpoint)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

/// Tries `endpoints` in order. Unreachable or mismatched endpoints are
/// skipped with a warning; only an exhausted list is an error.
pub async fn connect(
    dialer: &dyn Dialer,
    endpoints: &[String],
    expected_chain_id: u64,
    timeout: Duration,
) -> FaucetResult<ConnectedClient> {
    for endpoint in endpoints {
        let client = match tokio::time::timeout(timeout, dialer.dial(endpoint, timeout)).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                warn!(endpoint = %endpoint, error = %e, "cannot connect to endpoint");
                continue;
            }
            Err(_) => {
                warn!(endpoint = %endpoint, "timed out connecting to endpoint");
                continue;
            }
        };

        let chain_id = match with_timeout(timeout, client.chain_id()).await {
            Ok(id) => id,
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "cannot get chain id from endpoint");
                continue;
            }
        };

        if chain_id != expected_chain_id {
            warn!(
                endpoint = %endpoint,
                got = chain_id,
                expected = expected_chain_id,
                "chain id mismatch, skipping endpoint"
            );
            continue;
        }

        info!(endpoint = %endpoint, chain_id, "connected to ledger endpoint");
        return Ok(ConnectedClient {
            client,
            endpoint: endpoint.clone(),
            chain_id,
        });
    }

    Err(FaucetError::InvalidEndpoint(format!(
        "no working endpoint found among {} candidates",
        endpoints.len()
    )))
}
