//! Faucet service binary

use clap::Parser;
use spigot_common::utils::logging::init_logging;
use spigot_faucet::api::{self, ApiState, NoChallengeVerifier, TokenWhitelist};
use spigot_faucet::{Config, EvmFaucet, FaucetConfig, FaucetMetrics, HttpDialer, VocdoniFaucet};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Faucet service CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding faucet.toml (defaults to ~/.faucet)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Write the effective configuration back to the data directory
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output: stdout, stderr or a file path
    #[arg(long)]
    log_output: Option<String>,

    /// Also write warnings and errors to this file
    #[arg(long)]
    log_error_file: Option<String>,

    #[arg(long)]
    enable_evm: Option<bool>,

    #[arg(long)]
    enable_vocdoni: Option<bool>,

    /// Hex private keys of the EVM signers (comma separated)
    #[arg(long, value_delimiter = ',')]
    evm_priv_keys: Vec<String>,

    /// EVM endpoints, tried in order (comma separated)
    #[arg(long, value_delimiter = ',')]
    evm_endpoints: Vec<String>,

    #[arg(long)]
    evm_network: Option<String>,

    /// Amount per EVM transfer (in wei)
    #[arg(long)]
    evm_amount: Option<String>,

    #[arg(long)]
    vocdoni_priv_key: Option<String>,

    #[arg(long)]
    vocdoni_network: Option<String>,

    #[arg(long)]
    vocdoni_amount: Option<u64>,

    /// Recipients holding this many wei or more are refused
    #[arg(long)]
    amount_threshold: Option<String>,

    /// Require a solved challenge on every request
    #[arg(long)]
    enable_challenge: bool,

    /// Base route for the faucet endpoints
    #[arg(long)]
    api_route: Option<String>,

    #[arg(long)]
    api_listen_host: Option<String>,

    #[arg(long)]
    api_listen_port: Option<u16>,

    /// Bearer tokens (UUIDs) accepted by the API (comma separated)
    #[arg(long, value_delimiter = ',')]
    api_whitelist: Vec<String>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
        if let Some(output) = &self.log_output {
            config.log.output = output.clone();
        }
        if let Some(path) = &self.log_error_file {
            config.log.error_file = Some(path.clone());
        }

        let faucet = &mut config.faucet;
        if let Some(enable) = self.enable_evm {
            faucet.enable_evm = enable;
        }
        if let Some(enable) = self.enable_vocdoni {
            faucet.enable_vocdoni = enable;
        }
        if !self.evm_priv_keys.is_empty() {
            faucet.evm_priv_keys = self.evm_priv_keys.clone();
        }
        if !self.evm_endpoints.is_empty() {
            faucet.evm_endpoints = self.evm_endpoints.clone();
        }
        if let Some(network) = &self.evm_network {
            faucet.evm_network = network.clone();
        }
        if let Some(amount) = &self.evm_amount {
            faucet.evm_amount = amount.clone();
        }
        if let Some(key) = &self.vocdoni_priv_key {
            faucet.vocdoni_priv_key = key.clone();
        }
        if let Some(network) = &self.vocdoni_network {
            faucet.vocdoni_network = network.clone();
        }
        if let Some(amount) = self.vocdoni_amount {
            faucet.vocdoni_amount = amount;
        }
        if let Some(threshold) = &self.amount_threshold {
            faucet.send_conditions.balance = threshold.clone();
        }
        if self.enable_challenge {
            faucet.send_conditions.challenge = true;
        }

        if let Some(route) = &self.api_route {
            config.api.route = route.clone();
        }
        if let Some(host) = &self.api_listen_host {
            config.api.listen_host = host.clone();
        }
        if let Some(port) = self.api_listen_port {
            config.api.listen_port = port;
        }
        if !self.api_whitelist.is_empty() {
            config.api.whitelist = self.api_whitelist.clone();
        }
    }
}

async fn build_evm(config: &FaucetConfig, metrics: Arc<FaucetMetrics>) -> anyhow::Result<EvmFaucet> {
    let evm = EvmFaucet::new(
        config.evm_network()?,
        config.evm_settings()?,
        config.evm_signer_pool()?,
        Arc::new(HttpDialer),
        metrics,
    )?;
    evm.connect().await?;
    Ok(evm)
}

fn build_vocdoni(config: &FaucetConfig, metrics: Arc<FaucetMetrics>) -> anyhow::Result<VocdoniFaucet> {
    Ok(VocdoniFaucet::new(
        config.vocdoni_network()?,
        config.vocdoni_keys()?,
        config.vocdoni_settings()?,
        metrics,
    )?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let data_dir = match args.data_dir.clone() {
        Some(dir) => dir,
        None => Config::default_data_dir()?,
    };
    let config_exists = Config::path(&data_dir).exists();
    let mut config = Config::load(&data_dir)?;
    args.apply(&mut config);

    let _log_guards = init_logging(&config.log).map_err(|e| anyhow::anyhow!(e))?;
    info!("Starting faucet v{}", env!("CARGO_PKG_VERSION"));
    info!(data_dir = %data_dir.display(), "using data directory");

    if args.save_config || !config_exists {
        config.save(&data_dir)?;
        info!(path = %Config::path(&data_dir).display(), "configuration saved");
    }

    let metrics = Arc::new(FaucetMetrics::new()?);

    let evm = if config.faucet.enable_evm {
        let evm = build_evm(&config.faucet, Arc::clone(&metrics)).await.map_err(|e| {
            error!(error = %e, "cannot start evm faucet");
            e
        })?;
        Some(Arc::new(evm))
    } else {
        None
    };
    let vocdoni = if config.faucet.enable_vocdoni {
        let vocdoni = build_vocdoni(&config.faucet, Arc::clone(&metrics)).map_err(|e| {
            error!(error = %e, "cannot start vocdoni faucet");
            e
        })?;
        Some(Arc::new(vocdoni))
    } else {
        None
    };
    if evm.is_none() && vocdoni.is_none() {
        anyhow::bail!("both faucet modes are disabled");
    }

    let whitelist = TokenWhitelist::parse(&config.api.whitelist)?;
    if whitelist.len().await == 0 {
        warn!("token whitelist is empty, every faucet request will be refused");
    }
    if config.faucet.send_conditions.challenge {
        warn!("challenge required but no challenge verifier is installed, faucet requests will be refused");
    }

    let state = ApiState {
        evm: evm.clone(),
        vocdoni,
        whitelist: Arc::new(whitelist),
        challenge: Arc::new(NoChallengeVerifier),
        metrics,
        dispatch_timeout: config.faucet.dispatch_timeout()?,
    };
    let app = api::router(&config.api.route, state)?;

    let addr: SocketAddr = config.api.listen_addr().parse()?;
    info!(route = %config.api.route, "Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(evm) = evm {
        evm.shutdown();
    }
    info!("Shutting down gracefully");
    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
