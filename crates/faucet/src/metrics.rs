//! Prometheus metrics for dispatches, signers and confirmations.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct FaucetMetrics {
    registry: Registry,
    /// Dispatch attempts by outcome (submitted, denied, exhausted, error).
    pub dispatch_total: IntCounterVec,
    /// Tracker terminal outcomes (confirmed, reverted, error, timeout, shutdown).
    pub tracker_total: IntCounterVec,
    pub signers_busy: IntGauge,
    pub packages_total: IntCounter,
}

impl FaucetMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let dispatch_total = IntCounterVec::new(
            Opts::new("faucet_dispatch_total", "Dispatch attempts by outcome"),
            &["outcome"],
        )?;
        let tracker_total = IntCounterVec::new(
            Opts::new("faucet_tracker_total", "Confirmation tracker outcomes"),
            &["outcome"],
        )?;
        let signers_busy = IntGauge::with_opts(Opts::new(
            "faucet_signers_busy",
            "Signers currently holding an unconfirmed transfer",
        ))?;
        let packages_total = IntCounter::with_opts(Opts::new(
            "faucet_packages_total",
            "Signed faucet packages issued",
        ))?;

        registry.register(Box::new(dispatch_total.clone()))?;
        registry.register(Box::new(tracker_total.clone()))?;
        registry.register(Box::new(signers_busy.clone()))?;
        registry.register(Box::new(packages_total.clone()))?;

        Ok(Self {
            registry,
            dispatch_total,
            tracker_total,
            signers_busy,
            packages_total,
        })
    }

    pub fn record_dispatch(&self, outcome: &str) {
        self.dispatch_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_tracker(&self, outcome: &str) {
        self.tracker_total.with_label_values(&[outcome]).inc();
    }

    /// Text exposition of all registered metrics.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
