//! # Prometheus Metrics
//!
//! Exposes operational metrics for the vault node. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] with
//! the `vault` prefix.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

use vault_ledger::Vault;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Completed operations, labelled by operation name and `ok` / `err`.
    pub operations_total: IntCounterVec,
    /// Wall time of each operation, collaborator calls included.
    pub operation_latency_seconds: HistogramVec,
    pub total_supply: IntGauge,
    pub total_value_locked: IntGauge,
    /// Custodied amount per asset kind.
    pub pool_amount: IntGaugeVec,
    /// 1 once the vault has halted on an accounting inconsistency.
    pub halted: IntGauge,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("vault".into()), None)?;

        let operations_total = IntCounterVec::new(
            Opts::new("operations_total", "Vault and ledger operations by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let operation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Operation latency in seconds, including collaborator calls",
            )
            .buckets(vec![
                0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0,
            ]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_latency_seconds.clone()))?;

        let total_supply = IntGauge::new("total_supply", "Shares outstanding")?;
        registry.register(Box::new(total_supply.clone()))?;

        let total_value_locked =
            IntGauge::new("total_value_locked", "Sum of custodied asset units")?;
        registry.register(Box::new(total_value_locked.clone()))?;

        let pool_amount = IntGaugeVec::new(
            Opts::new("pool_amount", "Custodied units per asset kind"),
            &["asset"],
        )?;
        registry.register(Box::new(pool_amount.clone()))?;

        let halted = IntGauge::new("halted", "1 if the vault has halted")?;
        registry.register(Box::new(halted.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            operation_latency_seconds,
            total_supply,
            total_value_locked,
            pool_amount,
            halted,
        })
    }

    /// Counts one finished operation and its latency.
    pub fn record(&self, operation: &str, ok: bool, elapsed: Duration) {
        let outcome = if ok { "ok" } else { "err" };
        self.operations_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.operation_latency_seconds
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    /// Refreshes the gauges from the vault's committed state.
    pub fn observe(&self, vault: &Vault) {
        self.total_supply.set(saturating_i64(vault.total_supply()));
        self.total_value_locked
            .set(saturating_i64(vault.total_value_locked()));
        for entry in vault.pool_balances() {
            self.pool_amount
                .with_label_values(&[entry.asset.to_string().as_str()])
                .set(saturating_i64(entry.amount));
        }
        self.halted.set(i64::from(vault.halt_reason().is_some()));
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn saturating_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
