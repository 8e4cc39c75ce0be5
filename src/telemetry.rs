// SPDX-License-Identifier: MIT

//! Structured logging initialization and the Prometheus metrics surface:
//! an `initialize_logging` / `METRICS_REGISTRY` / `serve_metrics` trio.

use std::sync::LazyLock;

use axum::routing::get;
use axum::Router;
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tracing::{error, info};

use crate::config::LogMode;
use crate::constants::{METRICS_NAMESPACE, METRICS_PATH};

/// Global Prometheus registry every metric below registers into, exposed
/// at `/metrics` by [`serve_metrics`].
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Total provider writes, labeled by provider and outcome.
pub static PROVIDER_WRITES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_provider_writes_total"),
        "Total number of provider write operations by provider and outcome",
    );
    let counter = CounterVec::new(opts, &["provider", "outcome"]).expect("valid metric labels");
    METRICS_REGISTRY.register(Box::new(counter.clone())).expect("unique metric name");
    counter
});

/// Total probe executions, labeled by probe key and outcome.
pub static PROBE_EXECUTIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_probe_executions_total"),
        "Total number of health probe executions by probe key and outcome",
    );
    let counter = CounterVec::new(opts, &["probe_key", "outcome"]).expect("valid metric labels");
    METRICS_REGISTRY.register(Box::new(counter.clone())).expect("unique metric name");
    counter
});

/// Total probe status transitions (healthy -> unhealthy or the reverse).
pub static PROBE_STATUS_TRANSITIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_probe_status_transitions_total"),
        "Total number of probe health status transitions",
    );
    let counter = CounterVec::new(opts, &["probe_key", "direction"]).expect("valid metric labels");
    METRICS_REGISTRY.register(Box::new(counter.clone())).expect("unique metric name");
    counter
});

/// Currently connected remote clusters.
pub static ACTIVE_REMOTE_CLUSTERS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_active_remote_clusters"),
        "Number of remote clusters currently contributing desired records",
    );
    let gauge = GaugeVec::new(opts, &["role"]).expect("valid metric labels");
    METRICS_REGISTRY.register(Box::new(gauge.clone())).expect("unique metric name");
    gauge
});

/// `(rootHost, specHash)` gauge used for reconciliation-stability
/// tracking: a value that stops changing between cycles indicates the
/// record has converged.
pub static AUTHORITATIVE_RECORD_SPEC_HASH: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_authoritative_record_spec_hash"),
        "Spec hash of the last published authoritative record, by root host",
    );
    let gauge = GaugeVec::new(opts, &["root_host"]).expect("valid metric labels");
    METRICS_REGISTRY.register(Box::new(gauge.clone())).expect("unique metric name");
    gauge
});

pub fn record_provider_write(provider: &str, succeeded: bool) {
    let outcome = if succeeded { "success" } else { "failure" };
    PROVIDER_WRITES_TOTAL.with_label_values(&[provider, outcome]).inc();
}

pub fn record_probe_execution(probe_key: &str, healthy: bool) {
    let outcome = if healthy { "healthy" } else { "unhealthy" };
    PROBE_EXECUTIONS_TOTAL.with_label_values(&[probe_key, outcome]).inc();
}

pub fn record_probe_transition(probe_key: &str, became_healthy: bool) {
    let direction = if became_healthy { "to_healthy" } else { "to_unhealthy" };
    PROBE_STATUS_TRANSITIONS_TOTAL.with_label_values(&[probe_key, direction]).inc();
}

/// Renders every registered metric in Prometheus text exposition format.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Initializes the global `tracing` subscriber. Respects `RUST_LOG` if
/// set, otherwise falls back to the configured `--log-level`; switches
/// between compact text and JSON output based on `--log-mode`.
pub fn init_logging(log_mode: LogMode, log_level: crate::config::LogLevel) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level.as_filter_str()));

    match log_mode {
        LogMode::Production => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .json()
                .init();
        }
        LogMode::Development => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("dns-authority starting up");
}

async fn metrics_handler() -> String {
    match gather_metrics() {
        Ok(body) => body,
        Err(err) => {
            error!(error = %err, "failed to gather metrics");
            String::from("# error gathering metrics\n")
        }
    }
}

/// Serves the Prometheus text exposition endpoint at `bind_address` +
/// [`METRICS_PATH`] until the returned task is aborted.
pub fn serve_metrics(bind_address: String) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let router = Router::new().route(METRICS_PATH, get(metrics_handler));
        let listener = match tokio::net::TcpListener::bind(&bind_address).await {
            Ok(listener) => listener,
            Err(err) => {
                error!(error = %err, address = %bind_address, "failed to bind metrics server");
                return;
            }
        };
        info!(address = %bind_address, path = METRICS_PATH, "serving Prometheus metrics");
        if let Err(err) = axum::serve(listener, router).await {
            error!(error = %err, "metrics server exited");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_metrics_produces_prometheus_text_format() {
        record_provider_write("inmemory", true);
        let text = gather_metrics().unwrap();
        assert!(text.contains("dns_authority_provider_writes_total"));
    }
}
