use std::time::Duration;

use anyhow::Result;
use axum::{routing::get, Router};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::MetricsConfig;

/// Outcome of a cache lookup as seen by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    Hit,
    Miss,
    Error,
}

impl LookupOutcome {
    fn as_str(self) -> &'static str {
        match self {
            LookupOutcome::Hit => "hit",
            LookupOutcome::Miss => "miss",
            LookupOutcome::Error => "error",
        }
    }
}

/// Metrics collector for proxy and cache events
#[derive(Clone)]
pub struct MetricsCollector {
    enabled: bool,
    prometheus_handle: Option<PrometheusHandle>,
}

impl MetricsCollector {
    pub fn new(config: &MetricsConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }

        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

        Self::register_metrics();

        Ok(Self {
            enabled: true,
            prometheus_handle: Some(handle),
        })
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            prometheus_handle: None,
        }
    }

    fn register_metrics() {
        describe_counter!("proxy_requests_total", "Requests handled, by route and outcome");
        describe_counter!("proxy_cache_lookups_total", "Cache lookups, by result");
        describe_counter!("proxy_cache_writes_total", "Cache writes, by result");
        describe_counter!("proxy_upstream_errors_total", "Failed upstream forwards, by kind");
        describe_histogram!("proxy_upstream_duration_seconds", "Upstream round-trip time in seconds");
    }

    /// Serve the Prometheus exposition on its own listener
    pub async fn start_server(&self, config: &MetricsConfig) -> Result<()> {
        let Some(handle) = self.prometheus_handle.clone() else {
            return Ok(());
        };

        let app = Router::new()
            .route(&config.path, get(move || async move { handle.render() }))
            .route("/health", get(|| async { "OK" }));

        let addr = format!("0.0.0.0:{}", config.port);
        let listener = TcpListener::bind(&addr).await?;

        info!("Metrics server listening on {}{}", addr, config.path);
        axum::serve(listener, app).await?;
        Ok(())
    }

    pub fn record_request(&self, route: &'static str, status: u16) {
        if !self.enabled {
            return;
        }

        let outcome = match status {
            200..=299 => "success",
            405 => "method_not_allowed",
            404 => "unreachable",
            _ => "error",
        };
        counter!("proxy_requests_total", "route" => route, "outcome" => outcome).increment(1);
    }

    pub fn record_lookup(&self, outcome: LookupOutcome) {
        if !self.enabled {
            return;
        }
        counter!("proxy_cache_lookups_total", "result" => outcome.as_str()).increment(1);
    }

    pub fn record_write(&self, success: bool) {
        if !self.enabled {
            return;
        }
        let result = if success { "ok" } else { "error" };
        counter!("proxy_cache_writes_total", "result" => result).increment(1);
    }

    pub fn record_upstream_error(&self, kind: &'static str) {
        if !self.enabled {
            return;
        }
        counter!("proxy_upstream_errors_total", "kind" => kind).increment(1);
    }

    pub fn record_upstream_duration(&self, elapsed: Duration) {
        if !self.enabled {
            return;
        }
        histogram!("proxy_upstream_duration_seconds").record(elapsed.as_secs_f64());
    }
}
