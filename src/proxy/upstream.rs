use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, error, warn};

use crate::config::UpstreamConfig;
use crate::error::{ProxyError, Result as ProxyResult};
use crate::observability::MetricsCollector;
use super::{carries_body, is_allowed_method, TargetRequest};

/// Performs the single outbound call for a request.
///
/// Bodies are fully buffered in both directions and only the upstream body
/// is returned; status and headers are not relayed.
#[derive(Clone)]
pub struct ProxyExecutor {
    http_client: reqwest::Client,
    metrics: MetricsCollector,
}

impl ProxyExecutor {
    pub fn new(config: &UpstreamConfig, metrics: MetricsCollector) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .pool_max_idle_per_host(20)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            http_client,
            metrics,
        })
    }

    pub async fn execute(&self, request: &TargetRequest) -> ProxyResult<Bytes> {
        if !is_allowed_method(&request.method) {
            return Err(ProxyError::MethodNotAllowed(request.method.to_string()));
        }

        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| ProxyError::Forward(format!("Invalid method: {}", e)))?;

        let mut request_builder = self.http_client.request(method, &request.url);
        for (name, value) in &request.headers {
            request_builder = request_builder.header(name.as_str(), value.as_str());
        }

        if carries_body(&request.method) {
            if let Some(body) = &request.body {
                request_builder = request_builder.body(body.clone());
            }
        }

        debug!("Forwarding {} {}", request.method, request.url);
        let started = Instant::now();

        let response = request_builder.send().await.map_err(|e| {
            let error = classify(&e);
            warn!("Upstream request to {} failed: {}", request.url, e);
            self.metrics.record_upstream_error(error.error_code());
            error
        })?;

        let body = response.bytes().await.map_err(|e| {
            error!("Failed to read upstream body from {}: {}", request.url, e);
            self.metrics.record_upstream_error("BODY_READ");
            ProxyError::Forward(format!("Failed to read response body: {}", e))
        })?;

        self.metrics.record_upstream_duration(started.elapsed());
        Ok(body)
    }
}

fn classify(error: &reqwest::Error) -> ProxyError {
    if error.is_connect() {
        ProxyError::UpstreamUnreachable(error.to_string())
    } else {
        ProxyError::Forward(error.to_string())
    }
}
