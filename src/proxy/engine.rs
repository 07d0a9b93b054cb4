use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use bytes::Bytes;
use http_body_util::BodyExt;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cache::{CachePolicy, CacheStore, Fingerprint};
use crate::config::ServerConfig;
use crate::error::{ProxyError, Result as ProxyResult};
use crate::observability::{LookupOutcome, MetricsCollector};
use super::{
    headers, is_allowed_method,
    route::{ProxyRoute, RouteKind},
    upstream::ProxyExecutor,
    url, HeaderPairs, TargetRequest,
};

/// An inbound request with its body fully read
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderPairs,
    pub body: Option<Bytes>,
}

impl InboundRequest {
    pub async fn from_request(req: Request) -> ProxyResult<Self> {
        let (parts, body) = req.into_parts();

        let declares_body = parts.headers.contains_key(header::CONTENT_LENGTH)
            || parts.headers.contains_key(header::TRANSFER_ENCODING);

        let bytes = body
            .collect()
            .await
            .map_err(|e| ProxyError::InvalidRequest(format!("Failed to read request body: {}", e)))?
            .to_bytes();

        // No body at all stays distinguishable from an explicitly empty one
        let body = if bytes.is_empty() && !declares_body {
            None
        } else {
            Some(bytes)
        };

        Ok(Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: headers::filter_header_map(&parts.headers),
            body,
        })
    }
}

/// Per-request orchestration: resolve, filter, then either forward directly
/// or consult the cache first.
pub struct ForwardProxy {
    cache: Arc<dyn CacheStore>,
    executor: ProxyExecutor,
    metrics: MetricsCollector,
}

#[derive(Clone)]
struct AppState {
    proxy: Arc<ForwardProxy>,
}

impl ForwardProxy {
    pub fn new(cache: Arc<dyn CacheStore>, executor: ProxyExecutor, metrics: MetricsCollector) -> Self {
        Self {
            cache,
            executor,
            metrics,
        }
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/", any(proxy_handler))
            .route("/*path", any(proxy_handler))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive())
                    .into_inner(),
            )
            .with_state(AppState { proxy: self })
    }

    /// Start the proxy server
    pub async fn start(self: Arc<Self>, server_config: &ServerConfig) -> anyhow::Result<()> {
        let app = self.router();

        let addr = format!("{}:{}", server_config.host, server_config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

        info!("Forward proxy listening on {}", addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        Ok(())
    }

    /// Process a single proxied request and return the upstream body
    #[instrument(skip(self, inbound), fields(request_id, method = %inbound.method, path = %inbound.path))]
    pub async fn handle(&self, inbound: InboundRequest) -> ProxyResult<Bytes> {
        tracing::Span::current().record("request_id", Uuid::new_v4().to_string());

        let route = ProxyRoute::parse(&inbound.path);
        let result = self.dispatch(&route, inbound).await;

        let status = match &result {
            Ok(_) => StatusCode::OK,
            Err(e) => e.status_code(),
        };
        self.metrics.record_request(route.label(), status.as_u16());

        result
    }

    async fn dispatch(&self, route: &ProxyRoute, inbound: InboundRequest) -> ProxyResult<Bytes> {
        // Checked before any cache work so rejected methods never touch the store
        if !is_allowed_method(&inbound.method) {
            return Err(ProxyError::MethodNotAllowed(inbound.method.to_string()));
        }

        let request = TargetRequest {
            method: inbound.method,
            url: url::resolve(&route.target, inbound.query.as_deref()),
            headers: inbound.headers,
            body: inbound.body,
        };

        match route.kind {
            RouteKind::Direct => self.executor.execute(&request).await,
            RouteKind::Cached(policy) => self.forward_cached(&request, policy).await,
        }
    }

    async fn forward_cached(&self, request: &TargetRequest, policy: CachePolicy) -> ProxyResult<Bytes> {
        let key = Fingerprint::of(request);

        match self.cache.get(&key, policy).await {
            Ok(Some(payload)) => {
                debug!("Cache HIT for {} {}", request.method, request.url);
                self.metrics.record_lookup(LookupOutcome::Hit);
                return Ok(payload);
            }
            Ok(None) => {
                debug!("Cache MISS for {} {}", request.method, request.url);
                self.metrics.record_lookup(LookupOutcome::Miss);
            }
            Err(e) => {
                warn!("Error while getting from cache, forwarding: {}", e);
                self.metrics.record_lookup(LookupOutcome::Error);
            }
        }

        let response = self.executor.execute(request).await?;

        match self.cache.set(&key, response.clone()).await {
            Ok(()) => self.metrics.record_write(true),
            Err(e) => {
                warn!("Error while setting cache: {}", e);
                self.metrics.record_write(false);
            }
        }

        Ok(response)
    }
}

async fn proxy_handler(State(state): State<AppState>, req: Request) -> Response {
    let inbound = match InboundRequest::from_request(req).await {
        Ok(inbound) => inbound,
        Err(e) => return e.into_response(),
    };

    match state.proxy.handle(inbound).await {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            debug!("Proxy request failed: {}", e);
            e.into_response()
        }
    }
}
