use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors surfaced to the caller as HTTP responses
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Method Not Allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Connection Error: {0}")]
    UpstreamUnreachable(String),

    #[error("Error: {0}")]
    Forward(String),

    #[error("Bad request: {0}")]
    InvalidRequest(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::UpstreamUnreachable(_) => StatusCode::NOT_FOUND,
            ProxyError::Forward(_) => StatusCode::BAD_REQUEST,
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ProxyError::MethodNotAllowed(_) => "METHOD_NOT_ALLOWED",
            ProxyError::UpstreamUnreachable(_) => "UPSTREAM_UNREACHABLE",
            ProxyError::Forward(_) => "PROXY_ERROR",
            ProxyError::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, [("x-proxy-error", self.error_code())], self.to_string()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

/// Cache-layer failures. None of these abort a request.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend '{backend}' failed to initialize: {reason}")]
    Init { backend: &'static str, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt cache entry: {0}")]
    CorruptEntry(String),
}

impl CacheError {
    pub fn init(backend: &'static str, reason: impl ToString) -> Self {
        CacheError::Init {
            backend,
            reason: reason.to_string(),
        }
    }
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;
