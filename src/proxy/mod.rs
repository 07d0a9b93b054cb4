pub mod engine;
pub mod headers;
pub mod route;
pub mod upstream;
pub mod url;

use std::collections::HashMap;

use axum::http::Method;
use bytes::Bytes;

pub use engine::ForwardProxy;
pub use upstream::ProxyExecutor;

/// Filtered request headers. Names keep the caller's spelling.
pub type HeaderPairs = HashMap<String, String>;

/// Methods the proxy relays; anything else is answered with 405
pub const ALLOWED_METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::OPTIONS,
    Method::HEAD,
];

/// Methods that carry a request body upstream. GET and HEAD never do.
pub const BODY_METHODS: [Method; 5] = [
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

pub fn is_allowed_method(method: &Method) -> bool {
    ALLOWED_METHODS.contains(method)
}

pub fn carries_body(method: &Method) -> bool {
    BODY_METHODS.contains(method)
}

/// A fully resolved outbound request
#[derive(Debug, Clone)]
pub struct TargetRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderPairs,
    pub body: Option<Bytes>,
}
