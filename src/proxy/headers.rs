use axum::http::HeaderMap;
use tracing::debug;

use super::HeaderPairs;

/// Connection-specific headers the outbound client recomputes
const EXCLUDED_HEADERS: [&str; 2] = ["host", "content-length"];

fn is_excluded(name: &str) -> bool {
    EXCLUDED_HEADERS
        .iter()
        .any(|excluded| excluded.eq_ignore_ascii_case(name))
}

/// Drop excluded headers; for duplicate names the last value wins
pub fn filter<I, K, V>(pairs: I) -> HeaderPairs
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut filtered = HeaderPairs::new();
    for (name, value) in pairs {
        let name = name.into();
        if !is_excluded(&name) {
            filtered.insert(name, value.into());
        }
    }
    filtered
}

/// Filter an inbound header map, skipping values that are not valid UTF-8
pub fn filter_header_map(headers: &HeaderMap) -> HeaderPairs {
    filter(headers.iter().filter_map(|(name, value)| match value.to_str() {
        Ok(value) => Some((name.as_str(), value)),
        Err(_) => {
            debug!("Skipping non UTF-8 header value for {}", name);
            None
        }
    }))
}
