//! Deterministic request fingerprints.
//!
//! The key is a SHA-256 digest over a canonical encoding of method, URL,
//! body and headers, so it is identical across processes and backends.
//! Headers are sorted by name (then value) before encoding, and an absent
//! body is encoded differently from an empty one.

use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::proxy::{HeaderPairs, TargetRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    digest: String,
    method: String,
    url: String,
    body: Option<Bytes>,
    headers: String,
}

impl Fingerprint {
    pub fn new(method: &str, url: &str, body: Option<&[u8]>, headers: &HeaderPairs) -> Self {
        let headers = canonical_headers(headers);

        let mut hasher = Sha256::new();
        update_field(&mut hasher, method.as_bytes());
        update_field(&mut hasher, url.as_bytes());
        match body {
            None => hasher.update([0u8]),
            Some(body) => {
                hasher.update([1u8]);
                update_field(&mut hasher, body);
            }
        }
        update_field(&mut hasher, headers.as_bytes());

        Self {
            digest: format!("{:x}", hasher.finalize()),
            method: method.to_string(),
            url: url.to_string(),
            body: body.map(Bytes::copy_from_slice),
            headers,
        }
    }

    pub fn of(request: &TargetRequest) -> Self {
        Self::new(
            request.method.as_str(),
            &request.url,
            request.body.as_deref(),
            &request.headers,
        )
    }

    /// Hex SHA-256 digest; the storage key
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Sorted headers as a JSON array of `[name, value]` pairs
    pub fn headers(&self) -> &str {
        &self.headers
    }
}

// Length prefix keeps ("ab", "c") and ("a", "bc") apart
fn update_field(hasher: &mut Sha256, field: &[u8]) {
    hasher.update((field.len() as u64).to_be_bytes());
    hasher.update(field);
}

fn canonical_headers(headers: &HeaderPairs) -> String {
    let mut pairs: Vec<(&str, &str)> = headers
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    pairs.sort_unstable();

    // Serializing a list of string pairs cannot fail
    serde_json::to_string(&pairs).unwrap_or_default()
}
