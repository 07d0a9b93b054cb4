use crate::cache::CachePolicy;

/// How an inbound path maps onto the proxy's routes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteKind {
    /// `/{targetUrl}`
    Direct,
    /// `/cache/{targetUrl}` or `/cache/max-age:{N}/{targetUrl}`
    Cached(CachePolicy),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRoute {
    pub kind: RouteKind,
    /// Raw path remainder, not yet resolved into a URL
    pub target: String,
}

impl ProxyRoute {
    pub fn parse(path: &str) -> Self {
        let path = path.strip_prefix('/').unwrap_or(path);

        let Some(rest) = path.strip_prefix("cache/") else {
            return Self::direct(path);
        };

        if let Some((seconds, tail)) = rest
            .strip_prefix("max-age:")
            .and_then(|after| after.split_once('/'))
        {
            // Only plain digits select the max-age route; anything else falls
            // through to cache-forever with the segment kept in the target.
            if !seconds.is_empty() && seconds.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(max_age) = seconds.parse::<i64>() {
                    return Self::cached(CachePolicy::new(max_age), tail);
                }
            }
        }

        Self::cached(CachePolicy::forever(), rest)
    }

    fn direct(target: &str) -> Self {
        Self {
            kind: RouteKind::Direct,
            target: target.to_string(),
        }
    }

    fn cached(policy: CachePolicy, target: &str) -> Self {
        Self {
            kind: RouteKind::Cached(policy),
            target: target.to_string(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self.kind {
            RouteKind::Direct => "direct",
            RouteKind::Cached(_) => "cached",
        }
    }
}
