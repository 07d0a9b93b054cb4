/// Turn the path remainder of an inbound request into the upstream URL.
///
/// Some front ends collapse `//` in paths, which turns `http://host` into
/// `http:/host`; that form is restored. Anything without a scheme-like
/// prefix is passed through untouched and will fail at forward time.
pub fn resolve(path_tail: &str, query: Option<&str>) -> String {
    let url = restore_scheme(path_tail);

    match query {
        Some(q) if !q.is_empty() => format!("{}?{}", url, q),
        _ => url,
    }
}

fn restore_scheme(path_tail: &str) -> String {
    let Some((scheme, rest)) = path_tail.split_once(':') else {
        return path_tail.to_string();
    };

    if !is_scheme(scheme) || rest.starts_with("//") {
        return path_tail.to_string();
    }

    match rest.strip_prefix('/') {
        Some(host_and_path) => format!("{}://{}", scheme, host_and_path),
        None => path_tail.to_string(),
    }
}

// RFC 3986: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapsed_scheme_is_restored() {
        assert_eq!(resolve("http:/example.com/a", None), "http://example.com/a");
        assert_eq!(resolve("https:/example.com/a/b", None), "https://example.com/a/b");
    }

    #[test]
    fn test_absolute_url_unchanged() {
        assert_eq!(resolve("http://example.com/a", None), "http://example.com/a");
        assert_eq!(
            resolve("https://example.com/a%20b?x=1", None),
            "https://example.com/a%20b?x=1"
        );
    }

    #[test]
    fn test_relative_path_unchanged() {
        assert_eq!(resolve("/relative/path", None), "/relative/path");
        assert_eq!(resolve("relative/path", None), "relative/path");
        assert_eq!(resolve("max-age:abc/x", None), "max-age:abc/x");
    }

    #[test]
    fn test_query_appended_verbatim() {
        assert_eq!(
            resolve("http://example.com/search", Some("q=a%2Bb&page=2")),
            "http://example.com/search?q=a%2Bb&page=2"
        );
        assert_eq!(resolve("http://example.com/", Some("")), "http://example.com/");
    }
}
