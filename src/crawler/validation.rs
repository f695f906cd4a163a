//! URL validation applied before any engine-specific work.

use url::Url;

/// Characters rejected anywhere in a crawl URL.
const BLOCKED_CHARS: &[char] = &['<', '>', '"', '{', '}', '|', '\\', '^', '[', ']', '`'];

/// Returns true if `url` can be crawled.
///
/// The scheme must be `http` or `https`, an authority must be present and the
/// raw string must not contain any blocked character. The raw string is
/// checked because the parser silently repairs inputs such as `http:/host`.
#[must_use]
pub fn validate_url(url: &str) -> bool {
    if url.contains(BLOCKED_CHARS) {
        return false;
    }

    let Some((scheme, rest)) = url.split_once("://") else {
        return false;
    };
    if !matches!(scheme.to_ascii_lowercase().as_str(), "http" | "https") {
        return false;
    }
    if rest.is_empty() || rest.starts_with(['/', '?', '#']) {
        return false;
    }

    match Url::parse(url) {
        Ok(parsed) => parsed.host_str().is_some_and(|host| !host.is_empty()),
        Err(error) => {
            tracing::debug!(url, %error, "URL validation failed");
            false
        }
    }
}

/// Lower-cased host of a URL that already passed [`validate_url`].
#[must_use]
pub(crate) fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_http_and_https() {
        assert!(validate_url("https://example.com"));
        assert!(validate_url("http://example.com/path?query=value&other=123#fragment"));
        assert!(validate_url("https://127.0.0.1:8080/page"));
    }

    #[test]
    fn test_rejects_plain_text() {
        assert!(!validate_url("not a url"));
        assert!(!validate_url(""));
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!(!validate_url("ftp://example.com/file"));
        assert!(!validate_url("file:///etc/passwd"));
        assert!(!validate_url("javascript://alert(1)"));
    }

    #[test]
    fn test_rejects_missing_authority() {
        assert!(!validate_url("http://"));
        assert!(!validate_url("https:///path-only"));
        assert!(!validate_url("http:/example.com"));
    }

    #[test]
    fn test_rejects_blocked_characters() {
        for url in [
            "https://example.com/<script>",
            "https://example.com/a\"b",
            "https://example.com/{x}",
            "https://example.com/a|b",
            "https://example.com/a\\b",
            "https://example.com/a^b",
            "https://example.com/[1]",
            "https://example.com/`x`",
        ] {
            assert!(!validate_url(url), "should reject {url}");
        }
    }

    #[test]
    fn test_host_of_lowercases() {
        assert_eq!(
            host_of("https://Blog.CSDN.net/a").as_deref(),
            Some("blog.csdn.net")
        );
    }
}
