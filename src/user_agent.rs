//! Shared browser identity used by every engine.
//!
//! One header profile keeps direct fetches, API extraction and browser
//! rendering looking like the same desktop Chrome.

/// Default User-Agent: desktop Chrome on Windows.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Accept-Language sent with every browser-like request.
pub const ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9,en;q=0.8";

const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,\
    image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";

/// Header set sent by the direct fetch session, minus `User-Agent`.
///
/// `Accept-Encoding` is left to the HTTP client so it only advertises
/// encodings it can decode.
pub const BROWSER_HEADERS: &[(&str, &str)] = &[
    ("Accept", ACCEPT),
    ("Accept-Language", ACCEPT_LANGUAGE),
    ("Cache-Control", "max-age=0"),
    ("Upgrade-Insecure-Requests", "1"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "none"),
    ("Sec-Fetch-User", "?1"),
    ("sec-ch-ua", "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\""),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-ch-ua-platform", "\"Windows\""),
];

/// Resolves the effective user agent: an explicit override wins when non-blank.
#[must_use]
pub fn resolve_user_agent(override_value: Option<&str>) -> String {
    override_value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_USER_AGENT)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_user_agent_looks_like_chrome() {
        assert!(DEFAULT_USER_AGENT.contains("Chrome/120"));
        assert!(DEFAULT_USER_AGENT.starts_with("Mozilla/5.0"));
        assert!(!DEFAULT_USER_AGENT.contains("  "), "continuation must not double spaces");
    }

    #[test]
    fn test_profile_leaves_encoding_to_client() {
        assert!(
            BROWSER_HEADERS
                .iter()
                .all(|(name, _)| !name.eq_ignore_ascii_case("accept-encoding"))
        );
        assert!(
            BROWSER_HEADERS
                .iter()
                .all(|(name, _)| !name.eq_ignore_ascii_case("user-agent"))
        );
    }

    #[test]
    fn test_resolve_user_agent() {
        assert_eq!(resolve_user_agent(None), DEFAULT_USER_AGENT);
        assert_eq!(resolve_user_agent(Some("   ")), DEFAULT_USER_AGENT);
        assert_eq!(resolve_user_agent(Some("custom-agent/1.0")), "custom-agent/1.0");
    }
}
