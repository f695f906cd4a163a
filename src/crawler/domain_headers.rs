//! Declarative per-domain request header overrides.
//!
//! Some sites only serve content to requests that look like they came from
//! their own pages. Rules are data: adding a domain means adding a row, not a
//! branch. Overrides are applied to a single request and never written into
//! the shared session.

use super::validation::host_of;

/// Header deltas applied to requests whose host matches `host_suffix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainHeaderRule {
    /// Registrable suffix such as `csdn.net`; matches the host itself and any subdomain.
    pub host_suffix: String,
    /// Headers merged over the session profile.
    pub headers: Vec<(String, String)>,
}

impl DomainHeaderRule {
    #[must_use]
    pub fn new(host_suffix: impl Into<String>, headers: &[(&str, &str)]) -> Self {
        Self {
            host_suffix: host_suffix.into().to_ascii_lowercase(),
            headers: headers
                .iter()
                .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
                .collect(),
        }
    }

    fn matches_host(&self, host: &str) -> bool {
        host == self.host_suffix
            || host
                .strip_suffix(self.host_suffix.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

/// Ordered override table. Later rules win on conflicting header names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainHeaderTable {
    rules: Vec<DomainHeaderRule>,
}

impl DomainHeaderTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in overrides.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new().with_rule(DomainHeaderRule::new(
            "csdn.net",
            &[
                ("Referer", "https://blog.csdn.net/"),
                ("Cookie", "uuid_tt_dd=1_0; dc_session_id=1_1"),
            ],
        ))
    }

    /// Appends a rule.
    #[must_use]
    pub fn with_rule(mut self, rule: DomainHeaderRule) -> Self {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Headers to add for `url`, evaluated once per request.
    #[must_use]
    pub fn headers_for(&self, url: &str) -> Vec<(String, String)> {
        let Some(host) = host_of(url) else {
            return Vec::new();
        };

        let mut merged: Vec<(String, String)> = Vec::new();
        for rule in self.rules.iter().filter(|rule| rule.matches_host(&host)) {
            for (name, value) in &rule.headers {
                merged.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
                merged.push((name.clone(), value.clone()));
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_matches_csdn_subdomains() {
        let table = DomainHeaderTable::builtin();
        let headers = table.headers_for("https://blog.csdn.net/user/article/details/1");
        assert_eq!(headers.len(), 2);
        assert!(
            headers
                .iter()
                .any(|(name, value)| name == "Referer" && value == "https://blog.csdn.net/")
        );
        assert_eq!(table.headers_for("https://csdn.net/").len(), 2);
    }

    #[test]
    fn test_no_match_for_lookalike_hosts() {
        let table = DomainHeaderTable::builtin();
        assert!(table.headers_for("https://notcsdn.net/").is_empty());
        assert!(table.headers_for("https://example.com/csdn.net").is_empty());
    }

    #[test]
    fn test_later_rules_override_earlier_ones() {
        let table = DomainHeaderTable::new()
            .with_rule(DomainHeaderRule::new("example.com", &[("Referer", "https://a/")]))
            .with_rule(DomainHeaderRule::new("docs.example.com", &[("referer", "https://b/")]));
        let headers = table.headers_for("https://docs.example.com/page");
        assert_eq!(headers, vec![("referer".to_string(), "https://b/".to_string())]);
        let headers = table.headers_for("https://www.example.com/page");
        assert_eq!(headers, vec![("Referer".to_string(), "https://a/".to_string())]);
    }

    #[test]
    fn test_invalid_url_yields_nothing() {
        assert!(DomainHeaderTable::builtin().headers_for("not a url").is_empty());
    }
}
