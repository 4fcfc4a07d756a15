use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;
use url::Url;

/// Substrings that make a link worth a second look.
pub const INTERESTING_MARKERS: &[&str] = &[
    "admin", "login", "wp-admin", "dashboard", "config", "backup", ".zip", ".sql", ".bak", ".git", ".env",
];

/// Second-level labels under which registrations happen one level deeper (`example.co.uk`).
const SHARED_SECOND_LEVEL: &[&str] = &["co", "com", "org", "net", "gov", "ac", "edu", "ne", "or", "go"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkScope {
    Internal,
    External,
}

impl LinkScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkScope::Internal => "internal",
            LinkScope::External => "external",
        }
    }
}

/// Every resolved link on a page, split by scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInventory {
    pub internal: BTreeSet<String>,
    pub external: BTreeSet<String>,
}

impl LinkInventory {
    pub fn insert(&mut self, scope: LinkScope, url: String) {
        match scope {
            LinkScope::Internal => self.internal.insert(url),
            LinkScope::External => self.external.insert(url),
        };
    }

    pub fn merge(&mut self, other: LinkInventory) {
        self.internal.extend(other.internal);
        self.external.extend(other.external);
    }

    pub fn is_empty(&self) -> bool {
        self.internal.is_empty() && self.external.is_empty()
    }
}

/// Resolve an anchor href against the page URL. Fragments and `javascript:` links are dropped.
pub fn resolve_href(page: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.to_ascii_lowercase().starts_with("javascript:") {
        return None;
    }
    page.join(href).ok()
}

/// Approximate registrable domain: the last two labels, or three under a
/// shared second level such as `co.uk`. IP literals are returned as-is.
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if bare.parse::<IpAddr>().is_ok() {
        return host;
    }
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host;
    }
    let n = labels.len();
    let take = if labels[n - 1].len() == 2 && SHARED_SECOND_LEVEL.contains(&labels[n - 2]) { 3 } else { 2 };
    labels[n - take.min(n)..].join(".")
}

pub fn classify(page: &Url, link: &Url) -> LinkScope {
    match (page.host_str(), link.host_str()) {
        (Some(a), Some(b)) if registrable_domain(a) == registrable_domain(b) => LinkScope::Internal,
        _ => LinkScope::External,
    }
}

pub fn is_interesting(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    INTERESTING_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_hrefs_resolve_against_page() {
        let page = Url::parse("https://example.com/blog/post").unwrap();
        assert_eq!(resolve_href(&page, "/wp-admin/").unwrap().as_str(), "https://example.com/wp-admin/");
        assert_eq!(resolve_href(&page, "next").unwrap().as_str(), "https://example.com/blog/next");
        assert!(resolve_href(&page, "#top").is_none());
        assert!(resolve_href(&page, "JavaScript:void(0)").is_none());
    }

    #[test]
    fn registrable_domain_handles_common_shapes() {
        assert_eq!(registrable_domain("www.example.com"), "example.com");
        assert_eq!(registrable_domain("a.b.example.co.uk"), "example.co.uk");
        assert_eq!(registrable_domain("example.com"), "example.com");
        assert_eq!(registrable_domain("127.0.0.1"), "127.0.0.1");
    }

    #[test]
    fn subdomains_are_internal() {
        let page = Url::parse("https://www.example.com/").unwrap();
        let same = Url::parse("https://shop.example.com/cart").unwrap();
        let other = Url::parse("https://example.org/").unwrap();
        assert_eq!(classify(&page, &same), LinkScope::Internal);
        assert_eq!(classify(&page, &other), LinkScope::External);
    }

    #[test]
    fn markers_match_case_insensitively() {
        assert!(is_interesting("/Backup/site.ZIP"));
        assert!(is_interesting("/.env"));
        assert!(!is_interesting("/about"));
    }
}
