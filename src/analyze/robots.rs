use serde::{Deserialize, Serialize};

use crate::target::Target;

/// Rules read from a site's `/robots.txt`, across all user-agent groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotsRules {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disallow: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sitemaps: Vec<String>,
}

impl RobotsRules {
    pub fn is_empty(&self) -> bool {
        self.disallow.is_empty() && self.allow.is_empty() && self.sitemaps.is_empty()
    }

    pub fn merge(&mut self, other: RobotsRules) {
        push_new(&mut self.disallow, other.disallow);
        push_new(&mut self.allow, other.allow);
        push_new(&mut self.sitemaps, other.sitemaps);
    }
}

fn push_new(into: &mut Vec<String>, items: Vec<String>) {
    for item in items {
        if !into.contains(&item) {
            into.push(item);
        }
    }
}

/// Collect `Disallow`, `Allow` and `Sitemap` lines. Comments, unknown
/// directives and empty values are ignored; first-seen order is kept.
pub fn parse_robots(text: &str) -> RobotsRules {
    let mut rules = RobotsRules::default();
    for raw in text.lines() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        let Some((key, value)) = line.split_once(':') else { continue };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let bucket = match key.trim().to_ascii_lowercase().as_str() {
            "disallow" => &mut rules.disallow,
            "allow" => &mut rules.allow,
            "sitemap" => &mut rules.sitemaps,
            _ => continue,
        };
        if !bucket.iter().any(|v| v == value) {
            bucket.push(value.to_string());
        }
    }
    rules
}

/// Whether `target` is the `/robots.txt` of some host.
pub fn is_robots_file(target: &Target) -> bool {
    url::Url::parse(target.as_str())
        .map(|u| u.path() == "/robots.txt")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_rules_from_every_group() {
        let text = "\
# staging robots
User-agent: *
Disallow: /admin/
Disallow: /backup   # old dumps
Allow: /admin/public
Disallow:

User-agent: Googlebot
DISALLOW: /admin/
Sitemap: https://example.com/sitemap.xml
Crawl-delay: 10
";
        let rules = parse_robots(text);
        assert_eq!(rules.disallow, vec!["/admin/", "/backup"]);
        assert_eq!(rules.allow, vec!["/admin/public"]);
        assert_eq!(rules.sitemaps, vec!["https://example.com/sitemap.xml"]);
    }

    #[test]
    fn html_error_page_yields_nothing() {
        assert!(parse_robots("<html><body>Not Found</body></html>").is_empty());
    }

    #[test]
    fn robots_file_detection() {
        assert!(is_robots_file(&Target::from("https://example.com/robots.txt")));
        assert!(!is_robots_file(&Target::from("https://example.com/admin/robots.txt")));
        assert!(!is_robots_file(&Target::from("example.com")));
    }
}
