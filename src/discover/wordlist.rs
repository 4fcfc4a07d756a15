use std::path::Path;

use crate::error::Result;

/// Built-in subdomain labels, used when no wordlist file is given.
pub fn default_subdomains() -> Vec<String> {
    [
        "www", "mail", "ftp", "localhost", "webmail", "smtp", "pop", "ns1", "ns2", "admin",
        "cpanel", "webdisk", "autodiscover", "autoconfig", "msoid", "sip", "lyncdiscover",
        "enterpriseenrollment", "enterpriseregistration", "owa", "portal", "vpn", "test",
        // a few common extras
        "api", "dev", "staging", "beta", "blog", "shop", "cdn", "static",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Built-in directory/file candidates.
pub fn default_paths() -> Vec<String> {
    ["admin", "login", "dashboard", "wp-admin", "test"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Read a line-delimited wordlist. Lines are trimmed; blanks and `#` comments are skipped.
pub fn load(path: &Path) -> Result<Vec<String>> {
    let data = std::fs::read_to_string(path)?;
    Ok(parse(&data))
}

pub fn parse(data: &str) -> Vec<String> {
    data.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.to_string())
        .collect()
}
