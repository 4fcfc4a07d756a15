use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;

use crate::error::{ReconError, Result};
use crate::target::Scheme;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Options recognized by the Fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_seconds: u64,
    pub verify_tls: bool,
    pub user_agent: String,
    pub max_redirects: usize,
    pub max_retries: u32,
    pub backoff_base_seconds: f64,
    /// `http://`, `https://` or `socks5://` proxy for every request.
    pub proxy: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            verify_tls: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_redirects: 5,
            max_retries: 2,
            backoff_base_seconds: 0.5,
            proxy: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub seed: String,
    pub workers: usize,
    pub requests_per_second: u32,
    pub schemes: Vec<Scheme>,
    pub enumerate_subdomains: bool,
    pub exploit_lookup: bool,
    /// Fetch `/robots.txt` of every base host in the service round.
    pub fetch_robots: bool,
    pub dns_timeout_seconds: u64,
    pub fetch: FetchConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            seed: String::new(),
            workers: 10,
            requests_per_second: 10,
            schemes: vec![Scheme::Http, Scheme::Https],
            enumerate_subdomains: true,
            exploit_lookup: false,
            fetch_robots: true,
            dns_timeout_seconds: 5,
            fetch: FetchConfig::default(),
        }
    }
}

/// Timing template, nmap style: `(workers, requests_per_second, max_retries)`.
pub fn timing_template(level: u8) -> (usize, u32, u32) {
    match level {
        0 => (1, 1, 1),    // T0: Paranoid
        1 => (2, 2, 2),    // T1: Sneaky
        2 => (5, 5, 2),    // T2: Polite
        3 => (10, 10, 2),  // T3: Normal (default)
        4 => (20, 25, 3),  // T4: Aggressive
        5 => (50, 50, 1),  // T5: Insane
        _ => (10, 10, 2),
    }
}

impl ScanConfig {
    pub fn new(seed: impl Into<String>) -> Self {
        Self { seed: seed.into(), ..Self::default() }
    }

    /// Load a (possibly partial) JSON config file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: ScanConfig = serde_json::from_str(&data)
            .map_err(|e| ReconError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(cfg)
    }

    pub fn apply_timing(&mut self, level: u8) {
        let (workers, rps, retries) = timing_template(level);
        self.workers = workers;
        self.requests_per_second = rps;
        self.fetch.max_retries = retries;
    }

    /// Check every option and normalize the seed. Runs before any probing.
    pub fn validate(mut self) -> Result<Self> {
        self.seed = normalize_seed(&self.seed)?;
        if self.workers == 0 {
            return Err(ReconError::Config("workers must be greater than zero".into()));
        }
        if self.requests_per_second == 0 {
            return Err(ReconError::Config("requests_per_second must be greater than zero".into()));
        }
        if self.schemes.is_empty() {
            return Err(ReconError::Config("at least one scheme is required".into()));
        }
        if self.fetch.timeout_seconds == 0 {
            return Err(ReconError::Config("timeout_seconds must be greater than zero".into()));
        }
        if !self.fetch.backoff_base_seconds.is_finite() || self.fetch.backoff_base_seconds < 0.0 {
            return Err(ReconError::Config(format!(
                "backoff_base_seconds must be a non-negative number, got {}",
                self.fetch.backoff_base_seconds
            )));
        }
        if let Some(proxy) = &self.fetch.proxy {
            reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| ReconError::Config(format!("invalid proxy '{}': {}", proxy, e)))?;
        }
        if self.dns_timeout_seconds == 0 {
            return Err(ReconError::Config("dns_timeout_seconds must be greater than zero".into()));
        }
        let mut seen = Vec::with_capacity(self.schemes.len());
        for s in &self.schemes {
            if !seen.contains(s) {
                seen.push(*s);
            }
        }
        self.schemes = seen;
        Ok(self)
    }
}

/// Reduce user input (`https://Example.com/x`, `example.com.`) to a bare
/// `host[:port]` and reject anything that is not a DNS name or IP literal.
pub fn normalize_seed(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ReconError::Config("seed domain is empty".into()));
    }

    let authority = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        let parsed = url::Url::parse(trimmed)
            .map_err(|e| ReconError::Config(format!("malformed seed URL '{}': {}", trimmed, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| ReconError::Config(format!("seed URL '{}' has no host", trimmed)))?;
        match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    } else {
        trimmed.split('/').next().unwrap_or_default().to_string()
    };

    let lowered = authority.to_ascii_lowercase();
    let (host, port) = split_port(&lowered)?;
    let host = host.trim_end_matches('.');

    let bare_ip = host.trim_start_matches('[').trim_end_matches(']');
    if bare_ip.parse::<IpAddr>().is_err() && !is_valid_domain(host) {
        return Err(ReconError::Config(format!("malformed seed domain '{}'", input.trim())));
    }

    Ok(match port {
        Some(p) => format!("{}:{}", host, p),
        None => host.to_string(),
    })
}

/// Split `host[:port]`, keeping a bracketed IPv6 host intact.
pub fn split_port(authority: &str) -> Result<(&str, Option<u16>)> {
    // bracketed IPv6, optionally with a port
    if authority.starts_with('[') {
        return match authority.rfind("]:") {
            Some(idx) => {
                let port = parse_port(&authority[idx + 2..])?;
                Ok((&authority[..=idx], Some(port)))
            }
            None => Ok((authority, None)),
        };
    }
    // unbracketed IPv6 literal
    if authority.matches(':').count() > 1 {
        return Ok((authority, None));
    }
    match authority.split_once(':') {
        Some((host, port)) => Ok((host, Some(parse_port(port)?))),
        None => Ok((authority, None)),
    }
}

fn parse_port(raw: &str) -> Result<u16> {
    raw.parse::<u16>()
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| ReconError::Config(format!("invalid port '{}'", raw)))
}

pub fn is_valid_domain(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_is_normalized() {
        assert_eq!(normalize_seed("https://Example.COM/path").unwrap(), "example.com");
        assert_eq!(normalize_seed("example.com.").unwrap(), "example.com");
        assert_eq!(normalize_seed("127.0.0.1:8080").unwrap(), "127.0.0.1:8080");
        assert_eq!(normalize_seed("http://localhost:3000").unwrap(), "localhost:3000");
        assert_eq!(normalize_seed("[::1]:8443").unwrap(), "[::1]:8443");
    }

    #[test]
    fn malformed_seeds_are_rejected() {
        for bad in ["", "exa mple.com", "-bad.com", "bad..com", "example.com:99999", "ex_ample.com"] {
            assert!(normalize_seed(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn validate_rejects_bad_options() {
        let mut cfg = ScanConfig::new("example.com");
        cfg.fetch.timeout_seconds = 0;
        assert!(matches!(cfg.validate(), Err(ReconError::Config(_))));

        let mut cfg = ScanConfig::new("example.com");
        cfg.fetch.backoff_base_seconds = f64::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = ScanConfig::new("example.com");
        cfg.workers = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ScanConfig::new("example.com");
        cfg.fetch.proxy = Some("ftp://proxy.local:21".into());
        assert!(matches!(cfg.validate(), Err(ReconError::Config(_))));
    }

    #[test]
    fn proxy_schemes_are_accepted() {
        for proxy in ["http://127.0.0.1:8080", "https://proxy.local:3128", "socks5://127.0.0.1:9050"] {
            let mut cfg = ScanConfig::new("example.com");
            cfg.fetch.proxy = Some(proxy.to_string());
            assert!(cfg.validate().is_ok(), "rejected {}", proxy);
        }
    }

    #[test]
    fn validate_dedups_schemes() {
        let mut cfg = ScanConfig::new("example.com");
        cfg.schemes = vec![Scheme::Https, Scheme::Https, Scheme::Http];
        let cfg = cfg.validate().unwrap();
        assert_eq!(cfg.schemes, vec![Scheme::Https, Scheme::Http]);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: ScanConfig = serde_json::from_str(r#"{"seed":"example.com","fetch":{"max_retries":4}}"#).unwrap();
        assert_eq!(cfg.workers, 10);
        assert_eq!(cfg.fetch.max_retries, 4);
        assert_eq!(cfg.fetch.timeout_seconds, 10);
    }

    #[test]
    fn timing_template_overrides() {
        let mut cfg = ScanConfig::new("example.com");
        cfg.apply_timing(0);
        assert_eq!((cfg.workers, cfg.requests_per_second, cfg.fetch.max_retries), (1, 1, 1));
    }
}
