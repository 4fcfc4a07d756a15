use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;
use tracing::{info, warn};
use which::which;

use crate::external::runner;

static PORT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)/(tcp|udp)\s+open\s+(\S+)\s*(.*)$").expect("port line regex"));

const SCAN_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpenPort {
    pub port: u16,
    pub protocol: String,
    pub service: String,
    /// Version banner from `-sV`, empty if nmap could not tell.
    pub version: String,
}

impl OpenPort {
    /// Lowercased first word of the version banner, falling back to the service name.
    pub fn product(&self) -> Option<String> {
        let word = self.version.split_whitespace().next().unwrap_or(self.service.as_str());
        let word = word.trim().to_ascii_lowercase();
        if word.is_empty() || word.ends_with('?') || !word.chars().any(|c| c.is_ascii_alphabetic()) {
            None
        } else {
            Some(word)
        }
    }
}

/// Pull `PORT STATE SERVICE VERSION` rows out of normal nmap output.
pub fn parse_open_ports(output: &str) -> Vec<OpenPort> {
    output
        .lines()
        .filter_map(|line| {
            let caps = PORT_LINE.captures(line.trim())?;
            Some(OpenPort {
                port: caps[1].parse().ok()?,
                protocol: caps[2].to_string(),
                service: caps[3].to_string(),
                version: caps[4].trim().to_string(),
            })
        })
        .collect()
}

pub fn available() -> bool {
    which("nmap").is_ok()
}

/// Arguments for one host. IPv6 literals lose their brackets and get `-6`.
pub fn scan_args(host: &str) -> Vec<&str> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    let mut args = vec!["-sV", "-T4", "--open"];
    if bare.contains(':') {
        args.push("-6");
    }
    args.push(bare);
    args
}

/// `nmap -sV -T4 --open <host>`. `Ok(None)` when nmap is not installed.
pub async fn scan_host(host: &str) -> io::Result<Option<Vec<OpenPort>>> {
    if !available() {
        warn!("nmap not found in PATH, skipping port scan");
        return Ok(None);
    }
    info!(host, "running nmap service scan");
    let args = scan_args(host);
    let output = runner::run_captured("nmap", &args, SCAN_TIMEOUT).await?;
    if !output.success() {
        warn!(host, stderr = output.stderr.trim(), "nmap exited with an error");
    }
    Ok(Some(parse_open_ports(&output.stdout)))
}
