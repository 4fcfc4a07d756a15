//! Error types for the recon engine.
//!
//! `ReconError` is reserved for conditions that stop a scan before it
//! starts. Everything that can go wrong while probing a single target is
//! carried as a value and summarized by [`FailureKind`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fatal error type for engine setup and the export layer
#[derive(Debug, Error)]
pub enum ReconError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("external tool unavailable: {0}")]
    ExternalToolUnavailable(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ReconError>;

/// Reason a DNS lookup produced no usable answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum DnsFailure {
    #[error("NXDOMAIN")]
    NxDomain,
    #[error("no answer")]
    NoAnswer,
    #[error("timeout")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

/// Per-target failure taxonomy, surfaced in reports as a negative result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FailureKind {
    NetworkTimeout,
    ConnectionFailure,
    TlsVerificationFailure,
    HttpStatusError { code: u16 },
    DnsResolutionFailure { failure: DnsFailure },
    ParseFailure,
    ExternalToolUnavailable,
}

impl FailureKind {
    pub fn label(&self) -> String {
        match self {
            FailureKind::NetworkTimeout => "timeout".to_string(),
            FailureKind::ConnectionFailure => "connection".to_string(),
            FailureKind::TlsVerificationFailure => "tls".to_string(),
            FailureKind::HttpStatusError { code } => format!("http-{}", code),
            FailureKind::DnsResolutionFailure { failure } => format!("dns: {}", failure),
            FailureKind::ParseFailure => "parse".to_string(),
            FailureKind::ExternalToolUnavailable => "tool-unavailable".to_string(),
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_labels_are_stable() {
        assert_eq!(FailureKind::HttpStatusError { code: 404 }.label(), "http-404");
        assert_eq!(
            FailureKind::DnsResolutionFailure { failure: DnsFailure::NxDomain }.label(),
            "dns: NXDOMAIN"
        );
    }
}
