use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::FailureKind;
use crate::target::Target;

/// Terminal status of one fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ProbeStatus {
    Success,
    Timeout,
    ConnectionError,
    TlsError,
    HttpError { code: u16 },
}

impl ProbeStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeStatus::Success)
    }

    /// Timeouts and connection failures are transient; everything else is a definitive answer.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProbeStatus::Timeout | ProbeStatus::ConnectionError)
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ProbeStatus::Success => None,
            ProbeStatus::Timeout => Some(FailureKind::NetworkTimeout),
            ProbeStatus::ConnectionError => Some(FailureKind::ConnectionFailure),
            ProbeStatus::TlsError => Some(FailureKind::TlsVerificationFailure),
            ProbeStatus::HttpError { code } => Some(FailureKind::HttpStatusError { code: *code }),
        }
    }

    pub fn label(&self) -> String {
        match self {
            ProbeStatus::Success => "success".to_string(),
            ProbeStatus::Timeout => "timeout".to_string(),
            ProbeStatus::ConnectionError => "connection-error".to_string(),
            ProbeStatus::TlsError => "tls-error".to_string(),
            ProbeStatus::HttpError { code } => format!("http-error-{}", code),
        }
    }
}

/// What the HTTP capability hands back for a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    /// Lowercased header names; repeated headers (e.g. `set-cookie`) keep one entry per value.
    pub headers: Vec<(String, String)>,
    #[serde(skip)]
    pub body: Vec<u8>,
    pub final_url: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Outcome of one Fetcher call against one Target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub target: Target,
    pub status: ProbeStatus,
    pub response: Option<HttpResponse>,
    pub elapsed: Duration,
    /// Network attempts made, including the TLS fallback.
    pub attempts: u32,
    /// Set when the result came from the unverified-TLS fallback.
    pub tls_downgraded: bool,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn status_code(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }

    pub fn final_url(&self) -> &str {
        self.response
            .as_ref()
            .map(|r| r.final_url.as_str())
            .unwrap_or_else(|| self.target.as_str())
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.status.failure_kind()
    }
}
