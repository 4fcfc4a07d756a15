use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use which::which;

use crate::error::{FailureKind, ReconError};
use crate::external::runner;

const SEARCHSPLOIT: &str = "searchsploit";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(60);

/// One Exploit-DB entry as printed by `searchsploit -j`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Exploit {
    #[serde(rename = "Title", default = "not_available")]
    pub title: String,
    #[serde(rename = "EDB-ID", default = "not_available", deserialize_with = "string_or_number")]
    pub edb_id: String,
    #[serde(rename = "Path", default = "not_available")]
    pub path: String,
}

fn not_available() -> String {
    "N/A".to_string()
}

fn string_or_number<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }
    Ok(match Id::deserialize(de)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// An exploit found for a service name observed on a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExploitMatch {
    pub service: String,
    pub exploit: Exploit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("{0} is not installed or not in PATH")]
    Unavailable(String),
    #[error("exploit lookup failed: {0}")]
    Failed(String),
    #[error("could not parse exploit lookup output: {0}")]
    Parse(String),
}

impl LookupError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            LookupError::Parse(_) => FailureKind::ParseFailure,
            LookupError::Unavailable(_) | LookupError::Failed(_) => FailureKind::ExternalToolUnavailable,
        }
    }
}

#[async_trait]
pub trait ExploitLookup: Send + Sync {
    async fn search(&self, service: &str) -> Result<Vec<Exploit>, LookupError>;
}

#[derive(Debug, Deserialize)]
struct SearchsploitReport {
    #[serde(rename = "RESULTS_EXPLOIT", default)]
    results: Vec<Exploit>,
}

/// Parse `searchsploit -j` stdout. Empty output means nothing was found.
pub fn parse_searchsploit_output(stdout: &str) -> Result<Vec<Exploit>, LookupError> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str::<SearchsploitReport>(stdout)
        .map(|report| report.results)
        .map_err(|e| LookupError::Parse(e.to_string()))
}

/// `searchsploit` from a local exploitdb checkout.
#[derive(Debug, Clone)]
pub struct Searchsploit {
    binary: PathBuf,
    timeout: Duration,
}

impl Searchsploit {
    /// Find `searchsploit` on PATH. Missing is fatal only when the caller asked for lookups.
    pub fn locate() -> crate::error::Result<Self> {
        let binary = which(SEARCHSPLOIT).map_err(|_| {
            ReconError::ExternalToolUnavailable(format!(
                "'{}' not found; install exploitdb and run `searchsploit -u`",
                SEARCHSPLOIT
            ))
        })?;
        Ok(Self { binary, timeout: LOOKUP_TIMEOUT })
    }
}

#[async_trait]
impl ExploitLookup for Searchsploit {
    async fn search(&self, service: &str) -> Result<Vec<Exploit>, LookupError> {
        let output = runner::run_captured(&self.binary, &["--nocolor", "-j", service], self.timeout)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => LookupError::Unavailable(SEARCHSPLOIT.to_string()),
                _ => LookupError::Failed(e.to_string()),
            })?;

        // searchsploit exits non-zero when nothing matches
        if !output.success() {
            let stderr = output.stderr.trim();
            if !stderr.is_empty() && !stderr.to_ascii_lowercase().contains("database needs update") {
                warn!(service, stderr, "searchsploit reported an error");
            }
        }

        let exploits = parse_searchsploit_output(&output.stdout)?;
        debug!(service, count = exploits.len(), "exploit lookup finished");
        Ok(exploits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_results_with_mixed_id_types() {
        let json = r#"{
            "SEARCH": "apache 2.4",
            "RESULTS_EXPLOIT": [
                {"Title": "Apache 2.4.49 - Path Traversal", "EDB-ID": "50383", "Path": "/usr/share/exploitdb/exploits/multiple/webapps/50383.sh"},
                {"Title": "Apache mod_ssl", "EDB-ID": 764, "Path": "/x/764.c"},
                {"Title": "Partial entry"}
            ],
            "RESULTS_SHELLCODE": []
        }"#;
        let exploits = parse_searchsploit_output(json).unwrap();
        assert_eq!(exploits.len(), 3);
        assert_eq!(exploits[0].edb_id, "50383");
        assert_eq!(exploits[1].edb_id, "764");
        assert_eq!(exploits[2].edb_id, "N/A");
        assert_eq!(exploits[2].path, "N/A");
    }

    #[test]
    fn empty_output_is_no_results() {
        assert!(parse_searchsploit_output("").unwrap().is_empty());
        assert!(parse_searchsploit_output("  \n").unwrap().is_empty());
        assert!(parse_searchsploit_output(r#"{"RESULTS_EXPLOIT": []}"#).unwrap().is_empty());
    }

    #[test]
    fn malformed_json_is_a_parse_failure() {
        let err = parse_searchsploit_output("Exploits: No Results").unwrap_err();
        assert!(matches!(err, LookupError::Parse(_)));
        assert_eq!(err.failure_kind(), FailureKind::ParseFailure);
    }
}
