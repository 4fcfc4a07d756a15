use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::TokioAsyncResolver;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{DnsFailure, FailureKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    A,
    Cname,
}

#[async_trait]
pub trait DnsResolve: Send + Sync {
    async fn resolve(&self, host: &str, kind: RecordKind) -> Result<Vec<String>, DnsFailure>;
}

/// Resolver backed by hickory with the system-independent default upstreams.
pub struct HickoryResolver {
    inner: TokioAsyncResolver,
    timeout: Duration,
}

impl HickoryResolver {
    pub fn new(timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 1;
        Self {
            inner: TokioAsyncResolver::tokio(ResolverConfig::default(), opts),
            timeout,
        }
    }
}

#[async_trait]
impl DnsResolve for HickoryResolver {
    async fn resolve(&self, host: &str, kind: RecordKind) -> Result<Vec<String>, DnsFailure> {
        let record_type = match kind {
            RecordKind::A => RecordType::A,
            RecordKind::Cname => RecordType::CNAME,
        };
        // hickory has its own timeout; this is the hard bound around it
        let lookup = tokio::time::timeout(self.timeout * 2, self.inner.lookup(host, record_type))
            .await
            .map_err(|_| DnsFailure::Timeout)?;

        match lookup {
            Ok(answer) => {
                let values: Vec<String> = answer
                    .record_iter()
                    .filter(|r| r.record_type() == record_type)
                    .filter_map(|r| r.data().map(|d| d.to_string()))
                    .collect();
                if values.is_empty() {
                    Err(DnsFailure::NoAnswer)
                } else {
                    Ok(values)
                }
            }
            Err(e) => Err(match e.kind() {
                ResolveErrorKind::NoRecordsFound { response_code, .. } if *response_code == ResponseCode::NXDomain => {
                    DnsFailure::NxDomain
                }
                ResolveErrorKind::NoRecordsFound { .. } => DnsFailure::NoAnswer,
                ResolveErrorKind::Timeout => DnsFailure::Timeout,
                _ => DnsFailure::Other(e.to_string()),
            }),
        }
    }
}

/// Outcome of one subdomain-existence check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsProbe {
    pub host: String,
    pub exists: bool,
    pub record_kind: Option<RecordKind>,
    pub records: Vec<String>,
    pub failure: Option<DnsFailure>,
    pub elapsed: Duration,
}

impl DnsProbe {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        if self.exists {
            return None;
        }
        self.failure
            .clone()
            .map(|failure| FailureKind::DnsResolutionFailure { failure })
    }
}

/// A host exists only if an A or a CNAME record resolves. A bare
/// answer with no records does not count. CNAME is always consulted when
/// A fails, so an alias pointing at a vanished target still exists.
pub async fn subdomain_exists(resolver: &dyn DnsResolve, host: &str) -> DnsProbe {
    let start = Instant::now();

    let a_failure = match resolver.resolve(host, RecordKind::A).await {
        Ok(records) => {
            return DnsProbe {
                host: host.to_string(),
                exists: true,
                record_kind: Some(RecordKind::A),
                records,
                failure: None,
                elapsed: start.elapsed(),
            };
        }
        Err(f) => f,
    };

    // Still ask for CNAME after NXDOMAIN: a dangling CNAME answers A with the
    // RCODE of its missing target, but the alias record itself resolves.
    match resolver.resolve(host, RecordKind::Cname).await {
        Ok(records) => DnsProbe {
            host: host.to_string(),
            exists: true,
            record_kind: Some(RecordKind::Cname),
            records,
            failure: None,
            elapsed: start.elapsed(),
        },
        Err(cname_failure) => DnsProbe {
            host: host.to_string(),
            exists: false,
            record_kind: None,
            records: Vec::new(),
            // NXDOMAIN or a timeout on A says more than whatever CNAME returned
            failure: Some(match a_failure {
                DnsFailure::NxDomain | DnsFailure::Timeout => a_failure,
                _ => cname_failure,
            }),
            elapsed: start.elapsed(),
        },
    }
}
