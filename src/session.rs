use dashmap::DashMap;
use indicatif::ProgressBar;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analyze::{is_robots_file, parse_robots, service_names, Fingerprinter};
use crate::concurrent::{DispatchedSet, PoolStats, WorkerPool};
use crate::config::{split_port, ScanConfig};
use crate::discover::dns::{self, DnsResolve, HickoryResolver};
use crate::discover::enumerator::{enumerate, Mode, Seed};
use crate::error::{ReconError, Result};
use crate::external::exploitdb::{Exploit, ExploitLookup, ExploitMatch, LookupError, Searchsploit};
use crate::external::nmap;
use crate::output::{append_jsonl, write_jsonl, Reporter, TargetReport};
use crate::probe::{Fetcher, RateLimiter, ReqwestTransport, Transport};
use crate::target::Target;

type LookupCell = Arc<OnceCell<std::result::Result<Vec<Exploit>, LookupError>>>;

/// Aggregated worker-pool counters for all rounds of one scan.
#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    pub dispatched: usize,
    pub skipped: usize,
    pub completed: usize,
    pub panicked: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl ScanStats {
    fn absorb(&mut self, round: &PoolStats) {
        self.dispatched += round.dispatched;
        self.skipped += round.skipped;
        self.completed += round.completed;
        self.panicked += round.panicked.len();
        self.cancelled |= round.cancelled;
    }
}

/// JSONL file that gets a line for every report as soon as its target is done.
///
/// A target may appear more than once; the last line for it is the most complete.
struct Journal {
    path: PathBuf,
    lock: parking_lot::Mutex<()>,
}

impl Journal {
    fn append(&self, report: &TargetReport) {
        let _guard = self.lock.lock();
        if let Err(e) = append_jsonl(&self.path, [report]) {
            warn!(path = %self.path.display(), error = %e, "could not append to checkpoint");
        }
    }
}

/// Per-target work shared by every spawned task.
struct Worker {
    fetcher: Fetcher,
    limiter: Arc<RateLimiter>,
    resolver: Arc<dyn DnsResolve>,
    reporter: Arc<Reporter>,
    fingerprinter: Fingerprinter,
    exploits: Option<Arc<dyn ExploitLookup>>,
    exploit_cache: DashMap<String, LookupCell>,
    progress: Option<ProgressBar>,
    journal: Option<Journal>,
}

impl Worker {
    async fn resolve(&self, target: Target) {
        self.limiter.acquire().await;
        let probe = dns::subdomain_exists(self.resolver.as_ref(), target.as_str()).await;
        if probe.exists {
            info!(host = %target, records = ?probe.records, "subdomain found");
        } else if let Some(failure) = &probe.failure {
            debug!(host = %target, %failure, "subdomain not found");
        }
        self.reporter.record_resolution(&target, probe);
        self.checkpoint(&target);
        self.tick();
    }

    async fn probe(&self, target: Target) {
        let result = self.fetcher.fetch(&target).await;

        let mut signals = Vec::new();
        if result.status.is_success() {
            info!(url = %target, status = result.status_code().unwrap_or_default(), "reachable");
            signals = self.fingerprinter.analyze(&result);
            self.reporter.record_links(&target, self.fingerprinter.link_inventory(&result));
            if is_robots_file(&target) {
                if let Some(resp) = &result.response {
                    let rules = parse_robots(&resp.body_text());
                    if !rules.disallow.is_empty() {
                        info!(url = %target, disallowed = rules.disallow.len(), "robots.txt rules");
                    }
                    self.reporter.record_robots(&target, rules);
                }
            }
        } else if let Some(kind) = result.failure_kind() {
            match &result.error {
                Some(err) => warn!(url = %target, failure = %kind, error = %err, "probe failed"),
                None => info!(url = %target, failure = %kind, "probe failed"),
            }
        }
        if result.tls_downgraded {
            self.reporter.note(&target, "fetched without TLS certificate verification");
        }

        let services = service_names(&signals);
        self.reporter.record(&target, result, signals);

        for service in services {
            self.lookup_into_report(&target, &service).await;
        }
        self.checkpoint(&target);
        self.tick();
    }

    /// Search once per service per scan; later callers reuse the first answer.
    async fn lookup_into_report(&self, target: &Target, service: &str) {
        let Some(lookup) = self.exploits.as_ref() else { return };
        let cell = self.exploit_cache.entry(service.to_string()).or_insert_with(Default::default).clone();
        let answer = cell.get_or_init(|| async { lookup.search(service).await }).await;
        match answer {
            Ok(exploits) => {
                if !exploits.is_empty() {
                    info!(url = %target, service, count = exploits.len(), "exploit-db matches");
                }
                let matches = exploits
                    .iter()
                    .map(|e| ExploitMatch { service: service.to_string(), exploit: e.clone() })
                    .collect();
                self.reporter.record_exploits(target, matches);
            }
            Err(e) => {
                warn!(url = %target, service, error = %e, "exploit lookup failed");
                self.reporter.note(target, format!("exploit lookup for '{}' failed: {}", service, e));
            }
        }
    }

    fn checkpoint(&self, target: &Target) {
        if let Some(journal) = &self.journal {
            if let Some(report) = self.reporter.get(target) {
                journal.append(&report);
            }
        }
    }

    fn tick(&self) {
        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
    }
}

/// One scan: pacing clock, dispatched set and the growing report map.
pub struct ScanSession {
    config: ScanConfig,
    worker: Arc<Worker>,
    reporter: Arc<Reporter>,
    dispatched: DispatchedSet,
    cancel: CancellationToken,
    port_scan: bool,
    restored: usize,
}

impl ScanSession {
    /// Production session: reqwest transport, hickory DNS and, when requested, searchsploit.
    ///
    /// Fails before any network traffic on a bad config or a missing searchsploit.
    pub fn new(config: ScanConfig) -> Result<Self> {
        let config = config.validate()?;
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(&config.fetch)?);
        let resolver: Arc<dyn DnsResolve> =
            Arc::new(HickoryResolver::new(Duration::from_secs(config.dns_timeout_seconds)));
        let lookup: Option<Arc<dyn ExploitLookup>> = if config.exploit_lookup {
            Some(Arc::new(Searchsploit::locate()?))
        } else {
            None
        };
        Self::with_parts(config, transport, resolver, lookup)
    }

    /// Session over caller-supplied capabilities.
    pub fn with_parts(
        config: ScanConfig,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn DnsResolve>,
        exploits: Option<Arc<dyn ExploitLookup>>,
    ) -> Result<Self> {
        let config = config.validate()?;
        if config.exploit_lookup && exploits.is_none() {
            return Err(ReconError::ExternalToolUnavailable(
                "exploit lookup requested but no lookup tool configured".into(),
            ));
        }
        let limiter = Arc::new(RateLimiter::per_second(config.requests_per_second));
        let reporter = Arc::new(Reporter::new());
        let worker = Arc::new(Worker {
            fetcher: Fetcher::new(transport, limiter.clone(), config.fetch.clone()),
            limiter,
            resolver,
            reporter: reporter.clone(),
            fingerprinter: Fingerprinter::new(),
            exploits: exploits.filter(|_| config.exploit_lookup),
            exploit_cache: DashMap::new(),
            progress: None,
            journal: None,
        });
        Ok(Self {
            config,
            worker,
            reporter,
            dispatched: DispatchedSet::new(),
            cancel: CancellationToken::new(),
            port_scan: false,
            restored: 0,
        })
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_port_scan(mut self, enabled: bool) -> Self {
        self.port_scan = enabled;
        self
    }

    /// Attach a progress bar. Must be called before [`scan`](Self::scan).
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        if let Some(worker) = Arc::get_mut(&mut self.worker) {
            worker.progress = Some(progress);
        }
        self
    }

    /// Checkpoint every finished target to `path` while the scan runs.
    ///
    /// The file is replaced by the reports held so far (those restored by
    /// [`resume`](Self::resume)); call this after resuming and before scanning.
    pub fn with_journal(mut self, path: &Path) -> Result<Self> {
        let worker = Arc::get_mut(&mut self.worker)
            .ok_or_else(|| ReconError::Session("journal must be attached before scanning".into()))?;
        let current: Vec<TargetReport> = self.reporter.snapshot();
        write_jsonl(path, current.iter())?;
        worker.journal = Some(Journal { path: path.to_path_buf(), lock: parking_lot::Mutex::new(()) });
        Ok(self)
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn restored(&self) -> usize {
        self.restored
    }

    /// Seed the session with reports from an earlier run. Their targets count
    /// as dispatched and are never probed again.
    pub fn resume(&mut self, reports: Vec<TargetReport>) -> usize {
        self.dispatched.mark(reports.iter().map(|r| r.target.clone()));
        let restored = self.reporter.restore(reports);
        self.restored += restored;
        info!(restored, "resumed from checkpoint");
        restored
    }

    /// Subdomain round, service round, path round, then the optional port scan.
    pub async fn scan(&self, subdomain_words: &[String], path_words: &[String]) -> ScanStats {
        let start = Instant::now();
        let mut stats = ScanStats::default();
        let root = self.config.seed.clone();

        if self.config.enumerate_subdomains {
            if seed_is_plain_domain(&root) {
                let seed = Seed::domain(root.clone());
                let round = self.resolve_round(enumerate(&seed, subdomain_words, &Mode::Subdomain)).await;
                stats.absorb(&round);
            } else {
                info!(seed = %root, "seed is an address or has a port, skipping subdomain round");
            }
        }

        let discovered = self.reporter.resolved_hosts();
        if !discovered.is_empty() {
            info!(count = discovered.len(), "subdomains feed the service and path rounds");
        }
        let seed = Seed::with_discovered(root, discovered);
        let mode = Mode::Path { schemes: self.config.schemes.clone() };

        let mut service_words = vec![String::new()];
        if self.config.fetch_robots {
            service_words.push("robots.txt".to_string());
        }
        let round = self.probe_round("services", enumerate(&seed, &service_words, &mode)).await;
        stats.absorb(&round);

        let round = self.probe_round("paths", enumerate(&seed, path_words, &mode)).await;
        stats.absorb(&round);

        if self.port_scan && !self.cancel.is_cancelled() {
            self.port_round(seed.bases()).await;
        }

        stats.cancelled |= self.cancel.is_cancelled();
        stats.elapsed = start.elapsed();
        stats
    }

    /// Fetch and fingerprint a single URL through the same dispatch rules as a scan.
    pub async fn probe_target(&self, target: Target) -> bool {
        if !self.dispatched.try_dispatch(&target) {
            return false;
        }
        self.worker.probe(target).await;
        true
    }

    async fn resolve_round<I: IntoIterator<Item = Target>>(&self, targets: I) -> PoolStats {
        info!("round: subdomains");
        let pool = WorkerPool::new(self.config.workers, self.cancel.clone());
        let worker = self.worker.clone();
        let stats = pool
            .drive(targets, &self.dispatched, move |t| {
                let worker = worker.clone();
                async move { worker.resolve(t).await }
            })
            .await;
        self.settle_panics(&stats);
        stats
    }

    async fn probe_round<I: IntoIterator<Item = Target>>(&self, name: &str, targets: I) -> PoolStats {
        info!(round = name, "round starting");
        let pool = WorkerPool::new(self.config.workers, self.cancel.clone());
        let worker = self.worker.clone();
        let stats = pool
            .drive(targets, &self.dispatched, move |t| {
                let worker = worker.clone();
                async move { worker.probe(t).await }
            })
            .await;
        self.settle_panics(&stats);
        info!(round = name, dispatched = stats.dispatched, skipped = stats.skipped, "round finished");
        stats
    }

    /// A panicked worker never reached the reporter; leave a negative report instead of silence.
    fn settle_panics(&self, stats: &PoolStats) {
        for target in &stats.panicked {
            self.reporter.note(target, "worker task panicked before reporting");
            self.worker.checkpoint(target);
        }
    }

    async fn port_round(&self, bases: &[String]) {
        for base in bases {
            if self.cancel.is_cancelled() {
                break;
            }
            let host = port_scan_host(base);
            let target = Target::new(host);
            match nmap::scan_host(host).await {
                Ok(Some(ports)) => {
                    info!(host, open = ports.len(), "port scan finished");
                    let products: Vec<String> = ports.iter().filter_map(|p| p.product()).collect();
                    self.reporter.record_ports(&target, ports);
                    for product in products {
                        self.worker.lookup_into_report(&target, &product).await;
                    }
                    self.worker.checkpoint(&target);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(host, error = %e, "port scan failed");
                    self.reporter.note(&target, format!("port scan failed: {}", e));
                    self.worker.checkpoint(&target);
                }
            }
        }
    }

    /// Barrier: consume the session once every round has returned.
    pub fn finish(self) -> Result<BTreeMap<Target, TargetReport>> {
        let ScanSession { worker, reporter, .. } = self;
        drop(worker);
        let reporter = Arc::try_unwrap(reporter)
            .map_err(|_| ReconError::Session("reporter is still shared with a running worker".into()))?;
        Ok(reporter.finalize())
    }
}

/// Host part of a base, with any port dropped and IPv6 brackets kept.
fn port_scan_host(base: &str) -> &str {
    split_port(base).map(|(host, _)| host).unwrap_or(base)
}

fn seed_is_plain_domain(seed: &str) -> bool {
    !seed.contains(':') && seed.parse::<IpAddr>().is_err() && seed.contains('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_domain_detection() {
        assert!(seed_is_plain_domain("example.com"));
        assert!(!seed_is_plain_domain("example.com:8080"));
        assert!(!seed_is_plain_domain("127.0.0.1"));
        assert!(!seed_is_plain_domain("[::1]"));
        assert!(!seed_is_plain_domain("localhost"));
    }

    #[test]
    fn port_scan_host_keeps_ipv6_intact() {
        assert_eq!(port_scan_host("example.com"), "example.com");
        assert_eq!(port_scan_host("example.com:8080"), "example.com");
        assert_eq!(port_scan_host("[::1]"), "[::1]");
        assert_eq!(port_scan_host("[::1]:8443"), "[::1]");
    }
}
