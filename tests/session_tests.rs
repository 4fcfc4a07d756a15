use async_trait::async_trait;
use parking_lot::Mutex;
use reconscrap::discover::{DnsResolve, RecordKind};
use reconscrap::error::DnsFailure;
use reconscrap::external::{Exploit, ExploitLookup, LookupError};
use reconscrap::probe::{FetchRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
use reconscrap::output::TargetReport;
use reconscrap::utils::read_jsonl;
use reconscrap::{ScanConfig, ScanSession, Scheme, Target};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct NoDns;

#[async_trait]
impl DnsResolve for NoDns {
    async fn resolve(&self, _host: &str, _kind: RecordKind) -> Result<Vec<String>, DnsFailure> {
        Err(DnsFailure::NxDomain)
    }
}

/// Only `www.<domain>` exists.
struct WwwOnly;

#[async_trait]
impl DnsResolve for WwwOnly {
    async fn resolve(&self, host: &str, kind: RecordKind) -> Result<Vec<String>, DnsFailure> {
        match (host.starts_with("www."), kind) {
            (true, RecordKind::A) => Ok(vec!["10.0.0.1".to_string()]),
            _ => Err(DnsFailure::NxDomain),
        }
    }
}

/// Answers 200 for every URL and remembers what it was asked.
#[derive(Default)]
struct RecordingTransport {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn execute(&self, request: FetchRequest<'_>) -> Result<HttpResponse, TransportError> {
        self.seen.lock().push(request.url.to_string());
        Ok(HttpResponse {
            status: 200,
            headers: vec![("server".into(), "nginx/1.18.0".into())],
            body: Vec::new(),
            final_url: request.url.to_string(),
        })
    }
}

#[derive(Default)]
struct CountingLookup {
    calls: AtomicUsize,
}

#[async_trait]
impl ExploitLookup for CountingLookup {
    async fn search(&self, service: &str) -> Result<Vec<Exploit>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Exploit {
            title: format!("{} remote code execution", service),
            edb_id: "12345".into(),
            path: "/exploits/12345.py".into(),
        }])
    }
}

fn local_config(server: &MockServer) -> ScanConfig {
    let mut cfg = ScanConfig::new(server.address().to_string());
    cfg.schemes = vec![Scheme::Http];
    cfg.enumerate_subdomains = false;
    cfg.requests_per_second = 1000;
    cfg.workers = 4;
    cfg.fetch.timeout_seconds = 5;
    cfg.fetch.max_retries = 0;
    cfg
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

async fn mount_site(server: &MockServer) {
    let home = r#"<html><head><meta name="generator" content="WordPress 6.4"></head>
        <body><a href="/wp-admin/">admin</a> Contact: webmaster@example.com</body></html>"#;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("server", "Apache/2.4.41 (Ubuntu)")
                .insert_header("content-type", "text/html")
                .set_body_string(home),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("server", "Apache/2.4.41 (Ubuntu)")
                .insert_header("content-type", "text/html")
                .set_body_string("<html><!-- debug: true --></html>"),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .set_body_string("User-agent: *\nDisallow: /backup/\nSitemap: /sitemap.xml\n"),
        )
        .mount(server)
        .await;
}

fn session_for(cfg: ScanConfig, lookup: Option<Arc<dyn ExploitLookup>>) -> ScanSession {
    let transport = Arc::new(ReqwestTransport::new(&cfg.fetch).unwrap());
    ScanSession::with_parts(cfg, transport, Arc::new(NoDns), lookup).unwrap()
}

#[tokio::test]
async fn every_dispatched_target_gets_exactly_one_report() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let base = server.uri();

    let session = session_for(local_config(&server), None);
    let stats = session.scan(&[], &words(&["admin", "login", "admin"])).await;
    // "/", "/robots.txt", "/admin", "/login"
    assert_eq!(stats.dispatched, 4);
    assert_eq!(stats.skipped, 1);
    assert!(!stats.cancelled);

    let reports = session.finish().unwrap();
    assert_eq!(reports.len(), 4);

    let robots = &reports[&Target::new(format!("{}/robots.txt", base))];
    let rules = robots.robots.as_ref().unwrap();
    assert_eq!(rules.disallow, vec!["/backup/"]);
    assert_eq!(rules.sitemaps, vec!["/sitemap.xml"]);

    let home = &reports[&Target::new(format!("{}/", base))];
    assert_eq!(home.outcome(), "success");
    assert!(home.signals.iter().any(|s| s.value == "apache"));
    assert!(home.signals.iter().any(|s| s.value == "webmaster@example.com"));
    assert!(home.links.internal.contains(&format!("{}/wp-admin/", base)));

    let admin = &reports[&Target::new(format!("{}/admin", base))];
    assert!(admin.signals.iter().any(|s| s.flagged));

    let login = &reports[&Target::new(format!("{}/login", base))];
    assert_eq!(login.outcome(), "http-error-404");
    assert!(login.signals.is_empty());
}

#[tokio::test]
async fn exploit_lookups_run_once_per_service() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let mut cfg = local_config(&server);
    cfg.exploit_lookup = true;
    let lookup = Arc::new(CountingLookup::default());
    let session = session_for(cfg, Some(lookup.clone()));
    session.scan(&[], &words(&["admin"])).await;

    // "apache" from two pages, "wordpress" from the generator tag
    assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
    let reports = session.finish().unwrap();
    let with_matches = reports.values().filter(|r| r.exploits.iter().any(|m| m.service == "apache")).count();
    assert_eq!(with_matches, 2);
}

#[tokio::test]
async fn resumed_targets_are_not_probed_again() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let first = session_for(local_config(&server), None);
    first.scan(&[], &words(&["admin", "login"])).await;
    let previous: Vec<_> = first.finish().unwrap().into_values().collect();
    assert_eq!(previous.len(), 4);

    let mut second = session_for(local_config(&server), None);
    assert_eq!(second.resume(previous.clone()), 4);
    let stats = second.scan(&[], &words(&["admin", "login", "dashboard"])).await;
    assert_eq!(stats.dispatched, 1);
    assert_eq!(stats.skipped, 4);

    let reports = second.finish().unwrap();
    assert_eq!(reports.len(), 5);
    for old in previous {
        assert_eq!(reports[&old.target], old);
    }
}

#[tokio::test]
async fn cancelled_scan_dispatches_nothing_new() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let session = session_for(local_config(&server), None).with_cancel(cancel);
    let stats = session.scan(&[], &words(&["admin", "login"])).await;
    assert!(stats.cancelled);
    assert_eq!(stats.dispatched, 0);
    assert!(session.finish().unwrap().is_empty());
}

#[tokio::test]
async fn discovered_subdomains_feed_later_rounds() {
    let transport = Arc::new(RecordingTransport::default());
    let mut cfg = ScanConfig::new("example.com");
    cfg.requests_per_second = 1000;
    cfg.workers = 1;

    let session = ScanSession::with_parts(cfg, transport.clone(), Arc::new(WwwOnly), None).unwrap();
    let stats = session.scan(&words(&["www", "mail"]), &words(&["admin"])).await;
    // 2 DNS checks + 2 bases * 2 schemes * ("", robots.txt, admin)
    assert_eq!(stats.dispatched, 2 + 12);

    let seen = transport.seen.lock().clone();
    assert_eq!(
        seen,
        vec![
            "http://example.com/",
            "http://www.example.com/",
            "https://example.com/",
            "https://www.example.com/",
            "http://example.com/robots.txt",
            "http://www.example.com/robots.txt",
            "https://example.com/robots.txt",
            "https://www.example.com/robots.txt",
            "http://example.com/admin",
            "http://www.example.com/admin",
            "https://example.com/admin",
            "https://www.example.com/admin",
        ]
    );

    let reports = session.finish().unwrap();
    assert_eq!(reports[&Target::from("www.example.com")].outcome(), "resolved");
    assert_eq!(reports[&Target::from("mail.example.com")].outcome(), "unresolved");
}

#[tokio::test]
async fn robots_fetch_can_be_turned_off() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let mut cfg = local_config(&server);
    cfg.fetch_robots = false;
    let session = session_for(cfg, None);
    let stats = session.scan(&[], &[]).await;
    assert_eq!(stats.dispatched, 1);
    assert!(session.finish().unwrap().values().all(|r| r.robots.is_none()));
}

#[tokio::test]
async fn journal_holds_every_finished_target() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = std::env::temp_dir().join(format!("reconscrap-journal-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let journal = dir.join("reports.jsonl");
    std::fs::write(&journal, "stale line from an older run\n").unwrap();

    let session = session_for(local_config(&server), None).with_journal(&journal).unwrap();
    session.scan(&[], &words(&["admin", "login"])).await;
    let reports = session.finish().unwrap();

    // bodies are not serialized, so compare what a resume relies on
    let summary = |r: &TargetReport| (r.target.clone(), r.outcome(), r.signals.clone(), r.robots.clone());
    let on_disk: Vec<_> = read_jsonl(&journal).unwrap().iter().map(summary).collect();
    let in_memory: Vec<_> = reports.values().map(summary).collect();
    assert_eq!(on_disk.len(), 4);
    assert_eq!(on_disk, in_memory);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn requested_exploit_lookup_without_a_tool_is_fatal() {
    let mut cfg = ScanConfig::new("example.com");
    cfg.exploit_lookup = true;
    let transport = Arc::new(RecordingTransport::default());
    assert!(ScanSession::with_parts(cfg, transport, Arc::new(NoDns), None).is_err());
}

#[test]
fn malformed_seed_is_fatal() {
    let transport = Arc::new(RecordingTransport::default());
    let cfg = ScanConfig::new("exa mple..com");
    assert!(ScanSession::with_parts(cfg, transport, Arc::new(NoDns), None).is_err());
}
