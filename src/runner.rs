use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use reconscrap::analyze::SignalKind;
use reconscrap::config::ScanConfig;
use reconscrap::discover::wordlist;
use reconscrap::external::{ExploitLookup, Searchsploit};
use reconscrap::output::{write_jsonl, write_signals_csv, write_targets_csv, ScanSummary, TargetReport};
use reconscrap::session::ScanSession;
use reconscrap::target::{Scheme, Target};
use reconscrap::utils;

use crate::cli::{Cli, Commands, FetchArgs};

fn print_ascii_logo() {
    println!(r#"
     ____                      ____
    |  _ \ ___  ___ ___  _ __ / ___|  ___ _ __ __ _ _ __
    | |_) / _ \/ __/ _ \| '_ \\___ \ / __| '__/ _` | '_ \
    |  _ <  __/ (_| (_) | | | |___) | (__| | | (_| | |_) |
    |_| \_\___|\___\___/|_| |_|____/ \___|_|  \__,_| .__/
                                                   |_|
                    Web Recon Engine v0.1.0
    "#);
}

pub async fn run_from_cli(cli: Cli) -> anyhow::Result<()> {
    // Keep external crates at INFO/WARN so the console stays readable in debug mode.
    use tracing_subscriber::EnvFilter;
    let crate_level = if cli.debug { "debug" } else if cli.verbose { "info" } else { "warn" };
    let filter_str = format!(
        "reconscrap={crate},reqwest=info,hyper=info,h2=info,hickory_proto=warn,hickory_resolver=warn",
        crate = crate_level
    );
    let env_filter = EnvFilter::try_new(&filter_str).unwrap_or_else(|_| EnvFilter::new(crate_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(true)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Scan {
            target,
            wordlist,
            subdomain_wordlist,
            out,
            timing,
            workers,
            rate,
            fetch,
            schemes,
            no_subdomains,
            no_robots,
            exploits,
            port_scan,
            resume,
            config,
        } => {
            let mut cfg = match &config {
                Some(path) => ScanConfig::from_json_file(Path::new(path))?,
                None => ScanConfig::default(),
            };
            cfg.seed = target;
            if config.is_none() || timing != 3 {
                cfg.apply_timing(timing);
            }
            if let Some(w) = workers {
                cfg.workers = w;
            }
            if let Some(r) = rate {
                cfg.requests_per_second = r;
            }
            cfg.schemes = parse_schemes(&schemes)?;
            if no_subdomains {
                cfg.enumerate_subdomains = false;
            }
            if no_robots {
                cfg.fetch_robots = false;
            }
            cfg.exploit_lookup |= exploits;
            apply_fetch_args(&mut cfg, &fetch);

            let opts = ScanOptions {
                out: PathBuf::from(out),
                wordlist: wordlist.map(PathBuf::from),
                subdomain_wordlist: subdomain_wordlist.map(PathBuf::from),
                resume: resume.map(PathBuf::from),
                port_scan,
                timing,
            };
            run_scan(cfg, opts).await
        }
        Commands::Fingerprint { url, fetch, exploits, no_robots } => {
            run_fingerprint(url, fetch, exploits, !no_robots).await
        }
        Commands::Exploits { service } => run_exploits(service).await,
    }
}

struct ScanOptions {
    out: PathBuf,
    wordlist: Option<PathBuf>,
    subdomain_wordlist: Option<PathBuf>,
    resume: Option<PathBuf>,
    port_scan: bool,
    timing: u8,
}

fn parse_schemes(values: &[String]) -> anyhow::Result<Vec<Scheme>> {
    values
        .iter()
        .map(|v| Scheme::parse(v).ok_or_else(|| anyhow::anyhow!("unknown scheme '{}', expected http or https", v)))
        .collect()
}

fn apply_fetch_args(cfg: &mut ScanConfig, fetch: &FetchArgs) {
    if let Some(t) = fetch.timeout {
        cfg.fetch.timeout_seconds = t;
    }
    if let Some(r) = fetch.retries {
        cfg.fetch.max_retries = r;
    }
    if let Some(b) = fetch.backoff {
        cfg.fetch.backoff_base_seconds = b;
    }
    if let Some(m) = fetch.max_redirects {
        cfg.fetch.max_redirects = m;
    }
    if fetch.no_verify {
        cfg.fetch.verify_tls = false;
    }
    if let Some(ua) = &fetch.user_agent {
        cfg.fetch.user_agent = ua.clone();
    }
    if let Some(proxy) = &fetch.proxy {
        cfg.fetch.proxy = Some(proxy.clone());
    }
}

fn load_words(path: Option<&Path>, fallback: fn() -> Vec<String>) -> anyhow::Result<Vec<String>> {
    match path {
        Some(p) => {
            let words = wordlist::load(p).with_context(|| format!("reading wordlist {}", p.display()))?;
            println!("[*] Loaded {} words from {}", words.len(), p.display());
            Ok(words)
        }
        None => Ok(fallback()),
    }
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner:.cyan} {pos} targets checked [{elapsed}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

async fn run_scan(cfg: ScanConfig, opts: ScanOptions) -> anyhow::Result<()> {
    // everything fatal happens here, before the first request
    let mut session = ScanSession::new(cfg)?;
    let path_words = load_words(opts.wordlist.as_deref(), wordlist::default_paths)?;
    let subdomain_words = load_words(opts.subdomain_wordlist.as_deref(), wordlist::default_subdomains)?;
    utils::ensure_dir(&opts.out)?;

    print_ascii_logo();
    let cfg = session.config().clone();
    println!("[>] Target: {}", cfg.seed);
    println!(
        "[~] Timing: T{} (workers: {}, rate: {}/s, retries: {})",
        opts.timing, cfg.workers, cfg.requests_per_second, cfg.fetch.max_retries
    );
    if !cfg.fetch.verify_tls {
        println!("[!] TLS certificate verification is disabled");
    }
    if let Some(proxy) = &cfg.fetch.proxy {
        println!("[~] Proxy: {}", proxy);
    }

    if let Some(path) = &opts.resume {
        let reports = utils::read_jsonl(path).with_context(|| format!("loading checkpoint {}", path.display()))?;
        let restored = session.resume(reports);
        println!("[+] Resumed {} reports from {}", restored, path.display());
    }

    let checkpoint = opts.out.join("reports.jsonl");
    let pb = spinner();
    let session = session
        .with_journal(&checkpoint)?
        .with_port_scan(opts.port_scan)
        .with_progress(pb.clone());
    let restored = session.restored();

    let cancel = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n[!] Interrupted: finishing in-flight probes, then writing a checkpoint");
            cancel.cancel();
        }
    });

    println!("\n{}\n", "-".repeat(60));
    let stats = session.scan(&subdomain_words, &path_words).await;
    pb.finish_and_clear();

    let reports = session.finish()?;
    let ordered: Vec<&TargetReport> = reports.values().collect();

    // rewrite the journal without superseded lines
    write_jsonl(&checkpoint, ordered.iter().copied())?;
    let target_rows = write_targets_csv(&opts.out.join("targets.csv"), ordered.iter().copied())?;
    let signal_rows = write_signals_csv(&opts.out.join("signals.csv"), ordered.iter().copied())?;

    let mut summary = ScanSummary::from_reports(ordered.iter().copied());
    summary.dispatched = stats.dispatched;
    summary.restored = restored;
    summary.cancelled = stats.cancelled;
    summary.duration = stats.elapsed;
    summary.print();

    println!("[+] {} targets -> {}", target_rows, opts.out.join("targets.csv").display());
    println!("[+] {} signals -> {}", signal_rows, opts.out.join("signals.csv").display());
    if stats.cancelled {
        println!("[+] Checkpoint written: resume with --resume {}", checkpoint.display());
    } else {
        println!("[+] Reports -> {}", checkpoint.display());
    }
    if stats.panicked > 0 {
        println!("[!] {} worker task(s) failed; see notes in the report", stats.panicked);
    }
    Ok(())
}

async fn run_fingerprint(url: String, fetch: FetchArgs, exploits: bool, robots: bool) -> anyhow::Result<()> {
    let parsed = url::Url::parse(&url).with_context(|| format!("'{}' is not a valid URL", url))?;
    let host = parsed.host_str().context("URL has no host")?;
    let seed = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let mut cfg = ScanConfig::new(seed);
    cfg.enumerate_subdomains = false;
    cfg.exploit_lookup = exploits;
    apply_fetch_args(&mut cfg, &fetch);

    let session = ScanSession::new(cfg)?;
    let target = Target::new(url);
    println!("[*] Fetching {}", target);
    session.probe_target(target.clone()).await;

    let robots_target = match parsed.join("/robots.txt") {
        Ok(u) if robots => Some(Target::new(u.to_string())),
        _ => None,
    };
    if let Some(rt) = &robots_target {
        session.probe_target(rt.clone()).await;
    }

    let mut reports = session.finish()?;
    let Some(report) = reports.remove(&target) else {
        anyhow::bail!("no report produced for {}", target);
    };
    print_page_report(&report);

    if let Some(rt) = robots_target {
        match reports.get(&rt) {
            Some(r) if r.robots.is_some() || r.is_positive() => print_robots(r),
            Some(r) => println!("\n[-] {}: {}", rt, r.outcome()),
            None => {}
        }
    }
    Ok(())
}

fn print_page_report(report: &TargetReport) {
    match report.terminal() {
        Some(probe) => println!(
            "[*] {} -> {} ({} ms, {} attempt(s))",
            probe.final_url(),
            report.outcome(),
            probe.elapsed.as_millis(),
            probe.attempts
        ),
        None => println!("[!] {} was not probed", report.target),
    }
    if let Some(failure) = report.failure() {
        println!("[!] {}", failure);
    }

    let kinds = [
        SignalKind::ServerHeader,
        SignalKind::PoweredBy,
        SignalKind::MetaGenerator,
        SignalKind::CookiePattern,
        SignalKind::ScriptLibrary,
        SignalKind::StylesheetFramework,
        SignalKind::EmailAddress,
        SignalKind::InterestingLink,
        SignalKind::HtmlComment,
    ];
    for kind in kinds {
        let matching: Vec<_> = report.signals.iter().filter(|s| s.kind == kind).collect();
        if matching.is_empty() {
            continue;
        }
        println!("\n[+] {}:", kind);
        for s in matching {
            let flag = if s.flagged { " [!]" } else { "" };
            match s.scope {
                Some(scope) => println!("   {} ({}){}", s.value.trim(), scope.as_str(), flag),
                None => println!("   {}{}", s.value.trim(), flag),
            }
        }
    }

    if !report.links.is_empty() {
        println!(
            "\n[*] Links: {} internal, {} external",
            report.links.internal.len(),
            report.links.external.len()
        );
    }
    for m in &report.exploits {
        println!("[!] [{}] {} (EDB-ID: {})", m.service, m.exploit.title, m.exploit.edb_id);
    }
    for note in &report.notes {
        println!("[·] {}", note);
    }
}

fn print_robots(report: &TargetReport) {
    println!("\n[+] Found {}", report.target);
    let Some(rules) = &report.robots else {
        println!("   (no rules)");
        return;
    };
    for path in &rules.disallow {
        println!("   Disallow: {}", path);
    }
    for path in &rules.allow {
        println!("   Allow: {}", path);
    }
    for sitemap in &rules.sitemaps {
        println!("   Sitemap: {}", sitemap);
    }
}

async fn run_exploits(service: String) -> anyhow::Result<()> {
    let lookup = Searchsploit::locate()?;
    println!("[*] Searching Exploit-DB for: {}", service);
    let exploits = lookup.search(&service).await?;
    if exploits.is_empty() {
        println!("[-] No potential exploits found in Exploit-DB.");
        return Ok(());
    }
    println!("[+] Found {} potential exploits:", exploits.len());
    for e in &exploits {
        println!("  - {} (EDB-ID: {})", e.title, e.edb_id);
        println!("    {}", e.path);
    }
    Ok(())
}
