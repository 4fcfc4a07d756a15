use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::analyze::SignalKind;
use crate::external::ExploitMatch;
use crate::output::reporter::TargetReport;
use crate::target::Target;

/// Counts and highlights of a finalized scan, for the console.
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    pub total_reports: usize,
    pub dispatched: usize,
    pub restored: usize,
    pub cancelled: bool,
    pub duration: Duration,
    pub subdomains: Vec<String>,
    pub by_outcome: BTreeMap<String, usize>,
    pub by_signal: BTreeMap<SignalKind, usize>,
    pub tls_downgraded: Vec<Target>,
    pub interesting_links: BTreeSet<String>,
    pub emails: BTreeSet<String>,
    pub flagged_comments: Vec<(Target, String)>,
    pub robots_disallowed: Vec<(Target, String)>,
    pub sitemaps: BTreeSet<String>,
    pub exploits: Vec<ExploitMatch>,
}

impl ScanSummary {
    pub fn from_reports<'a, I>(reports: I) -> Self
    where
        I: IntoIterator<Item = &'a TargetReport>,
    {
        let mut s = ScanSummary::default();
        for report in reports {
            s.total_reports += 1;
            *s.by_outcome.entry(report.outcome()).or_insert(0) += 1;

            if let Some(dns) = report.resolution.as_ref().filter(|d| d.exists) {
                s.subdomains.push(dns.host.clone());
            }
            if report.terminal().map(|p| p.tls_downgraded).unwrap_or(false) {
                s.tls_downgraded.push(report.target.clone());
            }
            for signal in &report.signals {
                *s.by_signal.entry(signal.kind).or_insert(0) += 1;
                match signal.kind {
                    SignalKind::InterestingLink => {
                        s.interesting_links.insert(signal.value.clone());
                    }
                    SignalKind::EmailAddress => {
                        s.emails.insert(signal.value.clone());
                    }
                    SignalKind::HtmlComment if signal.flagged => {
                        s.flagged_comments.push((report.target.clone(), signal.value.trim().to_string()));
                    }
                    _ => {}
                }
            }
            if let Some(robots) = &report.robots {
                for path in &robots.disallow {
                    s.robots_disallowed.push((report.target.clone(), path.clone()));
                }
                s.sitemaps.extend(robots.sitemaps.iter().cloned());
            }
            for m in &report.exploits {
                if !s.exploits.contains(m) {
                    s.exploits.push(m.clone());
                }
            }
        }
        s.subdomains.sort();
        s.subdomains.dedup();
        s
    }

    pub fn positives(&self) -> usize {
        self.by_outcome.get("success").copied().unwrap_or(0) + self.by_outcome.get("resolved").copied().unwrap_or(0)
    }

    pub fn print(&self) {
        println!("\n{}", "=".repeat(60));
        println!("              SCAN COMPLETE");
        println!("{}", "=".repeat(60));

        println!("\n[*] Summary:");
        println!("   Reports: {}", self.total_reports);
        println!("   Dispatched this run: {}", self.dispatched);
        if self.restored > 0 {
            println!("   Restored from checkpoint: {}", self.restored);
        }
        println!("   Duration: {}s", self.duration.as_secs());
        if self.cancelled {
            println!("   [!] Scan was cancelled before all targets were dispatched");
        }

        if !self.subdomains.is_empty() {
            println!("\n[+] Subdomains ({}):", self.subdomains.len());
            for host in &self.subdomains {
                println!("   {}", host);
            }
        }

        if !self.by_outcome.is_empty() {
            println!("\n[*] Outcomes:");
            for (outcome, count) in &self.by_outcome {
                println!("   {:<20} {}", outcome, count);
            }
        }

        if !self.by_signal.is_empty() {
            println!("\n[*] Signals:");
            for (kind, count) in &self.by_signal {
                println!("   {:<22} {}", kind, count);
            }
        }

        if !self.tls_downgraded.is_empty() {
            println!("\n[!] Fetched WITHOUT certificate verification:");
            for t in &self.tls_downgraded {
                println!("   {}", t);
            }
        }

        if !self.interesting_links.is_empty() {
            println!("\n[+] Interesting links:");
            for link in &self.interesting_links {
                println!("   {}", link);
            }
        }

        if !self.emails.is_empty() {
            println!("\n[+] Email addresses:");
            for email in &self.emails {
                println!("   {}", email);
            }
        }

        if !self.flagged_comments.is_empty() {
            println!("\n[!] Suspicious HTML comments:");
            for (target, text) in &self.flagged_comments {
                println!("   {} <!-- {} -->", target, text);
            }
        }

        if !self.robots_disallowed.is_empty() {
            println!("\n[+] robots.txt disallowed paths:");
            for (target, path) in &self.robots_disallowed {
                println!("   {} -> {}", target, path);
            }
        }
        for sitemap in &self.sitemaps {
            println!("   [sitemap] {}", sitemap);
        }

        if !self.exploits.is_empty() {
            println!("\n[!] Potential exploits:");
            for m in &self.exploits {
                println!("   [{}] {} (EDB-ID: {})", m.service, m.exploit.title, m.exploit.edb_id);
            }
        }

        println!("\n{}\n", "=".repeat(60));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{RobotsRules, Signal};
    use crate::probe::{ProbeResult, ProbeStatus};

    #[test]
    fn counts_outcomes_and_highlights() {
        let t = Target::from("https://example.com/");
        let mut ok = TargetReport::new(t.clone());
        ok.probes.push(ProbeResult {
            target: t.clone(),
            status: ProbeStatus::Success,
            response: None,
            elapsed: Duration::from_millis(1),
            attempts: 1,
            tls_downgraded: true,
            error: None,
        });
        ok.signals.push(Signal::new(SignalKind::EmailAddress, "a@example.com", &t));
        let mut comment = Signal::new(SignalKind::HtmlComment, " debug on ", &t);
        comment.flagged = true;
        ok.signals.push(comment);

        let t2 = Target::from("https://example.com/admin");
        let mut missing = TargetReport::new(t2.clone());
        missing.probes.push(ProbeResult {
            target: t2.clone(),
            status: ProbeStatus::HttpError { code: 404 },
            response: None,
            elapsed: Duration::from_millis(1),
            attempts: 1,
            tls_downgraded: false,
            error: None,
        });

        let t3 = Target::from("https://example.com/robots.txt");
        let mut robots = TargetReport::new(t3.clone());
        robots.robots = Some(RobotsRules {
            disallow: vec!["/backup/".into()],
            allow: Vec::new(),
            sitemaps: vec!["https://example.com/sitemap.xml".into()],
        });

        let summary = ScanSummary::from_reports([&ok, &missing, &robots]);
        assert_eq!(summary.total_reports, 3);
        assert_eq!(summary.robots_disallowed, vec![(t3, "/backup/".to_string())]);
        assert!(summary.sitemaps.contains("https://example.com/sitemap.xml"));
        assert_eq!(summary.positives(), 1);
        assert_eq!(summary.by_outcome.get("http-error-404"), Some(&1));
        assert_eq!(summary.tls_downgraded, vec![t.clone()]);
        assert!(summary.emails.contains("a@example.com"));
        assert_eq!(summary.flagged_comments, vec![(t, "debug on".to_string())]);
    }
}
