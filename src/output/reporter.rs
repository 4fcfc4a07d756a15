use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::analyze::{LinkInventory, RobotsRules, Signal};
use crate::discover::dns::DnsProbe;
use crate::error::FailureKind;
use crate::external::{ExploitMatch, OpenPort};
use crate::probe::ProbeResult;
use crate::target::Target;

/// Everything learned about one Target. Fields only ever grow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: Target,
    #[serde(default)]
    pub probes: Vec<ProbeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<DnsProbe>,
    #[serde(default)]
    pub signals: Vec<Signal>,
    #[serde(default, skip_serializing_if = "LinkInventory::is_empty")]
    pub links: LinkInventory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robots: Option<RobotsRules>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exploits: Vec<ExploitMatch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub open_ports: Vec<OpenPort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl TargetReport {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            probes: Vec::new(),
            resolution: None,
            signals: Vec::new(),
            links: LinkInventory::default(),
            robots: None,
            exploits: Vec::new(),
            open_ports: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// The last probe recorded, which decides the HTTP outcome.
    pub fn terminal(&self) -> Option<&ProbeResult> {
        self.probes.last()
    }

    pub fn failure(&self) -> Option<FailureKind> {
        match (self.terminal(), &self.resolution) {
            (Some(probe), _) => probe.failure_kind(),
            (None, Some(dns)) => dns.failure_kind(),
            (None, None) => None,
        }
    }

    pub fn is_positive(&self) -> bool {
        match (self.terminal(), &self.resolution) {
            (Some(probe), _) => probe.status.is_success(),
            (None, Some(dns)) => dns.exists,
            (None, None) => false,
        }
    }

    pub fn outcome(&self) -> String {
        match (self.terminal(), &self.resolution) {
            (Some(probe), _) => probe.status.label(),
            (None, Some(dns)) if dns.exists => "resolved".to_string(),
            (None, Some(_)) => "unresolved".to_string(),
            (None, None) if !self.notes.is_empty() => "aborted".to_string(),
            (None, None) => "pending".to_string(),
        }
    }
}

fn push_unique<T: PartialEq>(into: &mut Vec<T>, items: impl IntoIterator<Item = T>) {
    for item in items {
        if !into.contains(&item) {
            into.push(item);
        }
    }
}

/// Concurrent Target → TargetReport accumulator shared by all workers.
#[derive(Debug, Default)]
pub struct Reporter {
    reports: DashMap<Target, TargetReport>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a probe and its signals. Recording the same probe twice is a no-op.
    pub fn record(&self, target: &Target, probe: ProbeResult, signals: Vec<Signal>) {
        let mut entry = self
            .reports
            .entry(target.clone())
            .or_insert_with(|| TargetReport::new(target.clone()));
        if entry.probes.last() != Some(&probe) {
            entry.probes.push(probe);
        }
        push_unique(&mut entry.signals, signals);
    }

    /// First resolution wins; later ones are ignored.
    pub fn record_resolution(&self, target: &Target, probe: DnsProbe) {
        let mut entry = self
            .reports
            .entry(target.clone())
            .or_insert_with(|| TargetReport::new(target.clone()));
        if entry.resolution.is_none() {
            entry.resolution = Some(probe);
        }
    }

    pub fn record_links(&self, target: &Target, links: LinkInventory) {
        if links.is_empty() {
            return;
        }
        self.reports
            .entry(target.clone())
            .or_insert_with(|| TargetReport::new(target.clone()))
            .links
            .merge(links);
    }

    pub fn record_robots(&self, target: &Target, rules: RobotsRules) {
        if rules.is_empty() {
            return;
        }
        self.reports
            .entry(target.clone())
            .or_insert_with(|| TargetReport::new(target.clone()))
            .robots
            .get_or_insert_with(RobotsRules::default)
            .merge(rules);
    }

    pub fn record_exploits(&self, target: &Target, exploits: Vec<ExploitMatch>) {
        let mut entry = self
            .reports
            .entry(target.clone())
            .or_insert_with(|| TargetReport::new(target.clone()));
        push_unique(&mut entry.exploits, exploits);
    }

    pub fn record_ports(&self, target: &Target, ports: Vec<OpenPort>) {
        let mut entry = self
            .reports
            .entry(target.clone())
            .or_insert_with(|| TargetReport::new(target.clone()));
        push_unique(&mut entry.open_ports, ports);
    }

    pub fn note(&self, target: &Target, note: impl Into<String>) {
        let mut entry = self
            .reports
            .entry(target.clone())
            .or_insert_with(|| TargetReport::new(target.clone()));
        push_unique(&mut entry.notes, Some(note.into()));
    }

    /// Seed reports from an earlier run. Targets already present are left alone.
    pub fn restore<I: IntoIterator<Item = TargetReport>>(&self, reports: I) -> usize {
        let mut restored = 0;
        for report in reports {
            if !self.reports.contains_key(&report.target) {
                self.reports.insert(report.target.clone(), report);
                restored += 1;
            }
        }
        restored
    }

    /// Hosts whose DNS check found an A or CNAME record, sorted.
    pub fn resolved_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .reports
            .iter()
            .filter_map(|r| r.resolution.as_ref().filter(|d| d.exists).map(|d| d.host.clone()))
            .collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }

    pub fn get(&self, target: &Target) -> Option<TargetReport> {
        self.reports.get(target).map(|r| r.value().clone())
    }

    /// Copy of every report held right now, in target order.
    pub fn snapshot(&self) -> Vec<TargetReport> {
        let mut reports: Vec<TargetReport> = self.reports.iter().map(|r| r.value().clone()).collect();
        reports.sort_by(|a, b| a.target.cmp(&b.target));
        reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Consume the reporter once every worker is done with it.
    pub fn finalize(self) -> BTreeMap<Target, TargetReport> {
        self.reports.into_iter().collect()
    }
}
