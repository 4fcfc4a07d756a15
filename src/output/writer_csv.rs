use csv::Writer;
use std::fs::File;
use std::path::Path;

use crate::error::Result;
use crate::output::reporter::TargetReport;

pub const TARGET_COLUMNS: [&str; 8] = [
    "target",
    "outcome",
    "status_code",
    "final_url",
    "elapsed_ms",
    "tls_downgraded",
    "signal_count",
    "failure",
];

pub const SIGNAL_COLUMNS: [&str; 5] = ["target", "kind", "value", "flagged", "scope"];

/// One row per report.
pub fn write_targets_csv<'a, I>(path: &Path, reports: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a TargetReport>,
{
    let f = File::create(path)?;
    let mut w = Writer::from_writer(f);
    w.write_record(TARGET_COLUMNS)?;
    let mut rows = 0;
    for report in reports {
        let terminal = report.terminal();
        let elapsed = terminal
            .map(|p| p.elapsed)
            .or_else(|| report.resolution.as_ref().map(|d| d.elapsed));
        w.write_record(&[
            report.target.to_string(),
            report.outcome(),
            terminal.and_then(|p| p.status_code()).map(|c| c.to_string()).unwrap_or_default(),
            terminal.map(|p| p.final_url().to_string()).unwrap_or_default(),
            elapsed.map(|d| d.as_millis().to_string()).unwrap_or_default(),
            terminal.map(|p| p.tls_downgraded).unwrap_or(false).to_string(),
            report.signals.len().to_string(),
            report.failure().map(|f| f.label()).unwrap_or_default(),
        ])?;
        rows += 1;
    }
    w.flush()?;
    Ok(rows)
}

/// One row per signal, across all reports.
pub fn write_signals_csv<'a, I>(path: &Path, reports: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a TargetReport>,
{
    let f = File::create(path)?;
    let mut w = Writer::from_writer(f);
    w.write_record(SIGNAL_COLUMNS)?;
    let mut rows = 0;
    for report in reports {
        for signal in &report.signals {
            w.write_record(&[
                report.target.to_string(),
                signal.kind.to_string(),
                signal.value.clone(),
                signal.flagged.to_string(),
                signal.scope.map(|s| s.as_str()).unwrap_or_default().to_string(),
            ])?;
            rows += 1;
        }
    }
    w.flush()?;
    Ok(rows)
}
