use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{ReconError, Result};
use crate::output::TargetReport;

pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Load a JSONL checkpoint. Blank lines are skipped; a bad line names its line number.
///
/// A target written more than once keeps its last line.
pub fn read_jsonl(path: &Path) -> Result<Vec<TargetReport>> {
    let mut out = BTreeMap::new();
    let data = fs::read_to_string(path)?;
    for (i, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let report: TargetReport = serde_json::from_str(line)
            .map_err(|e| ReconError::Parse(format!("{}:{}: {}", path.display(), i + 1, e)))?;
        out.insert(report.target.clone(), report);
    }
    Ok(out.into_values().collect())
}
