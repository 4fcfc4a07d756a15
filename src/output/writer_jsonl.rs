use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::output::reporter::TargetReport;

/// Write reports as one JSON object per line, replacing any existing file.
pub fn write_jsonl<'a, I>(path: &Path, reports: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a TargetReport>,
{
    let mut f = BufWriter::new(File::create(path)?);
    let written = write_lines(&mut f, reports)?;
    f.flush()?;
    Ok(written)
}

/// Append reports to an existing JSONL file.
pub fn append_jsonl<'a, I>(path: &Path, reports: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a TargetReport>,
{
    let f = OpenOptions::new().append(true).create(true).open(path)?;
    let mut f = BufWriter::new(f);
    let written = write_lines(&mut f, reports)?;
    f.flush()?;
    Ok(written)
}

fn write_lines<'a, W, I>(out: &mut W, reports: I) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a TargetReport>,
{
    let mut n = 0;
    for report in reports {
        let line = serde_json::to_string(report)?;
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
        n += 1;
    }
    Ok(n)
}
