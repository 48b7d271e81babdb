//! Benchmark report artifacts.
//!
//! A run produces exactly one file: `<base>-errors` when any host failed
//! the payload, `<base>-result` otherwise. Each file holds one section per
//! host, delimited by a single `### <host>` header line.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use virtfleet_common::Result;

use crate::exec::BenchOutcome;

/// Which artifact a run produced.
#[derive(Debug, PartialEq, Eq)]
pub enum Report {
    /// All hosts succeeded; path of the result report
    Result(PathBuf),
    /// At least one host failed; path of the error report
    Errors(PathBuf),
}

impl Report {
    /// Path of the written artifact.
    pub fn path(&self) -> &Path {
        match self {
            Report::Result(path) | Report::Errors(path) => path,
        }
    }
}

/// Write the run's single report artifact next to `base`
/// (typically the run identifier).
pub fn write_report(base: &Path, outcome: &BenchOutcome) -> Result<Report> {
    if outcome.failed() {
        let path = suffixed(base, "errors");
        write_sections(&path, &outcome.errors)?;
        Ok(Report::Errors(path))
    } else {
        let path = suffixed(base, "result");
        write_sections(&path, &outcome.results)?;
        Ok(Report::Result(path))
    }
}

fn suffixed(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(format!("-{}", suffix));
    PathBuf::from(name)
}

fn write_sections(path: &Path, sections: &BTreeMap<String, String>) -> Result<()> {
    let mut dst = File::create(path)?;
    for (host, data) in sections {
        write!(dst, "### {}\n{}\n", host, data)?;
    }
    info!(path = %path.display(), hosts = sections.len(), "report written");
    Ok(())
}
