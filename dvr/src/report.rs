//! Report sink for verification runs.
//!
//! Each post-deployment verification run is persisted as one JSON file
//! under the local data directory so CI and operators can inspect past
//! verdicts.

use crate::verify::VerificationRun;
use anyhow::Result;
use std::fs;
use std::path::PathBuf;

/// Writes verification runs to disk.
pub struct ReportSink {
    report_dir: PathBuf,
}

impl ReportSink {
    /// Create a sink under the default data directory.
    pub fn new() -> Result<Self> {
        let report_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dvr")
            .join("reports");
        Self::at(report_dir)
    }

    /// Create a sink rooted at an explicit directory.
    pub fn at(report_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&report_dir)?;
        Ok(Self { report_dir })
    }

    /// Persist one run; returns the written path.
    pub fn persist(&self, run: &VerificationRun) -> Result<PathBuf> {
        let name = format!(
            "verification-{}.json",
            run.started_at.format("%Y%m%dT%H%M%S%3f")
        );
        let path = self.report_dir.join(name);
        fs::write(&path, serde_json::to_string_pretty(run)?)?;
        Ok(path)
    }
}
