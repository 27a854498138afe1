//! Rollback execution history.
//!
//! Tracks past rollback executions for auditing and for target selection
//! in automated mode. Stored as JSONL, most recent first on read.

use anyhow::Result;
use chrono::{DateTime, Utc};
use dvr_common::types::{DeploymentId, RollbackOutcome};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

/// One recorded rollback execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRecord {
    /// Execution id.
    pub id: Uuid,
    /// Mode the rollback ran in.
    pub mode: String,
    /// Deployment the rollback targeted.
    pub target: DeploymentId,
    /// Terminal outcome.
    pub outcome: RollbackOutcome,
    /// Traffic percentages that were applied, in order.
    pub steps_applied: Vec<u8>,
    /// When the execution started.
    pub started_at: DateTime<Utc>,
    /// When the execution reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Manages rollback history storage and retrieval.
pub struct RollbackHistory {
    history_dir: PathBuf,
}

impl RollbackHistory {
    /// Create a history manager under the default data directory.
    pub fn new() -> Result<Self> {
        let history_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dvr")
            .join("history");
        Self::at(history_dir)
    }

    /// Create a history manager rooted at an explicit directory.
    pub fn at(history_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&history_dir)?;
        Ok(Self { history_dir })
    }

    fn history_file(&self) -> PathBuf {
        self.history_dir.join("rollbacks.jsonl")
    }

    /// Append one record.
    pub fn record(&self, record: &RollbackRecord) -> Result<()> {
        use std::io::Write;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.history_file())?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }

    /// Get recent records, most recent first.
    pub fn recent(&self, limit: usize) -> Result<Vec<RollbackRecord>> {
        let path = self.history_file();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path)?;
        let mut entries: Vec<RollbackRecord> = content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();

        entries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        entries.truncate(limit);
        Ok(entries)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(target: &str, minutes_ago: i64) -> RollbackRecord {
        RollbackRecord {
            id: Uuid::new_v4(),
            mode: "canary".to_string(),
            target: DeploymentId::new(target),
            outcome: RollbackOutcome::Success,
            steps_applied: vec![10, 25, 50, 75, 100],
            started_at: Utc::now() - chrono::Duration::minutes(minutes_ago),
            completed_at: Some(Utc::now()),
        }
    }

    #[test]
    fn records_round_trip_most_recent_first() {
        let dir = TempDir::new().unwrap();
        let history = RollbackHistory::at(dir.path().to_path_buf()).unwrap();
        history.record(&record("deploy-1", 30)).unwrap();
        history.record(&record("deploy-2", 10)).unwrap();

        let entries = history.recent(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].target.as_str(), "deploy-2");
        assert_eq!(entries[1].target.as_str(), "deploy-1");
    }

    #[test]
    fn recent_respects_limit() {
        let dir = TempDir::new().unwrap();
        let history = RollbackHistory::at(dir.path().to_path_buf()).unwrap();
        for i in 0..5 {
            history.record(&record(&format!("deploy-{}", i), i)).unwrap();
        }
        assert_eq!(history.recent(3).unwrap().len(), 3);
    }

    #[test]
    fn empty_history_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let history = RollbackHistory::at(dir.path().to_path_buf()).unwrap();
        assert!(history.recent(10).unwrap().is_empty());
    }
}
