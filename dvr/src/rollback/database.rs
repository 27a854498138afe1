//! Database rollback coordination.
//!
//! All-or-nothing: a tagged backup of current state must succeed before
//! the target snapshot is restored, and a restore without a passing
//! integrity check is treated as a failure. Any failure here is fatal
//! for the surrounding rollback execution.

use chrono::Utc;
use dvr_common::config::DatabaseConfig;
use dvr_common::errors::DatabaseRollbackError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Failure reported by a backup store operation.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

/// Port to the external backup/restore subsystem.
pub trait BackupStore: Send + Sync {
    /// Create a tagged backup of current state.
    fn create_backup(&self, tag: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
    /// Restore the named snapshot.
    fn restore(&self, snapshot: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
    /// Verify integrity of the restored state.
    fn verify_integrity(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// One database rollback attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseRollbackRecord {
    /// Tag of the pre-rollback backup.
    pub backup_tag: String,
    /// Snapshot that was restored.
    pub target_snapshot_id: String,
    /// Whether the post-restore integrity check passed.
    pub integrity_check_passed: bool,
}

/// Drives backup, restore, and integrity verification in strict order.
pub struct DatabaseRollbackCoordinator<B> {
    store: B,
}

impl<B: BackupStore> DatabaseRollbackCoordinator<B> {
    pub fn new(store: B) -> Self {
        Self { store }
    }

    /// Roll the database back to `target_snapshot`.
    ///
    /// Sequence, no step skipped: tagged backup, restore, integrity
    /// check. Restore is never attempted without a successful backup.
    pub async fn rollback(
        &self,
        target_snapshot: &str,
    ) -> Result<DatabaseRollbackRecord, DatabaseRollbackError> {
        let backup_tag = format!("pre-rollback-{}", Utc::now().format("%Y%m%d-%H%M%S%.3f"));

        info!("creating database backup '{}'", backup_tag);
        self.store
            .create_backup(&backup_tag)
            .await
            .map_err(|e| DatabaseRollbackError::BackupFailed(e.to_string()))?;

        info!("restoring snapshot '{}'", target_snapshot);
        self.store.restore(target_snapshot).await.map_err(|e| {
            warn!("restore of '{}' failed: {}", target_snapshot, e);
            DatabaseRollbackError::RestoreFailed {
                snapshot: target_snapshot.to_string(),
                reason: e.to_string(),
            }
        })?;

        info!("verifying database integrity after restore");
        self.store.verify_integrity().await.map_err(|e| {
            warn!("integrity check after '{}' failed: {}", target_snapshot, e);
            DatabaseRollbackError::IntegrityCheckFailed {
                snapshot: target_snapshot.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(DatabaseRollbackRecord {
            backup_tag,
            target_snapshot_id: target_snapshot.to_string(),
            integrity_check_passed: true,
        })
    }
}

/// Backup store backed by configurable shell commands. `{tag}` and
/// `{snapshot}` placeholders are substituted before execution.
pub struct CommandBackupStore {
    config: DatabaseConfig,
}

impl CommandBackupStore {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    async fn run(&self, command: &str) -> Result<(), StoreError> {
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|e| StoreError(format!("'{}' failed to start: {}", command, e)))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(StoreError(format!(
                "'{}' exited with {}: {}",
                command,
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

impl BackupStore for CommandBackupStore {
    async fn create_backup(&self, tag: &str) -> Result<(), StoreError> {
        let command = self.config.backup_command.replace("{tag}", tag);
        self.run(&command).await
    }

    async fn restore(&self, snapshot: &str) -> Result<(), StoreError> {
        let command = self.config.restore_command.replace("{snapshot}", snapshot);
        self.run(&command).await
    }

    async fn verify_integrity(&self) -> Result<(), StoreError> {
        self.run(&self.config.integrity_command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackupStore;

    #[tokio::test]
    async fn successful_rollback_runs_backup_restore_integrity_in_order() {
        let store = FakeBackupStore::new();
        let calls = store.calls();
        let coordinator = DatabaseRollbackCoordinator::new(store);

        let record = coordinator.rollback("snap-7").await.unwrap();
        assert!(record.backup_tag.starts_with("pre-rollback-"));
        assert_eq!(record.target_snapshot_id, "snap-7");
        assert!(record.integrity_check_passed);
        assert_eq!(
            calls.lock().unwrap().as_slice(),
            ["backup", "restore", "integrity"]
        );
    }

    #[tokio::test]
    async fn failed_backup_never_attempts_restore() {
        let store = FakeBackupStore::new().fail_backup();
        let calls = store.calls();
        let coordinator = DatabaseRollbackCoordinator::new(store);

        let err = coordinator.rollback("snap-7").await.unwrap_err();
        assert!(matches!(err, DatabaseRollbackError::BackupFailed(_)));
        assert_eq!(calls.lock().unwrap().as_slice(), ["backup"]);
    }

    #[tokio::test]
    async fn failed_restore_is_fatal_and_skips_integrity() {
        let store = FakeBackupStore::new().fail_restore();
        let calls = store.calls();
        let coordinator = DatabaseRollbackCoordinator::new(store);

        let err = coordinator.rollback("snap-7").await.unwrap_err();
        assert!(matches!(err, DatabaseRollbackError::RestoreFailed { .. }));
        assert_eq!(calls.lock().unwrap().as_slice(), ["backup", "restore"]);
    }

    #[tokio::test]
    async fn failed_integrity_check_fails_a_nominally_successful_restore() {
        let store = FakeBackupStore::new().fail_integrity();
        let coordinator = DatabaseRollbackCoordinator::new(store);

        let err = coordinator.rollback("snap-7").await.unwrap_err();
        assert!(matches!(
            err,
            DatabaseRollbackError::IntegrityCheckFailed { .. }
        ));
    }

    #[tokio::test]
    async fn command_store_substitutes_placeholders() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("backup-tag");
        let config = DatabaseConfig {
            backup_command: format!("printf '%s' {{tag}} > {}", out.display()),
            restore_command: "true".to_string(),
            integrity_command: "true".to_string(),
        };
        let store = CommandBackupStore::new(config);
        store.create_backup("pre-rollback-test").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(out).unwrap(),
            "pre-rollback-test"
        );
    }

    #[tokio::test]
    async fn command_store_surfaces_nonzero_exit() {
        let config = DatabaseConfig {
            backup_command: "exit 3".to_string(),
            ..Default::default()
        };
        let store = CommandBackupStore::new(config);
        let err = store.create_backup("t").await.unwrap_err();
        assert!(err.0.contains("exited with 3"));
    }
}
