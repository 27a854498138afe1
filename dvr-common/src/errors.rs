//! Error taxonomy for DVR.
//!
//! Validation and verification findings are data, not errors, and a
//! rollback's terminal outcome is carried on the execution itself; the
//! types here cover the paths where a component genuinely cannot
//! continue.

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file contains invalid TOML.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// Environment variable has an invalid value.
    #[error("invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidEnv {
        var: String,
        expected: String,
        value: String,
    },

    /// Value is outside its valid range.
    #[error("value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    /// A required setting is missing entirely.
    #[error("missing required setting: {name}")]
    Missing { name: &'static str },
}

/// Invalid state-machine operation on a rollback execution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// The requested state transition is not allowed.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Canary steps may not regress except on abort.
    #[error("step regression: {from}% -> {to}%")]
    StepRegression { from: u8, to: u8 },

    /// Traffic percentage outside 0-100.
    #[error("invalid traffic percentage: {percentage}")]
    InvalidPercentage { percentage: u8 },
}

/// Fatal outcomes of a database rollback attempt.
///
/// All three are terminal for the surrounding rollback execution: an
/// unverified restore is treated the same as a failed one.
#[derive(Debug, Error)]
pub enum DatabaseRollbackError {
    /// Backup of current state failed; restore was never attempted.
    #[error("backup failed before restore: {0}")]
    BackupFailed(String),

    /// Restore of the target snapshot failed; data may now disagree with code.
    #[error("restore failed for snapshot {snapshot}: {reason}")]
    RestoreFailed { snapshot: String, reason: String },

    /// Integrity check after restore failed.
    #[error("integrity check failed after restoring {snapshot}: {reason}")]
    IntegrityCheckFailed { snapshot: String, reason: String },
}
