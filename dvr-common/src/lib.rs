//! Shared types, configuration, and error taxonomy for DVR components.

pub mod config;
pub mod errors;
pub mod types;

pub use config::{DvrConfig, Thresholds};
pub use errors::{ConfigError, DatabaseRollbackError, TransitionError};
pub use types::{
    DeploymentId, Finding, Indicator, RollbackDecision, RollbackOutcome, Severity, SliSnapshot,
    TrafficSplit,
};
