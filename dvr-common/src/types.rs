//! Common types used across DVR components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for a deployment known to the traffic router.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentId(pub String);

impl DeploymentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Severity of a validation or verification finding.
///
/// `Error` findings block a deploy or fail a verification run;
/// `Warning` findings are advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A single finding produced by a validation tier or verification check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Severity of the finding.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// File the finding refers to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Finding {
    /// Create an error-severity finding.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            file: None,
        }
    }

    /// Create a warning-severity finding.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            file: None,
        }
    }

    /// Attach the file this finding refers to.
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// Service level indicator queried from the metrics backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    /// Request error rate, percent.
    ErrorRate,
    /// 95th percentile request latency, milliseconds.
    P95Latency,
    /// Conversion rate, percent. Breaches downward (floor).
    ConversionRate,
}

impl Indicator {
    /// Metric name as the metrics backend knows it.
    pub fn metric_name(&self) -> &'static str {
        match self {
            Self::ErrorRate => "error_rate",
            Self::P95Latency => "p95_latency",
            Self::ConversionRate => "conversion_rate",
        }
    }
}

impl std::fmt::Display for Indicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.metric_name())
    }
}

/// Point-in-time read of one indicator compared against its threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliSnapshot {
    /// Which indicator was read.
    pub indicator: Indicator,
    /// Observed value.
    pub value: f64,
    /// Query window in seconds.
    pub window_secs: u64,
    /// Threshold (ceiling, or floor for conversion rate).
    pub threshold: f64,
    /// Whether the observed value breaches the threshold.
    pub breached: bool,
}

/// Aggregate rollback recommendation from the decision engine.
///
/// Carries every breached indicator, not just the first, so operators
/// see the full picture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackDecision {
    /// Whether a rollback is recommended.
    pub recommend: bool,
    /// Every indicator read during evaluation, in evaluation order.
    pub observed: Vec<SliSnapshot>,
    /// All indicators that breached their thresholds.
    pub breached: Vec<SliSnapshot>,
    /// When the decision was evaluated.
    pub evaluated_at: DateTime<Utc>,
}

impl RollbackDecision {
    /// Names of the breached indicators, in evaluation order.
    pub fn breached_names(&self) -> Vec<&'static str> {
        self.breached.iter().map(|s| s.indicator.metric_name()).collect()
    }
}

/// Terminal outcome of a rollback execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackOutcome {
    /// Rollback completed; traffic fully shifted to the target.
    Success,
    /// Rollback stopped safely; traffic left at the last confirmed-good split.
    Aborted,
    /// Rollback failed in a way that requires human intervention.
    Failed,
}

impl std::fmt::Display for RollbackOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Aborted => write!(f, "aborted"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Routing state requested from the traffic router: `percentage`% of
/// traffic to `target`, with the router owning the complementary share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficSplit {
    /// Deployment receiving the shifted share.
    pub target: DeploymentId,
    /// Percentage of traffic routed to `target` (0-100).
    pub percentage: u8,
}

impl TrafficSplit {
    /// Create a split, rejecting percentages over 100.
    pub fn new(target: DeploymentId, percentage: u8) -> Result<Self, crate::errors::TransitionError> {
        if percentage > 100 {
            return Err(crate::errors::TransitionError::InvalidPercentage { percentage });
        }
        Ok(Self { target, percentage })
    }

    /// Share the router keeps on the currently live deployment.
    pub fn complement(&self) -> u8 {
        100 - self.percentage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_warning_below_error() {
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn finding_builders_set_severity_and_file() {
        let f = Finding::error("missing file").with_file("next.config.js");
        assert_eq!(f.severity, Severity::Error);
        assert_eq!(f.file.as_deref(), Some(std::path::Path::new("next.config.js")));

        let w = Finding::warning("slow");
        assert_eq!(w.severity, Severity::Warning);
        assert!(w.file.is_none());
    }

    #[test]
    fn traffic_split_complement_sums_to_100() {
        for pct in [0u8, 10, 25, 50, 75, 100] {
            let split = TrafficSplit::new(DeploymentId::new("blue"), pct).unwrap();
            assert_eq!(split.percentage as u16 + split.complement() as u16, 100);
        }
    }

    #[test]
    fn traffic_split_rejects_over_100() {
        assert!(TrafficSplit::new(DeploymentId::new("blue"), 101).is_err());
    }

    #[test]
    fn indicator_serializes_snake_case() {
        let json = serde_json::to_string(&Indicator::ErrorRate).unwrap();
        assert_eq!(json, "\"error_rate\"");
    }
}
