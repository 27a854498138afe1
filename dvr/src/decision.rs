//! SLI-based rollback decisioning.
//!
//! A pure read-and-compare step: queries the three indicators
//! concurrently, compares each against its threshold, and recommends a
//! rollback when any breaches. Safe to call repeatedly and concurrently
//! with rollback execution; the canary flow reuses it with tighter
//! thresholds.

use crate::sli::{SliBackend, SliError};
use chrono::Utc;
use dvr_common::config::Thresholds;
use dvr_common::types::{Indicator, RollbackDecision, SliSnapshot};
use std::time::Duration;
use tracing::{debug, warn};

/// Evaluates SLIs against thresholds and emits rollback recommendations.
#[derive(Debug, Clone)]
pub struct DecisionEngine<S> {
    backend: S,
}

impl<S: SliBackend> DecisionEngine<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    /// Evaluate all three indicators against `thresholds`.
    ///
    /// Backend failures degrade to a value of 0 with a logged warning,
    /// matching the metrics contract's "absence of data is 0"; they never
    /// abort the evaluation or propagate to the orchestrator.
    pub async fn evaluate(&self, thresholds: &Thresholds) -> RollbackDecision {
        let window = thresholds.window();
        let (error_rate, p95, conversion) = tokio::join!(
            self.backend.fetch(Indicator::ErrorRate, window),
            self.backend.fetch(Indicator::P95Latency, window),
            self.backend.fetch(Indicator::ConversionRate, window),
        );

        let observed = vec![
            ceiling_snapshot(
                Indicator::ErrorRate,
                settle(error_rate),
                thresholds.error_rate_pct,
                window,
            ),
            ceiling_snapshot(
                Indicator::P95Latency,
                settle(p95),
                thresholds.p95_latency_ms,
                window,
            ),
            floor_snapshot(
                Indicator::ConversionRate,
                settle(conversion),
                thresholds.conversion_floor_pct,
                window,
            ),
        ];

        let breached: Vec<SliSnapshot> =
            observed.iter().filter(|s| s.breached).cloned().collect();
        let recommend = !breached.is_empty();
        if recommend {
            warn!(
                "rollback recommended: breached indicators {:?}",
                breached.iter().map(|s| s.indicator).collect::<Vec<_>>()
            );
        } else {
            debug!("all indicators within thresholds");
        }

        RollbackDecision {
            recommend,
            observed,
            breached,
            evaluated_at: Utc::now(),
        }
    }
}

fn settle(result: Result<f64, SliError>) -> f64 {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!("treating unavailable metric as 0: {}", e);
            0.0
        }
    }
}

fn ceiling_snapshot(
    indicator: Indicator,
    value: f64,
    threshold: f64,
    window: Duration,
) -> SliSnapshot {
    SliSnapshot {
        indicator,
        value,
        window_secs: window.as_secs(),
        threshold,
        breached: value > threshold,
    }
}

/// Floor comparison for conversion rate. A reading of exactly 0 means
/// "no data" under the metrics contract and does not breach; a floor of
/// 0 disables the indicator (canary gates).
fn floor_snapshot(
    indicator: Indicator,
    value: f64,
    threshold: f64,
    window: Duration,
) -> SliSnapshot {
    SliSnapshot {
        indicator,
        value,
        window_secs: window.as_secs(),
        threshold,
        breached: threshold > 0.0 && value > 0.0 && value < threshold,
    }
}
