//! Client for the external metrics backend.
//!
//! The backend exposes indicators by name over a query window and
//! returns a single numeric value. Absence of data is `0`, not an
//! error, so an idle window never triggers a rollback by itself.

use dvr_common::types::Indicator;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Transport or contract failure while querying the metrics backend.
#[derive(Debug, Error)]
#[error("metrics query for {indicator} failed: {reason}")]
pub struct SliError {
    pub indicator: Indicator,
    pub reason: String,
}

/// Port to the metrics backend. The production implementation is
/// [`HttpSliClient`]; tests substitute a fake.
pub trait SliBackend: Send + Sync {
    /// Fetch one indicator over `window`. Missing data yields `Ok(0.0)`.
    fn fetch(
        &self,
        indicator: Indicator,
        window: Duration,
    ) -> impl Future<Output = Result<f64, SliError>> + Send;
}

/// HTTP metrics-backend client.
#[derive(Debug, Clone)]
pub struct HttpSliClient {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpSliClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

impl SliBackend for HttpSliClient {
    async fn fetch(&self, indicator: Indicator, window: Duration) -> Result<f64, SliError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("metric", indicator.metric_name().to_string()),
                ("window_secs", window.as_secs().to_string()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SliError {
                indicator,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SliError {
                indicator,
                reason: format!("backend returned {}", status),
            });
        }

        let payload: serde_json::Value = response.json().await.map_err(|e| SliError {
            indicator,
            reason: format!("invalid response body: {}", e),
        })?;

        // {"value": 1.25} with null/missing meaning "no data".
        let value = payload.get("value").and_then(|v| v.as_f64()).unwrap_or(0.0);
        debug!("sli {} over {}s = {}", indicator, window.as_secs(), value);
        Ok(value)
    }
}
