//! Bounded-timeout HTTP probing.
//!
//! A probe issues one GET against one target and classifies the outcome.
//! Transport failures and timeouts become structured results, never
//! propagated errors.

use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of one HTTP check.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProbeResult {
    /// Target URL.
    pub url: String,
    /// HTTP status, if a response arrived.
    pub status_code: Option<u16>,
    /// Round-trip time in milliseconds.
    pub latency_ms: u64,
    /// Whether the probe passed (2xx-3xx).
    pub success: bool,
    /// Error message if the request failed outright.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeResult {
    fn passed(url: String, status: u16, latency_ms: u64) -> Self {
        Self {
            url,
            status_code: Some(status),
            latency_ms,
            success: true,
            error: None,
        }
    }

    fn rejected(url: String, status: u16, latency_ms: u64) -> Self {
        Self {
            url,
            status_code: Some(status),
            latency_ms,
            success: false,
            error: None,
        }
    }

    fn failed(url: String, latency_ms: u64, error: String) -> Self {
        Self {
            url,
            status_code: None,
            latency_ms,
            success: false,
            error: Some(error),
        }
    }
}

/// Whether an HTTP status counts as a passing probe.
pub fn status_passes(status: u16) -> bool {
    (200..400).contains(&status)
}

/// A fetched page: probe outcome plus body and response headers, for
/// content and security-header checks.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub result: ProbeResult,
    pub body: String,
    headers: Vec<(String, String)>,
}

impl PageSnapshot {
    /// Construct a snapshot directly; used by in-crate tests.
    #[cfg(test)]
    pub fn for_tests(result: ProbeResult, body: String, headers: Vec<(String, String)>) -> Self {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self {
            result,
            body,
            headers,
        }
    }

    /// Look up a response header by (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Issues bounded-timeout requests against single targets.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HealthProbe {
    /// Create a probe with the given per-request timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Probe one target, classifying the outcome.
    pub async fn probe(&self, url: &str) -> ProbeResult {
        let start = Instant::now();
        match self.client.get(url).timeout(self.timeout).send().await {
            Ok(response) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                let status = response.status().as_u16();
                debug!("probe {} -> {} ({}ms)", url, status, latency_ms);
                if status_passes(status) {
                    ProbeResult::passed(url.to_string(), status, latency_ms)
                } else {
                    ProbeResult::rejected(url.to_string(), status, latency_ms)
                }
            }
            Err(e) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                debug!("probe {} failed: {}", url, e);
                ProbeResult::failed(url.to_string(), latency_ms, e.to_string())
            }
        }
    }

    /// Fetch a page in full: outcome, body, and headers.
    pub async fn fetch_page(&self, url: &str) -> PageSnapshot {
        let start = Instant::now();
        match self.client.get(url).timeout(self.timeout).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let headers = response
                    .headers()
                    .iter()
                    .map(|(k, v)| {
                        (
                            k.as_str().to_ascii_lowercase(),
                            v.to_str().unwrap_or_default().to_string(),
                        )
                    })
                    .collect();
                let body = response.text().await.unwrap_or_default();
                let latency_ms = start.elapsed().as_millis() as u64;
                let result = if status_passes(status) {
                    ProbeResult::passed(url.to_string(), status, latency_ms)
                } else {
                    ProbeResult::rejected(url.to_string(), status, latency_ms)
                };
                PageSnapshot {
                    result,
                    body,
                    headers,
                }
            }
            Err(e) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                PageSnapshot {
                    result: ProbeResult::failed(url.to_string(), latency_ms, e.to_string()),
                    body: String::new(),
                    headers: Vec::new(),
                }
            }
        }
    }
}
