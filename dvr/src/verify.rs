//! Post-deployment live-site verification.
//!
//! Probes a fixed endpoint set, runs content and security assertions
//! against the home page, and produces a pass/fail verdict with a
//! numeric success rate. Partial target unavailability never aborts a
//! run; every target is always attempted.

use crate::probe::{HealthProbe, PageSnapshot, ProbeResult};
use chrono::{DateTime, Utc};
use dvr_common::config::VerifierConfig;
use dvr_common::types::Finding;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Latency below this is a clean pass (ms).
const LATENCY_WARN_MS: u64 = 3000;
/// Latency above this is an error (ms).
const LATENCY_ERROR_MS: u64 = 5000;
/// Minimum success rate for a successful deployment (percent).
const SUCCESS_RATE_FLOOR: f64 = 75.0;

/// Aggregate verdict of one verification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRun {
    /// Base URL that was verified.
    pub base_url: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Every probe issued, in target order (pages then assets).
    pub probes: Vec<ProbeResult>,
    /// Percentage of probes that passed (0-100).
    pub success_rate: f64,
    /// Error findings; any entry fails the deployment.
    pub errors: Vec<Finding>,
    /// Warning findings; advisory only.
    pub warnings: Vec<Finding>,
    /// `errors` empty and `success_rate` at least 75.
    pub deployment_success: bool,
}

/// Join a base URL and a path without doubling slashes.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Runs verification against one deployed site.
pub struct PostDeploymentVerifier {
    probe: HealthProbe,
    config: VerifierConfig,
    base_url: String,
}

impl PostDeploymentVerifier {
    pub fn new(config: VerifierConfig, base_url: impl Into<String>) -> Self {
        Self {
            probe: HealthProbe::new(config.probe_timeout()),
            config,
            base_url: base_url.into(),
        }
    }

    /// Run the full verification: endpoint probes, content checks,
    /// security headers, and home-page latency.
    pub async fn verify(&self) -> VerificationRun {
        let started_at = Utc::now();

        let page_urls: Vec<String> = self
            .config
            .page_targets
            .iter()
            .map(|p| join_url(&self.base_url, p))
            .collect();
        let asset_urls: Vec<String> = self
            .config
            .asset_targets
            .iter()
            .map(|p| join_url(&self.base_url, p))
            .collect();

        // Independent and I/O-bound: fan out with bounded concurrency,
        // preserving target order in the collected results.
        let page_results: Vec<ProbeResult> = futures::stream::iter(page_urls)
            .map(|url| {
                let probe = self.probe.clone();
                async move { probe.probe(&url).await }
            })
            .buffered(self.config.probe_concurrency.max(1))
            .collect()
            .await;
        let asset_results: Vec<ProbeResult> = futures::stream::iter(asset_urls)
            .map(|url| {
                let probe = self.probe.clone();
                async move { probe.probe(&url).await }
            })
            .buffered(self.config.probe_concurrency.max(1))
            .collect()
            .await;

        let home = self.probe.fetch_page(&self.base_url).await;

        let run = assemble_run(
            &self.base_url,
            started_at,
            page_results,
            asset_results,
            &home,
            &self.config,
        );
        info!(
            "verification of {}: success_rate={:.1}% errors={} warnings={} -> {}",
            self.base_url,
            run.success_rate,
            run.errors.len(),
            run.warnings.len(),
            if run.deployment_success { "pass" } else { "fail" }
        );
        run
    }
}

impl crate::rollback::DeploymentHealth for PostDeploymentVerifier {
    async fn healthy(&self) -> bool {
        self.verify().await.deployment_success
    }
}

/// Pure aggregation of probe outcomes and home-page checks into a run.
fn assemble_run(
    base_url: &str,
    started_at: DateTime<Utc>,
    page_results: Vec<ProbeResult>,
    asset_results: Vec<ProbeResult>,
    home: &PageSnapshot,
    config: &VerifierConfig,
) -> VerificationRun {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if !base_url.starts_with("https://") {
        errors.push(Finding::error(format!(
            "base URL {} is not served over TLS",
            base_url
        )));
    }

    for result in &page_results {
        if !result.success {
            errors.push(Finding::error(match (&result.error, result.status_code) {
                (Some(e), _) => format!("{} unreachable: {}", result.url, e),
                (None, Some(status)) => format!("{} returned HTTP {}", result.url, status),
                (None, None) => format!("{} probe failed", result.url),
            }));
        }
    }
    for result in &asset_results {
        if !result.success {
            warnings.push(Finding::warning(format!(
                "static asset {} unavailable",
                result.url
            )));
        }
    }

    check_content(home, config, &mut errors, &mut warnings);
    check_security_headers(home, &mut warnings);
    check_latency(home, &mut errors, &mut warnings);

    let mut probes = page_results;
    probes.extend(asset_results);
    let total = probes.len();
    let passed = probes.iter().filter(|p| p.success).count();
    let success_rate = if total == 0 {
        0.0
    } else {
        100.0 * passed as f64 / total as f64
    };
    let deployment_success = errors.is_empty() && success_rate >= SUCCESS_RATE_FLOOR;

    VerificationRun {
        base_url: base_url.to_string(),
        started_at,
        probes,
        success_rate,
        errors,
        warnings,
        deployment_success,
    }
}

fn check_content(
    home: &PageSnapshot,
    config: &VerifierConfig,
    errors: &mut Vec<Finding>,
    warnings: &mut Vec<Finding>,
) {
    if !home.result.success {
        errors.push(Finding::error(
            "content verification failed: home page unreachable",
        ));
        return;
    }

    let body = home.body.to_lowercase();

    let missing: Vec<&String> = config
        .expected_keywords
        .iter()
        .filter(|k| !body.contains(&k.to_lowercase()))
        .collect();
    let present = config.expected_keywords.len() - missing.len();
    if !config.expected_keywords.is_empty() && present * 2 < config.expected_keywords.len() {
        errors.push(Finding::error(format!(
            "content verification failed: {}/{} expected keywords present",
            present,
            config.expected_keywords.len()
        )));
    } else {
        for keyword in missing {
            warnings.push(Finding::warning(format!(
                "expected keyword missing from home page: '{}'",
                keyword
            )));
        }
    }

    for indicator in &config.error_indicators {
        if body.contains(&indicator.to_lowercase()) {
            errors.push(Finding::error(format!(
                "error indicator present on home page: '{}'",
                indicator
            )));
        }
    }
}

fn check_security_headers(home: &PageSnapshot, warnings: &mut Vec<Finding>) {
    if !home.result.success {
        return;
    }
    for header in [
        "strict-transport-security",
        "x-frame-options",
        "x-content-type-options",
    ] {
        if home.header(header).is_none() {
            warnings.push(Finding::warning(format!(
                "security header missing: {}",
                header
            )));
        }
    }
}

fn check_latency(home: &PageSnapshot, errors: &mut Vec<Finding>, warnings: &mut Vec<Finding>) {
    if !home.result.success {
        return;
    }
    let latency = home.result.latency_ms;
    if latency > LATENCY_ERROR_MS {
        errors.push(Finding::error(format!(
            "home page latency {}ms exceeds {}ms",
            latency, LATENCY_ERROR_MS
        )));
    } else if latency >= LATENCY_WARN_MS {
        warnings.push(Finding::warning(format!(
            "home page latency {}ms is degraded",
            latency
        )));
    }
}
