//! Configuration for DVR.
//!
//! Every component receives an explicit config struct; there are no
//! process-wide mutable globals. Settings come from an optional TOML
//! file overridden by `DVR_*` environment variables, with malformed
//! values collected and reported at startup rather than silently
//! defaulted.

pub mod env;

pub use env::EnvParser;

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level DVR configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DvrConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub canary: CanaryConfig,
    #[serde(default)]
    pub health: HealthCheckConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub verifier: VerifierConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Endpoints of the deployed site and its collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Base URL of the deployed application.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Metrics backend endpoint.
    #[serde(default = "default_metrics_url")]
    pub metrics_url: String,
    /// Traffic router control endpoint.
    #[serde(default = "default_router_url")]
    pub router_url: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            metrics_url: default_metrics_url(),
            router_url: default_router_url(),
        }
    }
}

/// SLI thresholds driving the rollback decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// Error rate ceiling, percent.
    #[serde(default = "default_error_rate")]
    pub error_rate_pct: f64,
    /// p95 latency ceiling, milliseconds.
    #[serde(default = "default_p95_ms")]
    pub p95_latency_ms: f64,
    /// Conversion rate floor, percent.
    #[serde(default = "default_conversion_floor")]
    pub conversion_floor_pct: f64,
    /// Query window in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            error_rate_pct: default_error_rate(),
            p95_latency_ms: default_p95_ms(),
            conversion_floor_pct: default_conversion_floor(),
            window_secs: default_window_secs(),
        }
    }
}

impl Thresholds {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Canary rollback behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanaryConfig {
    /// Settle wait after each traffic shift, seconds.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    /// Tighter error-rate ceiling applied at each canary step, percent.
    #[serde(default = "default_canary_error_rate")]
    pub error_rate_pct: f64,
    /// Query window for canary-gate checks, seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for CanaryConfig {
    fn default() -> Self {
        Self {
            settle_secs: default_settle_secs(),
            error_rate_pct: default_canary_error_rate(),
            window_secs: default_window_secs(),
        }
    }
}

impl CanaryConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    /// Thresholds used at canary gates: tighter error rate, production
    /// latency ceiling, conversion floor disabled (too noisy over a
    /// single settle window).
    pub fn gate_thresholds(&self, production: &Thresholds) -> Thresholds {
        Thresholds {
            error_rate_pct: self.error_rate_pct,
            p95_latency_ms: production.p95_latency_ms,
            conversion_floor_pct: 0.0,
            window_secs: self.window_secs,
        }
    }
}

/// Post-emergency health verification retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Number of verification attempts before giving up.
    #[serde(default = "default_health_retries")]
    pub retries: u32,
    /// Wait between attempts, seconds.
    #[serde(default = "default_health_interval_secs")]
    pub interval_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            retries: default_health_retries(),
            interval_secs: default_health_interval_secs(),
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Notification channel targets. Both channels are optional and
/// best-effort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Chat webhook URL (JSON payload).
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Email recipient.
    #[serde(default)]
    pub email_to: Option<String>,
    /// Local mailer command invoked as `<mailer> -s <subject> <to>`.
    #[serde(default = "default_mailer")]
    pub mailer_command: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            email_to: None,
            mailer_command: default_mailer(),
        }
    }
}

/// Pre-deployment validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Runtime binary checked for the minimum version.
    #[serde(default = "default_runtime")]
    pub runtime_command: String,
    /// Minimum runtime major version.
    #[serde(default = "default_runtime_major")]
    pub min_runtime_major: u32,
    /// Application manifest scanned for dependency placement.
    #[serde(default = "default_manifest")]
    pub manifest: String,
    /// Type-check configuration file.
    #[serde(default = "default_typecheck_config")]
    pub typecheck_config: String,
    /// Build command executed during the build-matrix tier.
    #[serde(default = "default_build_command")]
    pub build_command: String,
    /// Files that must exist for the build to be deployable.
    #[serde(default = "default_critical_files")]
    pub critical_files: Vec<String>,
    /// Build configuration file scanned for risky patterns.
    #[serde(default = "default_build_config")]
    pub build_config: String,
    /// Packages that must not live under devDependencies.
    #[serde(default = "default_build_critical_packages")]
    pub build_critical_packages: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            runtime_command: default_runtime(),
            min_runtime_major: default_runtime_major(),
            manifest: default_manifest(),
            typecheck_config: default_typecheck_config(),
            build_command: default_build_command(),
            critical_files: default_critical_files(),
            build_config: default_build_config(),
            build_critical_packages: default_build_critical_packages(),
        }
    }
}

/// Post-deployment verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Per-probe timeout, seconds.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Page targets probed on every run, relative to the base URL.
    #[serde(default = "default_page_targets")]
    pub page_targets: Vec<String>,
    /// Static assets probed with warning-only severity.
    #[serde(default = "default_asset_targets")]
    pub asset_targets: Vec<String>,
    /// Keywords expected on the home page (at least half must appear).
    #[serde(default = "default_expected_keywords")]
    pub expected_keywords: Vec<String>,
    /// Strings whose presence on the home page always fails the run.
    #[serde(default = "default_error_indicators")]
    pub error_indicators: Vec<String>,
    /// Maximum concurrent probes.
    #[serde(default = "default_probe_concurrency")]
    pub probe_concurrency: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout_secs(),
            page_targets: default_page_targets(),
            asset_targets: default_asset_targets(),
            expected_keywords: default_expected_keywords(),
            error_indicators: default_error_indicators(),
            probe_concurrency: default_probe_concurrency(),
        }
    }
}

impl VerifierConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Database rollback commands. `{tag}` and `{snapshot}` placeholders are
/// substituted before execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_backup_command")]
    pub backup_command: String,
    #[serde(default = "default_restore_command")]
    pub restore_command: String,
    #[serde(default = "default_integrity_command")]
    pub integrity_command: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backup_command: default_backup_command(),
            restore_command: default_restore_command(),
            integrity_command: default_integrity_command(),
        }
    }
}

impl DvrConfig {
    /// Load configuration from `path` (or the default location when
    /// `None`), then apply environment overrides. Returns the config and
    /// any collected environment errors; a missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<(Self, Vec<ConfigError>), ConfigError> {
        let mut config = match path.map(PathBuf::from).or_else(Self::default_path) {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(&p).map_err(|source| ConfigError::Read {
                    path: p.display().to_string(),
                    source,
                })?;
                toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                    path: p.display().to_string(),
                    source,
                })?
            }
            _ => Self::default(),
        };
        let errors = config.apply_env();
        Ok((config, errors))
    }

    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("dvr").join("config.toml"))
    }

    /// Apply `DVR_*` environment overrides, returning collected errors.
    pub fn apply_env(&mut self) -> Vec<ConfigError> {
        let mut parser = EnvParser::new();

        parser.get_string("BASE_URL", &mut self.general.base_url);
        parser.get_string("METRICS_URL", &mut self.general.metrics_url);
        parser.get_string("ROUTER_URL", &mut self.general.router_url);

        parser.get_f64_range(
            "ERROR_RATE_THRESHOLD",
            &mut self.thresholds.error_rate_pct,
            0.0,
            100.0,
        );
        parser.get_f64_range(
            "P95_LATENCY_MS",
            &mut self.thresholds.p95_latency_ms,
            1.0,
            600_000.0,
        );
        parser.get_f64_range(
            "CONVERSION_FLOOR",
            &mut self.thresholds.conversion_floor_pct,
            0.0,
            100.0,
        );
        parser.get_duration_secs("SLI_WINDOW", &mut self.thresholds.window_secs);

        parser.get_duration_secs("CANARY_SETTLE", &mut self.canary.settle_secs);
        parser.get_f64_range(
            "CANARY_ERROR_RATE_THRESHOLD",
            &mut self.canary.error_rate_pct,
            0.0,
            100.0,
        );

        parser.get_u32_range("HEALTH_RETRIES", &mut self.health.retries, 1, 100);
        parser.get_duration_secs("HEALTH_RETRY_INTERVAL", &mut self.health.interval_secs);

        parser.get_opt_string("WEBHOOK_URL", &mut self.notify.webhook_url);
        parser.get_opt_string("EMAIL_TO", &mut self.notify.email_to);

        parser.get_duration_secs("PROBE_TIMEOUT", &mut self.verifier.probe_timeout_secs);

        parser.take_errors()
    }
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_metrics_url() -> String {
    "http://localhost:9090/api/v1/metrics".to_string()
}

fn default_router_url() -> String {
    "http://localhost:8080/api/traffic".to_string()
}

fn default_error_rate() -> f64 {
    5.0
}

fn default_p95_ms() -> f64 {
    2000.0
}

fn default_conversion_floor() -> f64 {
    2.0
}

fn default_window_secs() -> u64 {
    300
}

fn default_settle_secs() -> u64 {
    30
}

fn default_canary_error_rate() -> f64 {
    3.0
}

fn default_health_retries() -> u32 {
    10
}

fn default_health_interval_secs() -> u64 {
    10
}

fn default_mailer() -> String {
    "mail".to_string()
}

fn default_runtime() -> String {
    "node".to_string()
}

fn default_runtime_major() -> u32 {
    18
}

fn default_manifest() -> String {
    "package.json".to_string()
}

fn default_typecheck_config() -> String {
    "tsconfig.json".to_string()
}

fn default_build_command() -> String {
    "npm run build".to_string()
}

fn default_critical_files() -> Vec<String> {
    vec![
        "package.json".to_string(),
        "next.config.js".to_string(),
        "middleware.ts".to_string(),
    ]
}

fn default_build_config() -> String {
    "next.config.js".to_string()
}

fn default_build_critical_packages() -> Vec<String> {
    vec!["typescript".to_string(), "module-alias".to_string()]
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_page_targets() -> Vec<String> {
    vec![
        "/".to_string(),
        "/pricing".to_string(),
        "/login".to_string(),
        "/api/health".to_string(),
    ]
}

fn default_asset_targets() -> Vec<String> {
    vec!["/favicon.ico".to_string(), "/robots.txt".to_string()]
}

fn default_expected_keywords() -> Vec<String> {
    vec![
        "dashboard".to_string(),
        "analytics".to_string(),
        "pricing".to_string(),
        "sign in".to_string(),
    ]
}

fn default_error_indicators() -> Vec<String> {
    vec![
        "internal server error".to_string(),
        "application error".to_string(),
        "econnrefused".to_string(),
        "cannot read propert".to_string(),
    ]
}

fn default_probe_concurrency() -> usize {
    4
}

fn default_backup_command() -> String {
    "scripts/db-backup.sh {tag}".to_string()
}

fn default_restore_command() -> String {
    "scripts/db-restore.sh {snapshot}".to_string()
}

fn default_integrity_command() -> String {
    "scripts/db-verify.sh".to_string()
}
