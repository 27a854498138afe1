//! Pre-deployment readiness gating.
//!
//! Runs ordered verification tiers against the build and environment and
//! produces a readiness verdict. Error findings block the deploy;
//! warnings are advisory. The local build is the only tier allowed to
//! fail fatally, and even that is reported as a finding, never thrown.

use crate::verify::join_url;
use dvr_common::config::{ValidatorConfig, VerifierConfig};
use dvr_common::types::{Finding, Severity};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// One ordered gate in pre-deploy validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationTier {
    pub name: String,
    pub ordinal: u32,
    pub findings: Vec<Finding>,
}

impl VerificationTier {
    fn new(name: &str, ordinal: u32) -> Self {
        Self {
            name: name.to_string(),
            ordinal,
            findings: Vec::new(),
        }
    }

    fn push(&mut self, finding: Finding) {
        self.findings.push(finding);
    }
}

/// Aggregate pre-deploy verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Tiers in execution order.
    pub tiers: Vec<VerificationTier>,
    /// No error-severity finding in any tier.
    pub is_ready: bool,
    /// Endpoint list assembled for post-deployment verification.
    pub endpoints: Vec<String>,
}

impl ValidationReport {
    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.tiers
            .iter()
            .flat_map(|t| &t.findings)
            .filter(|f| f.severity == severity)
            .count()
    }
}

/// Runs the ordered validation tiers.
pub struct PreDeploymentValidator {
    config: ValidatorConfig,
    verifier: VerifierConfig,
    base_url: String,
}

impl PreDeploymentValidator {
    pub fn new(config: ValidatorConfig, verifier: VerifierConfig, base_url: impl Into<String>) -> Self {
        Self {
            config,
            verifier,
            base_url: base_url.into(),
        }
    }

    /// Run all tiers strictly in order and aggregate the verdict.
    pub async fn validate(&self, project_root: &Path) -> ValidationReport {
        let tiers = vec![
            self.runtime_tier(project_root).await,
            self.build_tier(project_root).await,
            self.pipeline_tier(project_root).await,
            self.target_tier(),
        ];

        let is_ready = tiers
            .iter()
            .flat_map(|t| &t.findings)
            .all(|f| f.severity != Severity::Error);
        let endpoints = self.endpoints();

        info!(
            "pre-deployment validation: {} -> {}",
            project_root.display(),
            if is_ready { "ready" } else { "not ready" }
        );
        ValidationReport {
            tiers,
            is_ready,
            endpoints,
        }
    }

    /// Tier 1: runtime/environment replication.
    async fn runtime_tier(&self, project_root: &Path) -> VerificationTier {
        let mut tier = VerificationTier::new("runtime replication", 1);

        match run_command(&self.config.runtime_command, &["--version"], project_root).await {
            Ok((0, stdout, _)) => match parse_major(&stdout) {
                Some(major) if major >= self.config.min_runtime_major => {
                    debug!("runtime version {} satisfies minimum", stdout.trim());
                }
                Some(major) => tier.push(Finding::error(format!(
                    "runtime major version {} is below the minimum {}",
                    major, self.config.min_runtime_major
                ))),
                None => tier.push(Finding::warning(format!(
                    "could not parse runtime version from '{}'",
                    stdout.trim()
                ))),
            },
            Ok((code, _, stderr)) => tier.push(Finding::error(format!(
                "runtime version check exited with {}: {}",
                code,
                stderr.trim()
            ))),
            Err(e) => tier.push(Finding::error(format!(
                "runtime '{}' not available: {}",
                self.config.runtime_command, e
            ))),
        }

        self.check_manifest(project_root, &mut tier);

        let typecheck = project_root.join(&self.config.typecheck_config);
        if !typecheck.exists() {
            tier.push(
                Finding::warning("no type-check configuration found")
                    .with_file(&self.config.typecheck_config),
            );
        }

        tier
    }

    fn check_manifest(&self, project_root: &Path, tier: &mut VerificationTier) {
        let path = project_root.join(&self.config.manifest);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => {
                tier.push(
                    Finding::error("application manifest missing").with_file(&self.config.manifest),
                );
                return;
            }
        };
        let manifest: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                tier.push(
                    Finding::error(format!("manifest is not valid JSON: {}", e))
                        .with_file(&self.config.manifest),
                );
                return;
            }
        };

        let in_section = |section: &str, package: &str| {
            manifest
                .get(section)
                .and_then(|s| s.get(package))
                .is_some()
        };
        for package in &self.config.build_critical_packages {
            if in_section("devDependencies", package) && !in_section("dependencies", package) {
                tier.push(
                    Finding::error(format!(
                        "build-critical package '{}' is declared under devDependencies",
                        package
                    ))
                    .with_file(&self.config.manifest),
                );
            }
        }
    }

    /// Tier 2: build matrix.
    async fn build_tier(&self, project_root: &Path) -> VerificationTier {
        let mut tier = VerificationTier::new("build matrix", 2);

        match run_shell(&self.config.build_command, project_root).await {
            Ok((0, _, _)) => debug!("build succeeded: {}", self.config.build_command),
            Ok((code, _, stderr)) => tier.push(Finding::error(format!(
                "build '{}' exited with {}: {}",
                self.config.build_command,
                code,
                tail(&stderr, 400)
            ))),
            Err(e) => tier.push(Finding::error(format!(
                "build tool invocation failed: {}",
                e
            ))),
        }

        for file in &self.config.critical_files {
            if !project_root.join(file).exists() {
                tier.push(Finding::error("critical file missing").with_file(file));
            }
        }

        self.scan_build_config(project_root, &mut tier);
        self.scan_env_files(project_root, &mut tier);

        tier
    }

    fn scan_build_config(&self, project_root: &Path, tier: &mut VerificationTier) {
        let path = project_root.join(&self.config.build_config);
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return; // absence already covered by the critical-file check
        };

        // Known risky patterns in the build configuration.
        let alias = Regex::new(r"alias").unwrap();
        let ignore_type_errors = Regex::new(r"ignoreBuildErrors\s*:\s*true").unwrap();
        let ignore_lint = Regex::new(r"ignoreDuringBuilds\s*:\s*true").unwrap();

        if !alias.is_match(&raw) {
            tier.push(
                Finding::warning("build config has no module alias configuration")
                    .with_file(&self.config.build_config),
            );
        }
        if ignore_type_errors.is_match(&raw) {
            tier.push(
                Finding::warning("build config ignores type errors")
                    .with_file(&self.config.build_config),
            );
        }
        if ignore_lint.is_match(&raw) {
            tier.push(
                Finding::warning("build config ignores lint errors during builds")
                    .with_file(&self.config.build_config),
            );
        }
    }

    fn scan_env_files(&self, project_root: &Path, tier: &mut VerificationTier) {
        let mut declared = 0usize;
        let mut files = 0usize;
        if let Ok(entries) = std::fs::read_dir(project_root) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                if !name.starts_with(".env") {
                    continue;
                }
                files += 1;
                if let Ok(raw) = std::fs::read_to_string(entry.path()) {
                    declared += raw
                        .lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty() && !l.starts_with('#') && l.contains('='))
                        .count();
                }
            }
        }
        if files == 0 {
            tier.push(Finding::warning("no environment files found"));
        } else {
            debug!("{} environment variables declared across {} files", declared, files);
        }
    }

    /// Tier 3: pipeline sync.
    async fn pipeline_tier(&self, project_root: &Path) -> VerificationTier {
        let mut tier = VerificationTier::new("pipeline sync", 3);

        match run_command("git", &["status", "--porcelain"], project_root).await {
            Ok((0, stdout, _)) => {
                let dirty = stdout.lines().filter(|l| !l.trim().is_empty()).count();
                if dirty > 0 {
                    tier.push(Finding::warning(format!(
                        "working tree has {} uncommitted change(s)",
                        dirty
                    )));
                }
            }
            Ok((_, _, stderr)) => tier.push(Finding::warning(format!(
                "git status unavailable: {}",
                stderr.trim()
            ))),
            Err(e) => tier.push(Finding::warning(format!("git not available: {}", e))),
        }

        match run_command(
            "git",
            &["rev-list", "--left-right", "--count", "@{upstream}...HEAD"],
            project_root,
        )
        .await
        {
            Ok((0, stdout, _)) => match parse_divergence(&stdout) {
                Some((0, 0)) => {}
                Some((behind, ahead)) => {
                    if ahead > 0 {
                        tier.push(Finding::warning(format!(
                            "local is ahead of remote by {} commit(s) (unpushed)",
                            ahead
                        )));
                    }
                    if behind > 0 {
                        tier.push(Finding::warning(format!(
                            "local is behind remote by {} commit(s)",
                            behind
                        )));
                    }
                }
                None => tier.push(Finding::warning(format!(
                    "could not parse git divergence from '{}'",
                    stdout.trim()
                ))),
            },
            Ok((_, _, stderr)) => tier.push(Finding::warning(format!(
                "git upstream comparison unavailable: {}",
                stderr.trim()
            ))),
            Err(e) => tier.push(Finding::warning(format!("git not available: {}", e))),
        }

        tier
    }

    /// Tier 4: live-target preparation. No network calls.
    fn target_tier(&self) -> VerificationTier {
        let mut tier = VerificationTier::new("live-target preparation", 4);
        if self.base_url.trim().is_empty() {
            tier.push(Finding::error("no base URL configured for verification"));
        } else if !self.base_url.starts_with("https://") {
            tier.push(Finding::warning(format!(
                "base URL {} is not TLS; post-deployment verification will fail it",
                self.base_url
            )));
        }
        tier
    }

    fn endpoints(&self) -> Vec<String> {
        self.verifier
            .page_targets
            .iter()
            .chain(self.verifier.asset_targets.iter())
            .map(|p| join_url(&self.base_url, p))
            .collect()
    }
}

/// Parse the major component of a version string like `v20.11.1`.
fn parse_major(raw: &str) -> Option<u32> {
    let trimmed = raw.trim().trim_start_matches('v');
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Parse `git rev-list --left-right --count` output: "behind<TAB>ahead".
fn parse_divergence(raw: &str) -> Option<(u32, u32)> {
    let mut parts = raw.split_whitespace();
    let behind = parts.next()?.parse().ok()?;
    let ahead = parts.next()?.parse().ok()?;
    Some((behind, ahead))
}

fn tail(raw: &str, max: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.len() <= max {
        trimmed.to_string()
    } else {
        let cut = trimmed.len() - max;
        let mut start = cut;
        while !trimmed.is_char_boundary(start) {
            start += 1;
        }
        format!("...{}", &trimmed[start..])
    }
}

async fn run_command(
    program: &str,
    args: &[&str],
    cwd: &Path,
) -> std::io::Result<(i32, String, String)> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .current_dir(cwd)
        .output()
        .await?;
    Ok((
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    ))
}

async fn run_shell(command: &str, cwd: &Path) -> std::io::Result<(i32, String, String)> {
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .output()
        .await?;
    Ok((
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    fn validator(config: ValidatorConfig) -> PreDeploymentValidator {
        PreDeploymentValidator::new(config, VerifierConfig::default(), "https://x.dev")
    }

    /// A config whose external commands always succeed, for tiers under test.
    fn passing_config() -> ValidatorConfig {
        ValidatorConfig {
            runtime_command: "true".to_string(),
            build_command: "true".to_string(),
            critical_files: vec!["package.json".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn parse_major_handles_v_prefix_and_plain() {
        assert_eq!(parse_major("v20.11.1\n"), Some(20));
        assert_eq!(parse_major("18.0"), Some(18));
        assert_eq!(parse_major("--version"), None);
    }

    #[test]
    fn parse_divergence_reads_behind_and_ahead() {
        assert_eq!(parse_divergence("2\t3\n"), Some((2, 3)));
        assert_eq!(parse_divergence("0 0"), Some((0, 0)));
        assert_eq!(parse_divergence("garbage"), None);
    }

    #[tokio::test]
    async fn missing_runtime_is_an_error() {
        let dir = TempDir::new().unwrap();
        let config = ValidatorConfig {
            runtime_command: "/nonexistent/dvr-runtime".to_string(),
            ..Default::default()
        };
        let tier = validator(config).runtime_tier(dir.path()).await;
        assert!(
            tier.findings
                .iter()
                .any(|f| f.severity == Severity::Error && f.message.contains("not available"))
        );
    }

    #[tokio::test]
    async fn missing_manifest_is_an_error_and_missing_tsconfig_a_warning() {
        let dir = TempDir::new().unwrap();
        let tier = validator(passing_config()).runtime_tier(dir.path()).await;
        assert!(
            tier.findings
                .iter()
                .any(|f| f.severity == Severity::Error && f.message.contains("manifest"))
        );
        assert!(
            tier.findings
                .iter()
                .any(|f| f.severity == Severity::Warning && f.message.contains("type-check"))
        );
    }

    #[tokio::test]
    async fn build_critical_package_in_dev_dependencies_is_an_error() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "package.json",
            r#"{"dependencies": {}, "devDependencies": {"typescript": "^5.0.0"}}"#,
        );
        write(dir.path(), "tsconfig.json", "{}");
        let tier = validator(passing_config()).runtime_tier(dir.path()).await;
        assert!(
            tier.findings
                .iter()
                .any(|f| f.message.contains("typescript") && f.severity == Severity::Error)
        );
    }

    #[tokio::test]
    async fn failing_build_is_one_error_finding_not_a_crash() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "package.json", "{}");
        let config = ValidatorConfig {
            build_command: "false".to_string(),
            critical_files: vec!["package.json".to_string()],
            ..Default::default()
        };
        let tier = validator(config).build_tier(dir.path()).await;
        let build_errors: Vec<_> = tier
            .findings
            .iter()
            .filter(|f| f.severity == Severity::Error && f.message.contains("build"))
            .collect();
        assert_eq!(build_errors.len(), 1);
    }

    #[tokio::test]
    async fn missing_critical_file_is_an_error_with_file() {
        let dir = TempDir::new().unwrap();
        let config = ValidatorConfig {
            build_command: "true".to_string(),
            critical_files: vec!["next.config.js".to_string()],
            ..Default::default()
        };
        let tier = validator(config).build_tier(dir.path()).await;
        let finding = tier
            .findings
            .iter()
            .find(|f| f.message.contains("critical file"))
            .unwrap();
        assert_eq!(finding.severity, Severity::Error);
        assert_eq!(
            finding.file.as_deref(),
            Some(Path::new("next.config.js"))
        );
    }

    #[tokio::test]
    async fn risky_build_config_patterns_warn() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "package.json", "{}");
        write(
            dir.path(),
            "next.config.js",
            "module.exports = { typescript: { ignoreBuildErrors: true } }",
        );
        write(dir.path(), ".env.production", "API_URL=https://x\nSECRET=y\n# comment\n");
        let config = ValidatorConfig {
            build_command: "true".to_string(),
            critical_files: vec![],
            ..Default::default()
        };
        let tier = validator(config).build_tier(dir.path()).await;
        assert!(
            tier.findings
                .iter()
                .any(|f| f.message.contains("module alias") && f.severity == Severity::Warning)
        );
        assert!(
            tier.findings
                .iter()
                .any(|f| f.message.contains("type errors") && f.severity == Severity::Warning)
        );
        // Env files were found, so no missing-env warning.
        assert!(!tier.findings.iter().any(|f| f.message.contains("environment files")));
    }

    #[tokio::test]
    async fn absent_env_files_warn() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "package.json", "{}");
        let config = ValidatorConfig {
            build_command: "true".to_string(),
            critical_files: vec![],
            ..Default::default()
        };
        let tier = validator(config).build_tier(dir.path()).await;
        assert!(
            tier.findings
                .iter()
                .any(|f| f.message.contains("no environment files"))
        );
    }

    #[tokio::test]
    async fn pipeline_tier_outside_a_repo_warns_only() {
        let dir = TempDir::new().unwrap();
        let tier = validator(passing_config()).pipeline_tier(dir.path()).await;
        assert!(!tier.findings.is_empty());
        assert!(tier.findings.iter().all(|f| f.severity == Severity::Warning));
    }

    #[tokio::test]
    async fn target_tier_assembles_endpoints_without_network() {
        let v = validator(passing_config());
        let tier = v.target_tier();
        assert!(tier.findings.is_empty());
        let endpoints = v.endpoints();
        assert!(endpoints.contains(&"https://x.dev/login".to_string()));
        assert!(endpoints.contains(&"https://x.dev/favicon.ico".to_string()));
        assert_eq!(endpoints.len(), 6);
    }

    #[tokio::test]
    async fn report_readiness_requires_zero_errors() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "package.json", r#"{"dependencies": {"typescript": "^5"}}"#);
        write(dir.path(), "tsconfig.json", "{}");
        write(dir.path(), "next.config.js", "module.exports = { alias: {} }");
        write(dir.path(), ".env", "A=1\n");
        write(dir.path(), "middleware.ts", "");
        let config = ValidatorConfig {
            runtime_command: "true".to_string(),
            build_command: "true".to_string(),
            critical_files: vec!["package.json".to_string(), "next.config.js".to_string()],
            ..Default::default()
        };
        let report = validator(config).validate(dir.path()).await;
        // "true --version" exits 0 with empty output: unparseable version
        // is only a warning, git divergence warnings are advisory.
        assert_eq!(report.error_count(), 0);
        assert!(report.is_ready);
        assert_eq!(report.tiers.len(), 4);
        assert!(report.warning_count() >= 1);
    }
}
