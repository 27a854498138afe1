//! DVR - Deployment Verification & Rollback
//!
//! CLI orchestrator that gates deploys, verifies live sites, evaluates
//! SLIs, and executes tiered rollback flows.

#![forbid(unsafe_code)]

mod decision;
mod history;
mod notify;
mod probe;
mod report;
mod rollback;
mod sli;
#[cfg(test)]
mod testing;
mod traffic;
mod validate;
mod verify;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use decision::DecisionEngine;
use dvr_common::DvrConfig;
use dvr_common::types::{DeploymentId, RollbackOutcome, Severity, SliSnapshot};
use history::{RollbackHistory, RollbackRecord};
use notify::NotificationDispatcher;
use report::ReportSink;
use rollback::database::{CommandBackupStore, DatabaseRollbackCoordinator};
use rollback::{
    ExecutionState, InteractiveGate, OrchestratorConfig, PresetGate, RollbackExecution,
    RollbackMode, RollbackOrchestrator, RollbackRun,
};
use sli::HttpSliClient;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use traffic::HttpTrafficRouter;
use validate::{PreDeploymentValidator, ValidationReport};
use verify::{PostDeploymentVerifier, VerificationRun};

/// Timeout for router and metrics-backend calls.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "dvr")]
#[command(author, version, about = "Deployment verification and rollback orchestration")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run pre-deployment readiness validation
    Validate {
        /// Project root to validate
        #[arg(long, default_value = ".")]
        project_root: PathBuf,
    },
    /// Verify a live deployment
    Verify {
        /// Base URL to verify (defaults to the configured base URL)
        #[arg(long)]
        url: Option<String>,
    },
    /// Evaluate SLIs and print the rollback recommendation
    Check {
        /// Keep polling instead of evaluating once
        #[arg(long)]
        watch: bool,
        /// Seconds between polls in watch mode
        #[arg(long, default_value = "60")]
        interval: u64,
    },
    /// Execute a rollback
    Rollback {
        /// Rollback mode
        #[arg(long, value_enum)]
        mode: ModeArg,
        /// Target deployment id
        #[arg(long)]
        target: String,
        /// Canary ceiling percentage
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
        percentage: Option<u8>,
        /// Also roll the database back (emergency mode)
        #[arg(long)]
        rollback_database: bool,
        /// Skip interactive confirmation (headless/CI)
        #[arg(long)]
        yes: bool,
    },
    /// List recorded rollback executions
    History {
        /// Maximum entries to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Manual,
    Canary,
    Automated,
    Emergency,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let (config, env_errors) = DvrConfig::load(cli.config.as_deref())?;
    if !env_errors.is_empty() {
        for error in &env_errors {
            eprintln!("{} {}", "config error:".red().bold(), error);
        }
        std::process::exit(2);
    }

    let code = match cli.command {
        Command::Validate { project_root } => run_validate(&config, &project_root).await?,
        Command::Verify { url } => run_verify(&config, url).await?,
        Command::Check { watch, interval } => run_check(&config, watch, interval).await,
        Command::Rollback {
            mode,
            target,
            percentage,
            rollback_database,
            yes,
        } => run_rollback(&config, mode, target, percentage, rollback_database, yes).await?,
        Command::History { limit } => run_history(limit)?,
    };
    std::process::exit(code);
}

async fn run_validate(config: &DvrConfig, project_root: &std::path::Path) -> Result<i32> {
    let validator = PreDeploymentValidator::new(
        config.validator.clone(),
        config.verifier.clone(),
        config.general.base_url.clone(),
    );
    let report = validator.validate(project_root).await;
    print_validation_report(&report);
    Ok(if report.is_ready { 0 } else { 1 })
}

async fn run_verify(config: &DvrConfig, url: Option<String>) -> Result<i32> {
    let base_url = url.unwrap_or_else(|| config.general.base_url.clone());
    let verifier = PostDeploymentVerifier::new(config.verifier.clone(), base_url);
    let run = verifier.verify().await;
    print_verification_run(&run);

    match ReportSink::new().and_then(|sink| sink.persist(&run)) {
        Ok(path) => info!("report written to {}", path.display()),
        Err(e) => warn!("could not persist verification report: {}", e),
    }

    Ok(if run.deployment_success { 0 } else { 1 })
}

async fn run_check(config: &DvrConfig, watch_mode: bool, interval_secs: u64) -> i32 {
    let backend = HttpSliClient::new(config.general.metrics_url.clone(), CONTROL_TIMEOUT);
    let engine = DecisionEngine::new(backend);

    if !watch_mode {
        return check_once(&engine, config).await;
    }

    // Continuous polling. Ctrl-C stops the loop cleanly between cycles;
    // an in-flight evaluation always completes and is printed.
    let (stop_tx, mut stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(true);
        }
    });

    let interval = Duration::from_secs(interval_secs.max(1));
    let mut last = 0;
    loop {
        last = check_once(&engine, config).await;
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = stop_rx.changed() => {
                if changed.is_ok() && *stop_rx.borrow() {
                    info!("stopping SLI monitoring");
                    break;
                }
                // Signal handler gone; nothing to wait for between polls.
                tokio::time::sleep(interval).await;
            }
        }
    }
    last
}

async fn check_once(engine: &DecisionEngine<HttpSliClient>, config: &DvrConfig) -> i32 {
    let decision = engine.evaluate(&config.thresholds).await;

    println!("{} {}", "SLI check".bold(), decision.evaluated_at.format("%H:%M:%S"));
    for snapshot in &decision.observed {
        print_snapshot(snapshot);
    }
    if decision.recommend {
        println!(
            "{} breached: {}",
            "rollback recommended".red().bold(),
            decision.breached_names().join(", ")
        );
        1
    } else {
        println!("{}", "all indicators within thresholds".green());
        0
    }
}

async fn run_rollback(
    config: &DvrConfig,
    mode: ModeArg,
    target: String,
    percentage: Option<u8>,
    rollback_database: bool,
    yes: bool,
) -> Result<i32> {
    let mode = match mode {
        ModeArg::Manual => RollbackMode::Manual,
        ModeArg::Canary => RollbackMode::Canary {
            ceiling: percentage.unwrap_or(100),
        },
        ModeArg::Automated => RollbackMode::Automated,
        ModeArg::Emergency => RollbackMode::Emergency { rollback_database },
    };
    let target = DeploymentId::new(target);

    // Ctrl-C stops step progression, leaving traffic at the last
    // confirmed-good split.
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping rollback progression");
            let _ = stop_tx.send(true);
        }
    });

    let orchestrator = RollbackOrchestrator::new(
        HttpTrafficRouter::new(config.general.router_url.clone(), CONTROL_TIMEOUT),
        DecisionEngine::new(HttpSliClient::new(
            config.general.metrics_url.clone(),
            CONTROL_TIMEOUT,
        )),
        DatabaseRollbackCoordinator::new(CommandBackupStore::new(config.database.clone())),
        NotificationDispatcher::new(config.notify.clone()),
        PostDeploymentVerifier::new(config.verifier.clone(), config.general.base_url.clone()),
        OrchestratorConfig {
            thresholds: config.thresholds.clone(),
            canary: config.canary.clone(),
            health: config.health.clone(),
        },
        stop_rx,
    );

    let history = RollbackHistory::new()?;
    let recent = history.recent(10)?;

    let run = if yes {
        orchestrator
            .run(mode, target, &PresetGate::new(true), &recent)
            .await?
    } else {
        orchestrator
            .run(mode, target, &InteractiveGate, &recent)
            .await?
    };

    match run {
        RollbackRun::Executed(exec) => {
            if let Err(e) = record_execution(&history, &exec) {
                warn!("could not record rollback history: {}", e);
            }
            print_execution(&exec);
            Ok(match exec.outcome {
                Some(RollbackOutcome::Success) => 0,
                _ => 1,
            })
        }
        RollbackRun::NotRecommended(decision) => {
            println!("{}", "no SLI breach; nothing to roll back".green());
            for snapshot in &decision.observed {
                print_snapshot(snapshot);
            }
            Ok(0)
        }
        RollbackRun::Declined(decision) => {
            println!(
                "{} breached: {}",
                "rollback declined at confirmation gate".yellow().bold(),
                decision.breached_names().join(", ")
            );
            Ok(1)
        }
    }
}

fn run_history(limit: usize) -> Result<i32> {
    let history = RollbackHistory::new()?;
    let entries = history.recent(limit)?;
    if entries.is_empty() {
        println!("no rollback executions recorded");
        return Ok(0);
    }
    for entry in entries {
        println!(
            "{}  {:9}  {:20}  {}  steps {:?}",
            entry.started_at.format("%Y-%m-%d %H:%M:%S"),
            entry.mode,
            entry.target.to_string(),
            paint_outcome(entry.outcome),
            entry.steps_applied,
        );
    }
    Ok(0)
}

fn record_execution(history: &RollbackHistory, exec: &RollbackExecution) -> Result<()> {
    history.record(&RollbackRecord {
        id: exec.id,
        mode: exec.mode.to_string(),
        target: exec.target.clone(),
        outcome: exec.outcome.unwrap_or(RollbackOutcome::Aborted),
        steps_applied: exec.applied_steps.clone(),
        started_at: exec.started_at,
        completed_at: exec.completed_at,
    })
}

fn print_validation_report(report: &ValidationReport) {
    for tier in &report.tiers {
        println!("{} {}", format!("tier {}:", tier.ordinal).bold(), tier.name);
        if tier.findings.is_empty() {
            println!("  {}", "ok".green());
        }
        for finding in &tier.findings {
            let label = match finding.severity {
                Severity::Error => "error".red().bold(),
                Severity::Warning => "warning".yellow(),
            };
            match &finding.file {
                Some(file) => println!("  {} {} ({})", label, finding.message, file.display()),
                None => println!("  {} {}", label, finding.message),
            }
        }
    }
    println!(
        "\n{} error(s), {} warning(s) -> {}",
        report.error_count(),
        report.warning_count(),
        if report.is_ready {
            "READY".green().bold()
        } else {
            "NOT READY".red().bold()
        }
    );
    if report.is_ready {
        println!("verification targets: {}", report.endpoints.join(", "));
    }
}

fn print_verification_run(run: &VerificationRun) {
    println!("{} {}", "verification of".bold(), run.base_url);
    for probe in &run.probes {
        let status = match (probe.success, probe.status_code) {
            (true, Some(code)) => format!("{}", code).green(),
            (false, Some(code)) => format!("{}", code).red(),
            (_, None) => "ERR".red().bold(),
        };
        println!("  {:>4}  {}  {}ms", status, probe.url, probe.latency_ms);
    }
    for finding in &run.errors {
        println!("  {} {}", "error".red().bold(), finding.message);
    }
    for finding in &run.warnings {
        println!("  {} {}", "warning".yellow(), finding.message);
    }
    let passed = run.probes.iter().filter(|p| p.success).count();
    println!(
        "\n{}/{} probes passed ({:.1}%) -> {}",
        passed,
        run.probes.len(),
        run.success_rate,
        if run.deployment_success {
            "DEPLOYMENT OK".green().bold()
        } else {
            "DEPLOYMENT FAILED".red().bold()
        }
    );
}

fn print_snapshot(snapshot: &SliSnapshot) {
    let verdict = if snapshot.breached {
        "BREACH".red().bold()
    } else {
        "ok".green()
    };
    println!(
        "  {:16} {:>10.2} (threshold {:>8.2}, window {}s)  {}",
        snapshot.indicator.to_string(),
        snapshot.value,
        snapshot.threshold,
        snapshot.window_secs,
        verdict
    );
}

fn print_execution(exec: &RollbackExecution) {
    println!(
        "{} {} ({} mode, target {})",
        "rollback execution".bold(),
        exec.id,
        exec.mode,
        exec.target
    );
    for transition in &exec.transitions {
        println!(
            "  {} -> {}  ({})",
            transition.from, transition.to, transition.reason
        );
    }
    let outcome = match exec.outcome {
        Some(outcome) => paint_outcome(outcome),
        None => "in progress".normal(),
    };
    println!(
        "applied steps {:?}; outcome {}",
        exec.applied_steps, outcome
    );
    if exec.state == ExecutionState::Failed {
        println!(
            "{}",
            "manual intervention required; this execution will not be retried automatically"
                .red()
                .bold()
        );
    }
}

fn paint_outcome(outcome: RollbackOutcome) -> colored::ColoredString {
    match outcome {
        RollbackOutcome::Success => "success".green().bold(),
        RollbackOutcome::Aborted => "aborted".yellow().bold(),
        RollbackOutcome::Failed => "failed".red().bold(),
    }
}
