//! Rollback orchestration.
//!
//! One orchestrator drives all four flows (manual, canary, automated,
//! emergency) off the [`RollbackMode`] sum type. Traffic is only ever
//! mutated here, one step at a time; callers must not run two
//! orchestrators against the same deployment target.

pub mod database;
pub mod execution;

pub use execution::{CANARY_STEPS, ExecutionState, RollbackExecution, RollbackMode, canary_ladder};

use crate::decision::DecisionEngine;
use crate::history::RollbackRecord;
use crate::notify::{Notifier, NotifyEvent, NotifySeverity};
use crate::sli::SliBackend;
use crate::traffic::TrafficRouter;
use database::{BackupStore, DatabaseRollbackCoordinator};
use dvr_common::config::{CanaryConfig, HealthCheckConfig, Thresholds};
use dvr_common::errors::TransitionError;
use dvr_common::types::{DeploymentId, RollbackDecision, TrafficSplit};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Port for post-shift health verification in the emergency flow.
pub trait DeploymentHealth: Send + Sync {
    fn healthy(&self) -> impl Future<Output = bool> + Send;
}

/// Port for the human confirmation step in automated mode. Returns the
/// confirmed rollback target, or `None` to decline.
pub trait ConfirmationGate: Send + Sync {
    fn select_target(
        &self,
        decision: &RollbackDecision,
        default_target: &DeploymentId,
        history: &[RollbackRecord],
    ) -> impl Future<Output = Option<DeploymentId>> + Send;
}

/// Headless confirmation gate: approves the default target or declines.
pub struct PresetGate {
    approve: bool,
}

impl PresetGate {
    pub fn new(approve: bool) -> Self {
        Self { approve }
    }
}

impl ConfirmationGate for PresetGate {
    async fn select_target(
        &self,
        _decision: &RollbackDecision,
        default_target: &DeploymentId,
        _history: &[RollbackRecord],
    ) -> Option<DeploymentId> {
        self.approve.then(|| default_target.clone())
    }
}

/// Interactive confirmation gate backed by a terminal prompt.
pub struct InteractiveGate;

impl ConfirmationGate for InteractiveGate {
    async fn select_target(
        &self,
        decision: &RollbackDecision,
        default_target: &DeploymentId,
        history: &[RollbackRecord],
    ) -> Option<DeploymentId> {
        let mut candidates = vec![default_target.clone()];
        for record in history {
            if !candidates.contains(&record.target) {
                candidates.push(record.target.clone());
            }
        }

        let items: Vec<String> = candidates
            .iter()
            .map(|c| {
                match history.iter().find(|r| r.target == *c) {
                    Some(r) => format!("{} (last rollback {} at {})", c, r.outcome, r.started_at),
                    None => c.to_string(),
                }
            })
            .collect();
        let prompt = format!(
            "SLI breach [{}]: select rollback target",
            decision.breached_names().join(", ")
        );

        // dialoguer is synchronous; keep the terminal prompt off the runtime.
        let selection = tokio::task::spawn_blocking(move || {
            dialoguer::Select::new()
                .with_prompt(prompt)
                .items(&items)
                .default(0)
                .interact_opt()
        })
        .await
        .ok()?
        .ok()??;

        candidates.get(selection).cloned()
    }
}

/// Result of one orchestrator invocation.
#[derive(Debug)]
pub enum RollbackRun {
    /// A rollback execution ran to a terminal state.
    Executed(RollbackExecution),
    /// Automated mode found no breach; nothing was executed.
    NotRecommended(RollbackDecision),
    /// Automated mode recommended a rollback but the operator declined.
    Declined(RollbackDecision),
}

/// Orchestrator configuration, carved out of the full config.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub thresholds: Thresholds,
    pub canary: CanaryConfig,
    pub health: HealthCheckConfig,
}

/// Drives rollback executions against the external ports.
pub struct RollbackOrchestrator<R, S, B, N, V> {
    router: R,
    decision: DecisionEngine<S>,
    database: DatabaseRollbackCoordinator<B>,
    notifier: N,
    verifier: V,
    config: OrchestratorConfig,
    stop: watch::Receiver<bool>,
}

impl<R, S, B, N, V> RollbackOrchestrator<R, S, B, N, V>
where
    R: TrafficRouter,
    S: SliBackend,
    B: BackupStore,
    N: Notifier,
    V: DeploymentHealth,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        router: R,
        decision: DecisionEngine<S>,
        database: DatabaseRollbackCoordinator<B>,
        notifier: N,
        verifier: V,
        config: OrchestratorConfig,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            router,
            decision,
            database,
            notifier,
            verifier,
            config,
            stop,
        }
    }

    /// Execute a rollback in the given mode.
    ///
    /// Structured failures (SLI breach, router error, database failure,
    /// interrupt) end in a terminal execution state; `Err` is reserved
    /// for state-machine violations, which indicate a bug.
    pub async fn run<G: ConfirmationGate>(
        &self,
        mode: RollbackMode,
        target: DeploymentId,
        gate: &G,
        history: &[RollbackRecord],
    ) -> Result<RollbackRun, TransitionError> {
        match mode {
            RollbackMode::Manual => self.canary_flow(mode, target, 100).await,
            RollbackMode::Canary { ceiling } => self.canary_flow(mode, target, ceiling).await,
            RollbackMode::Emergency { rollback_database } => {
                self.emergency_flow(mode, target, rollback_database).await
            }
            RollbackMode::Automated => self.automated_flow(target, gate, history).await,
        }
    }

    /// Canary flow: walk the ladder, gating each step on tightened SLI
    /// thresholds. A breach or interrupt reverts traffic to the last
    /// confirmed-good split and aborts.
    async fn canary_flow(
        &self,
        mode: RollbackMode,
        target: DeploymentId,
        ceiling: u8,
    ) -> Result<RollbackRun, TransitionError> {
        let ladder = canary_ladder(ceiling);
        let mut exec = RollbackExecution::new(mode, target.clone(), ladder.clone());

        if ladder.is_empty() {
            exec.transition_to(ExecutionState::Aborted, "empty canary ladder")?;
            return Ok(RollbackRun::Executed(exec));
        }

        self.notify(
            NotifySeverity::Info,
            "rollback started",
            &exec,
            &[("steps", format!("{:?}", ladder))],
        )
        .await;

        let gate_thresholds = self.config.canary.gate_thresholds(&self.config.thresholds);
        let mut last_good: Option<u8> = None;
        let mut applied_any = false;

        for percentage in ladder {
            if self.stopped() {
                return self
                    .abort(exec, last_good, applied_any, "interrupted before step")
                    .await
                    .map(RollbackRun::Executed);
            }

            let split = TrafficSplit::new(target.clone(), percentage)?;
            if let Err(e) = self.router.route(&split).await {
                warn!("traffic shift to {}% failed: {}", percentage, e);
                return self
                    .abort(exec, last_good, applied_any, format!("router error: {}", e))
                    .await
                    .map(RollbackRun::Executed);
            }
            applied_any = true;
            exec.transition_to(
                ExecutionState::Stepping { percentage },
                "traffic shifted",
            )?;
            self.notify(
                NotifySeverity::Info,
                "canary step applied",
                &exec,
                &[("percentage", percentage.to_string())],
            )
            .await;

            if !self.interruptible_sleep(self.config.canary.settle()).await {
                return self
                    .abort(exec, last_good, applied_any, "interrupted during settle")
                    .await
                    .map(RollbackRun::Executed);
            }

            let decision = self.decision.evaluate(&gate_thresholds).await;
            if decision.recommend {
                let reason = format!(
                    "SLI breach at {}%: {}",
                    percentage,
                    decision.breached_names().join(", ")
                );
                return self
                    .abort(exec, last_good, applied_any, reason)
                    .await
                    .map(RollbackRun::Executed);
            }
            last_good = Some(percentage);
        }

        exec.transition_to(ExecutionState::Completed, "final step healthy")?;
        self.notify(NotifySeverity::Info, "rollback completed", &exec, &[])
            .await;
        Ok(RollbackRun::Executed(exec))
    }

    /// Emergency flow: optional database rollback, immediate 100% shift,
    /// then health verification with bounded retries.
    async fn emergency_flow(
        &self,
        mode: RollbackMode,
        target: DeploymentId,
        rollback_database: bool,
    ) -> Result<RollbackRun, TransitionError> {
        let mut exec = RollbackExecution::new(mode, target.clone(), vec![100]);
        self.notify(NotifySeverity::Warning, "emergency rollback started", &exec, &[])
            .await;

        if rollback_database {
            exec.transition_to(ExecutionState::DatabaseRollback, "database rollback requested")?;
            match self.database.rollback(target.as_str()).await {
                Ok(record) => {
                    info!(
                        "database rolled back to {} (backup {})",
                        record.target_snapshot_id, record.backup_tag
                    );
                    self.notify(
                        NotifySeverity::Info,
                        "database rolled back",
                        &exec,
                        &[("backup_tag", record.backup_tag.clone())],
                    )
                    .await;
                }
                Err(e) => {
                    exec.transition_to(ExecutionState::Failed, e.to_string())?;
                    self.notify(
                        NotifySeverity::Critical,
                        "database rollback failed; manual intervention required",
                        &exec,
                        &[("error", e.to_string())],
                    )
                    .await;
                    return Ok(RollbackRun::Executed(exec));
                }
            }
        }

        let split = TrafficSplit::new(target.clone(), 100)?;
        if let Err(e) = self.router.route(&split).await {
            // After a database restore, stopping here leaves code and
            // data disagreeing; that is a failure, not a safe abort.
            let (state, title) = if rollback_database {
                (
                    ExecutionState::Failed,
                    "traffic shift failed after database rollback; manual intervention required",
                )
            } else {
                (ExecutionState::Aborted, "emergency traffic shift failed")
            };
            exec.transition_to(state, format!("router error: {}", e))?;
            self.notify(NotifySeverity::Critical, title, &exec, &[("error", e.to_string())])
                .await;
            return Ok(RollbackRun::Executed(exec));
        }
        exec.transition_to(ExecutionState::Stepping { percentage: 100 }, "emergency shift")?;
        self.notify(NotifySeverity::Warning, "traffic shifted to 100%", &exec, &[])
            .await;

        exec.transition_to(ExecutionState::VerifyingHealth, "post-shift verification")?;
        let retries = self.config.health.retries.max(1);
        for attempt in 1..=retries {
            if self.stopped() {
                exec.transition_to(ExecutionState::Aborted, "interrupted during verification")?;
                self.notify(NotifySeverity::Critical, "rollback interrupted", &exec, &[])
                    .await;
                return Ok(RollbackRun::Executed(exec));
            }
            if self.verifier.healthy().await {
                exec.transition_to(
                    ExecutionState::Completed,
                    format!("healthy after {} attempt(s)", attempt),
                )?;
                self.notify(NotifySeverity::Info, "rollback completed", &exec, &[])
                    .await;
                return Ok(RollbackRun::Executed(exec));
            }
            info!(
                "health verification attempt {}/{} failed, retrying",
                attempt, retries
            );
            if attempt < retries && !self.interruptible_sleep(self.config.health.interval()).await {
                exec.transition_to(ExecutionState::Aborted, "interrupted during verification")?;
                self.notify(NotifySeverity::Critical, "rollback interrupted", &exec, &[])
                    .await;
                return Ok(RollbackRun::Executed(exec));
            }
        }

        exec.transition_to(
            ExecutionState::Failed,
            format!("health verification exhausted {} retries", retries),
        )?;
        self.notify(
            NotifySeverity::Critical,
            "emergency rollback failed; manual intervention required",
            &exec,
            &[("retries", retries.to_string())],
        )
        .await;
        Ok(RollbackRun::Executed(exec))
    }

    /// Automated flow: evaluate production thresholds, surface history
    /// through the confirmation gate, then run a full canary.
    async fn automated_flow<G: ConfirmationGate>(
        &self,
        target: DeploymentId,
        gate: &G,
        history: &[RollbackRecord],
    ) -> Result<RollbackRun, TransitionError> {
        let decision = self.decision.evaluate(&self.config.thresholds).await;
        if !decision.recommend {
            info!("no SLI breach; rollback not recommended");
            return Ok(RollbackRun::NotRecommended(decision));
        }

        let Some(confirmed) = gate.select_target(&decision, &target, history).await else {
            info!("rollback recommended but declined at the confirmation gate");
            return Ok(RollbackRun::Declined(decision));
        };

        self.canary_flow(RollbackMode::Automated, confirmed, 100).await
    }

    /// Abort: revert traffic to the last confirmed-good split (0 when no
    /// step ever passed its gate), then mark the execution aborted.
    async fn abort(
        &self,
        mut exec: RollbackExecution,
        last_good: Option<u8>,
        applied_any: bool,
        reason: impl Into<String>,
    ) -> Result<RollbackExecution, TransitionError> {
        let reason = reason.into();
        if applied_any {
            let percentage = last_good.unwrap_or(0);
            if let Ok(split) = TrafficSplit::new(exec.target.clone(), percentage) {
                match self.router.route(&split).await {
                    Ok(()) => info!("traffic reverted to last-good {}%", percentage),
                    Err(e) => warn!("failed to revert traffic to {}%: {}", percentage, e),
                }
            }
        }
        exec.transition_to(ExecutionState::Aborted, reason.clone())?;
        self.notify(
            NotifySeverity::Critical,
            "canary rollback aborted",
            &exec,
            &[
                ("reason", reason),
                (
                    "traffic_left_at",
                    format!("{}%", last_good.unwrap_or(0)),
                ),
            ],
        )
        .await;
        Ok(exec)
    }

    fn stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Sleep for `duration`, returning false if the stop signal fires.
    async fn interruptible_sleep(&self, duration: Duration) -> bool {
        let mut stop = self.stop.clone();
        if *stop.borrow() {
            return false;
        }
        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                changed = stop.changed() => match changed {
                    Ok(()) if *stop.borrow() => return false,
                    Ok(()) => continue,
                    // Sender gone: no interrupt can arrive, finish the wait.
                    Err(_) => {
                        sleep.as_mut().await;
                        return true;
                    }
                },
            }
        }
    }

    async fn notify(
        &self,
        severity: NotifySeverity,
        title: &str,
        exec: &RollbackExecution,
        extra: &[(&str, String)],
    ) {
        let mut event = NotifyEvent::new(severity, title)
            .field("execution", exec.id.to_string())
            .field("mode", exec.mode.to_string())
            .field("target", exec.target.to_string())
            .field("state", exec.state.to_string());
        for (name, value) in extra {
            event = event.field(*name, value.clone());
        }
        self.notifier.notify(&event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        FakeBackupStore, FakeHealth, FakeNotifier, FakeSliBackend, FakeTrafficRouter,
    };
    use dvr_common::types::RollbackOutcome;

    type TestOrchestrator = RollbackOrchestrator<
        FakeTrafficRouter,
        FakeSliBackend,
        FakeBackupStore,
        FakeNotifier,
        FakeHealth,
    >;

    struct Harness {
        orchestrator: TestOrchestrator,
        router: FakeTrafficRouter,
        notifier: FakeNotifier,
        store: FakeBackupStore,
        stop_tx: watch::Sender<bool>,
    }

    fn config() -> OrchestratorConfig {
        let full = dvr_common::config::DvrConfig::default();
        OrchestratorConfig {
            thresholds: full.thresholds,
            canary: CanaryConfig {
                settle_secs: 0,
                ..full.canary
            },
            health: HealthCheckConfig {
                retries: 2,
                interval_secs: 0,
            },
        }
    }

    fn harness(sli: FakeSliBackend, store: FakeBackupStore, health: FakeHealth) -> Harness {
        let router = FakeTrafficRouter::new();
        let notifier = FakeNotifier::new();
        let (stop_tx, stop_rx) = watch::channel(false);
        let orchestrator = RollbackOrchestrator::new(
            router.clone(),
            DecisionEngine::new(sli),
            DatabaseRollbackCoordinator::new(store.clone()),
            notifier.clone(),
            health,
            config(),
            stop_rx,
        );
        Harness {
            orchestrator,
            router,
            notifier,
            store,
            stop_tx,
        }
    }

    fn healthy_harness() -> Harness {
        harness(
            FakeSliBackend::new(1.0, 500.0, 4.0),
            FakeBackupStore::new(),
            FakeHealth::always(true),
        )
    }

    fn target() -> DeploymentId {
        DeploymentId::new("deploy-42")
    }

    async fn run(h: &Harness, mode: RollbackMode) -> RollbackRun {
        h.orchestrator
            .run(mode, target(), &PresetGate::new(true), &[])
            .await
            .unwrap()
    }

    fn executed(run: RollbackRun) -> RollbackExecution {
        match run {
            RollbackRun::Executed(exec) => exec,
            other => panic!("expected an execution, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn manual_mode_walks_the_full_ladder() {
        let h = healthy_harness();
        let exec = executed(run(&h, RollbackMode::Manual).await);
        assert_eq!(exec.outcome, Some(RollbackOutcome::Success));
        assert_eq!(h.router.applied_percentages(), vec![10, 25, 50, 75, 100]);
        assert_eq!(exec.applied_steps, vec![10, 25, 50, 75, 100]);
    }

    #[tokio::test]
    async fn ceiling_truncates_executed_steps() {
        let h = healthy_harness();
        let exec = executed(run(&h, RollbackMode::Canary { ceiling: 50 }).await);
        assert_eq!(exec.outcome, Some(RollbackOutcome::Success));
        // Steps 75 and 100 are never invoked.
        assert_eq!(h.router.applied_percentages(), vec![10, 25, 50]);
    }

    #[tokio::test]
    async fn gate_breach_aborts_and_reverts_to_last_good() {
        // Healthy for two gates, breaching on the third.
        let h = harness(
            FakeSliBackend::with_error_rate_sequence(vec![1.0, 1.0, 9.0], 500.0, 4.0),
            FakeBackupStore::new(),
            FakeHealth::always(true),
        );
        let exec = executed(run(&h, RollbackMode::Manual).await);
        assert_eq!(exec.outcome, Some(RollbackOutcome::Aborted));
        // 10 and 25 confirmed, 50 breached, reverted back to 25.
        assert_eq!(h.router.applied_percentages(), vec![10, 25, 50, 25]);
        assert_eq!(
            h.notifier.count(NotifySeverity::Critical),
            1,
            "abort notifies critical exactly once"
        );
    }

    #[tokio::test]
    async fn breach_at_first_step_reverts_to_zero() {
        let h = harness(
            FakeSliBackend::new(9.0, 500.0, 4.0),
            FakeBackupStore::new(),
            FakeHealth::always(true),
        );
        let exec = executed(run(&h, RollbackMode::Manual).await);
        assert_eq!(exec.outcome, Some(RollbackOutcome::Aborted));
        assert_eq!(h.router.applied_percentages(), vec![10, 0]);
    }

    #[tokio::test]
    async fn router_failure_mid_ladder_aborts_safely() {
        let h = healthy_harness();
        h.router.fail_at(50);
        let exec = executed(run(&h, RollbackMode::Manual).await);
        assert_eq!(exec.outcome, Some(RollbackOutcome::Aborted));
        // 10 and 25 applied, 50 failed, revert to 25.
        assert_eq!(h.router.applied_percentages(), vec![10, 25, 25]);
    }

    #[tokio::test]
    async fn stop_signal_before_start_prevents_any_routing() {
        let h = healthy_harness();
        h.stop_tx.send(true).unwrap();
        let exec = executed(run(&h, RollbackMode::Manual).await);
        assert_eq!(exec.outcome, Some(RollbackOutcome::Aborted));
        assert!(h.router.applied_percentages().is_empty());
    }

    #[tokio::test]
    async fn emergency_shifts_everything_then_verifies() {
        let h = healthy_harness();
        let exec = executed(
            run(
                &h,
                RollbackMode::Emergency {
                    rollback_database: false,
                },
            )
            .await,
        );
        assert_eq!(exec.outcome, Some(RollbackOutcome::Success));
        assert_eq!(h.router.applied_percentages(), vec![100]);
        assert!(h.store.calls().lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn emergency_exhausting_health_retries_fails() {
        let h = harness(
            FakeSliBackend::new(1.0, 500.0, 4.0),
            FakeBackupStore::new(),
            FakeHealth::always(false),
        );
        let exec = executed(
            run(
                &h,
                RollbackMode::Emergency {
                    rollback_database: false,
                },
            )
            .await,
        );
        assert_eq!(exec.outcome, Some(RollbackOutcome::Failed));
        assert_eq!(h.notifier.count(NotifySeverity::Critical), 1);
        assert!(
            exec.transitions
                .last()
                .unwrap()
                .reason
                .contains("exhausted 2 retries")
        );
    }

    #[tokio::test]
    async fn emergency_recovers_when_health_returns_late() {
        let h = harness(
            FakeSliBackend::new(1.0, 500.0, 4.0),
            FakeBackupStore::new(),
            FakeHealth::sequence(vec![false, true]),
        );
        let exec = executed(
            run(
                &h,
                RollbackMode::Emergency {
                    rollback_database: false,
                },
            )
            .await,
        );
        assert_eq!(exec.outcome, Some(RollbackOutcome::Success));
    }

    #[tokio::test]
    async fn emergency_with_database_runs_backup_before_traffic() {
        let h = healthy_harness();
        let exec = executed(
            run(
                &h,
                RollbackMode::Emergency {
                    rollback_database: true,
                },
            )
            .await,
        );
        assert_eq!(exec.outcome, Some(RollbackOutcome::Success));
        assert_eq!(
            h.store.calls().lock().unwrap().as_slice(),
            ["backup", "restore", "integrity"]
        );
        assert!(h.router.routed_after(h.store.last_call_at()));
    }

    #[tokio::test]
    async fn failed_backup_fails_execution_without_restore_or_routing() {
        let h = harness(
            FakeSliBackend::new(1.0, 500.0, 4.0),
            FakeBackupStore::new().fail_backup(),
            FakeHealth::always(true),
        );
        let exec = executed(
            run(
                &h,
                RollbackMode::Emergency {
                    rollback_database: true,
                },
            )
            .await,
        );
        assert_eq!(exec.outcome, Some(RollbackOutcome::Failed));
        // Restore never attempted, traffic untouched.
        assert_eq!(h.store.calls().lock().unwrap().as_slice(), ["backup"]);
        assert!(h.router.applied_percentages().is_empty());
        assert_eq!(h.notifier.count(NotifySeverity::Critical), 1);
    }

    #[tokio::test]
    async fn failed_integrity_check_is_fatal_even_after_restore() {
        let h = harness(
            FakeSliBackend::new(1.0, 500.0, 4.0),
            FakeBackupStore::new().fail_integrity(),
            FakeHealth::always(true),
        );
        let exec = executed(
            run(
                &h,
                RollbackMode::Emergency {
                    rollback_database: true,
                },
            )
            .await,
        );
        assert_eq!(exec.outcome, Some(RollbackOutcome::Failed));
        assert!(h.router.applied_percentages().is_empty());
    }

    #[tokio::test]
    async fn automated_mode_without_breach_executes_nothing() {
        let h = healthy_harness();
        let run = run(&h, RollbackMode::Automated).await;
        assert!(matches!(run, RollbackRun::NotRecommended(_)));
        assert!(h.router.applied_percentages().is_empty());
    }

    #[tokio::test]
    async fn automated_mode_with_breach_and_approval_runs_full_canary() {
        // Production thresholds breached on the first read; canary gates
        // afterwards see healthy metrics.
        let h = harness(
            FakeSliBackend::with_error_rate_sequence(
                vec![6.0, 1.0, 1.0, 1.0, 1.0, 1.0],
                500.0,
                4.0,
            ),
            FakeBackupStore::new(),
            FakeHealth::always(true),
        );
        let exec = executed(run(&h, RollbackMode::Automated).await);
        assert_eq!(exec.outcome, Some(RollbackOutcome::Success));
        assert_eq!(exec.mode, RollbackMode::Automated);
        assert_eq!(h.router.applied_percentages(), vec![10, 25, 50, 75, 100]);
    }

    #[tokio::test]
    async fn automated_mode_declined_at_gate_executes_nothing() {
        let h = harness(
            FakeSliBackend::new(6.0, 500.0, 4.0),
            FakeBackupStore::new(),
            FakeHealth::always(true),
        );
        let run = h
            .orchestrator
            .run(
                RollbackMode::Automated,
                target(),
                &PresetGate::new(false),
                &[],
            )
            .await
            .unwrap();
        assert!(matches!(run, RollbackRun::Declined(_)));
        assert!(h.router.applied_percentages().is_empty());
    }

    #[tokio::test]
    async fn notifications_cover_start_steps_and_completion() {
        let h = healthy_harness();
        let _ = run(&h, RollbackMode::Canary { ceiling: 25 }).await;
        let titles = h.notifier.titles();
        assert_eq!(titles.first().map(String::as_str), Some("rollback started"));
        assert_eq!(
            titles
                .iter()
                .filter(|t| t.as_str() == "canary step applied")
                .count(),
            2
        );
        assert_eq!(titles.last().map(String::as_str), Some("rollback completed"));
    }

    #[tokio::test]
    async fn interruptible_sleep_returns_false_on_stop() {
        let Harness {
            orchestrator,
            stop_tx,
            ..
        } = healthy_harness();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = stop_tx.send(true);
        });
        let finished = tokio::time::timeout(
            Duration::from_secs(2),
            orchestrator.interruptible_sleep(Duration::from_secs(30)),
        )
        .await
        .expect("sleep must be interrupted promptly");
        assert!(!finished);
    }
}
