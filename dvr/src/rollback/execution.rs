//! Rollback execution state machine.
//!
//! State transitions are explicit data: every change is validated
//! against the transition matrix and recorded with a timestamp and
//! reason, so an execution carries its own audit trail.

use chrono::{DateTime, Utc};
use dvr_common::errors::TransitionError;
use dvr_common::types::{DeploymentId, RollbackOutcome};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The fixed canary ladder. A caller ceiling truncates it.
pub const CANARY_STEPS: [u8; 5] = [10, 25, 50, 75, 100];

/// Build the step sequence for a ceiling: every fixed step at or below
/// the ceiling, with the ceiling itself always included.
pub fn canary_ladder(ceiling: u8) -> Vec<u8> {
    let mut steps: Vec<u8> = CANARY_STEPS
        .iter()
        .copied()
        .filter(|p| *p <= ceiling)
        .collect();
    if ceiling > 0 && steps.last() != Some(&ceiling) {
        steps.push(ceiling);
    }
    steps
}

/// How a rollback is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RollbackMode {
    /// Full canary ladder, no automated decision step.
    Manual,
    /// Canary ladder truncated at `ceiling` percent.
    Canary { ceiling: u8 },
    /// Decision-engine gated, confirmation required, then full canary.
    Automated,
    /// Immediate 100% shift, optional database rollback, health-verified.
    Emergency { rollback_database: bool },
}

impl std::fmt::Display for RollbackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Canary { .. } => write!(f, "canary"),
            Self::Automated => write!(f, "automated"),
            Self::Emergency { .. } => write!(f, "emergency"),
        }
    }
}

/// State of a rollback execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExecutionState {
    /// Created, nothing applied yet.
    Draft,
    /// Database backup/restore/integrity in progress.
    DatabaseRollback,
    /// Traffic at `percentage`% on the target, awaiting the gate.
    Stepping { percentage: u8 },
    /// Post-shift health verification with bounded retries.
    VerifyingHealth,
    /// Terminal: traffic fully shifted and confirmed.
    Completed,
    /// Terminal: stopped safely at the last confirmed-good split.
    Aborted,
    /// Terminal: unsafe state, human intervention required.
    Failed,
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::DatabaseRollback => write!(f, "database_rollback"),
            Self::Stepping { percentage } => write!(f, "stepping({}%)", percentage),
            Self::VerifyingHealth => write!(f, "verifying_health"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: ExecutionState,
    pub to: ExecutionState,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// One rollback lifecycle instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackExecution {
    /// Unique execution id.
    pub id: Uuid,
    /// Mode driving this execution.
    pub mode: RollbackMode,
    /// Deployment the rollback targets.
    pub target: DeploymentId,
    /// Current state.
    pub state: ExecutionState,
    /// Planned traffic percentages, in order.
    pub traffic_steps: Vec<u8>,
    /// Index into `traffic_steps` of the last applied step.
    pub current_step_index: Option<usize>,
    /// Percentages actually applied at the router, in order.
    pub applied_steps: Vec<u8>,
    /// Audit trail of state changes.
    pub transitions: Vec<StateTransition>,
    /// When the execution started.
    pub started_at: DateTime<Utc>,
    /// When the execution reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Terminal outcome, set with `completed_at`.
    pub outcome: Option<RollbackOutcome>,
}

impl RollbackExecution {
    /// Create a draft execution with its planned ladder.
    pub fn new(mode: RollbackMode, target: DeploymentId, traffic_steps: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            target,
            state: ExecutionState::Draft,
            traffic_steps,
            current_step_index: None,
            applied_steps: Vec::new(),
            transitions: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            outcome: None,
        }
    }

    /// Whether the machine may move from the current state to `next`.
    ///
    /// Abort is reachable from every non-terminal state; step moves must
    /// not regress (checked separately for a precise error).
    pub fn can_transition_to(&self, next: &ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (&self.state, next),
            (Draft, Stepping { .. })
                | (Draft, DatabaseRollback)
                | (DatabaseRollback, Stepping { percentage: 100 })
                | (DatabaseRollback, Failed)
                | (Stepping { .. }, Stepping { .. })
                | (Stepping { .. }, VerifyingHealth)
                | (Stepping { .. }, Completed)
                | (VerifyingHealth, Completed)
                | (VerifyingHealth, Failed)
                | (Draft, Aborted)
                | (DatabaseRollback, Aborted)
                | (Stepping { .. }, Aborted)
                | (VerifyingHealth, Aborted)
        )
    }

    /// Apply a transition, recording it in the audit trail.
    pub fn transition_to(
        &mut self,
        next: ExecutionState,
        reason: impl Into<String>,
    ) -> Result<(), TransitionError> {
        if let ExecutionState::Stepping { percentage: from } = self.state {
            if let ExecutionState::Stepping { percentage: to } = next {
                if to <= from {
                    return Err(TransitionError::StepRegression { from, to });
                }
            }
        }
        if !self.can_transition_to(&next) {
            return Err(TransitionError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }

        self.transitions.push(StateTransition {
            from: self.state,
            to: next,
            reason: reason.into(),
            at: Utc::now(),
        });
        self.state = next;

        if let ExecutionState::Stepping { percentage } = next {
            self.applied_steps.push(percentage);
            self.current_step_index = self
                .traffic_steps
                .iter()
                .position(|p| *p == percentage)
                .or(self.current_step_index);
        }
        match next {
            ExecutionState::Completed => self.finish(RollbackOutcome::Success),
            ExecutionState::Aborted => self.finish(RollbackOutcome::Aborted),
            ExecutionState::Failed => self.finish(RollbackOutcome::Failed),
            _ => {}
        }
        Ok(())
    }

    fn finish(&mut self, outcome: RollbackOutcome) {
        self.completed_at = Some(Utc::now());
        self.outcome = Some(outcome);
    }
}
