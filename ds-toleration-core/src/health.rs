use std::time::SystemTime;

use log::{error, info, warn};
use tokio::sync::watch;

use crate::reconciler::ReconcileOutcome;

pub const DEFAULT_DEGRADED_AFTER: u32 = 3;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    #[default]
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Compliant,
    Patched,
    NotFound,
    Failed,
}

impl From<&ReconcileOutcome> for OutcomeKind {
    fn from(outcome: &ReconcileOutcome) -> Self {
        match outcome {
            ReconcileOutcome::Compliant => OutcomeKind::Compliant,
            ReconcileOutcome::Patched => OutcomeKind::Patched,
            ReconcileOutcome::NotFound => OutcomeKind::NotFound,
            ReconcileOutcome::Failed(_) => OutcomeKind::Failed,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Health {
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub last_outcome: Option<OutcomeKind>,
    pub last_success: Option<SystemTime>,
    /// set once the worker is gone, nothing gets reconciled from then on
    pub worker_lost: bool,
}

/// Folds reconciliation outcomes into a [`Health`] snapshot that can be watched.
///
/// The controller turns degraded after `degraded_after` failed passes in a row
/// and healthy again on the first pass that doesn't fail.
#[derive(Debug)]
pub struct HealthTracker {
    degraded_after: u32,
    sender: watch::Sender<Health>,
}

impl HealthTracker {
    pub fn new(degraded_after: u32) -> Self {
        let (sender, _) = watch::channel(Health::default());

        Self {
            degraded_after: degraded_after.max(1),
            sender,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Health> {
        self.sender.subscribe()
    }

    pub fn current(&self) -> Health {
        self.sender.borrow().clone()
    }

    /// Degrades permanently, later outcomes can't bring the controller back.
    pub fn mark_worker_lost(&self) {
        self.sender.send_modify(|health| {
            health.worker_lost = true;
            health.state = HealthState::Degraded;
        });

        error!("Controller worker is gone, the DaemonSet won't be reconciled anymore!");
    }

    pub fn record(&self, outcome: &ReconcileOutcome) {
        let degraded_after = self.degraded_after;

        self.sender.send_modify(|health| {
            if health.worker_lost {
                return;
            }

            let previous_state = health.state;
            health.last_outcome = Some(outcome.into());

            if outcome.is_failure() {
                health.consecutive_failures = health.consecutive_failures.saturating_add(1);
                if health.consecutive_failures >= degraded_after {
                    health.state = HealthState::Degraded;
                }
            } else {
                health.consecutive_failures = 0;
                health.last_success = Some(SystemTime::now());
                health.state = HealthState::Healthy;
            }

            match (previous_state, health.state) {
                (HealthState::Healthy, HealthState::Degraded) => warn!(
                    "Controller is degraded after {} failed reconciliations in a row!",
                    health.consecutive_failures
                ),
                (HealthState::Degraded, HealthState::Healthy) => {
                    info!("Controller recovered, reconciliation succeeded again")
                }
                _ => (),
            }
        });
    }
}
