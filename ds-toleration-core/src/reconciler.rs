use k8s_openapi::api::{apps::v1::DaemonSet, core::v1::Toleration};
use log::{error, info, warn};
use thiserror::Error;

use crate::{
    client::{ClientError, DaemonSetClient},
    model::{ReconciliationTarget, TolerationRule},
};

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Couldn't fetch the DaemonSet! Reason: {}", .0)]
    FetchFailed(ClientError),
    #[error("Couldn't update the DaemonSet! Reason: {}", .0)]
    UpdateFailed(ClientError),
}

#[derive(Debug)]
pub enum ReconcileOutcome {
    /// The required toleration was already there, nothing was written.
    Compliant,
    /// The toleration was appended and the update went through.
    Patched,
    /// The target doesn't exist (yet, or anymore).
    NotFound,
    /// The pass was abandoned, the next resync will try again.
    Failed(ReconcilerError),
}

impl ReconcileOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ReconcileOutcome::Failed(_))
    }
}

/// Makes sure `target` carries `rule`, appending it when it's missing.
///
/// Never fails outward: fetch and update errors are logged and reported as
/// [`ReconcileOutcome::Failed`], to be retried by the next periodic resync.
pub async fn ensure_toleration<C: DaemonSetClient>(
    client: &C,
    target: &ReconciliationTarget,
    rule: &TolerationRule,
) -> ReconcileOutcome {
    match try_ensure_toleration(client, target, rule).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("Reconciliation of DaemonSet {target} failed! {err}");
            ReconcileOutcome::Failed(err)
        }
    }
}

async fn try_ensure_toleration<C: DaemonSetClient>(
    client: &C,
    target: &ReconciliationTarget,
    rule: &TolerationRule,
) -> Result<ReconcileOutcome, ReconcilerError> {
    let daemon_set = match client.get(&target.namespace, &target.name).await {
        Ok(daemon_set) => daemon_set,
        Err(ClientError::NotFound) => {
            warn!("DaemonSet {target} not found");
            return Ok(ReconcileOutcome::NotFound);
        }
        Err(err) => return Err(ReconcilerError::FetchFailed(err)),
    };

    info!("Checking tolerations on DaemonSet {target}");
    let tolerations = pod_tolerations(&daemon_set);
    for (index, toleration) in tolerations.iter().enumerate() {
        info!(
            "DaemonSet {target} has toleration[{index}]: key={}, value={}, effect={}",
            toleration.key.as_deref().unwrap_or_default(),
            toleration.value.as_deref().unwrap_or_default(),
            toleration.effect.as_deref().unwrap_or_default(),
        );
    }

    if tolerations.iter().any(|toleration| rule.matches(toleration)) {
        info!("DaemonSet {target} already has the required toleration {rule}");
        return Ok(ReconcileOutcome::Compliant);
    }

    info!("DaemonSet {target} is missing the required toleration {rule}, adding it");

    let patched = with_toleration(&daemon_set, rule);
    client
        .update(&target.namespace, &patched)
        .await
        .map_err(ReconcilerError::UpdateFailed)?;

    info!("Successfully added toleration {rule} to DaemonSet {target}");

    Ok(ReconcileOutcome::Patched)
}

pub fn pod_tolerations(daemon_set: &DaemonSet) -> &[Toleration] {
    daemon_set
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .and_then(|pod_spec| pod_spec.tolerations.as_deref())
        .unwrap_or_default()
}

/// Returns a copy of `daemon_set` with `rule` appended to its pod template tolerations.
/// Existing entries are kept as they are, in order.
pub fn with_toleration(daemon_set: &DaemonSet, rule: &TolerationRule) -> DaemonSet {
    let mut patched = daemon_set.clone();

    patched
        .spec
        .get_or_insert_with(Default::default)
        .template
        .spec
        .get_or_insert_with(Default::default)
        .tolerations
        .get_or_insert_with(Vec::new)
        .push(rule.to_toleration());

    patched
}
