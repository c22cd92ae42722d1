use std::{sync::Arc, time::Duration};

use derive_builder::Builder;
use log::{debug, error, info};
use tokio::{
    sync::watch,
    task::JoinError,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    client::DaemonSetClient,
    health::{Health, HealthTracker, DEFAULT_DEGRADED_AFTER},
    model::{ReconciliationTarget, TolerationRule, WorkItem},
    queue::{ExponentialBackoff, WorkQueue, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX},
    reconciler::ensure_toleration,
};

pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(30);
pub const QUEUE_NAME: &str = "DaemonSets";

#[derive(Debug, Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct ControllerSettings {
    #[builder(default = "DEFAULT_RESYNC_INTERVAL")]
    pub resync_interval: Duration,
    #[builder(default = "DEFAULT_BACKOFF_BASE")]
    pub backoff_base: Duration,
    #[builder(default = "DEFAULT_BACKOFF_MAX")]
    pub backoff_max: Duration,
    /// consecutive failed passes before the controller reports itself degraded
    #[builder(default = "DEFAULT_DEGRADED_AFTER")]
    pub degraded_after: u32,
}

impl ControllerSettingsBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(interval) = self.resync_interval {
            if interval.is_zero() {
                return Err("Resync interval must be greater than zero!".to_owned());
            }
        }

        if let Some(0) = self.degraded_after {
            return Err("Degraded threshold must be at least 1!".to_owned());
        }

        Ok(())
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
            degraded_after: DEFAULT_DEGRADED_AFTER,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    #[default]
    Created,
    Running,
    ShuttingDown,
    Stopped,
}

struct ControllerContext<C> {
    client: C,
    target: ReconciliationTarget,
    rule: TolerationRule,
    settings: ControllerSettings,
    queue: Arc<WorkQueue<WorkItem>>,
    health: HealthTracker,
    state: watch::Sender<ControllerState>,
}

impl<C: DaemonSetClient> ControllerContext<C> {
    async fn reconcile(&self) {
        let outcome = ensure_toleration(&self.client, &self.target, &self.rule).await;

        self.health.record(&outcome);
    }

    /// Returns `false` once the queue was shut down and drained.
    async fn process_next_work_item(&self) -> bool {
        let Some(item) = self.queue.get().await else {
            return false;
        };

        self.reconcile().await;

        // failures wait for the next resync instead of the queue's backoff
        self.queue.forget(&item);
        self.queue.done(&item);

        true
    }

    fn set_state(&self, state: ControllerState) {
        debug!("DaemonSet controller for {} is now {state:?}", self.target);
        self.state.send_replace(state);
    }
}

/// Keeps a single toleration on a single DaemonSet.
///
/// Reconciles once on startup, then on every queued [`WorkItem`]. A resync timer
/// queues one every `resync_interval`, so drift is repaired even if nothing else
/// triggers a check.
pub struct DaemonSetController<C> {
    context: Arc<ControllerContext<C>>,
}

impl<C> DaemonSetController<C>
where
    C: DaemonSetClient + 'static,
{
    pub fn new(
        client: C,
        target: ReconciliationTarget,
        rule: TolerationRule,
        settings: ControllerSettings,
    ) -> Self {
        info!("Created DaemonSet controller for {target} with toleration {rule}");

        let backoff = ExponentialBackoff::new(settings.backoff_base, settings.backoff_max);
        let (state, _) = watch::channel(ControllerState::Created);

        Self {
            context: Arc::new(ControllerContext {
                client,
                health: HealthTracker::new(settings.degraded_after),
                queue: Arc::new(WorkQueue::new(QUEUE_NAME, backoff)),
                target,
                rule,
                settings,
                state,
            }),
        }
    }

    pub fn health(&self) -> watch::Receiver<Health> {
        self.context.health.subscribe()
    }

    pub fn state(&self) -> watch::Receiver<ControllerState> {
        self.context.state.subscribe()
    }

    /// Runs until `stop` is cancelled, then drains the queue and waits for the
    /// worker to finish.
    pub async fn run(self, stop: CancellationToken) {
        let context = self.context;

        context.set_state(ControllerState::Running);
        info!("Starting DaemonSet controller");

        context.reconcile().await;

        let mut worker = tokio::spawn(run_worker(context.clone()));
        let resync = tokio::spawn(run_resync_timer(context.clone(), stop.clone()));

        let lost_worker = tokio::select! {
            biased;
            _ = stop.cancelled() => None,
            result = &mut worker => Some(result),
        };

        if let Some(result) = lost_worker.as_ref() {
            // not restarted, the controller idles degraded until stopped
            report_task_exit("worker", result);
            context.health.mark_worker_lost();
            stop.cancelled().await;
        }

        context.set_state(ControllerState::ShuttingDown);
        info!("Shutting down DaemonSet controller");

        context.queue.shut_down();

        report_task_exit("resync timer", &resync.await);
        if lost_worker.is_none() {
            report_task_exit("worker", &worker.await);
        }

        context.set_state(ControllerState::Stopped);
        info!("DaemonSet controller stopped");
    }
}

async fn run_worker<C: DaemonSetClient>(context: Arc<ControllerContext<C>>) {
    while context.process_next_work_item().await {}

    debug!("Worker of '{}' queue exited", context.queue.name());
}

async fn run_resync_timer<C: DaemonSetClient>(
    context: Arc<ControllerContext<C>>,
    stop: CancellationToken,
) {
    let period = context.settings.resync_interval;
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = interval.tick() => {
                info!("Periodic check of DaemonSet {}", context.target);
                context.queue.add(WorkItem);
            }
        }
    }

    debug!("Resync timer stopped");
}

fn report_task_exit(name: &str, result: &Result<(), JoinError>) {
    match result {
        Ok(()) => debug!("DaemonSet controller {name} finished"),
        Err(err) if err.is_panic() => error!("DaemonSet controller {name} panicked! {err}"),
        Err(err) => error!("DaemonSet controller {name} was cancelled! {err}"),
    }
}
