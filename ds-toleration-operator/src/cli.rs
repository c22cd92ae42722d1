use std::time::Duration;

use clap::Parser;
use ds_toleration_core::{
    ControllerSettings, ControllerSettingsBuilder, ReconciliationTarget, TolerationRule,
};
use log::LevelFilter;

pub const DEFAULT_NAMESPACE: &str = "kube-system";
pub const DEFAULT_DAEMONSET: &str = "vsphere-csi-node";
pub const DEFAULT_TOLERATION_KEY: &str = "dedicated";
pub const DEFAULT_TOLERATION_VALUE: &str = "prometheus";
pub const DEFAULT_TOLERATION_EFFECT: &str = "NoSchedule";

#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    /// namespace where the DaemonSet is located
    #[arg(short = 'n', long, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,
    /// name of the DaemonSet to keep the toleration on
    #[arg(long, default_value = DEFAULT_DAEMONSET)]
    pub daemonset: String,
    /// key of the enforced toleration
    #[arg(long, default_value = DEFAULT_TOLERATION_KEY)]
    pub toleration_key: String,
    /// value of the enforced toleration
    #[arg(long, default_value = DEFAULT_TOLERATION_VALUE)]
    pub toleration_value: String,
    /// effect of the enforced toleration (NoSchedule, PreferNoSchedule or NoExecute)
    ///
    /// unrecognized effects are treated as NoSchedule
    #[arg(long, default_value = DEFAULT_TOLERATION_EFFECT)]
    pub toleration_effect: String,
    /// seconds between periodic checks of the DaemonSet
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub resync_interval_secs: u64,
    /// seconds to wait for a graceful shutdown before exiting forcefully
    #[arg(long, default_value_t = 30)]
    pub shutdown_timeout_secs: u64,
    /// failed checks in a row before the controller reports itself as degraded
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub degraded_after: u32,
    /// override default kubeconfig (skips in-cluster configuration)
    #[arg(long)]
    pub kube_config: Option<String>,
    /// override default kubeconfig context (skips in-cluster configuration)
    #[arg(long)]
    pub kube_context: Option<String>,
    /// enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose_logging: bool,
    /// enable trace output (more detailed than verbose, overrides it if present)
    #[arg(long = "trace")]
    pub trace_logging: bool,
}

impl Cli {
    pub fn log_level(&self) -> LogLevel {
        match (self.trace_logging, self.verbose_logging) {
            (true, _) => LogLevel::Trace,
            (false, true) => LogLevel::Verbose,
            (false, false) => LogLevel::Normal,
        }
    }

    pub fn target(&self) -> ReconciliationTarget {
        ReconciliationTarget::new(&self.namespace, &self.daemonset)
    }

    pub fn rule(&self) -> TolerationRule {
        TolerationRule::new(
            &self.toleration_key,
            &self.toleration_value,
            &self.toleration_effect,
        )
    }

    pub fn controller_settings(&self) -> anyhow::Result<ControllerSettings> {
        Ok(ControllerSettingsBuilder::default()
            .resync_interval(Duration::from_secs(self.resync_interval_secs))
            .degraded_after(self.degraded_after)
            .build()?)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn uses_local_config(&self) -> bool {
        self.kube_config.is_some() || self.kube_context.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Normal,
    Verbose,
    Trace,
}

impl LogLevel {
    /// Level for dependencies such as kube and hyper.
    pub fn global_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Normal | LogLevel::Verbose => LevelFilter::Info,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }

    /// Level for the operator's own crates.
    pub fn operator_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Normal => LevelFilter::Info,
            LogLevel::Verbose => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}
