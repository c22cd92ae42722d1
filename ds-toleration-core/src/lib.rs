pub mod client;
pub mod controller;
pub mod health;
pub mod model;
pub mod queue;
pub mod reconciler;

#[cfg(test)]
mod testing;

pub use client::{ClientError, DaemonSetClient, KubeDaemonSetClient};
pub use controller::{ControllerSettings, ControllerSettingsBuilder, ControllerState, DaemonSetController};
pub use model::{ReconciliationTarget, TaintEffect, TolerationRule, WorkItem};

pub const FIELD_MANAGER: &str = "ds-toleration-operator";
