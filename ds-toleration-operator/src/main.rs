use std::{panic, process::exit};

use anyhow::Context;
use clap::Parser;
use ds_toleration_core::{DaemonSetController, KubeDaemonSetClient};
use env_logger::Target;
use log::{error, info};
use tokio_util::sync::CancellationToken;

use crate::{
    cli::{Cli, LogLevel},
    kubernetes::create_client,
    signals::{handle_shutdown_signals, termination_signals},
};

mod cli;
mod kubernetes;
mod signals;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    configure_logger(&cli);
    install_panic_logger();

    info!(
        "Starting DaemonSet toleration operator with config: namespace={}, daemonset={}, toleration={}",
        cli.namespace,
        cli.daemonset,
        cli.rule()
    );

    let signals = termination_signals().context("Couldn't listen for termination signals!")?;

    let settings = cli
        .controller_settings()
        .context("Invalid controller settings!")?;
    let client = create_client(&cli)
        .await
        .context("Couldn't initialize k8s API client!")?;

    let controller = DaemonSetController::new(
        KubeDaemonSetClient::new(client),
        cli.target(),
        cli.rule(),
        settings,
    );

    let stop = CancellationToken::new();
    let shutdown = handle_shutdown_signals(signals, stop.clone(), cli.shutdown_timeout());
    tokio::spawn(async move {
        if let Some(code) = shutdown.await.exit_code() {
            exit(code);
        }
    });

    info!("DaemonSet toleration controller is running. Press Ctrl+C to stop.");
    controller.run(stop).await;

    Ok(())
}

const OPERATOR_CRATES: [&str; 2] = ["ds_toleration_core", "ds_toleration_operator"];

fn configure_logger(cli: &Cli) {
    let log_level = cli.log_level();
    let mut logger = env_logger::builder();

    logger
        .default_format()
        .format_module_path(log_level == LogLevel::Trace)
        .target(Target::Stderr)
        .filter_level(log_level.global_filter());

    for module in OPERATOR_CRATES {
        logger.filter_module(module, log_level.operator_filter());
    }

    logger.parse_default_env().init();
}

/// Routes panics through the logger. The process keeps running on its remaining tasks.
fn install_panic_logger() {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        error!("Unexpected runtime failure! {info}");
        default_hook(info);
    }));
}
