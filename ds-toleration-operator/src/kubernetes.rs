use anyhow::Context;
use kube::{
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config,
};
use log::{info, warn};

use crate::cli::Cli;

/// Prefers the in-cluster service account, falling back to the local kubeconfig.
/// An explicit kubeconfig path or context skips the in-cluster attempt.
pub async fn create_client(cli: &Cli) -> anyhow::Result<Client> {
    let config = if cli.uses_local_config() {
        local_config(cli).await?
    } else {
        match Config::incluster() {
            Ok(config) => {
                info!("Using in-cluster configuration");
                config
            }
            Err(err) => {
                warn!("Failed to create in-cluster config, falling back to kubeconfig: {err}");
                local_config(cli).await?
            }
        }
    };

    Client::try_from(config).context("Couldn't create k8s API client from the configuration!")
}

async fn local_config(cli: &Cli) -> anyhow::Result<Config> {
    let options = kubeconfig_options(cli);

    let Some(path) = cli.kube_config.as_deref() else {
        info!("Using the default kubeconfig");
        return Config::from_kubeconfig(&options)
            .await
            .context("No usable kubeconfig found!");
    };

    info!("Using kubeconfig at '{path}'");
    let kubeconfig = Kubeconfig::read_from(path)
        .with_context(|| format!("Couldn't read kubeconfig from '{path}'!"))?;

    Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .with_context(|| format!("Kubeconfig at '{path}' is unusable!"))
}

fn kubeconfig_options(cli: &Cli) -> KubeConfigOptions {
    KubeConfigOptions {
        context: cli.kube_context.clone(),
        ..Default::default()
    }
}
