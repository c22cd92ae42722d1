use std::future::Future;

use k8s_openapi::api::apps::v1::DaemonSet;
use kube::{api::PostParams, Api, Client};
use thiserror::Error;

use crate::FIELD_MANAGER;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("DaemonSet was not found!")]
    NotFound,
    #[error("DaemonSet is missing its name!")]
    MissingObjectMetadata,
    #[error("Kubernetes API call failed! Reason: {}", .0)]
    KubeApiError(kube::Error),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound)
    }
}

impl From<kube::Error> for ClientError {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(response) if response.code == 404 => ClientError::NotFound,
            other => ClientError::KubeApiError(other),
        }
    }
}

/// The two DaemonSet calls the reconciler needs from the cluster.
pub trait DaemonSetClient: Send + Sync {
    fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<DaemonSet, ClientError>> + Send;

    fn update(
        &self,
        namespace: &str,
        daemon_set: &DaemonSet,
    ) -> impl Future<Output = Result<DaemonSet, ClientError>> + Send;
}

/// [`DaemonSetClient`] backed by an authenticated [`kube::Client`].
#[derive(Clone)]
pub struct KubeDaemonSetClient {
    client: Client,
}

impl KubeDaemonSetClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<DaemonSet> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl DaemonSetClient for KubeDaemonSetClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<DaemonSet, ClientError> {
        Ok(self.api(namespace).get(name).await?)
    }

    async fn update(
        &self,
        namespace: &str,
        daemon_set: &DaemonSet,
    ) -> Result<DaemonSet, ClientError> {
        let name = daemon_set
            .metadata
            .name
            .as_deref()
            .ok_or(ClientError::MissingObjectMetadata)?;

        let post_params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_owned()),
            ..Default::default()
        };

        // full replace, so a stale resourceVersion gets rejected by the API server
        Ok(self
            .api(namespace)
            .replace(name, &post_params, daemon_set)
            .await?)
    }
}
