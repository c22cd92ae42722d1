use std::sync::{Arc, Mutex, MutexGuard};

use k8s_openapi::api::{
    apps::v1::{DaemonSet, DaemonSetSpec},
    core::v1::{PodSpec, PodTemplateSpec, Toleration},
};
use kube::{core::ObjectMeta, error::ErrorResponse};

use crate::client::{ClientError, DaemonSetClient};

pub const NAMESPACE: &str = "kube-system";
pub const NAME: &str = "vsphere-csi-node";

pub fn toleration(key: &str, value: &str, effect: &str) -> Toleration {
    Toleration {
        key: Some(key.to_owned()),
        value: Some(value.to_owned()),
        effect: Some(effect.to_owned()),
        ..Default::default()
    }
}

pub fn daemon_set(tolerations: Vec<Toleration>) -> DaemonSet {
    DaemonSet {
        metadata: ObjectMeta {
            name: Some(NAME.to_owned()),
            namespace: Some(NAMESPACE.to_owned()),
            ..Default::default()
        },
        spec: Some(DaemonSetSpec {
            template: PodTemplateSpec {
                spec: Some(PodSpec {
                    tolerations: Some(tolerations),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn api_error(code: u16) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_owned(),
        message: "injected failure".to_owned(),
        reason: "Testing".to_owned(),
        code,
    })
}

#[derive(Debug, Default)]
pub struct ClusterState {
    pub daemon_set: Option<DaemonSet>,
    pub get_calls: usize,
    pub update_calls: usize,
    pub fail_gets_with: Option<u16>,
    pub fail_updates_with: Option<u16>,
    pub panic_on_get_call: Option<usize>,
}

/// In-memory stand-in for the API server that records every call.
#[derive(Debug, Clone, Default)]
pub struct RecordingClient {
    state: Arc<Mutex<ClusterState>>,
}

impl RecordingClient {
    pub fn with(daemon_set: Option<DaemonSet>) -> Self {
        let client = Self::default();
        client.state().daemon_set = daemon_set;

        client
    }

    pub fn state(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap()
    }

    pub fn tolerations(&self) -> Vec<Toleration> {
        self.state()
            .daemon_set
            .as_ref()
            .and_then(|ds| ds.spec.as_ref())
            .and_then(|spec| spec.template.spec.as_ref())
            .and_then(|pod| pod.tolerations.clone())
            .unwrap_or_default()
    }

    pub fn get_calls(&self) -> usize {
        self.state().get_calls
    }

    pub fn update_calls(&self) -> usize {
        self.state().update_calls
    }
}

impl DaemonSetClient for RecordingClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<DaemonSet, ClientError> {
        let mut state = self.state();
        state.get_calls += 1;

        if state.panic_on_get_call == Some(state.get_calls) {
            // release the lock first so the test can still inspect the state
            drop(state);
            panic!("injected panic while fetching the DaemonSet");
        }

        if let Some(code) = state.fail_gets_with {
            return Err(api_error(code).into());
        }

        state
            .daemon_set
            .clone()
            .filter(|ds| {
                ds.metadata.namespace.as_deref() == Some(namespace)
                    && ds.metadata.name.as_deref() == Some(name)
            })
            .ok_or(ClientError::NotFound)
    }

    async fn update(
        &self,
        _namespace: &str,
        daemon_set: &DaemonSet,
    ) -> Result<DaemonSet, ClientError> {
        let mut state = self.state();
        state.update_calls += 1;

        if let Some(code) = state.fail_updates_with {
            return Err(api_error(code).into());
        }

        state.daemon_set = Some(daemon_set.clone());

        Ok(daemon_set.clone())
    }
}
