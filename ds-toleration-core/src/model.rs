use std::fmt::Display;

use k8s_openapi::api::core::v1::Toleration;

/// The namespaced DaemonSet a controller instance watches over.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReconciliationTarget {
    pub namespace: String,
    pub name: String,
}

impl ReconciliationTarget {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl Display for ReconciliationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaintEffect {
    #[default]
    NoSchedule,
    PreferNoSchedule,
    NoExecute,
}

impl TaintEffect {
    /// Parses a configured effect, folding anything unrecognized into `NoSchedule`.
    pub fn from_config(effect: &str) -> Self {
        match effect {
            "NoSchedule" => TaintEffect::NoSchedule,
            "PreferNoSchedule" => TaintEffect::PreferNoSchedule,
            "NoExecute" => TaintEffect::NoExecute,
            _ => TaintEffect::NoSchedule,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaintEffect::NoSchedule => "NoSchedule",
            TaintEffect::PreferNoSchedule => "PreferNoSchedule",
            TaintEffect::NoExecute => "NoExecute",
        }
    }
}

impl Display for TaintEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The toleration that has to be present on the target's pod template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TolerationRule {
    pub key: String,
    pub value: String,
    pub effect: TaintEffect,
}

impl TolerationRule {
    pub fn new(key: impl Into<String>, value: impl Into<String>, effect: &str) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            effect: TaintEffect::from_config(effect),
        }
    }

    /// Structural match on key, value and effect. Unset fields on the observed
    /// toleration compare as empty strings, the same way the API server defaults them.
    pub fn matches(&self, toleration: &Toleration) -> bool {
        toleration.key.as_deref().unwrap_or_default() == self.key
            && toleration.value.as_deref().unwrap_or_default() == self.value
            && toleration.effect.as_deref().unwrap_or_default() == self.effect.as_str()
    }

    pub fn to_toleration(&self) -> Toleration {
        Toleration {
            key: Some(self.key.to_owned()),
            value: Some(self.value.to_owned()),
            effect: Some(self.effect.as_str().to_owned()),
            ..Default::default()
        }
    }
}

impl Display for TolerationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}:{}", self.key, self.value, self.effect)
    }
}

/// Payload-free trigger: its presence in the queue means "re-check the target".
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkItem;
