//! Cluster capability adapter.
//!
//! [`ClusterApi`] is the narrow read-only surface of the Kubernetes API used
//! by the CSI tools. The resource types below name the fields those tools
//! read. Pods keep every other field of the API object in `extra` so that
//! they are reported back unchanged.

use jfs_mcp::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, future::Future};
use thiserror::Error;

/// Errors from the cluster API.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// The object does not exist.
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },
    /// The API server answered with a non-success status.
    #[error("{kind} {name}: API server returned {status}: {message}")]
    Api {
        kind: &'static str,
        name: String,
        status: u16,
        message: String,
    },
    /// The API server could not be reached.
    #[error("request to API server failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The name cannot address a single object in a request path.
    #[error("invalid {kind} name {name:?}")]
    InvalidName { kind: &'static str, name: String },
    /// The response body was not the expected object.
    #[error("cannot decode {kind}: {source}")]
    Decode {
        kind: &'static str,
        source: serde_json::Error,
    },
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<ClusterError> for ToolError {
    fn from(e: ClusterError) -> Self {
        match e {
            ClusterError::NotFound { .. } => ToolError::NotFound(e.to_string()),
            ClusterError::InvalidName { .. } => ToolError::InvalidArguments(e.to_string()),
            other => ToolError::Upstream(other.to_string()),
        }
    }
}

/// Exact-match label and field selector for listing pods.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodSelector {
    pub labels: BTreeMap<String, String>,
    pub fields: BTreeMap<String, String>,
}

impl PodSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Pods scheduled on `node`.
    pub fn on_node(self, node: impl Into<String>) -> Self {
        self.field("spec.nodeName", node)
    }

    /// `labelSelector` query value, e.g. `app=x,tier=y`.
    pub fn label_selector(&self) -> String {
        join_selector(&self.labels)
    }

    /// `fieldSelector` query value, e.g. `spec.nodeName=node-a`.
    pub fn field_selector(&self) -> String {
        join_selector(&self.fields)
    }
}

fn join_selector(pairs: &BTreeMap<String, String>) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Read-only view of the cluster.
pub trait ClusterApi: Send + Sync + 'static {
    fn get_pod(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<Pod, ClusterError>> + Send;

    fn get_node(&self, name: &str) -> impl Future<Output = Result<Node, ClusterError>> + Send;

    fn get_persistent_volume(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<PersistentVolume, ClusterError>> + Send;

    fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<PersistentVolumeClaim, ClusterError>> + Send;

    /// List pods in `namespace` matching every label and field of `selector`.
    fn list_pods(
        &self,
        namespace: &str,
        selector: &PodSelector,
    ) -> impl Future<Output = Result<Vec<Pod>, ClusterError>> + Send;

    /// Fetch the last `tail_lines` lines of a container's log.
    fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
        tail_lines: u64,
    ) -> impl Future<Output = Result<String, ClusterError>> + Send;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Pod {
    /// The first container, which both the CSI node pod and mount pods use
    /// as their main process.
    pub fn primary_container(&self) -> Option<&Container> {
        self.spec.containers.first()
    }

    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or("default")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<ClaimSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSource {
    pub claim_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub container_statuses: Vec<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodList {
    #[serde(default)]
    pub items: Vec<Pod>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: NodeStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    #[serde(default)]
    pub capacity: BTreeMap<String, String>,
    #[serde(default)]
    pub allocatable: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistentVolume {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PersistentVolumeSpec,
    #[serde(default)]
    pub status: Value,
}

impl PersistentVolume {
    /// The CSI source if the volume is provisioned by `driver`.
    pub fn csi_source_of(&self, driver: &str) -> Option<&CsiSource> {
        self.spec.csi.as_ref().filter(|csi| csi.driver == driver)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csi: Option<CsiSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub capacity: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_ref: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsiSource {
    pub driver: String,
    #[serde(default)]
    pub volume_handle: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistentVolumeClaim {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PersistentVolumeClaimSpec,
    #[serde(default)]
    pub status: PersistentVolumeClaimStatus,
}

impl PersistentVolumeClaim {
    /// Name of the bound volume, if the claim is bound.
    pub fn bound_volume(&self) -> Option<&str> {
        if self.status.phase.as_deref() != Some("Bound") {
            return None;
        }
        self.spec.volume_name.as_deref().filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistentVolumeClaimStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}
