//! In-memory [`ClusterApi`] recording the calls made against it.

use crate::{
    DRIVER_NAME, MOUNT_POD_TYPE, POD_TYPE_KEY, SHARE_MOUNT_ENV, UNIQUE_ID_LABEL,
    cluster::{
        ClaimSource, ClusterApi, ClusterError, Container, CsiSource, EnvVar, Node, ObjectMeta,
        PersistentVolume, PersistentVolumeClaim, PersistentVolumeClaimSpec,
        PersistentVolumeClaimStatus, PersistentVolumeSpec, Pod, PodSelector, PodSpec, Volume,
    },
};
use std::{collections::BTreeMap, sync::Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRequest {
    pub namespace: String,
    pub name: String,
    pub container: String,
    pub tail_lines: u64,
}

#[derive(Debug, Default)]
pub struct FakeCluster {
    pods: Vec<Pod>,
    nodes: Vec<Node>,
    pvs: Vec<PersistentVolume>,
    pvcs: Vec<PersistentVolumeClaim>,
    failing_claims: Vec<String>,
    list_calls: Mutex<Vec<PodSelector>>,
    log_calls: Mutex<Vec<LogRequest>>,
}

impl FakeCluster {
    pub fn with_pod(mut self, pod: Pod) -> Self {
        self.pods.push(pod);
        self
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_pv(mut self, pv: PersistentVolume) -> Self {
        self.pvs.push(pv);
        self
    }

    pub fn with_pvc(mut self, pvc: PersistentVolumeClaim) -> Self {
        self.pvcs.push(pvc);
        self
    }

    /// Make lookups of this claim fail with a server error.
    pub fn failing_claim(mut self, name: &str) -> Self {
        self.failing_claims.push(name.to_owned());
        self
    }

    pub fn list_calls(&self) -> Vec<PodSelector> {
        self.list_calls.lock().unwrap().clone()
    }

    pub fn log_calls(&self) -> Vec<LogRequest> {
        self.log_calls.lock().unwrap().clone()
    }

    fn matches(pod: &Pod, namespace: &str, selector: &PodSelector) -> bool {
        pod.namespace() == namespace
            && selector
                .labels
                .iter()
                .all(|(k, v)| pod.metadata.labels.get(k) == Some(v))
            && selector.fields.iter().all(|(k, v)| match k.as_str() {
                "spec.nodeName" => pod.spec.node_name.as_ref() == Some(v),
                "metadata.name" => &pod.metadata.name == v,
                _ => false,
            })
    }
}

fn not_found(kind: &'static str, name: &str) -> ClusterError {
    ClusterError::NotFound {
        kind,
        name: name.to_owned(),
    }
}

impl ClusterApi for FakeCluster {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError> {
        self.pods
            .iter()
            .find(|p| p.metadata.name == name && p.namespace() == namespace)
            .cloned()
            .ok_or_else(|| not_found("Pod", name))
    }

    async fn get_node(&self, name: &str) -> Result<Node, ClusterError> {
        self.nodes
            .iter()
            .find(|n| n.metadata.name == name)
            .cloned()
            .ok_or_else(|| not_found("Node", name))
    }

    async fn get_persistent_volume(&self, name: &str) -> Result<PersistentVolume, ClusterError> {
        self.pvs
            .iter()
            .find(|pv| pv.metadata.name == name)
            .cloned()
            .ok_or_else(|| not_found("PersistentVolume", name))
    }

    async fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<PersistentVolumeClaim, ClusterError> {
        if self.failing_claims.iter().any(|c| c == name) {
            return Err(ClusterError::Api {
                kind: "PersistentVolumeClaim",
                name: name.to_owned(),
                status: 500,
                message: "etcdserver: request timed out".into(),
            });
        }
        self.pvcs
            .iter()
            .find(|c| c.metadata.name == name && c.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .ok_or_else(|| not_found("PersistentVolumeClaim", name))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &PodSelector,
    ) -> Result<Vec<Pod>, ClusterError> {
        self.list_calls.lock().unwrap().push(selector.clone());
        Ok(self
            .pods
            .iter()
            .filter(|p| Self::matches(p, namespace, selector))
            .cloned()
            .collect())
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
        tail_lines: u64,
    ) -> Result<String, ClusterError> {
        self.log_calls.lock().unwrap().push(LogRequest {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            container: container.to_owned(),
            tail_lines,
        });
        Ok(format!("{tail_lines} lines of {namespace}/{name}/{container}"))
    }
}

pub fn meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: name.to_owned(),
        namespace: namespace.map(str::to_owned),
        ..Default::default()
    }
}

pub fn container(name: &str) -> Container {
    Container {
        name: name.to_owned(),
        ..Default::default()
    }
}

pub fn juicefs_pv(name: &str, handle: &str, storage_class: &str) -> PersistentVolume {
    PersistentVolume {
        metadata: meta(name, None),
        spec: PersistentVolumeSpec {
            csi: Some(CsiSource {
                driver: DRIVER_NAME.into(),
                volume_handle: handle.into(),
            }),
            storage_class_name: Some(storage_class.into()),
            ..Default::default()
        },
        status: serde_json::json!({"phase": "Bound"}),
    }
}

pub fn csi_node(node: &str, share_mount: bool) -> Pod {
    let mut plugin = container("juicefs-plugin");
    if share_mount {
        plugin.env.push(EnvVar {
            name: SHARE_MOUNT_ENV.into(),
            value: Some("true".into()),
        });
    }
    let mut metadata = meta(&format!("juicefs-csi-node-{node}"), Some("kube-system"));
    metadata.labels = BTreeMap::from([
        (POD_TYPE_KEY.to_owned(), "juicefs-csi-driver".to_owned()),
        ("app".to_owned(), "juicefs-csi-node".to_owned()),
    ]);
    Pod {
        metadata,
        spec: PodSpec {
            node_name: Some(node.into()),
            containers: vec![plugin],
            ..Default::default()
        },
        ..Default::default()
    }
}

pub const MOUNT_IMAGE: &str = "juicedata/mount:ce-v1.2.0";

pub fn mount_pod(name: &str, node: &str, unique_id: &str) -> Pod {
    let mut metadata = meta(name, Some("kube-system"));
    metadata.labels = BTreeMap::from([
        (POD_TYPE_KEY.to_owned(), MOUNT_POD_TYPE.to_owned()),
        (UNIQUE_ID_LABEL.to_owned(), unique_id.to_owned()),
    ]);
    let mount = Container {
        image: Some(MOUNT_IMAGE.into()),
        resources: Some(serde_json::json!({"limits": {"cpu": "2", "memory": "5Gi"}})),
        volume_mounts: vec![serde_json::json!({
            "name": "jfs-dir",
            "mountPath": "/jfs",
            "mountPropagation": "Bidirectional"
        })],
        ..container("jfs-mount")
    };
    Pod {
        metadata,
        spec: PodSpec {
            node_name: Some(node.into()),
            containers: vec![mount],
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn app_pod(name: &str, namespace: &str, claims: &[&str]) -> Pod {
    Pod {
        metadata: meta(name, Some(namespace)),
        spec: PodSpec {
            node_name: Some("node-a".into()),
            containers: vec![container("app")],
            volumes: claims
                .iter()
                .map(|claim| Volume {
                    name: format!("vol-{claim}"),
                    persistent_volume_claim: Some(ClaimSource {
                        claim_name: (*claim).to_owned(),
                    }),
                })
                .chain(std::iter::once(Volume {
                    name: "config".into(),
                    persistent_volume_claim: None,
                }))
                .collect(),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn claim(name: &str, namespace: &str, bound_to: Option<&str>) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: meta(name, Some(namespace)),
        spec: PersistentVolumeClaimSpec {
            volume_name: bound_to.map(str::to_owned),
            storage_class_name: None,
        },
        status: PersistentVolumeClaimStatus {
            phase: Some(if bound_to.is_some() { "Bound" } else { "Pending" }.into()),
        },
    }
}

pub fn node(name: &str) -> Node {
    let mut node = Node {
        metadata: meta(name, None),
        ..Default::default()
    };
    node.status.capacity.insert("cpu".into(), "8".into());
    node
}
