//! MCP tools inspecting the JuiceFS CSI driver.
//!
//! All tools are read-only lookups against the cluster through a
//! [`ClusterApi`]. The central piece is mount pod resolution: finding the
//! pod that serves a persistent volume on a given node.

use cluster::{ClusterApi, ClusterError, Pod, PodSelector};

pub mod cluster;
pub mod kube;
pub mod kubeconfig;
pub mod mount;
pub mod tools;

#[cfg(test)]
mod fake;

pub use tools::register_tools;

/// CSI driver name recorded in JuiceFS persistent volumes.
pub const DRIVER_NAME: &str = "csi.juicefs.com";
/// Label key shared by driver components and mount pods.
pub const POD_TYPE_KEY: &str = "app.kubernetes.io/name";
/// `POD_TYPE_KEY` value of mount pods.
pub const MOUNT_POD_TYPE: &str = "juicefs-mount";
/// Label carrying the resolution key of a mount pod.
pub const UNIQUE_ID_LABEL: &str = "volume-id";
/// Environment variable enabling one shared mount pod per storage class.
pub const SHARE_MOUNT_ENV: &str = "STORAGE_CLASS_SHARE_MOUNT";

/// CSI tool handlers bound to a cluster.
#[derive(Debug)]
pub struct CsiHandler<C> {
    cluster: C,
    sys_namespace: String,
}

impl<C: ClusterApi> CsiHandler<C> {
    /// `sys_namespace` is where the CSI driver and its mount pods run.
    pub fn new(cluster: C, sys_namespace: impl Into<String>) -> Self {
        Self {
            cluster,
            sys_namespace: sys_namespace.into(),
        }
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    pub fn sys_namespace(&self) -> &str {
        &self.sys_namespace
    }

    /// The CSI node pod running on `node`, if any.
    pub async fn csi_node_on(&self, node: &str) -> Result<Option<Pod>, ClusterError> {
        let selector = PodSelector::new()
            .label(POD_TYPE_KEY, "juicefs-csi-driver")
            .label("app", "juicefs-csi-node")
            .on_node(node);
        let pods = self.cluster.list_pods(&self.sys_namespace, &selector).await?;
        Ok(pods.into_iter().next())
    }

    /// Mount pods on `node` labelled with `unique_id`.
    ///
    /// An empty `unique_id` matches every mount pod on the node.
    pub async fn mount_pods_on(&self, node: &str, unique_id: &str) -> Result<Vec<Pod>, ClusterError> {
        let mut selector = PodSelector::new()
            .label(POD_TYPE_KEY, MOUNT_POD_TYPE)
            .on_node(node);
        if !unique_id.is_empty() {
            selector = selector.label(UNIQUE_ID_LABEL, unique_id);
        }
        self.cluster.list_pods(&self.sys_namespace, &selector).await
    }
}
