//! Mount pod resolution.
//!
//! A mount pod is labelled with the volume handle of the PV it serves. When
//! the CSI node runs with `STORAGE_CLASS_SHARE_MOUNT`, one mount pod serves
//! every volume of a storage class and is labelled with the class name
//! instead.

use crate::{
    CsiHandler, DRIVER_NAME, SHARE_MOUNT_ENV,
    cluster::{ClusterApi, PersistentVolume, Pod},
};
use jfs_mcp::ToolError;

/// Outcome of resolving the mount pods of a PV on a node.
#[derive(Debug, Clone)]
pub struct MountResolution {
    /// Label value the mount pods were looked up by.
    pub unique_id: String,
    /// Matching pods in list order.
    pub pods: Vec<Pod>,
}

/// Whether the CSI node pod runs in shared mount mode.
pub fn shares_mount_by_storage_class(csi_node: &Pod) -> bool {
    csi_node
        .primary_container()
        .is_some_and(|c| c.env.iter().any(|v| v.name == SHARE_MOUNT_ENV))
}

/// Label value identifying the mount pod of `pv`.
///
/// Returns `None` when `pv` is not provisioned by the JuiceFS driver.
pub fn resolution_key(pv: &PersistentVolume, csi_node: &Pod) -> Option<String> {
    let csi = pv.csi_source_of(DRIVER_NAME)?;
    if shares_mount_by_storage_class(csi_node) {
        Some(pv.spec.storage_class_name.clone().unwrap_or_default())
    } else {
        Some(csi.volume_handle.clone())
    }
}

impl<C: ClusterApi> CsiHandler<C> {
    /// Find the mount pods serving `pv_name` on `node_name`.
    pub async fn resolve_mount_pods(
        &self,
        pv_name: &str,
        node_name: &str,
    ) -> Result<MountResolution, ToolError> {
        let pv = self.cluster().get_persistent_volume(pv_name).await?;
        if pv.csi_source_of(DRIVER_NAME).is_none() {
            tracing::error!(pv = pv_name, "not a JuiceFS PV");
            return Err(ToolError::Mismatch(format!("PV {pv_name} is not a JuiceFS PV")));
        }

        let csi_node = self.csi_node_on(node_name).await?.ok_or_else(|| {
            tracing::error!(node = node_name, "CSI node pod not found");
            ToolError::NotFound(format!("CSI node on {node_name} not found"))
        })?;

        let unique_id = resolution_key(&pv, &csi_node).unwrap_or_default();
        if unique_id.is_empty() {
            tracing::warn!(
                pv = pv_name,
                node = node_name,
                "PV has no storage class in share mode; matching every mount pod on the node"
            );
        }
        let pods = self.mount_pods_on(node_name, &unique_id).await?;
        tracing::debug!(
            pv = pv_name,
            node = node_name,
            unique_id = %unique_id,
            mount_pods = ?pods.iter().map(|p| p.metadata.name.as_str()).collect::<Vec<_>>(),
            "resolved mount pods"
        );
        Ok(MountResolution { unique_id, pods })
    }
}
