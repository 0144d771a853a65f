//! Tool implementations for the CSI handler family.

use crate::{
    CsiHandler, DRIVER_NAME,
    cluster::{ClusterApi, NodeStatus, PersistentVolume, Pod, PodStatus},
};
use jfs_mcp::{
    Registry, RegistryError, ToolDescriptor, ToolError,
    args::{default_namespace, positive_integer},
    to_json,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Log lines returned when `tailLines` is not given.
pub const DEFAULT_TAIL_LINES: u64 = 20;

const HANDLE_FLOW: &str = "
To troubleshoot an application pod whose JuiceFS volume fails to mount:
1. Check that the PVC is bound to a JuiceFS PV, using tool get_juicefs_pv_of_app_pod;
2. Check that the mount pod was created and is running, using tool get_mount_pod_by_pv;
3. If the mount pod exists, read its logs, using tool get_log_of_mount_pod or get_log_of_pod;
4. If the mount pod was not created, read the CSI node pod logs, using tool get_csi_node_pod + get_log_of_pod;
";

/// Parameters for looking up the JuiceFS volumes of an application pod.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppPodParams {
    /// Application pod name.
    pub app_name: String,
    /// Namespace of the application pod.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeParams {
    /// Node name.
    pub node_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodParams {
    /// Pod name.
    pub pod_name: String,
    /// Namespace of the pod.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MountPodParams {
    /// Node name.
    pub node_name: String,
    /// PV name.
    pub pv_name: String,
}

/// Parameters for reading mount pod logs.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MountPodLogParams {
    /// Node name.
    pub node_name: String,
    /// PV name.
    pub pv_name: String,
    /// Number of log lines to fetch.
    #[serde(default, deserialize_with = "positive_integer")]
    #[schemars(with = "f64")]
    pub tail_lines: Option<u64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodLogParams {
    /// Pod name.
    pub pod_name: String,
    /// Namespace of the pod.
    pub namespace: String,
    /// Number of log lines to fetch.
    #[serde(default, deserialize_with = "positive_integer")]
    #[schemars(with = "f64")]
    pub tail_lines: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PodWithStatus<'a> {
    name: &'a str,
    namespace: &'a str,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_name: Option<&'a str>,
    status: &'a PodStatus,
}

impl<'a> From<&'a Pod> for PodWithStatus<'a> {
    fn from(pod: &'a Pod) -> Self {
        Self {
            name: &pod.metadata.name,
            namespace: pod.namespace(),
            kind: "Pod",
            node_name: pod.spec.node_name.as_deref(),
            status: &pod.status,
        }
    }
}

#[derive(Debug, Serialize)]
struct NodeWithStatus<'a> {
    name: &'a str,
    kind: &'static str,
    status: &'a NodeStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PvWithStatus<'a> {
    name: &'a str,
    kind: &'static str,
    volume_handle: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    storage_class_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    claim_ref: Option<&'a Value>,
    status: &'a Value,
}

impl<C: ClusterApi> CsiHandler<C> {
    /// JuiceFS PVs used by an application pod.
    ///
    /// Claims that are missing, unbound, or bound to a missing or non-JuiceFS
    /// volume are skipped so that partial results are still returned.
    pub async fn juicefs_pvs_of_app(&self, params: AppPodParams) -> Result<String, ToolError> {
        let pod = self
            .cluster()
            .get_pod(&params.namespace, &params.app_name)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "get app pod"))?;

        let mut pvs: Vec<PersistentVolume> = Vec::new();
        let claims = pod
            .spec
            .volumes
            .iter()
            .filter_map(|v| v.persistent_volume_claim.as_ref());
        for claim in claims {
            let pvc = match self
                .cluster()
                .get_persistent_volume_claim(pod.namespace(), &claim.claim_name)
                .await
            {
                Ok(pvc) => pvc,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(claim = %claim.claim_name, "claim not found, skipping");
                    continue;
                }
                Err(e) => {
                    tracing::error!(claim = %claim.claim_name, error = %e, "get claim");
                    return Err(e.into());
                }
            };
            let Some(volume_name) = pvc.bound_volume() else {
                tracing::debug!(claim = %claim.claim_name, "claim not bound, skipping");
                continue;
            };
            let pv = match self.cluster().get_persistent_volume(volume_name).await {
                Ok(pv) => pv,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(pv = volume_name, "bound volume not found, skipping");
                    continue;
                }
                Err(e) => {
                    tracing::error!(pv = volume_name, error = %e, "get volume");
                    return Err(e.into());
                }
            };
            if pv.csi_source_of(DRIVER_NAME).is_some() {
                pvs.push(pv);
            }
        }

        tracing::debug!(
            pvs = ?pvs.iter().map(|pv| pv.metadata.name.as_str()).collect::<Vec<_>>(),
            "JuiceFS PVs of app pod"
        );
        let summaries: Vec<_> = pvs
            .iter()
            .map(|pv| PvWithStatus {
                name: &pv.metadata.name,
                kind: "PersistentVolume",
                volume_handle: pv
                    .spec
                    .csi
                    .as_ref()
                    .map(|csi| csi.volume_handle.as_str())
                    .unwrap_or_default(),
                storage_class_name: pv.spec.storage_class_name.as_deref(),
                claim_ref: pv.spec.claim_ref.as_ref(),
                status: &pv.status,
            })
            .collect();
        to_json(&summaries)
    }

    pub async fn get_csi_node_pod(&self, params: NodeParams) -> Result<String, ToolError> {
        let csi_node = self
            .csi_node_on(&params.node_name)
            .await?
            .ok_or_else(|| ToolError::NotFound(format!("CSI node on {} not found", params.node_name)))?;
        tracing::debug!(csi_node = %csi_node.metadata.name, "get csi node");
        to_json(&PodWithStatus::from(&csi_node))
    }

    pub async fn get_pod(&self, params: PodParams) -> Result<String, ToolError> {
        let pod = self
            .cluster()
            .get_pod(&params.namespace, &params.pod_name)
            .await?;
        to_json(&pod)
    }

    pub async fn get_node(&self, params: NodeParams) -> Result<String, ToolError> {
        let node = self.cluster().get_node(&params.node_name).await?;
        to_json(&NodeWithStatus {
            name: &node.metadata.name,
            kind: "Node",
            status: &node.status,
        })
    }

    pub async fn get_mount_pod_by_pv(&self, params: MountPodParams) -> Result<String, ToolError> {
        let resolution = self
            .resolve_mount_pods(&params.pv_name, &params.node_name)
            .await?;
        to_json(&resolution.pods)
    }

    /// Logs of the mount pod serving a PV.
    ///
    /// When several pods match, the first one returned by the list call is
    /// used; the API server does not guarantee any particular order. A shared
    /// mount PV without a storage class matches every mount pod on the node,
    /// so no single pod can be picked.
    pub async fn mount_pod_logs(&self, params: MountPodLogParams) -> Result<String, ToolError> {
        let tail = params.tail_lines.unwrap_or(DEFAULT_TAIL_LINES);
        let resolution = self
            .resolve_mount_pods(&params.pv_name, &params.node_name)
            .await?;
        if resolution.unique_id.is_empty() {
            return Err(ToolError::Mismatch(format!(
                "PV {} has no storage class; cannot identify its shared mount pod",
                params.pv_name
            )));
        }
        let mount_pod = resolution.pods.first().ok_or_else(|| {
            tracing::error!(pv = %params.pv_name, node = %params.node_name, "mount pod not found");
            ToolError::NotFound("mount pod not found".into())
        })?;
        self.container_logs(mount_pod, tail).await
    }

    pub async fn pod_logs(&self, params: PodLogParams) -> Result<String, ToolError> {
        let tail = params.tail_lines.unwrap_or(DEFAULT_TAIL_LINES);
        let pod = self
            .cluster()
            .get_pod(&params.namespace, &params.pod_name)
            .await?;
        self.container_logs(&pod, tail).await
    }

    async fn container_logs(&self, pod: &Pod, tail: u64) -> Result<String, ToolError> {
        let name = &pod.metadata.name;
        let container = pod
            .primary_container()
            .ok_or_else(|| ToolError::NotFound(format!("pod {name} has no containers")))?;
        let logs = self
            .cluster()
            .pod_logs(pod.namespace(), name, &container.name, tail)
            .await?;
        tracing::debug!(
            pod = %name,
            namespace = pod.namespace(),
            tail_lines = tail,
            bytes = logs.len(),
            "pod log"
        );
        Ok(logs)
    }
}

/// Register every CSI tool, in advertised order.
pub fn register_tools<C: ClusterApi>(
    registry: &mut Registry,
    handler: CsiHandler<C>,
) -> Result<(), RegistryError> {
    let csi = Arc::new(handler);

    registry.register(
        ToolDescriptor::builder(
            "get_handle_flow",
            "Get the procedure for troubleshooting JuiceFS CSI mount problems",
        )
        .text(HANDLE_FLOW),
    )?;
    registry.register(
        ToolDescriptor::builder(
            "get_juicefs_pv_of_app_pod",
            "Get the JuiceFS PVs used by an application pod",
        )
        .params::<AppPodParams>()
        .handle_with(Arc::clone(&csi), |csi, args| async move {
            csi.juicefs_pvs_of_app(args.decode()?).await
        }),
    )?;
    registry.register(
        ToolDescriptor::builder("get_csi_node_pod", "Get the CSI node pod running on a node")
            .params::<NodeParams>()
            .handle_with(Arc::clone(&csi), |csi, args| async move {
                csi.get_csi_node_pod(args.decode()?).await
            }),
    )?;
    registry.register(
        ToolDescriptor::builder(
            "get_pod",
            "Get a pod by name, including the PVCs it uses, the node it runs on and its status",
        )
        .params::<PodParams>()
        .handle_with(Arc::clone(&csi), |csi, args| async move {
            csi.get_pod(args.decode()?).await
        }),
    )?;
    registry.register(
        ToolDescriptor::builder("get_node", "Get a node by name")
            .params::<NodeParams>()
            .handle_with(Arc::clone(&csi), |csi, args| async move {
                csi.get_node(args.decode()?).await
            }),
    )?;
    registry.register(
        ToolDescriptor::builder(
            "get_mount_pod_by_pv",
            "Get the JuiceFS mount pod serving a PV on a node, including its resources, mount point and image",
        )
        .params::<MountPodParams>()
        .handle_with(Arc::clone(&csi), |csi, args| async move {
            csi.get_mount_pod_by_pv(args.decode()?).await
        }),
    )?;
    registry.register(
        ToolDescriptor::builder(
            "get_log_of_mount_pod",
            "Get the logs of the mount pod serving a PV on a node",
        )
        .params::<MountPodLogParams>()
        .handle_with(Arc::clone(&csi), |csi, args| async move {
            csi.mount_pod_logs(args.decode()?).await
        }),
    )?;
    registry.register(
        ToolDescriptor::builder("get_log_of_pod", "Get the logs of a pod")
            .params::<PodLogParams>()
            .handle_with(csi, |csi, args| async move {
                csi.pod_logs(args.decode()?).await
            }),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        CsiHandler,
        fake::{FakeCluster, MOUNT_IMAGE, app_pod, claim, csi_node, juicefs_pv, mount_pod, node},
        tools::register_tools,
    };
    use jfs_mcp::{Arguments, Registry, ToolError, ToolTable};
    use serde_json::{Value, json};
    use tokio_util::sync::CancellationToken;

    const TOOL_NAMES: [&str; 8] = [
        "get_handle_flow",
        "get_juicefs_pv_of_app_pod",
        "get_csi_node_pod",
        "get_pod",
        "get_node",
        "get_mount_pod_by_pv",
        "get_log_of_mount_pod",
        "get_log_of_pod",
    ];

    fn table(cluster: FakeCluster) -> ToolTable {
        let mut registry = Registry::new();
        register_tools(&mut registry, CsiHandler::new(cluster, "kube-system")).unwrap();
        registry.drain()
    }

    async fn call(table: &ToolTable, name: &str, args: Value) -> Result<String, ToolError> {
        let Value::Object(map) = args else {
            panic!("arguments must be an object");
        };
        table
            .call(name, Arguments::new(map), &CancellationToken::new())
            .await
    }

    fn handler(cluster: FakeCluster) -> CsiHandler<FakeCluster> {
        CsiHandler::new(cluster, "kube-system")
    }

    #[test]
    fn registers_tools_in_order() {
        let table = table(FakeCluster::default());
        let names: Vec<_> = table.iter().map(|t| t.name()).collect();
        assert_eq!(names, TOOL_NAMES);
    }

    #[test]
    fn declares_parameters() {
        let table = table(FakeCluster::default());
        let logs = table.get("get_log_of_mount_pod").unwrap().input_schema();
        assert_eq!(logs["required"], json!(["nodeName", "pvName"]));
        assert_eq!(logs["properties"]["tailLines"]["type"], "number");
        let pod_logs = table.get("get_log_of_pod").unwrap().input_schema();
        assert_eq!(pod_logs["required"], json!(["namespace", "podName"]));
        assert_eq!(
            pod_logs["properties"]["podName"]["description"],
            "Pod name."
        );
        let pod = table.get("get_pod").unwrap().input_schema();
        assert_eq!(pod["required"], json!(["podName"]));
        assert_eq!(pod["properties"]["namespace"]["default"], "default");
    }

    #[test]
    fn registering_twice_is_rejected() {
        let mut registry = Registry::new();
        register_tools(&mut registry, handler(FakeCluster::default())).unwrap();
        let err = register_tools(&mut registry, handler(FakeCluster::default())).unwrap_err();
        assert_eq!(err, jfs_mcp::RegistryError::Duplicate("get_handle_flow".into()));
    }

    #[tokio::test]
    async fn mount_pod_by_pv_end_to_end() {
        let cluster = FakeCluster::default()
            .with_pv(juicefs_pv("pv-1", "vol-abc", "jfs-sc"))
            .with_pod(csi_node("node-a", false))
            .with_pod(mount_pod("jfs-mount-vol-abc", "node-a", "vol-abc"))
            .with_pod(mount_pod("jfs-mount-other", "node-a", "vol-other"))
            .with_pod(mount_pod("jfs-mount-vol-abc-b", "node-b", "vol-abc"));
        let handler = handler(cluster);
        let out = handler
            .get_mount_pod_by_pv(crate::tools::MountPodParams {
                node_name: "node-a".into(),
                pv_name: "pv-1".into(),
            })
            .await
            .unwrap();
        let pods: Vec<Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0]["metadata"]["name"], "jfs-mount-vol-abc");
        assert_eq!(pods[0]["spec"]["nodeName"], "node-a");
        let mount = &pods[0]["spec"]["containers"][0];
        assert_eq!(mount["image"], MOUNT_IMAGE);
        assert_eq!(mount["resources"]["limits"]["memory"], "5Gi");
        assert_eq!(mount["volumeMounts"][0]["mountPath"], "/jfs");

        let selector = handler.cluster().list_calls().pop().unwrap();
        assert_eq!(
            selector.label_selector(),
            "app.kubernetes.io/name=juicefs-mount,volume-id=vol-abc"
        );
        assert_eq!(selector.field_selector(), "spec.nodeName=node-a");
    }

    #[tokio::test]
    async fn empty_mount_pod_list_is_success() {
        let cluster = FakeCluster::default()
            .with_pv(juicefs_pv("pv-1", "vol-abc", "jfs-sc"))
            .with_pod(csi_node("node-a", false));
        let table = table(cluster);
        let out = call(
            &table,
            "get_mount_pod_by_pv",
            json!({"pvName": "pv-1", "nodeName": "node-a"}),
        )
        .await
        .unwrap();
        assert_eq!(serde_json::from_str::<Vec<Value>>(&out).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn mount_pod_logs_default_to_twenty_lines() {
        let cluster = FakeCluster::default()
            .with_pv(juicefs_pv("pv-1", "vol-abc", "jfs-sc"))
            .with_pod(csi_node("node-a", false))
            .with_pod(mount_pod("jfs-mount-vol-abc", "node-a", "vol-abc"));
        let handler = handler(cluster);
        let logs = handler
            .mount_pod_logs(crate::tools::MountPodLogParams {
                node_name: "node-a".into(),
                pv_name: "pv-1".into(),
                tail_lines: None,
            })
            .await
            .unwrap();
        assert_eq!(logs, "20 lines of kube-system/jfs-mount-vol-abc/jfs-mount");
        let requests = handler.cluster().log_calls();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tail_lines, 20);
        assert_eq!(requests[0].container, "jfs-mount");
    }

    #[tokio::test]
    async fn mount_pod_logs_without_mount_pod_fail() {
        let cluster = FakeCluster::default()
            .with_pv(juicefs_pv("pv-1", "vol-abc", "jfs-sc"))
            .with_pod(csi_node("node-a", false));
        let table = table(cluster);
        let err = call(
            &table,
            "get_log_of_mount_pod",
            json!({"pvName": "pv-1", "nodeName": "node-a", "tailLines": 5}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(ref m) if m == "mount pod not found"));
    }

    #[tokio::test]
    async fn shared_mount_logs_need_storage_class() {
        let mut pv = juicefs_pv("pv-1", "vol-abc", "jfs-sc");
        pv.spec.storage_class_name = None;
        let cluster = FakeCluster::default()
            .with_pv(pv)
            .with_pod(csi_node("node-a", true))
            .with_pod(mount_pod("jfs-mount-a", "node-a", "sc-a"))
            .with_pod(mount_pod("jfs-mount-b", "node-a", "sc-b"));
        let table = table(cluster);
        let err = call(
            &table,
            "get_log_of_mount_pod",
            json!({"pvName": "pv-1", "nodeName": "node-a"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::Mismatch(ref m) if m.contains("no storage class")));
    }

    #[tokio::test]
    async fn pod_logs_honour_tail_lines() {
        let cluster = FakeCluster::default().with_pod(app_pod("web-0", "shop", &[]));
        let handler = handler(cluster);
        let logs = handler
            .pod_logs(crate::tools::PodLogParams {
                pod_name: "web-0".into(),
                namespace: "shop".into(),
                tail_lines: Some(100),
            })
            .await
            .unwrap();
        assert_eq!(logs, "100 lines of shop/web-0/app");
    }

    #[tokio::test]
    async fn pod_logs_without_tail_lines_request_twenty() {
        let cluster = FakeCluster::default().with_pod(app_pod("web-0", "shop", &[]));
        let table = table(cluster);
        let logs = call(
            &table,
            "get_log_of_pod",
            json!({"podName": "web-0", "namespace": "shop", "tailLines": "many"}),
        )
        .await
        .unwrap();
        assert_eq!(logs, "20 lines of shop/web-0/app");
    }

    #[tokio::test]
    async fn missing_argument_fails_before_any_call() {
        let cluster = FakeCluster::default();
        let table = table(cluster);
        let err = call(&table, "get_mount_pod_by_pv", json!({"pvName": "pv-1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(ref m) if m.contains("nodeName")));

        let err = call(&table, "get_log_of_pod", json!({"podName": "web-0"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(ref m) if m.contains("namespace")));
    }

    #[tokio::test]
    async fn app_pod_fan_out_skips_unbound_claims() {
        let cluster = FakeCluster::default()
            .with_pod(app_pod("web-0", "default", &["data-1", "data-2", "data-3"]))
            .with_pvc(claim("data-1", "default", Some("pv-1")))
            .with_pvc(claim("data-2", "default", None))
            .with_pvc(claim("data-3", "default", Some("pv-3")))
            .with_pv(juicefs_pv("pv-1", "vol-1", "jfs-sc"))
            .with_pv(juicefs_pv("pv-3", "vol-3", "jfs-sc"));
        let table = table(cluster);
        let out = call(&table, "get_juicefs_pv_of_app_pod", json!({"appName": "web-0"}))
            .await
            .unwrap();
        let pvs: Vec<Value> = serde_json::from_str(&out).unwrap();
        let names: Vec<_> = pvs.iter().map(|pv| pv["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["pv-1", "pv-3"]);
        assert_eq!(pvs[1]["volumeHandle"], "vol-3");
    }

    #[tokio::test]
    async fn app_pod_fan_out_skips_missing_links_and_other_drivers() {
        let mut foreign = juicefs_pv("pv-ebs", "vol-ebs", "gp3");
        if let Some(csi) = foreign.spec.csi.as_mut() {
            csi.driver = "ebs.csi.aws.com".into();
        }
        let cluster = FakeCluster::default()
            .with_pod(app_pod("web-0", "shop", &["gone", "dangling", "ebs", "jfs"]))
            .with_pvc(claim("dangling", "shop", Some("pv-missing")))
            .with_pvc(claim("ebs", "shop", Some("pv-ebs")))
            .with_pvc(claim("jfs", "shop", Some("pv-jfs")))
            .with_pv(foreign)
            .with_pv(juicefs_pv("pv-jfs", "vol-jfs", "jfs-sc"));
        let handler = handler(cluster);
        let out = handler
            .juicefs_pvs_of_app(crate::tools::AppPodParams {
                app_name: "web-0".into(),
                namespace: "shop".into(),
            })
            .await
            .unwrap();
        let pvs: Vec<Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(pvs.len(), 1);
        assert_eq!(pvs[0]["name"], "pv-jfs");
    }

    #[tokio::test]
    async fn app_pod_fan_out_propagates_upstream_errors() {
        let cluster = FakeCluster::default()
            .with_pod(app_pod("web-0", "default", &["data-1"]))
            .failing_claim("data-1");
        let table = table(cluster);
        let err = call(&table, "get_juicefs_pv_of_app_pod", json!({"appName": "web-0"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Upstream(_)));
    }

    #[tokio::test]
    async fn get_pod_defaults_namespace() {
        let cluster = FakeCluster::default().with_pod(app_pod("web-0", "default", &["data"]));
        let table = table(cluster);
        let out = call(&table, "get_pod", json!({"podName": "web-0"})).await.unwrap();
        let pod: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(pod["metadata"]["name"], "web-0");
        assert_eq!(
            pod["spec"]["volumes"][0]["persistentVolumeClaim"]["claimName"],
            "data"
        );

        assert_eq!(pod["spec"]["containers"][0]["name"], "app");

        let err = call(&table, "get_pod", json!({"podName": "web-0", "namespace": "other"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn get_pod_reports_unmodelled_fields() {
        let mut pod = app_pod("web-0", "default", &[]);
        pod.metadata
            .extra
            .insert("annotations".into(), json!({"team": "storage"}));
        pod.spec
            .extra
            .insert("tolerations".into(), json!([{"operator": "Exists"}]));
        pod.status.extra.insert("hostIP".into(), json!("192.168.1.5"));
        let table = table(FakeCluster::default().with_pod(pod));
        let out = call(&table, "get_pod", json!({"podName": "web-0"})).await.unwrap();
        let pod: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(pod["metadata"]["annotations"]["team"], "storage");
        assert_eq!(pod["spec"]["tolerations"][0]["operator"], "Exists");
        assert_eq!(pod["status"]["hostIP"], "192.168.1.5");
    }

    #[tokio::test]
    async fn get_node_and_csi_node() {
        let cluster = FakeCluster::default()
            .with_node(node("node-a"))
            .with_pod(csi_node("node-a", true));
        let table = table(cluster);
        let out = call(&table, "get_node", json!({"nodeName": "node-a"})).await.unwrap();
        let node: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(node["kind"], "Node");
        assert_eq!(node["status"]["capacity"]["cpu"], "8");

        let out = call(&table, "get_csi_node_pod", json!({"nodeName": "node-a"}))
            .await
            .unwrap();
        let pod: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(pod["name"], "juicefs-csi-node-node-a");

        let err = call(&table, "get_csi_node_pod", json!({"nodeName": "node-b"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(ref m) if m == "CSI node on node-b not found"));
    }

    #[tokio::test]
    async fn handle_flow_is_static() {
        let table = table(FakeCluster::default());
        let out = call(&table, "get_handle_flow", json!({})).await.unwrap();
        assert!(out.contains("get_mount_pod_by_pv"));
    }
}
