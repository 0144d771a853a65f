//! Tool implementations for the JuiceFS handler family.

use crate::{
    JuiceFsHandler, docs,
    exec::{ExecError, Executor},
};
use jfs_mcp::{
    Registry, RegistryError, ToolDescriptor, ToolError, args::positive_integer,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::{path::Path, sync::Arc, time::Duration};

/// Sampling window when `interval` is not given, in seconds.
pub const DEFAULT_INTERVAL_SECS: u64 = 3;

/// Process name of a running JuiceFS client.
const CLIENT_PROCESS: &str = "juicefs";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MountpointParams {
    /// Mount point.
    pub mountpoint: String,
}

/// Parameters for sampling a mount point for a fixed window.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SampleParams {
    /// Mount point.
    pub mountpoint: String,
    /// Sampling window in seconds.
    #[serde(default, deserialize_with = "positive_integer")]
    #[schemars(with = "f64")]
    pub interval: Option<u64>,
}

impl SampleParams {
    fn window(&self) -> Duration {
        Duration::from_secs(self.interval.unwrap_or(DEFAULT_INTERVAL_SECS))
    }
}

fn matching_lines(text: &str, keep: impl Fn(&str) -> bool) -> String {
    text.lines().filter(|line| keep(line)).collect::<Vec<_>>().join("\n")
}

impl<E: Executor> JuiceFsHandler<E> {
    /// JuiceFS entries of `df`; empty when nothing is mounted.
    pub async fn find_mountpoint(&self) -> Result<String, ToolError> {
        let out = self
            .exec()
            .run("df", &[], None)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "exec df"))?;
        let mounts = matching_lines(&out, |line| line.contains("JuiceFS"));
        tracing::debug!(mounts = %mounts, "find mountpoint");
        Ok(mounts)
    }

    /// Command lines of the JuiceFS clients serving `mountpoint`.
    pub async fn mount_options(&self, params: MountpointParams) -> Result<String, ToolError> {
        let out = self
            .exec()
            .run("ps", &["-ef"], None)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "exec ps"))?;
        let clients = matching_lines(&out, |line| {
            line.contains(CLIENT_PROCESS) && line.contains(params.mountpoint.as_str())
        });
        tracing::debug!(mountpoint = %params.mountpoint, clients = %clients, "mount options");
        Ok(clients)
    }

    pub async fn bench(&self, params: MountpointParams) -> Result<String, ToolError> {
        tracing::debug!(mountpoint = %params.mountpoint, "bench");
        self.exec()
            .run(self.binary(), &["bench", params.mountpoint.as_str()], None)
            .await
            .map_err(|e| {
                tracing::error!(mountpoint = %params.mountpoint, error = %e, "exec bench");
                e.into()
            })
    }

    pub async fn stats(&self, params: SampleParams) -> Result<String, ToolError> {
        let args = ["stats", params.mountpoint.as_str(), "-l", "1"];
        self.sample(self.binary(), &args, params.window()).await
    }

    pub async fn accesslog(&self, params: SampleParams) -> Result<String, ToolError> {
        let path = Path::new(&params.mountpoint)
            .join(".accesslog")
            .to_string_lossy()
            .into_owned();
        self.sample("cat", &[path.as_str()], params.window()).await
    }

    /// Run a program that never exits on its own and keep what it printed
    /// within `window`.
    async fn sample(
        &self,
        program: &str,
        args: &[&str],
        window: Duration,
    ) -> Result<String, ToolError> {
        match self.exec().run(program, args, Some(window)).await {
            Ok(output) => Ok(output),
            Err(ExecError::DeadlineExceeded { output, .. }) => {
                tracing::debug!(program, ?args, ?window, bytes = output.len(), "sampled");
                Ok(output)
            }
            Err(e) => {
                tracing::error!(program, ?args, error = %e, "sample");
                Err(e.into())
            }
        }
    }
}

/// Register every JuiceFS tool, in advertised order.
pub fn register_tools<E: Executor>(
    registry: &mut Registry,
    handler: JuiceFsHandler<E>,
) -> Result<(), RegistryError> {
    let jfs = Arc::new(handler);

    registry.register(
        ToolDescriptor::builder(
            "get_juicefs_workflow",
            "Get the procedure for troubleshooting JuiceFS performance problems",
        )
        .text(docs::WORKFLOW),
    )?;
    registry.register(
        ToolDescriptor::builder("find_mountpoint", "List the JuiceFS mount points on this machine")
            .handle_with(Arc::clone(&jfs), |jfs, _| async move {
                jfs.find_mountpoint().await
            }),
    )?;
    registry.register(
        ToolDescriptor::builder(
            "get_mount_options",
            "Show the mount options of the JuiceFS client serving a mount point",
        )
        .params::<MountpointParams>()
        .handle_with(Arc::clone(&jfs), |jfs, args| async move {
            jfs.mount_options(args.decode()?).await
        }),
    )?;
    registry.register(
        ToolDescriptor::builder("bench_in_juicefs", "Run a JuiceFS benchmark on a mount point")
            .params::<MountpointParams>()
            .handle_with(Arc::clone(&jfs), |jfs, args| async move {
                jfs.bench(args.decode()?).await
            }),
    )?;
    registry.register(
        ToolDescriptor::builder(
            "stats_in_juicefs",
            "Sample live JuiceFS performance metrics of a mount point",
        )
        .params::<SampleParams>()
        .require("interval")
        .handle_with(Arc::clone(&jfs), |jfs, args| async move {
            jfs.stats(args.decode()?).await
        }),
    )?;
    registry.register(
        ToolDescriptor::builder(
            "accesslog_in_juicefs",
            "Sample the file system access log of a mount point",
        )
        .params::<SampleParams>()
        .require("interval")
        .handle_with(jfs, |jfs, args| async move {
            jfs.accesslog(args.decode()?).await
        }),
    )?;
    docs::register_docs(registry)
}
