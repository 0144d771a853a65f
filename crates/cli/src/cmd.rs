//! Command-line interface of the JuiceFS diagnostic server.

use crate::serve;
use anyhow::Context;
use clap::{Parser, ValueEnum};
use jfs_mcp::{DiagnosticServer, Registry};
use jfs_mcp_csi::{
    CsiHandler,
    kube::{KubeClient, KubeConfig},
};
use jfs_mcp_juicefs::{JuiceFsHandler, exec::ProcessExecutor};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use tracing_subscriber::EnvFilter;

const CSI_INSTRUCTIONS: &str = "Diagnoses JuiceFS CSI driver mount problems in a Kubernetes \
                                cluster. Call get_handle_flow first for the troubleshooting order.";
const JUICEFS_INSTRUCTIONS: &str = "Diagnoses JuiceFS client performance on this machine. Call \
                                    get_juicefs_workflow first for the troubleshooting order.";

/// Tool family served by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HandlerKind {
    /// Kubernetes CSI driver inspection.
    Csi,
    /// Local JuiceFS client inspection.
    Juicefs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// Newline-delimited JSON-RPC over stdin and stdout.
    Stdio,
    /// Streamable HTTP under `/mcp`.
    #[value(alias = "sse")]
    Http,
}

/// JuiceFS diagnostic MCP server.
#[derive(Parser, Debug)]
#[command(name = "jfs-mcp", version, about)]
pub struct App {
    /// Tool family to serve.
    #[arg(long, value_enum, default_value_t = HandlerKind::Csi)]
    pub handler: HandlerKind,

    /// Transport to serve MCP over.
    #[arg(short, long, value_enum, default_value_t = Transport::Http)]
    pub transport: Transport,

    /// Listen address of the HTTP transport.
    #[arg(long, alias = "sseurl", default_value = "0.0.0.0:8088")]
    pub listen: SocketAddr,

    /// Namespace the CSI driver and its mount pods run in.
    #[arg(long, alias = "sysnamespace", default_value = "kube-system")]
    pub sys_namespace: String,

    /// Log at debug level unless `RUST_LOG` is set.
    #[arg(long)]
    pub debug: bool,

    /// JuiceFS client binary.
    #[arg(long, default_value = jfs_mcp_juicefs::DEFAULT_BINARY)]
    pub juicefs_bin: String,

    /// Upper bound in seconds for any single tool call.
    #[arg(long, value_name = "SECS")]
    pub call_timeout: Option<u64>,

    /// Kubernetes API server URL; when unset it comes from a kubeconfig or
    /// the in-cluster service account.
    #[arg(long, value_name = "URL")]
    pub kube_api_server: Option<String>,

    /// Kubeconfig file; defaults to `$KUBECONFIG`, then the in-cluster
    /// service account, then `~/.kube/config`.
    #[arg(long, value_name = "PATH")]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use instead of the current one.
    #[arg(long, value_name = "NAME")]
    pub kube_context: Option<String>,

    /// Bearer token file for the API server.
    #[arg(long, value_name = "PATH")]
    pub kube_token_file: Option<PathBuf>,

    /// CA bundle verifying the API server.
    #[arg(long, value_name = "PATH")]
    pub kube_ca_file: Option<PathBuf>,
}

impl App {
    /// Parse CLI arguments and serve until the transport closes.
    pub async fn run() -> anyhow::Result<()> {
        let app = App::parse();
        app.init_logging();
        let server = app.build_server().await?;
        tracing::info!(
            handler = ?app.handler,
            transport = ?app.transport,
            tools = server.tools().len(),
            "starting JuiceFS MCP server"
        );
        match app.transport {
            Transport::Stdio => serve::stdio(server).await,
            Transport::Http => serve::http(server, app.listen).await,
        }
    }

    /// Logs go to stderr so the stdio transport keeps stdout to itself.
    fn init_logging(&self) {
        let level = if self.debug { "debug" } else { "info" };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    }

    /// Register the selected tool family and wrap it in a server.
    pub async fn build_server(&self) -> anyhow::Result<DiagnosticServer> {
        let mut registry = Registry::new();
        let instructions = match self.handler {
            HandlerKind::Csi => {
                let config = KubeConfig {
                    api_server: self.kube_api_server.clone(),
                    token_file: self.kube_token_file.clone(),
                    ca_file: self.kube_ca_file.clone(),
                    kubeconfig: self.kubeconfig.clone(),
                    context: self.kube_context.clone(),
                }
                .resolve()
                .await
                .context("resolve Kubernetes connection")?;
                let client = KubeClient::new(config)
                    .await
                    .context("build Kubernetes client")?;
                jfs_mcp_csi::register_tools(
                    &mut registry,
                    CsiHandler::new(client, self.sys_namespace.as_str()),
                )?;
                CSI_INSTRUCTIONS
            }
            HandlerKind::Juicefs => {
                jfs_mcp_juicefs::register_tools(
                    &mut registry,
                    JuiceFsHandler::new(ProcessExecutor, self.juicefs_bin.as_str()),
                )?;
                JUICEFS_INSTRUCTIONS
            }
        };
        Ok(DiagnosticServer::new(registry.drain())
            .with_instructions(instructions)
            .with_call_timeout(self.call_timeout.map(Duration::from_secs)))
    }
}
