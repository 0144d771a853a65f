//! MCP server handler dispatching to a [`ToolTable`].

use crate::{args::Arguments, error::ToolError, registry::ToolTable};
use rmcp::{
    ErrorData, RoleServer, ServerHandler,
    model::{
        CallToolRequestParams, CallToolResult, Content, Implementation, ListToolsResult,
        PaginatedRequestParams, ServerCapabilities, ServerInfo,
    },
    service::RequestContext,
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

/// JuiceFS diagnostic MCP server.
///
/// Cheap to clone: every session of the HTTP transport gets its own clone
/// sharing the same tool table.
#[derive(Debug, Clone)]
pub struct DiagnosticServer {
    tools: Arc<ToolTable>,
    call_timeout: Option<Duration>,
    instructions: &'static str,
}

impl DiagnosticServer {
    pub fn new(tools: ToolTable) -> Self {
        Self {
            tools: Arc::new(tools),
            call_timeout: None,
            instructions: "JuiceFS diagnostic server. Call the workflow tool first to learn the \
                           recommended order of the other tools.",
        }
    }

    /// Bound every tool call by `timeout`.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Replace the instructions sent to clients on initialization.
    pub fn with_instructions(mut self, instructions: &'static str) -> Self {
        self.instructions = instructions;
        self
    }

    pub fn tools(&self) -> &ToolTable {
        &self.tools
    }

    /// Run one invocation through the table, applying the call timeout.
    pub async fn invoke(
        &self,
        name: &str,
        args: Arguments,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        tracing::debug!(tool = name, arguments = ?args.as_object(), "tool call");
        let call = self.tools.call(name, args, cancel);
        let result = match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(ToolError::TimedOut(limit))),
            None => call.await,
        };
        if let Err(e) = &result {
            tracing::error!(tool = name, error = %e, "tool call failed");
        }
        result
    }
}

/// Map an invocation outcome onto the MCP result.
///
/// Caller and wiring faults become protocol errors; every other failure is
/// reported as an error result so the calling agent can read the message.
pub fn into_call_result(result: Result<String, ToolError>) -> Result<CallToolResult, ErrorData> {
    match result {
        Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
        Err(e) if e.is_protocol_error() => Err(ErrorData::invalid_params(e.to_string(), None)),
        Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
    }
}

impl ServerHandler for DiagnosticServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "juicefs-mcp-server".into(),
                title: Some("JuiceFS Diagnostic MCP Server".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(self.instructions.into()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.tools.advertised()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let args = Arguments::from(request.arguments);
        into_call_result(self.invoke(&request.name, args, &context.ct).await)
    }
}
