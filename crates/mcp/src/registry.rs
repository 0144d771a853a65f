//! Tool registry.
//!
//! Tools are registered once at start-up into a [`Registry`], which is then
//! drained into an immutable [`ToolTable`] that the server dispatches from.
//! Registration order is preserved end to end because it is the order in
//! which tools are advertised to clients.

use crate::{args::Arguments, error::RegistryError, error::ToolError};
use futures::future::BoxFuture;
use rmcp::model::{JsonObject, Tool};
use schemars::JsonSchema;
use serde_json::Value;
use std::{collections::HashMap, future::Future, sync::Arc};
use tokio_util::sync::CancellationToken;

/// Type-erased async handler of a tool.
pub type ToolHandler =
    Arc<dyn Fn(Arguments) -> BoxFuture<'static, Result<String, ToolError>> + Send + Sync>;

/// A registered tool: its advertised shape plus the handler behind it.
#[derive(Clone)]
pub struct ToolDescriptor {
    name: &'static str,
    description: &'static str,
    input_schema: Arc<JsonObject>,
    handler: ToolHandler,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("input_schema", &self.input_schema)
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    /// Start describing a tool that takes no arguments.
    pub fn builder(name: &'static str, description: &'static str) -> ToolBuilder {
        let mut input_schema = JsonObject::new();
        input_schema.insert("type".into(), Value::from("object"));
        input_schema.insert("properties".into(), Value::Object(JsonObject::new()));
        ToolBuilder {
            name,
            description,
            input_schema,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    /// JSON schema of the tool input.
    pub fn input_schema(&self) -> &JsonObject {
        &self.input_schema
    }

    /// The MCP tool definition advertised to clients.
    pub fn to_tool(&self) -> Tool {
        Tool::new(self.name, self.description, Arc::clone(&self.input_schema))
    }

    /// Invoke the handler.
    pub fn invoke(&self, args: Arguments) -> BoxFuture<'static, Result<String, ToolError>> {
        (self.handler)(args)
    }
}

/// Builder for a [`ToolDescriptor`]; finished by attaching a handler.
#[derive(Debug)]
pub struct ToolBuilder {
    name: &'static str,
    description: &'static str,
    input_schema: JsonObject,
}

impl ToolBuilder {
    /// Advertise the schema of `T`, the struct the handler decodes its
    /// arguments into. Field docs become parameter descriptions.
    pub fn params<T: JsonSchema>(mut self) -> Self {
        match serde_json::to_value(schemars::schema_for!(T)) {
            Ok(Value::Object(mut schema)) => {
                schema.remove("$schema");
                schema.remove("title");
                schema.remove("description");
                self.input_schema = schema;
            }
            Ok(_) | Err(_) => {
                tracing::warn!(tool = self.name, "parameter schema is not an object");
            }
        }
        self
    }

    /// Advertise `name` as required even though decoding tolerates its
    /// absence.
    pub fn require(mut self, name: &'static str) -> Self {
        let required = self
            .input_schema
            .entry("required")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = required {
            if !list.iter().any(|v| v.as_str() == Some(name)) {
                list.push(Value::from(name));
            }
        }
        self
    }

    /// Attach the handler and finish the descriptor.
    pub fn handle<F, Fut>(self, f: F) -> ToolDescriptor
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        let handler: ToolHandler = Arc::new(
            move |args| -> BoxFuture<'static, Result<String, ToolError>> { Box::pin(f(args)) },
        );
        ToolDescriptor {
            name: self.name,
            description: self.description,
            input_schema: Arc::new(self.input_schema),
            handler,
        }
    }

    /// Attach a handler that runs against a shared target, typically a
    /// handler struct owning a capability adapter.
    pub fn handle_with<T, F, Fut>(self, target: Arc<T>, f: F) -> ToolDescriptor
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        self.handle(move |args| f(Arc::clone(&target), args))
    }

    /// Attach a handler that returns fixed text.
    pub fn text(self, text: &'static str) -> ToolDescriptor {
        self.handle(move |_| async move { Ok(text.to_owned()) })
    }
}

/// Start-up registry of tools.
#[derive(Debug, Default)]
pub struct Registry {
    tools: Vec<ToolDescriptor>,
    drained: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tool. Names must be unique and the registry must not have
    /// been drained yet.
    pub fn register(&mut self, tool: ToolDescriptor) -> Result<(), RegistryError> {
        if self.drained {
            return Err(RegistryError::Drained(tool.name.to_owned()));
        }
        if self.tools.iter().any(|t| t.name == tool.name) {
            return Err(RegistryError::Duplicate(tool.name.to_owned()));
        }
        tracing::debug!(tool = tool.name, "registered tool");
        self.tools.push(tool);
        Ok(())
    }

    /// Registered tools in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Move every registered tool into a [`ToolTable`] and close the
    /// registry for further registration.
    pub fn drain(&mut self) -> ToolTable {
        self.drained = true;
        ToolTable::new(std::mem::take(&mut self.tools))
    }
}

/// Immutable table of tools that the server dispatches from.
#[derive(Debug, Default)]
pub struct ToolTable {
    tools: Vec<ToolDescriptor>,
    index: HashMap<&'static str, usize>,
}

impl ToolTable {
    fn new(tools: Vec<ToolDescriptor>) -> Self {
        let index = tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name, i))
            .collect();
        Self { tools, index }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Tools in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// MCP definitions of every tool, in registration order.
    pub fn advertised(&self) -> Vec<Tool> {
        self.tools.iter().map(ToolDescriptor::to_tool).collect()
    }

    /// Dispatch an invocation by name.
    ///
    /// The handler future is dropped if `cancel` fires first, which aborts
    /// any in-flight upstream request or child process it owns.
    pub async fn call(
        &self,
        name: &str,
        args: Arguments,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_owned()))?;
        tokio::select! {
            result = tool.invoke(args) => result,
            _ = cancel.cancelled() => Err(ToolError::Cancelled),
        }
    }
}
