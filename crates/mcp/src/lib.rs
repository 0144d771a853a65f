//! Core of the JuiceFS diagnostic MCP server.
//!
//! Tools are described by [`ToolDescriptor`]s and collected into a
//! [`Registry`] at start-up. The registry is drained once into a
//! [`ToolTable`], which [`DiagnosticServer`] serves over MCP. Handler crates
//! decode their input with [`Arguments::decode`] and report failures as
//! [`ToolError`].

pub mod args;
pub mod error;
pub mod registry;
pub mod server;

pub use args::Arguments;
pub use error::{RegistryError, ToolError};
pub use registry::{Registry, ToolBuilder, ToolDescriptor, ToolTable};
pub use server::DiagnosticServer;

/// Render a tool result as pretty-printed JSON.
pub fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, ToolError> {
    serde_json::to_string_pretty(value).map_err(|e| ToolError::Internal(e.to_string()))
}
