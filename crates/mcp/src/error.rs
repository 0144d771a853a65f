//! Error types shared by the registry, the dispatcher and every handler.

use thiserror::Error;

/// Failure of a single tool invocation.
///
/// Handler crates convert their adapter errors into one of these variants so
/// the dispatcher can decide how a failure is surfaced to the caller.
#[derive(Error, Debug)]
pub enum ToolError {
    /// A required argument is missing or an argument has the wrong type.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The requested upstream resource does not exist.
    #[error("{0}")]
    NotFound(String),
    /// The upstream system could not be reached or rejected the request.
    #[error("upstream error: {0}")]
    Upstream(String),
    /// The resource exists but is not owned by the JuiceFS driver.
    #[error("{0}")]
    Mismatch(String),
    /// An external process failed.
    #[error("{0}")]
    Process(String),
    /// A result could not be rendered.
    #[error("internal error: {0}")]
    Internal(String),
    /// Dispatch to a name that was never registered.
    #[error("tool {0} is not registered")]
    UnknownTool(String),
    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,
    /// The call exceeded the server-wide call timeout.
    #[error("tool call timed out after {0:?}")]
    TimedOut(std::time::Duration),
}

impl ToolError {
    /// Whether the error is a protocol-level fault of the caller or of the
    /// server wiring, rather than a result of the diagnostic itself.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::InvalidArguments(_) | Self::UnknownTool(_))
    }
}

/// Start-up errors raised while building the tool table.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// A tool with the same name is already registered.
    #[error("tool {0} is already registered")]
    Duplicate(String),
    /// The registry was drained into a tool table and is closed.
    #[error("cannot register tool {0}: registry already drained")]
    Drained(String),
}
