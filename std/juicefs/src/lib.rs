//! MCP tools inspecting JuiceFS clients on the local machine.
//!
//! Tools shell out through an [`Executor`]: `df` and `ps` to locate mount
//! points and client options, and the JuiceFS binary itself to benchmark and
//! sample a mount point. Static tuning guides are served alongside.

use exec::Executor;

pub mod docs;
pub mod exec;
pub mod tools;

pub use tools::register_tools;

/// Default JuiceFS client binary, looked up on `PATH`.
pub const DEFAULT_BINARY: &str = "juicefs";

/// JuiceFS tool handlers bound to an executor.
#[derive(Debug)]
pub struct JuiceFsHandler<E> {
    exec: E,
    binary: String,
}

impl<E: Executor> JuiceFsHandler<E> {
    pub fn new(exec: E, binary: impl Into<String>) -> Self {
        Self {
            exec,
            binary: binary.into(),
        }
    }

    pub fn exec(&self) -> &E {
        &self.exec
    }

    /// Path of the JuiceFS client binary.
    pub fn binary(&self) -> &str {
        &self.binary
    }
}
