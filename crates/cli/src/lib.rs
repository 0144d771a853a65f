//! JuiceFS diagnostic MCP server binary support.

pub mod cmd;
pub mod serve;
