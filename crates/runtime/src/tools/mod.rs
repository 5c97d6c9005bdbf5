//! Tool execution seam between the orchestrator and a tool provider.

mod host;
mod mcp_host;

pub use host::ToolHost;
pub use mcp_host::McpToolHost;
