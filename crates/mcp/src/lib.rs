//! MCP (Model Context Protocol) tool provider sessions.
//!
//! This crate launches a tool provider as a child process, speaks
//! newline-delimited JSON-RPC 2.0 with it over stdio, and exposes the
//! discovered tools through a [`Session`].
//!
//! # Example
//!
//! ```no_run
//! use mcp::{DEFAULT_CALL_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, LaunchSpec, Session};
//!
//! # async fn example() -> mcp::Result<()> {
//! let spec = LaunchSpec::new("weather/server.py")
//!     .env("PATH", "/usr/bin:/bin")
//!     .env("AMAP_API_KEY", "...");
//!
//! let mut session = Session::connect(&spec, DEFAULT_CONNECT_TIMEOUT).await?;
//! for tool in session.list_tools().values() {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let outcome = session
//!     .invoke(
//!         "get_weather",
//!         serde_json::json!({ "location": "Xiamen" }),
//!         DEFAULT_CALL_TIMEOUT,
//!     )
//!     .await?;
//! println!("{}", outcome.content);
//!
//! session.close().await;
//! # Ok(())
//! # }
//! ```

mod error;
mod launch;
mod protocol;
mod registry;
mod session;

pub use error::{Error, Result};
pub use launch::LaunchSpec;
pub use protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcFrame, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    PROTOCOL_VERSION, RequestId, ServerInfo, Tool, ToolContent,
};
pub use registry::{Registration, SessionEntry, SessionId, SessionRegistry};
pub use session::{
    CLOSE_GRACE, CallOutcome, Catalog, DEFAULT_CALL_TIMEOUT, DEFAULT_CONNECT_TIMEOUT,
    MAX_FRAME_SIZE, Session, SessionState,
};
