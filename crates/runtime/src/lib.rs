//! Tern runtime: the conversation loop between a model and a tool provider.
//!
//! # Overview
//!
//! The runtime is organized around these concepts:
//!
//! - **Conversation**: Drives one user turn from input to final answer,
//!   executing the tool invocations the model asks for.
//! - **ContextStore**: The append-only conversation log, with tool results
//!   always linked to the request they answer.
//! - **Backend**: A trait abstracting the Model Gateway. [`OpenAiBackend`]
//!   speaks the OpenAI-compatible chat completions API.
//! - **ToolHost**: A trait abstracting tool execution. [`McpToolHost`] runs
//!   tools through an MCP provider session.
//!
//! # Example
//!
//! ```no_run
//! use runtime::{Conversation, ConversationConfig, GatewayConfig, McpToolHost, OpenAiBackend};
//!
//! # async fn example() -> runtime::Result<()> {
//! let host = McpToolHost::connect(
//!     &mcp::LaunchSpec::new("./weather.py"),
//!     mcp::DEFAULT_CONNECT_TIMEOUT,
//! )
//! .await?;
//! let backend = OpenAiBackend::new(GatewayConfig::new("sk-..."));
//!
//! let mut conversation = Conversation::new(backend, host, ConversationConfig::default());
//! let reply = conversation.send("What's the weather in Lisbon?").await?;
//! println!("{}", reply.text);
//! conversation.close().await;
//! # Ok(())
//! # }
//! ```

mod context;
mod conversation;
mod error;
pub mod model;
pub mod providers;
pub mod tools;

pub use context::{ContextStore, Draft};
pub use conversation::{
    Conversation, ConversationConfig, Degradation, EMPTY_ANSWER, LoopState, Reply,
    TOOL_LOOP_ANSWER,
};
pub use error::{ContextError, Error, Result};
pub use model::{
    Backend, InvocationRequest, InvocationResult, ModelError, ModelRequest, ModelResponse, Role,
    ToolSpec, Turn, Usage,
};
pub use providers::{DEFAULT_BASE_URL, DEFAULT_MODEL, GatewayConfig, OpenAiBackend, window};
pub use tools::{McpToolHost, ToolHost};
