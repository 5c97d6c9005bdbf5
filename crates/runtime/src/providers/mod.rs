//! Model Gateway adapters.
//!
//! Each provider implements the backend trait for its specific API.

mod openai;
mod window;

pub use openai::{DEFAULT_BASE_URL, DEFAULT_MODEL, GatewayConfig, OpenAiBackend};
pub use window::window;
