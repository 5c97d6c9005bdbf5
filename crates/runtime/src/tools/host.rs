//! Tool host trait.

use crate::model::{InvocationRequest, InvocationResult, ToolSpec};
use std::future::Future;
use std::time::Duration;

/// Trait for tool execution hosts.
///
/// Implementations provide tool specifications and execute invocations.
/// This is the boundary between the model loop and side effects.
pub trait ToolHost: Send {
    /// Tools to offer the model.
    fn specs(&self) -> &[ToolSpec];

    /// Whether `name` is in the catalog.
    fn contains(&self, name: &str) -> bool {
        self.specs().iter().any(|spec| spec.name == name)
    }

    /// Execute one invocation.
    ///
    /// Tool-side failures are a failed [`InvocationResult`]; an `Err` means
    /// the host itself failed (see [`mcp::Error::is_session_fatal`]).
    fn invoke(
        &mut self,
        request: &InvocationRequest,
        timeout: Duration,
    ) -> impl Future<Output = Result<InvocationResult, mcp::Error>> + Send;

    /// Release the host. Must be safe to call more than once.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}
