//! MCP-backed tool host.

use std::time::Duration;

use mcp::{LaunchSpec, Session, Tool};

use super::ToolHost;
use crate::model::{InvocationRequest, InvocationResult, ToolSpec};

/// Tool host backed by a tool provider session.
pub struct McpToolHost {
    session: Session,
    specs: Vec<ToolSpec>,
}

impl McpToolHost {
    /// Launch the provider and cache its tool specs.
    pub async fn connect(spec: &LaunchSpec, timeout: Duration) -> mcp::Result<Self> {
        Ok(Self::new(Session::connect(spec, timeout).await?))
    }

    /// Wrap an already connected session.
    pub fn new(session: Session) -> Self {
        let specs = session.list_tools().values().map(ToolSpec::from).collect();
        Self { session, specs }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

impl From<&Tool> for ToolSpec {
    fn from(tool: &Tool) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone().unwrap_or_default(),
            schema: tool.input_schema.clone(),
        }
    }
}

impl ToolHost for McpToolHost {
    fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    fn contains(&self, name: &str) -> bool {
        self.session.list_tools().contains_key(name)
    }

    async fn invoke(
        &mut self,
        request: &InvocationRequest,
        timeout: Duration,
    ) -> Result<InvocationResult, mcp::Error> {
        let outcome = self
            .session
            .invoke(&request.name, request.arguments.clone(), timeout)
            .await?;
        Ok(if outcome.is_error {
            InvocationResult::failure(request, outcome.content)
        } else {
            InvocationResult::success(request, outcome.content)
        })
    }

    async fn close(&mut self) {
        self.session.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_spec_from_mcp_tool() {
        let tool: Tool = serde_json::from_str(
            r#"{"name": "get_forecast", "inputSchema": {"type": "object", "properties": {"location": {"type": "string"}}}}"#,
        )
        .unwrap();
        let spec = ToolSpec::from(&tool);
        assert_eq!(spec.name, "get_forecast");
        assert_eq!(spec.description, "");
        assert_eq!(spec.schema["properties"]["location"]["type"], "string");
    }
}
