use super::errors::ModelError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation proposed by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Unique within one assistant turn; tool turns refer back to it.
    pub id: String,
    pub name: String,
    /// Opaque to the orchestrator; only the tool provider validates it.
    pub arguments: Value,
}

/// The outcome of executing one [`InvocationRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub request_id: String,
    pub is_error: bool,
    pub content: String,
}

impl InvocationResult {
    pub fn success(request: &InvocationRequest, content: impl Into<String>) -> Self {
        Self {
            request_id: request.id.clone(),
            is_error: false,
            content: content.into(),
        }
    }

    pub fn failure(request: &InvocationRequest, content: impl Into<String>) -> Self {
        Self {
            request_id: request.id.clone(),
            is_error: true,
            content: content.into(),
        }
    }

    /// Synthesized locally when the model names a tool the provider never
    /// advertised.
    pub fn unknown_tool(request: &InvocationRequest) -> Self {
        Self::failure(request, format!("unknown tool: {}", request.name))
    }
}

/// One entry in the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: Option<String>,
    /// Assistant turns only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<InvocationRequest>,
    /// Tool turns only: the id of the request this turn answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers: Option<String>,
    #[serde(default)]
    pub is_error: bool,
}

impl Turn {
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    pub fn assistant(content: Option<String>, invocations: Vec<InvocationRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            invocations,
            answers: None,
            is_error: false,
        }
    }

    /// A tool turn carrying `result`. Failures are prefixed so the model can
    /// tell them apart from data.
    pub fn tool(result: &InvocationResult) -> Self {
        let content = if result.is_error {
            format!("error: {}", result.content)
        } else {
            result.content.clone()
        };
        Self {
            role: Role::Tool,
            content: Some(content),
            invocations: Vec::new(),
            answers: Some(result.request_id.clone()),
            is_error: result.is_error,
        }
    }

    fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(text.into()),
            invocations: Vec::new(),
            answers: None,
            is_error: false,
        }
    }

    /// Text content, or the empty string for invocation-only turns.
    pub fn text_content(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// A tool definition offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Everything needed for a model request.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub turns: &'a [Turn],
    pub tools: &'a [ToolSpec],
}

/// The response from a model: text, requested invocations, or both.
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub content: Option<String>,
    pub invocations: Vec<InvocationRequest>,
    pub usage: Usage,
}

impl ModelResponse {
    /// A plain text answer.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// A response that only requests invocations.
    pub fn invoking(invocations: Vec<InvocationRequest>) -> Self {
        Self {
            invocations,
            ..Default::default()
        }
    }

    pub fn requests_tools(&self) -> bool {
        !self.invocations.is_empty()
    }
}

/// Trait for Model Gateway backends.
pub trait Backend: Send + Sync {
    fn call(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<ModelResponse, ModelError>> + Send;
}
