//! Model Backend Strategy
//!
//! Defines a common interface for all model backends (OpenAI-compatible
//! servers, Ollama, test doubles) so the agent loop works with any of them
//! without code changes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::ModelAdapter;
//!
//! let adapter = ModelAdapter::new(Box::new(backend), tools.schemas());
//! let reply = adapter.invoke(history.messages(), &args).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::args::CallArgs;
use crate::error::{AgentError, Result};
use crate::message::{Message, Role};
use crate::tool::ToolSchema;

/// Token usage statistics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason for completion finishing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
}

/// Raw response from a backend
#[derive(Clone, Debug)]
pub struct ModelResponse {
    /// Messages produced by the backend; the last one is authoritative
    pub messages: Vec<Message>,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,

    /// Finish reason
    pub finish_reason: Option<FinishReason>,
}

impl ModelResponse {
    pub fn single(message: Message, model: impl Into<String>) -> Self {
        Self {
            messages: vec![message],
            model: model.into(),
            usage: None,
            finish_reason: None,
        }
    }

    /// The message the loop continues from.
    pub fn into_final_message(mut self) -> Result<Message> {
        let message = self.messages.pop().ok_or_else(|| {
            AgentError::MalformedResponse(format!("'{}' returned no messages", self.model))
        })?;

        if message.role != Role::Assistant {
            return Err(AgentError::MalformedResponse(format!(
                "expected an assistant message from '{}', got {}",
                self.model, message.role
            )));
        }

        Ok(message)
    }
}

/// Strategy trait for model backends
///
/// Implement this trait to add support for new backends.
/// The agent works exclusively through this interface.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Receive the schemas of every callable tool. Called once, at agent
    /// construction.
    fn bind_tools(&mut self, tools: Vec<ToolSchema>);

    /// Produce the next response for `history`.
    ///
    /// Must not assume ownership of the history; transport failures and
    /// unusable payloads are both returned as `Err`.
    async fn complete(&self, history: &[Message], args: &CallArgs) -> Result<ModelResponse>;

    /// Check if the backend is reachable and configured correctly
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Wraps one backend for the agent loop
pub struct ModelAdapter {
    backend: Box<dyn ModelBackend>,
}

impl ModelAdapter {
    /// Bind `tools` to `backend` and wrap it.
    pub fn new(mut backend: Box<dyn ModelBackend>, tools: Vec<ToolSchema>) -> Self {
        backend.bind_tools(tools);
        Self { backend }
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn backend(&self) -> &dyn ModelBackend {
        self.backend.as_ref()
    }

    /// Ask the backend for the next message given the full history.
    pub async fn invoke(&self, history: &[Message], args: &CallArgs) -> Result<Message> {
        let response = self.backend.complete(history, args).await?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                backend = %self.backend.name(),
                model = %response.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Model responded"
            );
        }

        response.into_final_message()
    }
}

impl std::fmt::Debug for ModelAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAdapter")
            .field("backend", &self.backend.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    #[test]
    fn final_message_is_last() {
        let response = ModelResponse {
            messages: vec![
                Message::assistant("draft", Node::agent("a")),
                Message::assistant("final", Node::agent("a")),
            ],
            model: "test".into(),
            usage: None,
            finish_reason: Some(FinishReason::Stop),
        };
        assert_eq!(response.into_final_message().unwrap().text(), "final");
    }

    #[test]
    fn empty_response_is_malformed() {
        let response = ModelResponse {
            messages: vec![],
            model: "test".into(),
            usage: None,
            finish_reason: None,
        };
        assert!(matches!(
            response.into_final_message(),
            Err(AgentError::MalformedResponse(_))
        ));
    }

    #[test]
    fn non_assistant_final_message_is_malformed() {
        let response = ModelResponse::single(Message::user("echo"), "test");
        assert!(matches!(
            response.into_final_message(),
            Err(AgentError::MalformedResponse(_))
        ));
    }
}
