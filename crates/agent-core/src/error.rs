//! Error Types
//!
//! Two families: [`AgentError`] crosses the loop boundary as a failed run,
//! [`ToolError`] stays inside dispatch and is turned into a tool response.

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Model backend returned an error
    #[error("Model error: {0}")]
    Model(String),

    /// Model backend unreachable or not responding
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Backend answered but the response could not be used
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    /// Step limit reached before the model produced a final answer
    #[error("Maximum steps ({0}) reached")]
    MaxSteps(usize),

    /// Run cancelled between steps
    #[error("Run cancelled")]
    Cancelled,

    /// Rate limited by the backend
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Configuration error (load time)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tool registration or resolution error outside of a run
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Model(msg) => format!("The model backend encountered an error: {msg}"),
            Self::ModelUnavailable(_) => {
                "The model backend is currently unavailable. Please try again.".into()
            }
            Self::MalformedResponse(_) => "The model returned an unusable response.".into(),
            Self::MaxSteps(_) => {
                "The request took too many steps to process. Please try a simpler query.".into()
            }
            Self::Cancelled => "The request was cancelled.".into(),
            Self::RateLimited(_) => "Too many requests. Please wait a moment.".into(),
            Self::Auth(_) => "Authentication failed. Please check your credentials.".into(),
            Self::Config(msg) => format!("Invalid agent configuration: {msg}"),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Failure of a single tool call.
///
/// The `Display` output is what the model sees after the `"Error: "` prefix,
/// so [`ToolError::Failed`] renders its message verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// No tool registered under this name
    #[error("tool not found: {0}")]
    NotFound(String),

    /// Argument payload missing, not JSON, or not matching the schema
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// Tool ran and failed
    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn invalid_arguments(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            reason: reason.into(),
        }
    }
}

impl From<anyhow::Error> for ToolError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_tool_error_displays_message_verbatim() {
        assert_eq!(ToolError::failed("bad input").to_string(), "bad input");
    }

    #[test]
    fn anyhow_converts_into_failed_tool_error() {
        let err: ToolError = anyhow::anyhow!("disk full").into();
        assert_eq!(err, ToolError::Failed("disk full".into()));
    }
}
