//! Conversation Messages
//!
//! Standard message format used across the agent system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ToolError;
use crate::node::Node;

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (model) response
    Assistant,
    /// Result of a tool call, fed back to the model
    ToolResponse,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::ToolResponse => write!(f, "tool_response"),
        }
    }
}

/// Tool call requested by the model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation id, echoed on the tool response
    pub id: String,

    /// Tool identifier
    pub name: String,

    /// Raw argument payload as emitted by the model (a JSON object)
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the raw payload into keyword arguments.
    ///
    /// A blank payload means "no arguments".
    pub fn parse_arguments(&self) -> Result<Map<String, Value>, ToolError> {
        if self.arguments.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&self.arguments) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(ToolError::invalid_arguments(
                &self.name,
                format!("expected a JSON object, got {}", json_kind(&other)),
            )),
            Err(e) => Err(ToolError::invalid_arguments(&self.name, e.to_string())),
        }
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Correlation id (tool responses carry the id of the call they answer)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Message role
    pub role: Role,

    /// Text or structured content; may be empty
    #[serde(default)]
    pub content: Value,

    /// Tool calls requested by the assistant, in emitted order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// Participant that produced this message
    pub source: Node,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<Value>, source: Node) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            source,
            timestamp: Utc::now(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, Value::String(content.into()), Node::system())
    }

    /// Create a user message attributed to the default user node
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, Value::String(content.into()), Node::user())
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<Value>, source: Node) -> Self {
        Self::new(Role::Assistant, content, source)
    }

    /// Create a tool response answering the call `call_id`
    pub fn tool_response(call_id: impl Into<String>, content: impl Into<Value>, tool: &str) -> Self {
        Self::new(Role::ToolResponse, content, Node::tool(tool)).with_id(call_id)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCallRequest>) -> Self {
        self.tool_calls = calls;
        self
    }

    pub fn with_source(mut self, source: Node) -> Self {
        self.source = source;
        self
    }

    /// False for null, `""`, `[]` and `{}`.
    pub fn has_content(&self) -> bool {
        match &self.content {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
            Value::Bool(_) | Value::Number(_) => true,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Content as text: strings verbatim, null as empty, anything else as JSON.
    pub fn text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// What a run or step accepts: raw text or a pre-built message
#[derive(Clone, Debug)]
pub enum Input {
    Text(String),
    Message(Message),
}

impl Input {
    /// Raw text becomes a user message from the default user node.
    pub fn into_message(self) -> Message {
        match self {
            Self::Text(text) => Message::user(text),
            Self::Message(message) => message,
        }
    }
}

impl From<&str> for Input {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Input {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Message> for Input {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

/// Conversation history owned by one agent.
///
/// Messages are only ever appended. The leading system prompt is the one
/// slot that gets re-rendered, see [`History::set_system`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// Replace the leading system prompt, or insert one if missing.
    pub fn set_system(&mut self, prompt: impl Into<String>) {
        let system = Message::system(prompt);
        if self.system().is_some() {
            self.messages[0] = system;
        } else {
            self.messages.insert(0, system);
        }
    }

    /// The system prompt slot, if rendered yet
    pub fn system(&self) -> Option<&Message> {
        self.messages.first().filter(|m| m.role == Role::System)
    }

    /// Get all messages, system prompt first
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages after the system prompt
    pub fn conversation(&self) -> &[Message] {
        match self.system() {
            Some(_) => &self.messages[1..],
            None => &self.messages,
        }
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    /// Number of messages, system prompt included
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
