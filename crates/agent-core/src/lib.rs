//! # agent-core
//!
//! Agent execution loop with a backend-agnostic model adapter, name-based
//! tool dispatch and lifecycle events.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             Agent                                │
//! │  ┌─────────────┐   ┌──────────────────┐   ┌───────────────────┐  │
//! │  │   History   │   │   ModelAdapter   │   │  ToolDispatcher   │  │
//! │  │ (sys slot + │◀──│ (ModelBackend    │   │  (ToolRegistry:   │  │
//! │  │  append)    │◀──│  strategy)       │   │  tools, AgentTool)│  │
//! │  └─────────────┘   └──────────────────┘   └───────────────────┘  │
//! │         ▲                                           │            │
//! │         └────────────── tool responses ─────────────┘            │
//! │                                                                  │
//! │  CallbackManager: AGENT_* always, TOOL_* when mounted as a tool  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `ModelBackend` trait lets the loop run against OpenAI-compatible
//! servers, Ollama or a scripted test double without changing agent logic.

pub mod args;
pub mod builtin;
pub mod callback;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod node;
pub mod prompt;
pub mod provider;
pub mod reasoning;
pub mod subagent;
pub mod testing;
pub mod tool;

pub use args::CallArgs;
pub use callback::{
    BroadcastCallback, CallbackEvent, CallbackHandler, CallbackManager, EventKind, EventPayload,
    RecordingCallback, TracingCallback,
};
pub use config::{AgentConfig, AgentOptions, ModelConfig, ModelProvider, ToolConfig};
pub use dispatcher::ToolDispatcher;
pub use error::{AgentError, Result, ToolError};
pub use message::{History, Input, Message, Role, ToolCallRequest};
pub use node::{Node, NodeType};
pub use prompt::{PromptTemplate, Prompts};
pub use provider::{ModelAdapter, ModelBackend, ModelResponse};
pub use reasoning::{Agent, AgentBuilder};
pub use subagent::AgentTool;
pub use tool::{ParameterSchema, Tool, ToolRegistry, ToolSchema};
