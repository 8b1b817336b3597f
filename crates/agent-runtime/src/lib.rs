//! # agent-runtime
//!
//! Runtime pieces for the agent loop: concrete model backends and assembly
//! of agents from YAML files.
//!
//! ## Backends
//!
//! - **OpenAI**: chat completions with function calling
//! - **Ollama**: the same protocol through Ollama's `/v1` endpoint
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::AgentLoader;
//!
//! let mut agent = AgentLoader::new().load_file("agents/planner.yaml")?;
//! let answer = agent.run("What is 6 * 7?", CallArgs::new()).await?;
//! ```

pub mod factory;
pub mod loader;
pub mod openai;

pub use factory::{BackendFactory, backend_from_config};
pub use loader::{AgentLoader, default_tools};
pub use openai::{OpenAiBackend, OpenAiConfig};

// Re-export core types for convenience
pub use agent_core::{
    Agent, AgentConfig, AgentError, CallArgs, Message, ModelBackend, Result, Role, Tool,
    ToolRegistry,
};
