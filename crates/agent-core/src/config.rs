//! Agent Configuration
//!
//! YAML documents describing one agent: its model(s), prompt(s), tools and
//! loop options. Loading and validation happen once, before any run; the
//! "first model" / "first prompt" choice is made here and nowhere else.
//!
//! ```yaml
//! name: researcher
//! type: vanilla
//! description: Looks things up
//! model:
//!   provider: openai
//!   model: gpt-4o-mini
//! prompt: |
//!   You are a careful researcher working on {topic}.
//! tools:
//!   - calculator
//!   - path: summarizer.yaml
//! options:
//!   max_steps: 8
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::prompt::{PromptTemplate, Prompts};

/// Agent implementation to use
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// Model/tool loop until the model stops calling tools
    #[default]
    Vanilla,
}

/// Which wire protocol a model speaks
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

impl std::fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ModelProvider,

    /// Model identifier (e.g., "gpt-4o-mini", "llama3.2")
    pub model: String,

    /// Override of the provider's default endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_temperature() -> f32 {
    0.7
}

const fn default_timeout_secs() -> u64 {
    120
}

impl ModelConfig {
    pub fn new(provider: ModelProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_url: None,
            api_key_env: None,
            temperature: default_temperature(),
            max_tokens: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// A single value or a list of them
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn first(&self) -> Option<&T> {
        match self {
            Self::One(value) => Some(value),
            Self::Many(values) => values.first(),
        }
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            Self::One(value) => std::slice::from_ref(value),
            Self::Many(values) => values,
        }
    }
}

/// A tool entry: a registered tool name, or another agent used as a tool
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ToolConfig {
    /// Name of a tool the host registered
    Named(String),

    /// Sub-agent loaded from another file, relative to this one
    AgentFile { path: PathBuf },

    /// Sub-agent defined inline
    Agent(Box<AgentConfig>),
}

/// Loop behaviour
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOptions {
    /// Fail the run after this many model steps; unbounded when absent
    #[serde(default)]
    pub max_steps: Option<usize>,

    /// Run the tool calls of one model turn concurrently
    #[serde(default)]
    pub parallel_tool_calls: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AgentConfig {
    pub name: String,

    #[serde(rename = "type", default)]
    pub agent_type: AgentType,

    #[serde(default)]
    pub description: Option<String>,

    pub model: OneOrMany<ModelConfig>,

    pub prompt: Prompts,

    #[serde(default)]
    pub tools: Option<Vec<ToolConfig>>,

    #[serde(default)]
    pub options: AgentOptions,

    /// Directory relative `path:` tool entries resolve against
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl AgentConfig {
    /// Load and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Config(format!("cannot read {}: {e}", path.display()))
        })?;

        let mut config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            AgentError::Config(format!("error loading yaml file {}: {e}", path.display()))
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AgentError::Config("agent name must not be empty".into()));
        }
        if self.model.first().is_none() {
            return Err(AgentError::Config(format!(
                "agent '{}' has no model configured",
                self.name
            )));
        }
        if self.prompt.is_empty() {
            return Err(AgentError::Config(format!(
                "agent '{}' has no prompt configured",
                self.name
            )));
        }
        for model in self.model.as_slice() {
            if model.model.trim().is_empty() {
                return Err(AgentError::Config(format!(
                    "agent '{}' has a model entry without a model name",
                    self.name
                )));
            }
        }
        for tool in self.tools() {
            if let ToolConfig::Agent(sub) = tool {
                sub.validate()?;
            }
        }
        Ok(())
    }

    /// The model the agent runs on: the only one, or the first listed
    pub fn primary_model(&self) -> Result<&ModelConfig> {
        self.model.first().ok_or_else(|| {
            AgentError::Config(format!("agent '{}' has no model configured", self.name))
        })
    }

    /// The prompt the agent renders: the only one, or the first listed
    pub fn primary_prompt(&self) -> Result<&PromptTemplate> {
        self.prompt.primary().ok_or_else(|| {
            AgentError::Config(format!("agent '{}' has no prompt configured", self.name))
        })
    }

    pub fn tools(&self) -> &[ToolConfig] {
        self.tools.as_deref().unwrap_or_default()
    }

    /// Resolve a `path:` tool entry against this config's directory
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}
