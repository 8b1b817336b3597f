//! YAML → Agent assembly
//!
//! Resolves an [`AgentConfig`] into a ready [`Agent`]: one backend from the
//! first model entry, the first prompt, named tools from a registry and
//! nested agents (inline or `path:`) built recursively as sub-agent tools.

use std::path::{Path, PathBuf};

use agent_core::builtin::register_builtins;
use agent_core::{
    Agent, AgentBuilder, AgentConfig, AgentError, CallbackManager, Result, ToolConfig,
    ToolRegistry,
};

use crate::factory::{BackendFactory, default_factory};

/// Registry holding every built-in tool
pub fn default_tools() -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    register_builtins(&mut tools);
    tools
}

pub struct AgentLoader {
    tools: ToolRegistry,
    callbacks: CallbackManager,
    factory: BackendFactory,
    max_steps: Option<usize>,
    parallel_tool_calls: Option<bool>,
}

impl Default for AgentLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentLoader {
    /// Loader with the built-in tools and environment-configured backends
    pub fn new() -> Self {
        Self {
            tools: default_tools(),
            callbacks: CallbackManager::new(),
            factory: default_factory(),
            max_steps: None,
            parallel_tool_calls: None,
        }
    }

    /// Tools that named entries resolve against
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Callbacks shared by every agent the loader builds
    pub fn with_callbacks(mut self, callbacks: CallbackManager) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_backend_factory(mut self, factory: BackendFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Step limit for every agent built, sub-agents included
    pub const fn with_max_steps(mut self, max: usize) -> Self {
        self.max_steps = Some(max);
        self
    }

    /// Tool-call concurrency for every agent built, sub-agents included
    pub const fn with_parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.parallel_tool_calls = Some(enabled);
        self
    }

    /// Load, validate and build the agent defined in `path`
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Agent> {
        let config = AgentConfig::from_file(path.as_ref())?;
        let mut stack = vec![canonical(path.as_ref())];
        self.build_nested(&config, &mut stack)
    }

    /// Build an already loaded config. Prefer [`Self::load_file`] for files:
    /// it also catches a root file that includes itself.
    pub fn build(&self, config: &AgentConfig) -> Result<Agent> {
        self.build_nested(config, &mut Vec::new())
    }

    fn build_nested(&self, config: &AgentConfig, stack: &mut Vec<PathBuf>) -> Result<Agent> {
        let backend = (self.factory)(config.primary_model()?)?;
        let mut builder = AgentBuilder::from_config(config)?
            .backend_boxed(backend)
            .callbacks(self.callbacks.clone());
        if let Some(max) = self.max_steps {
            builder = builder.max_steps(max);
        }
        if let Some(enabled) = self.parallel_tool_calls {
            builder = builder.parallel_tool_calls(enabled);
        }

        for entry in config.tools() {
            builder = match entry {
                ToolConfig::Named(name) => {
                    let tool = self.tools.get(name).ok_or_else(|| {
                        AgentError::Config(format!(
                            "agent '{}' uses unknown tool '{name}' (available: {})",
                            config.name,
                            self.tools.names().join(", ")
                        ))
                    })?;
                    builder.tool_arc(tool)
                }
                ToolConfig::AgentFile { path } => {
                    let resolved = config.resolve_path(path);
                    let key = canonical(&resolved);
                    if stack.contains(&key) {
                        return Err(AgentError::Config(format!(
                            "agent file {} includes itself",
                            resolved.display()
                        )));
                    }

                    let sub = AgentConfig::from_file(&resolved)?;
                    stack.push(key);
                    let agent = self.build_nested(&sub, stack);
                    stack.pop();
                    builder.sub_agent(agent?)
                }
                ToolConfig::Agent(inline) => {
                    let mut sub = (**inline).clone();
                    if sub.base_dir.is_none() {
                        sub.base_dir.clone_from(&config.base_dir);
                    }
                    builder.sub_agent(self.build_nested(&sub, stack)?)
                }
            };
        }

        tracing::info!(
            agent = %config.name,
            model = %config.primary_model()?.model,
            tools = config.tools().len(),
            "Agent loaded"
        );
        builder.build()
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use agent_core::testing::ScriptedBackend;
    use agent_core::{CallArgs, ModelBackend, ModelConfig};
    use serde_json::json;

    fn scripted(backend: ScriptedBackend) -> AgentLoader {
        let factory: BackendFactory =
            Arc::new(move |_: &ModelConfig| -> Result<Box<dyn ModelBackend>> {
                Ok(Box::new(backend.clone()))
            });
        AgentLoader::new().with_backend_factory(factory)
    }

    #[test]
    fn unknown_tool_is_a_config_error() {
        let config = AgentConfig::from_yaml_str(
            "name: a\nmodel:\n  model: m\nprompt: p\ntools:\n  - teleport\n",
        )
        .unwrap();

        let err = scripted(ScriptedBackend::new()).build(&config).unwrap_err();
        assert!(err.to_string().contains("unknown tool 'teleport'"));
    }

    #[tokio::test]
    async fn loads_nested_agents_from_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("root.yaml"),
            "name: planner\nmodel:\n  model: m\nprompt: Plan.\ntools:\n  - calculator\n  - path: helper.yaml\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("helper.yaml"),
            "name: helper\ndescription: Helps\nmodel:\n  model: m\nprompt: Help.\n",
        )
        .unwrap();

        let backend = ScriptedBackend::new()
            .tool_call("c1", "calculator", json!({"expression": "6 * 7"}))
            .reply("42");
        let mut agent = scripted(backend).load_file(dir.path().join("root.yaml")).unwrap();

        assert_eq!(agent.tools().names(), vec!["calculator", "helper"]);
        assert_eq!(agent.run("6*7?", CallArgs::new()).await.unwrap(), "42");
        assert_eq!(agent.history().messages()[3].content, json!(42));
    }

    #[test]
    fn inline_sub_agent_is_mounted() {
        let config = AgentConfig::from_yaml_str(
            "name: root\nmodel:\n  model: m\nprompt: p\ntools:\n  - name: inner\n    model:\n      model: m\n    prompt: q\n",
        )
        .unwrap();

        let agent = scripted(ScriptedBackend::new()).build(&config).unwrap();
        assert!(agent.tools().contains("inner"));
    }

    #[tokio::test]
    async fn step_limit_reaches_file_sub_agents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("root.yaml"),
            "name: root\nmodel:\n  model: m\nprompt: p\ntools:\n  - path: helper.yaml\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("helper.yaml"),
            "name: helper\nmodel:\n  model: m\nprompt: q\ntools:\n  - calculator\n",
        )
        .unwrap();

        let backend = ScriptedBackend::new()
            .tool_call("c1", "helper", json!({"message": "add"}))
            .tool_call("c2", "calculator", json!({"expression": "1 + 1"}))
            .reply("2");
        let mut agent = scripted(backend.clone())
            .with_max_steps(1)
            .with_parallel_tool_calls(true)
            .load_file(dir.path().join("root.yaml"))
            .unwrap();

        assert!(agent.options().parallel_tool_calls);
        let err = agent.run("go", CallArgs::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::MaxSteps(1)));
        assert_eq!(backend.calls(), 2);
        assert_eq!(agent.history().messages()[3].text(), "Error: Maximum steps (1) reached");
    }

    #[test]
    fn self_including_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("loop.yaml"),
            "name: loop\nmodel:\n  model: m\nprompt: p\ntools:\n  - path: loop.yaml\n",
        )
        .unwrap();

        let err = scripted(ScriptedBackend::new())
            .load_file(dir.path().join("loop.yaml"))
            .unwrap_err();
        assert!(err.to_string().contains("includes itself"));
    }
}
