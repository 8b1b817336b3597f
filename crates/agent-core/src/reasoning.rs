//! Agent Loop
//!
//! Drives one agent from an incoming message to a terminal result:
//!
//! ```text
//! START → STEPPING → (TOOL_DISPATCH → STEPPING)* → DONE | FAILED
//! ```
//!
//! Each step re-renders the system prompt, appends the pending message,
//! asks the model for the next message and appends that. Tool calls in the
//! reply are dispatched, their responses appended, and the loop steps again
//! so the model sees them. A reply without tool calls ends the run.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::args::CallArgs;
use crate::callback::{CallbackHandler, CallbackManager, EventKind, EventPayload};
use crate::config::{AgentConfig, AgentOptions};
use crate::dispatcher::ToolDispatcher;
use crate::error::{AgentError, Result};
use crate::message::{History, Input, Message};
use crate::node::Node;
use crate::prompt::PromptTemplate;
use crate::provider::{ModelAdapter, ModelBackend};
use crate::subagent::AgentTool;
use crate::tool::{Tool, ToolRegistry};

/// The main Agent struct
pub struct Agent {
    node: Arc<Node>,
    description: String,
    model: ModelAdapter,
    prompt: PromptTemplate,
    tools: Arc<ToolRegistry>,
    dispatcher: ToolDispatcher,
    callbacks: CallbackManager,
    options: AgentOptions,
    history: History,
}

impl Agent {
    pub fn builder(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name)
    }

    /// Run the agent until the model answers without calling tools.
    ///
    /// `args` reach the model backend, the prompt renderer and every
    /// lifecycle event of this run.
    pub async fn run(&mut self, input: impl Into<Input>, args: CallArgs) -> Result<String> {
        self.run_with_cancel(input, args, &CancellationToken::new())
            .await
    }

    /// Like [`Agent::run`], aborting between steps once `cancel` fires.
    pub async fn run_with_cancel(
        &mut self,
        input: impl Into<Input>,
        args: CallArgs,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let message = input.into().into_message();
        let node = Arc::clone(&self.node);
        let nested = node.is_nested();

        if nested {
            self.callbacks.publish(
                EventKind::ToolStart,
                &node,
                EventPayload::Message(message.clone()),
                &args,
            );
        }
        self.callbacks.publish(
            EventKind::AgentStart,
            &node,
            EventPayload::Message(message.clone()),
            &args,
        );
        info!(agent = %node.name, nested, "Agent run started");

        match self.drive(message, &args, cancel).await {
            Ok(reply) => {
                let content = reply.text();
                if nested {
                    self.callbacks.publish(
                        EventKind::ToolEnd,
                        &node,
                        EventPayload::Content(reply.content.clone()),
                        &args,
                    );
                }
                self.callbacks
                    .publish(EventKind::AgentEnd, &node, EventPayload::Message(reply), &args);
                info!(agent = %node.name, history = self.history.len(), "Agent run finished");
                Ok(content)
            }
            Err(e) => {
                let error = e.to_string();
                if nested {
                    self.callbacks.publish(
                        EventKind::ToolError,
                        &node,
                        EventPayload::Error(error.clone()),
                        &args,
                    );
                }
                self.callbacks
                    .publish(EventKind::AgentError, &node, EventPayload::Error(error), &args);
                warn!(agent = %node.name, error = %e, "Agent run failed");
                Err(e)
            }
        }
    }

    async fn drive(
        &mut self,
        message: Message,
        args: &CallArgs,
        cancel: &CancellationToken,
    ) -> Result<Message> {
        let mut pending = message;
        let mut steps = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            if let Some(max) = self.options.max_steps {
                if steps >= max {
                    return Err(AgentError::MaxSteps(max));
                }
            }
            steps += 1;

            let reply = self.step(pending, args).await?;
            if !reply.has_tool_calls() {
                debug!(agent = %self.node.name, steps, "Model answered");
                return Ok(reply);
            }

            debug!(
                agent = %self.node.name,
                calls = reply.tool_calls.len(),
                parallel = self.options.parallel_tool_calls,
                "Dispatching tool calls"
            );
            let responses = self
                .dispatcher
                .dispatch_all(&reply.tool_calls, self.options.parallel_tool_calls)
                .await;
            self.history.extend(responses);

            pending = Message::user("");
        }
    }

    /// One model turn: refresh the system prompt, append `input` if it has
    /// content, invoke the model and append its reply.
    ///
    /// A model failure leaves the history with whatever was appended before
    /// the call.
    pub async fn step(&mut self, input: impl Into<Input>, args: &CallArgs) -> Result<Message> {
        self.history.set_system(self.prompt.render(&args.kwargs));

        let message = input.into().into_message();
        if message.has_content() {
            self.history.push(message);
        }

        let reply = self
            .model
            .invoke(self.history.messages(), args)
            .await?
            .with_source((*self.node).clone());

        self.history.push(reply.clone());
        Ok(reply)
    }

    /// Mount this agent under `parent`; it then publishes tool events too.
    pub fn attach(&self, parent: &Arc<Node>) -> Result<()> {
        self.node.bind_ancestor(parent)
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub const fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub const fn history(&self) -> &History {
        &self.history
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub const fn model(&self) -> &ModelAdapter {
        &self.model
    }

    pub const fn prompt(&self) -> &PromptTemplate {
        &self.prompt
    }

    pub const fn options(&self) -> &AgentOptions {
        &self.options
    }

    pub const fn callbacks(&self) -> &CallbackManager {
        &self.callbacks
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("node", &self.node.to_string())
            .field("model", &self.model)
            .field("tools", &self.tools)
            .field("options", &self.options)
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Agent`]
///
/// Model and prompt are chosen here, once; the agent never switches them.
pub struct AgentBuilder {
    name: String,
    description: Option<String>,
    backend: Option<Box<dyn ModelBackend>>,
    prompt: PromptTemplate,
    tools: ToolRegistry,
    sub_agents: Vec<Agent>,
    callbacks: CallbackManager,
    options: AgentOptions,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            backend: None,
            prompt: PromptTemplate::default(),
            tools: ToolRegistry::new(),
            sub_agents: Vec::new(),
            callbacks: CallbackManager::new(),
            options: AgentOptions::default(),
        }
    }

    /// Name, description, first prompt and options of `config`.
    ///
    /// Backend and tools are resolved by the caller.
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let mut builder = Self::new(config.name.clone())
            .prompt(config.primary_prompt()?.clone())
            .options(config.options.clone());
        builder.description.clone_from(&config.description);
        Ok(builder)
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn backend<B: ModelBackend + 'static>(self, backend: B) -> Self {
        self.backend_boxed(Box::new(backend))
    }

    pub fn backend_boxed(mut self, backend: Box<dyn ModelBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn prompt(mut self, prompt: impl Into<PromptTemplate>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn tool_arc(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register_arc(tool);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Expose another agent as a tool named after it
    pub fn sub_agent(mut self, agent: Agent) -> Self {
        self.sub_agents.push(agent);
        self
    }

    pub fn callback(mut self, handler: Arc<dyn CallbackHandler>) -> Self {
        self.callbacks.add(handler);
        self
    }

    pub fn callbacks(mut self, callbacks: CallbackManager) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub const fn max_steps(mut self, max: usize) -> Self {
        self.options.max_steps = Some(max);
        self
    }

    pub const fn parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.options.parallel_tool_calls = enabled;
        self
    }

    pub fn options(mut self, options: AgentOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<Agent> {
        if self.name.trim().is_empty() {
            return Err(AgentError::Config("agent name must not be empty".into()));
        }
        let backend = self
            .backend
            .ok_or_else(|| AgentError::Config(format!("agent '{}' has no model backend", self.name)))?;

        let node = Arc::new(Node::agent(self.name));
        let mut tools = self.tools;
        for sub in self.sub_agents {
            if tools.contains(sub.name()) {
                return Err(AgentError::Config(format!(
                    "agent '{}' has two tools named '{}'",
                    node.name,
                    sub.name()
                )));
            }
            tools.register(AgentTool::mount(sub, &node)?);
        }

        let tools = Arc::new(tools);
        let model = ModelAdapter::new(backend, tools.schemas());
        debug!(agent = %node.name, backend = %model.name(), tools = ?tools.names(), "Agent built");

        Ok(Agent {
            description: self.description.unwrap_or_default(),
            dispatcher: ToolDispatcher::new(Arc::clone(&tools)),
            node,
            model,
            prompt: self.prompt,
            tools,
            callbacks: self.callbacks,
            options: self.options,
            history: History::new(),
        })
    }
}
