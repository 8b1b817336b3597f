//! Test doubles for agents, usable from unit tests, integration tests and
//! embedding crates.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::args::CallArgs;
use crate::error::{AgentError, Result, ToolError};
use crate::message::{Message, ToolCallRequest};
use crate::node::Node;
use crate::provider::{FinishReason, ModelBackend, ModelResponse};
use crate::tool::{Tool, ToolSchema};

enum Scripted {
    Reply(Message),
    Fail(String),
}

#[derive(Default)]
struct Script {
    queue: VecDeque<Scripted>,
    histories: Vec<Vec<Message>>,
    args: Vec<CallArgs>,
    tools: Vec<ToolSchema>,
}

/// Backend that plays back queued replies and records what it was asked.
///
/// Clones share the script, so a test can keep a handle after moving the
/// backend into an agent. Running out of replies is a model error.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain text reply
    pub fn reply(self, content: impl Into<String>) -> Self {
        self.push(Scripted::Reply(Message::assistant(
            Value::String(content.into()),
            Node::agent("scripted"),
        )))
    }

    /// Queue a reply that calls one tool
    pub fn tool_call(self, id: &str, name: &str, arguments: Value) -> Self {
        self.tool_calls(vec![ToolCallRequest::new(id, name, arguments.to_string())])
    }

    /// Queue a reply carrying several tool calls
    pub fn tool_calls(self, calls: Vec<ToolCallRequest>) -> Self {
        self.push(Scripted::Reply(
            Message::assistant(Value::Null, Node::agent("scripted")).with_tool_calls(calls),
        ))
    }

    /// Queue an arbitrary message, returned as-is
    pub fn message(self, message: Message) -> Self {
        self.push(Scripted::Reply(message))
    }

    /// Queue a backend failure
    pub fn fail(self, error: impl Into<String>) -> Self {
        self.push(Scripted::Fail(error.into()))
    }

    /// Number of completions requested so far
    pub fn calls(&self) -> usize {
        self.lock().histories.len()
    }

    /// History snapshot passed to each completion
    pub fn seen_histories(&self) -> Vec<Vec<Message>> {
        self.lock().histories.clone()
    }

    pub fn seen_args(&self) -> Vec<CallArgs> {
        self.lock().args.clone()
    }

    /// Schemas received through `bind_tools`
    pub fn bound_tools(&self) -> Vec<ToolSchema> {
        self.lock().tools.clone()
    }

    fn push(self, item: Scripted) -> Self {
        self.lock().queue.push_back(item);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn bind_tools(&mut self, tools: Vec<ToolSchema>) {
        self.lock().tools = tools;
    }

    async fn complete(&self, history: &[Message], args: &CallArgs) -> Result<ModelResponse> {
        let next = {
            let mut script = self.lock();
            script.histories.push(history.to_vec());
            script.args.push(args.clone());
            script.queue.pop_front()
        };

        match next {
            Some(Scripted::Reply(message)) => {
                let finish = if message.has_tool_calls() {
                    FinishReason::ToolCalls
                } else {
                    FinishReason::Stop
                };
                let mut response = ModelResponse::single(message, "scripted");
                response.finish_reason = Some(finish);
                Ok(response)
            }
            Some(Scripted::Fail(error)) => Err(AgentError::Model(error)),
            None => Err(AgentError::Model("script exhausted".into())),
        }
    }
}

type ToolFn = dyn Fn(&Map<String, Value>) -> std::result::Result<Value, ToolError> + Send + Sync;

/// Tool backed by a closure, with an empty parameter list
pub struct FnTool {
    name: String,
    func: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> std::result::Result<Value, ToolError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: format!("Test tool '{}'", self.name),
            parameters: Vec::new(),
        }
    }

    async fn run(&self, args: Map<String, Value>) -> std::result::Result<Value, ToolError> {
        (self.func)(&args)
    }
}
