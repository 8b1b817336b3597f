//! Agents as Tools
//!
//! A parent agent calls a sub-agent the same way it calls any tool: by name,
//! with a `message` argument. The sub-agent keeps its own history across
//! calls; concurrent calls from parallel dispatch queue on its lock.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::args::CallArgs;
use crate::error::{Result, ToolError};
use crate::node::Node;
use crate::reasoning::Agent;
use crate::tool::{ParameterSchema, Tool, ToolSchema};

pub struct AgentTool {
    name: String,
    description: String,
    agent: Mutex<Agent>,
}

impl AgentTool {
    /// Bind `agent` to `parent` and wrap it as a tool.
    pub fn mount(agent: Agent, parent: &Arc<Node>) -> Result<Self> {
        agent.attach(parent)?;

        let description = if agent.description().is_empty() {
            format!("Ask the '{}' agent", agent.name())
        } else {
            agent.description().to_owned()
        };

        Ok(Self {
            name: agent.name().to_owned(),
            description,
            agent: Mutex::new(agent),
        })
    }

    /// Exclusive access to the wrapped agent
    pub async fn agent(&self) -> tokio::sync::MutexGuard<'_, Agent> {
        self.agent.lock().await
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: vec![
                ParameterSchema::new("message", "string", "What to ask this agent").required(),
            ],
        }
    }

    async fn run(&self, mut args: Map<String, Value>) -> std::result::Result<Value, ToolError> {
        let message = match args.remove("message") {
            Some(Value::String(message)) => message,
            Some(other) => other.to_string(),
            None => {
                return Err(ToolError::invalid_arguments(
                    &self.name,
                    "missing required parameter: message",
                ));
            }
        };

        let mut agent = self.agent.lock().await;
        agent
            .run(message, CallArgs::from(args))
            .await
            .map(Value::String)
            .map_err(|e| ToolError::Failed(e.to_string()))
    }
}

impl std::fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;
    use serde_json::json;

    fn child(backend: ScriptedBackend) -> Agent {
        Agent::builder("researcher")
            .prompt("Research {topic}.")
            .backend(backend)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn forwards_message_and_extra_arguments() {
        let backend = ScriptedBackend::new().reply("found it");
        let parent = Arc::new(Node::agent("planner"));
        let tool = AgentTool::mount(child(backend.clone()), &parent).unwrap();

        let args = json!({"message": "look up rust", "topic": "languages"});
        let out = tool.run(args.as_object().cloned().unwrap()).await.unwrap();

        assert_eq!(out, json!("found it"));
        let agent = tool.agent().await;
        assert_eq!(agent.history().system().unwrap().text(), "Research languages.");
        assert_eq!(agent.history().conversation()[0].text(), "look up rust");
        assert_eq!(backend.seen_args()[0].get("topic"), Some(&json!("languages")));
    }

    #[tokio::test]
    async fn sub_agent_failure_becomes_tool_failure() {
        let backend = ScriptedBackend::new().fail("backend offline");
        let parent = Arc::new(Node::agent("planner"));
        let tool = AgentTool::mount(child(backend), &parent).unwrap();

        let err = tool
            .run(json!({"message": "hi"}).as_object().cloned().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Failed("Model error: backend offline".into()));
    }

    #[test]
    fn schema_requires_message() {
        let parent = Arc::new(Node::agent("planner"));
        let tool = AgentTool::mount(child(ScriptedBackend::new()), &parent).unwrap();
        let schema = tool.schema();

        assert_eq!(schema.name, "researcher");
        assert_eq!(schema.description, "Ask the 'researcher' agent");
        assert_eq!(schema.parameters_json()["required"], json!(["message"]));
    }

    #[test]
    fn agent_mounts_once() {
        let first = Arc::new(Node::agent("a"));
        let agent = child(ScriptedBackend::new());
        agent.attach(&first).unwrap();

        let second = Arc::new(Node::agent("b"));
        assert!(AgentTool::mount(agent, &second).is_err());
    }
}
