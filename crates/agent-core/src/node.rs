//! Conversation Participants
//!
//! A [`Node`] names who produced a message: the user, an agent, a tool.
//! Agents mounted as tools of another agent carry a weak link to the
//! parent's node, which is how the loop knows it runs nested.

use std::sync::{Arc, OnceLock, Weak};

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// Kind of participant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    User,
    Agent,
    Tool,
    System,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Agent => write!(f, "agent"),
            Self::Tool => write!(f, "tool"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Identity of a conversation participant.
///
/// The ancestor link is bound at most once, when an agent is mounted under a
/// parent, and is never an owning reference.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: NodeType,

    #[serde(skip)]
    ancestor: OnceLock<Weak<Node>>,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeType) -> Self {
        Self {
            name: name.into(),
            kind,
            ancestor: OnceLock::new(),
        }
    }

    /// The participant every raw-text input is attributed to.
    pub fn user() -> Self {
        Self::new("user", NodeType::User)
    }

    pub fn agent(name: impl Into<String>) -> Self {
        Self::new(name, NodeType::Agent)
    }

    pub fn tool(name: impl Into<String>) -> Self {
        Self::new(name, NodeType::Tool)
    }

    pub fn system() -> Self {
        Self::new("system", NodeType::System)
    }

    /// Construct with the ancestor already bound.
    pub fn with_ancestor(self, ancestor: &Arc<Self>) -> Self {
        let _ = self.ancestor.set(Arc::downgrade(ancestor));
        self
    }

    /// Bind the ancestor of a node that has none yet.
    pub fn bind_ancestor(&self, ancestor: &Arc<Self>) -> Result<()> {
        self.ancestor.set(Arc::downgrade(ancestor)).map_err(|_| {
            AgentError::Config(format!(
                "'{}' is already mounted under another agent",
                self.name
            ))
        })
    }

    /// The invoking node, if it is still alive.
    pub fn ancestor(&self) -> Option<Arc<Self>> {
        self.ancestor.get().and_then(Weak::upgrade)
    }

    /// True when this node runs on behalf of a parent agent.
    pub fn is_nested(&self) -> bool {
        self.ancestor.get().is_some()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.kind == other.kind
    }
}

impl Eq for Node {}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}
