//! Lifecycle Events
//!
//! The loop publishes start/end/error events at agent granularity, plus the
//! tool-granularity events when the agent itself runs as a tool of a parent.
//! Publishing is fire-and-forget: a handler that fails or panics is logged
//! and skipped, the run never sees it.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::args::CallArgs;
use crate::message::Message;
use crate::node::Node;

/// Event kinds published by the loop
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    AgentStart,
    AgentEnd,
    AgentError,
    ToolStart,
    ToolEnd,
    ToolError,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AgentStart => "AGENT_START",
            Self::AgentEnd => "AGENT_END",
            Self::AgentError => "AGENT_ERROR",
            Self::ToolStart => "TOOL_START",
            Self::ToolEnd => "TOOL_END",
            Self::ToolError => "TOOL_ERROR",
        };
        f.write_str(name)
    }
}

/// What an event carries
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EventPayload {
    /// Starting or final message
    Message(Message),
    /// Final content handed back to a parent
    Content(Value),
    /// Rendered error
    Error(String),
}

#[derive(Clone, Debug, Serialize)]
pub struct CallbackEvent {
    pub kind: EventKind,
    pub node: Node,
    pub payload: EventPayload,
    pub args: CallArgs,
    pub timestamp: DateTime<Utc>,
}

/// Subscriber to lifecycle events
pub trait CallbackHandler: Send + Sync {
    fn on_event(&self, event: &CallbackEvent) -> anyhow::Result<()>;
}

/// Fans events out to every registered handler
#[derive(Clone, Default)]
pub struct CallbackManager {
    handlers: Vec<Arc<dyn CallbackHandler>>,
}

impl CallbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, handler: Arc<dyn CallbackHandler>) {
        self.handlers.push(handler);
    }

    pub fn with_handler(mut self, handler: Arc<dyn CallbackHandler>) -> Self {
        self.add(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn publish(&self, kind: EventKind, node: &Node, payload: EventPayload, args: &CallArgs) {
        if self.handlers.is_empty() {
            return;
        }

        let event = CallbackEvent {
            kind,
            node: node.clone(),
            payload,
            args: args.clone(),
            timestamp: Utc::now(),
        };

        for handler in &self.handlers {
            match std::panic::catch_unwind(AssertUnwindSafe(|| handler.on_event(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(event = %kind, node = %node, error = %e, "Callback handler failed"),
                Err(_) => warn!(event = %kind, node = %node, "Callback handler panicked"),
            }
        }
    }
}

impl std::fmt::Debug for CallbackManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackManager")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Logs every event through `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingCallback;

impl CallbackHandler for TracingCallback {
    fn on_event(&self, event: &CallbackEvent) -> anyhow::Result<()> {
        match &event.payload {
            EventPayload::Error(error) => {
                warn!(event = %event.kind, node = %event.node, error = %error, "Lifecycle event");
            }
            EventPayload::Message(message) => {
                info!(event = %event.kind, node = %event.node, role = %message.role, "Lifecycle event");
            }
            EventPayload::Content(_) => {
                info!(event = %event.kind, node = %event.node, "Lifecycle event");
            }
        }
        Ok(())
    }
}

/// Re-publishes events on a `tokio::sync::broadcast` channel.
///
/// Having no subscribers is fine; events are dropped.
pub struct BroadcastCallback {
    sender: broadcast::Sender<Arc<CallbackEvent>>,
}

impl BroadcastCallback {
    /// Channel holding up to `capacity` unread events; at least one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<CallbackEvent>> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastCallback {
    fn default() -> Self {
        Self::new(256)
    }
}

impl CallbackHandler for BroadcastCallback {
    fn on_event(&self, event: &CallbackEvent) -> anyhow::Result<()> {
        let _ = self.sender.send(Arc::new(event.clone()));
        Ok(())
    }
}

/// Keeps every event in memory, in publish order
#[derive(Debug, Default)]
pub struct RecordingCallback {
    events: Mutex<Vec<CallbackEvent>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CallbackEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(|e| e.kind).collect()
    }
}

impl CallbackHandler for RecordingCallback {
    fn on_event(&self, event: &CallbackEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .map_err(|_| anyhow::anyhow!("event log poisoned"))?
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingHandler;

    impl CallbackHandler for FailingHandler {
        fn on_event(&self, _event: &CallbackEvent) -> anyhow::Result<()> {
            anyhow::bail!("subscriber offline")
        }
    }

    struct PanickingHandler;

    impl CallbackHandler for PanickingHandler {
        fn on_event(&self, _event: &CallbackEvent) -> anyhow::Result<()> {
            panic!("subscriber bug")
        }
    }

    #[test]
    fn failing_handlers_do_not_stop_delivery() {
        let recorder = Arc::new(RecordingCallback::new());
        let manager = CallbackManager::new()
            .with_handler(Arc::new(FailingHandler))
            .with_handler(Arc::new(PanickingHandler))
            .with_handler(recorder.clone());

        manager.publish(
            EventKind::AgentStart,
            &Node::agent("a"),
            EventPayload::Message(Message::user("hi")),
            &CallArgs::new(),
        );

        assert_eq!(recorder.kinds(), vec![EventKind::AgentStart]);
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let broadcast = Arc::new(BroadcastCallback::new(8));
        let mut rx = broadcast.subscribe();
        let manager = CallbackManager::new().with_handler(broadcast);

        manager.publish(
            EventKind::ToolEnd,
            &Node::agent("child"),
            EventPayload::Content(Value::from("done")),
            &CallArgs::new(),
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::ToolEnd);
        assert_eq!(event.node.name, "child");
    }

    #[tokio::test]
    async fn zero_capacity_broadcast_still_delivers() {
        let broadcast = Arc::new(BroadcastCallback::new(0));
        let mut rx = broadcast.subscribe();
        let manager = CallbackManager::new().with_handler(broadcast);

        manager.publish(
            EventKind::AgentStart,
            &Node::agent("a"),
            EventPayload::Content(Value::Null),
            &CallArgs::new(),
        );
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::AgentStart);
    }

    #[test]
    fn broadcast_without_subscribers_is_fine() {
        let manager = CallbackManager::new().with_handler(Arc::new(BroadcastCallback::default()));
        manager.publish(
            EventKind::AgentError,
            &Node::agent("a"),
            EventPayload::Error("boom".into()),
            &CallArgs::new(),
        );
    }

    #[test]
    fn event_kind_names() {
        assert_eq!(EventKind::ToolStart.to_string(), "TOOL_START");
        assert_eq!(serde_json::to_value(EventKind::AgentError).unwrap(), "AGENT_ERROR");
    }
}
