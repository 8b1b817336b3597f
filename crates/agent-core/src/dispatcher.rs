//! Tool dispatch for the agent loop.
//!
//! Turns each model-emitted [`ToolCallRequest`] into a tool-response
//! [`Message`]. Failures never leave this module: unknown tools, bad
//! argument payloads, tool errors and tool panics all become a response
//! whose content is `"Error: <message>"`, so the model can react to them.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::message::{Message, ToolCallRequest};
use crate::tool::ToolRegistry;

#[derive(Clone, Debug)]
pub struct ToolDispatcher {
    tools: Arc<ToolRegistry>,
}

impl ToolDispatcher {
    pub const fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Execute one call and wrap the outcome as a tool response.
    pub async fn dispatch(&self, call: &ToolCallRequest) -> Message {
        let start = Instant::now();
        let outcome = AssertUnwindSafe(self.execute(call))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ToolError::Failed(panic_message(panic.as_ref()))));
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(value) => {
                debug!(tool = %call.name, call_id = %call.id, duration_ms, "Tool call succeeded");
                Message::tool_response(&call.id, value, &call.name)
            }
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, duration_ms, error = %e, "Tool call failed");
                Message::tool_response(&call.id, Value::String(format!("Error: {e}")), &call.name)
            }
        }
    }

    /// Dispatch every call of one model turn.
    ///
    /// Responses come back in call order whether or not the calls ran
    /// concurrently.
    pub async fn dispatch_all(&self, calls: &[ToolCallRequest], parallel: bool) -> Vec<Message> {
        if parallel {
            return join_all(calls.iter().map(|call| self.dispatch(call))).await;
        }

        let mut responses = Vec::with_capacity(calls.len());
        for call in calls {
            responses.push(self.dispatch(call).await);
        }
        responses
    }

    async fn execute(&self, call: &ToolCallRequest) -> Result<Value, ToolError> {
        if !self.tools.contains(&call.name) {
            return Err(ToolError::NotFound(call.name.clone()));
        }
        let args = call.parse_arguments()?;
        self.tools.execute(&call.name, args).await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "tool panicked".into())
}
