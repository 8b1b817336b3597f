//! Tool System
//!
//! Extensible tool framework for agent capabilities.
//! Tools are registered at construction and invoked by the agent loop
//! through the [`ToolDispatcher`](crate::dispatcher::ToolDispatcher).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ToolError;

/// Parameter definition for tool schema
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    pub fn new(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: false,
            default: None,
            enum_values: None,
        }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }
}

/// Tool definition schema (for model function calling)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to the model)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,
}

impl ToolSchema {
    /// Parameters as a JSON Schema object, the shape function-calling APIs expect.
    pub fn parameters_json(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let mut prop = Map::new();
            prop.insert("type".into(), Value::String(param.param_type.clone()));
            prop.insert(
                "description".into(),
                Value::String(param.description.clone()),
            );
            if let Some(default) = &param.default {
                prop.insert("default".into(), default.clone());
            }
            if let Some(values) = &param.enum_values {
                prop.insert("enum".into(), Value::Array(values.clone()));
            }
            properties.insert(param.name.clone(), Value::Object(prop));

            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model calls this tool by
    fn name(&self) -> &str;

    /// Get the tool's schema for model function calling
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with keyword arguments
    async fn run(&self, args: Map<String, Value>) -> Result<Value, ToolError>;

    /// Validate arguments before execution (optional)
    fn validate(&self, args: &Map<String, Value>) -> Result<(), ToolError> {
        let schema = self.schema();

        for param in &schema.parameters {
            if param.required && !args.contains_key(&param.name) {
                return Err(ToolError::invalid_arguments(
                    &schema.name,
                    format!("missing required parameter: {}", param.name),
                ));
            }
        }

        Ok(())
    }
}

/// Registry for available tools
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool, replacing any tool with the same name
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_owned(), tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Resolve, validate and run a tool
    pub async fn execute(&self, name: &str, args: Map<String, Value>) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_owned()))?;

        tool.validate(&args)?;
        tool.run(args).await
    }

    /// All tool schemas, sorted by name
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<_> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Tool names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "echo".into(),
                description: "Echoes back the input".into(),
                parameters: vec![ParameterSchema::new("text", "string", "Text to echo").required()],
            }
        }

        async fn run(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
            Ok(args.get("text").cloned().unwrap_or(Value::Null))
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        assert_eq!(registry.len(), 1);
        assert!(registry.contains("echo"));
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.names(), vec!["echo"]);
    }

    #[tokio::test]
    async fn execute_validates_required_parameters() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        let err = registry.execute("echo", Map::new()).await.unwrap_err();
        assert!(err.to_string().contains("missing required parameter: text"));

        let mut args = Map::new();
        args.insert("text".into(), json!("hi"));
        assert_eq!(registry.execute("echo", args).await.unwrap(), json!("hi"));
    }

    #[tokio::test]
    async fn execute_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.execute("nope", Map::new()).await.unwrap_err();
        assert_eq!(err, ToolError::NotFound("nope".into()));
    }

    #[test]
    fn parameters_json_lists_required() {
        let schema = EchoTool.schema();
        let json = schema.parameters_json();
        assert_eq!(json["type"], "object");
        assert_eq!(json["properties"]["text"]["type"], "string");
        assert_eq!(json["required"], json!(["text"]));
    }
}
