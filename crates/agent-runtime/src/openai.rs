//! OpenAI-compatible Model Backend
//!
//! Implementation of `ModelBackend` for any server exposing
//! `/chat/completions` with function calling: OpenAI itself, Ollama's `/v1`
//! endpoint, vLLM and friends.

use std::time::Duration;

use agent_core::{
    args::CallArgs,
    config::{ModelConfig, ModelProvider},
    error::{AgentError, Result},
    message::{Message, Role, ToolCallRequest},
    node::Node,
    provider::{FinishReason, ModelBackend, ModelResponse, TokenUsage},
    tool::ToolSchema,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_HOST: &str = "http://localhost:11434";

/// Call keyword arguments copied into the request body
const REQUEST_OVERRIDES: &[&str] = &[
    "temperature",
    "max_tokens",
    "top_p",
    "stop",
    "seed",
    "presence_penalty",
    "frequency_penalty",
    "tool_choice",
    "response_format",
    "user",
];

/// Backend connection settings
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub provider: ModelProvider,

    /// Endpoint root, without trailing slash (e.g., "https://api.openai.com/v1")
    pub base_url: String,

    pub api_key: Option<String>,

    pub model: String,

    pub temperature: f32,

    pub max_tokens: Option<u32>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    /// Resolve a model config against the process environment
    pub fn from_model_config(config: &ModelConfig) -> Result<Self> {
        Self::resolve(config, |key| std::env::var(key).ok())
    }

    /// Resolve a model config, reading variables through `env`.
    ///
    /// OpenAI needs a key (`OPENAI_API_KEY` unless `api_key_env` names
    /// another variable); Ollama only uses one when `api_key_env` is set.
    pub fn resolve(config: &ModelConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = match (&config.base_url, config.provider) {
            (Some(url), _) => url.clone(),
            (None, ModelProvider::OpenAi) => {
                env("OPENAI_BASE_URL").unwrap_or_else(|| OPENAI_BASE_URL.into())
            }
            (None, ModelProvider::Ollama) => {
                let host = env("OLLAMA_HOST").unwrap_or_else(|| OLLAMA_HOST.into());
                format!("{}/v1", host.trim_end_matches('/'))
            }
        };

        let key_var = config.api_key_env.as_deref().or(match config.provider {
            ModelProvider::OpenAi => Some("OPENAI_API_KEY"),
            ModelProvider::Ollama => None,
        });
        let api_key = match key_var {
            Some(var) => Some(env(var).filter(|k| !k.is_empty()).ok_or_else(|| {
                AgentError::Config(format!(
                    "model '{}' needs an API key in ${var}",
                    config.model
                ))
            })?),
            None => None,
        };

        Ok(Self {
            provider: config.provider,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
        })
    }
}

/// OpenAI-compatible chat completions backend
pub struct OpenAiBackend {
    name: String,
    config: OpenAiConfig,
    client: reqwest::Client,
    tools: Vec<ApiTool>,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            name: format!("{}:{}", config.provider, config.model),
            config,
            client,
            tools: Vec::new(),
        })
    }

    /// Create from a model config and the process environment
    pub fn from_model_config(config: &ModelConfig) -> Result<Self> {
        Self::new(OpenAiConfig::from_model_config(config)?)
    }

    pub const fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn request_body(&self, history: &[Message], args: &CallArgs) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "messages": to_api_messages(history),
            "temperature": self.config.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = self.config.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !self.tools.is_empty() {
            body["tools"] = json!(self.tools);
        }
        for key in REQUEST_OVERRIDES {
            if let Some(value) = args.get(key) {
                body[*key] = value.clone();
            }
        }

        body
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(url);
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind_tools(&mut self, tools: Vec<ToolSchema>) {
        self.tools = tools.iter().map(ApiTool::from).collect();
    }

    async fn complete(&self, history: &[Message], args: &CallArgs) -> Result<ModelResponse> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = self.request_body(history, args);

        tracing::debug!(
            backend = %self.name,
            messages = history.len(),
            tools = self.tools.len(),
            "Sending completion request"
        );

        let response = self
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(backend = %self.name, status, body = %text, "Backend returned error");
            return Err(status_error(status, text));
        }

        let api: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::MalformedResponse(format!("cannot decode response: {e}")))?;

        parse_response(api, &self.config.model)
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.config.base_url);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!(backend = %self.name, error = %e, "Health check failed");
                Ok(false)
            }
        }
    }
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("name", &self.name)
            .field("base_url", &self.config.base_url)
            .field("tools", &self.tools.len())
            .finish_non_exhaustive()
    }
}

fn transport_error(e: reqwest::Error) -> AgentError {
    if e.is_connect() || e.is_timeout() {
        AgentError::ModelUnavailable(e.to_string())
    } else {
        AgentError::Model(e.to_string())
    }
}

fn status_error(status: u16, body: String) -> AgentError {
    match status {
        401 | 403 => AgentError::Auth(format!("HTTP {status}: {body}")),
        429 => AgentError::RateLimited(body),
        502..=504 => AgentError::ModelUnavailable(format!("HTTP {status}: {body}")),
        _ => AgentError::Model(format!("HTTP {status}: {body}")),
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: ApiFunction,
}

#[derive(Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    /// A JSON-encoded string; some servers send the object itself
    #[serde(default)]
    arguments: Value,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ApiToolFunction,
}

#[derive(Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: Value,
}

impl From<&ToolSchema> for ApiTool {
    fn from(schema: &ToolSchema) -> Self {
        Self {
            kind: "function",
            function: ApiToolFunction {
                name: schema.name.clone(),
                description: schema.description.clone(),
                parameters: schema.parameters_json(),
            },
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

/// Content as the wire expects it: text, or null when there is none
/// Only assistant turns may carry `null` content on the wire.
fn wire_content(message: &Message) -> Value {
    match (&message.role, &message.content) {
        (Role::Assistant, Value::Null) => Value::Null,
        (Role::Assistant, Value::String(s)) if s.is_empty() && message.has_tool_calls() => {
            Value::Null
        }
        (Role::ToolResponse, Value::Null) => Value::String("null".into()),
        _ => Value::String(message.text()),
    }
}

fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
    messages
        .iter()
        .map(|m| ApiMessage {
            role: match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::ToolResponse => "tool",
            },
            content: wire_content(m),
            tool_calls: m
                .tool_calls
                .iter()
                .map(|call| ApiToolCall {
                    id: Some(call.id.clone()),
                    kind: function_type(),
                    function: ApiFunction {
                        name: call.name.clone(),
                        arguments: Value::String(call.arguments.clone()),
                    },
                })
                .collect(),
            tool_call_id: match m.role {
                Role::ToolResponse => m.id.clone(),
                _ => None,
            },
        })
        .collect()
}

fn parse_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        _ => FinishReason::Error,
    }
}

fn parse_response(api: ChatResponse, requested_model: &str) -> Result<ModelResponse> {
    let model = api.model.unwrap_or_else(|| requested_model.to_owned());
    let choice = api
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AgentError::MalformedResponse(format!("'{model}' returned no choices")))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let arguments = match call.function.arguments {
                Value::String(raw) => raw,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            ToolCallRequest::new(
                call.id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
                call.function.name,
                arguments,
            )
        })
        .collect();

    let content = choice.message.content.map_or(Value::Null, Value::String);
    let message = Message::assistant(content, Node::agent(model.clone())).with_tool_calls(tool_calls);

    Ok(ModelResponse {
        messages: vec![message],
        usage: api.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
        finish_reason: choice.finish_reason.as_deref().map(parse_finish_reason),
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::tool::ParameterSchema;

    fn env(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key: &str| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_owned())
        }
    }

    fn backend() -> OpenAiBackend {
        let config = ModelConfig::new(ModelProvider::Ollama, "llama3.2");
        OpenAiBackend::new(OpenAiConfig::resolve(&config, env(&[])).unwrap()).unwrap()
    }

    #[test]
    fn ollama_defaults_to_local_v1_endpoint() {
        let config = ModelConfig::new(ModelProvider::Ollama, "llama3.2");
        let resolved = OpenAiConfig::resolve(&config, env(&[])).unwrap();
        assert_eq!(resolved.base_url, "http://localhost:11434/v1");
        assert!(resolved.api_key.is_none());

        let resolved =
            OpenAiConfig::resolve(&config, env(&[("OLLAMA_HOST", "http://gpu-box:11434/")])).unwrap();
        assert_eq!(resolved.base_url, "http://gpu-box:11434/v1");
    }

    #[test]
    fn openai_requires_api_key() {
        let config = ModelConfig::new(ModelProvider::OpenAi, "gpt-4o-mini");
        let err = OpenAiConfig::resolve(&config, env(&[])).unwrap_err();
        assert!(err.to_string().contains("$OPENAI_API_KEY"));

        let resolved = OpenAiConfig::resolve(&config, env(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        assert_eq!(resolved.base_url, OPENAI_BASE_URL);
        assert_eq!(resolved.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn custom_key_variable_and_base_url() {
        let mut config = ModelConfig::new(ModelProvider::OpenAi, "mixtral");
        config.base_url = Some("http://vllm:8000/v1/".into());
        config.api_key_env = Some("VLLM_KEY".into());

        let resolved = OpenAiConfig::resolve(&config, env(&[("VLLM_KEY", "secret")])).unwrap();
        assert_eq!(resolved.base_url, "http://vllm:8000/v1");
        assert_eq!(resolved.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn messages_map_to_wire_roles() {
        let node = Node::agent("a");
        let history = vec![
            Message::system("be brief"),
            Message::user("2+2?"),
            Message::assistant(Value::Null, node).with_tool_calls(vec![ToolCallRequest::new(
                "call_1",
                "calculator",
                r#"{"a":2,"b":2}"#,
            )]),
            Message::tool_response("call_1", json!(4), "calculator"),
        ];

        let wire = serde_json::to_value(to_api_messages(&history)).unwrap();
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[1]["content"], "2+2?");
        assert_eq!(wire[2]["content"], Value::Null);
        assert_eq!(wire[2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(wire[2]["tool_calls"][0]["type"], "function");
        assert_eq!(wire[2]["tool_calls"][0]["function"]["arguments"], r#"{"a":2,"b":2}"#);
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "call_1");
        assert_eq!(wire[3]["content"], "4");
        assert!(wire[1].get("tool_call_id").is_none());
    }

    #[test]
    fn null_tool_output_is_sent_as_text() {
        let history = vec![Message::tool_response("c1", Value::Null, "lookup")];

        let wire = serde_json::to_value(to_api_messages(&history)).unwrap();
        assert_eq!(wire[0]["role"], "tool");
        assert_eq!(wire[0]["tool_call_id"], "c1");
        assert_eq!(wire[0]["content"], "null");
    }

    #[test]
    fn request_body_carries_tools_and_overrides() {
        let mut backend = backend();
        backend.bind_tools(vec![ToolSchema {
            name: "calculator".into(),
            description: "math".into(),
            parameters: vec![ParameterSchema::new("expression", "string", "expr").required()],
        }]);

        let args = CallArgs::new().kwarg("temperature", 0.0).kwarg("topic", "ignored");
        let body = backend.request_body(&[Message::user("hi")], &args);

        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["tools"][0]["function"]["name"], "calculator");
        assert_eq!(
            body["tools"][0]["function"]["parameters"]["required"],
            json!(["expression"])
        );
        assert!(body.get("topic").is_none());
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn parses_tool_call_response() {
        let api: ChatResponse = serde_json::from_value(json!({
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_1", "type": "function",
                         "function": {"name": "calculator", "arguments": "{\"a\":2,\"b\":2}"}},
                        {"function": {"name": "datetime", "arguments": {"format": "iso"}}}
                    ]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
        }))
        .unwrap();

        let response = parse_response(api, "fallback").unwrap();
        assert_eq!(response.model, "gpt-4o-mini");
        assert_eq!(response.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(response.usage.as_ref().unwrap().total_tokens, 20);

        let message = response.into_final_message().unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert!(!message.has_content());
        assert_eq!(message.tool_calls[0].id, "call_1");
        assert_eq!(message.tool_calls[0].arguments, r#"{"a":2,"b":2}"#);
        assert!(message.tool_calls[1].id.starts_with("call_"));
        assert_eq!(
            message.tool_calls[1].parse_arguments().unwrap().get("format"),
            Some(&json!("iso"))
        );
    }

    #[test]
    fn parses_text_response() {
        let api: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "4"}, "finish_reason": "stop"}]
        }))
        .unwrap();

        let response = parse_response(api, "llama3.2").unwrap();
        assert_eq!(response.model, "llama3.2");
        let message = response.into_final_message().unwrap();
        assert_eq!(message.text(), "4");
        assert!(!message.has_tool_calls());
    }

    #[test]
    fn empty_choices_are_malformed() {
        let api: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(
            parse_response(api, "m"),
            Err(AgentError::MalformedResponse(_))
        ));
    }

    #[test]
    fn status_codes_map_to_errors() {
        assert!(matches!(status_error(401, String::new()), AgentError::Auth(_)));
        assert!(matches!(status_error(429, String::new()), AgentError::RateLimited(_)));
        assert!(matches!(status_error(503, String::new()), AgentError::ModelUnavailable(_)));
        assert!(matches!(status_error(400, "bad".into()), AgentError::Model(m) if m == "HTTP 400: bad"));
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let mut config = ModelConfig::new(ModelProvider::Ollama, "llama3.2");
        config.base_url = Some("http://127.0.0.1:9".into());
        config.timeout_secs = 5;
        let backend = OpenAiBackend::from_model_config(&config).unwrap();

        let err = backend
            .complete(&[Message::user("hi")], &CallArgs::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ModelUnavailable(_)));
        assert!(!backend.health_check().await.unwrap());
    }
}
