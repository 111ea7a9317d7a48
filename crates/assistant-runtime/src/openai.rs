//! OpenAI-compatible Provider
//!
//! Implementation of `LlmProvider` for `/chat/completions` endpoints with
//! native tool calling.

use std::time::Duration;

use assistant_core::{
    error::{AssistantError, Result},
    message::{Message, Role},
    provider::{Completion, FinishReason, GenerationOptions, LlmProvider, TokenUsage},
    tool::{ToolArguments, ToolCall, ToolSchema},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How the API key is presented
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>` (OpenAI, Ollama)
    Bearer,
    /// `api-key: <key>` (Azure OpenAI)
    ApiKeyHeader,
}

impl AuthStyle {
    fn from_env_value(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "api-key" | "azure" => Self::ApiKeyHeader,
            _ => Self::Bearer,
        }
    }
}

/// Provider configuration
#[derive(Clone)]
pub struct OpenAiConfig {
    /// Base URL; `/chat/completions` is appended
    pub base_url: String,

    /// API key (optional for local endpoints)
    pub api_key: Option<String>,

    /// Azure-style `api-version` query parameter
    pub api_version: Option<String>,

    pub auth: AuthStyle,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_version", &self.api_version)
            .field("auth", &self.auth)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            api_version: None,
            auth: AuthStyle::Bearer,
            timeout_secs: 120,
        }
    }
}

impl OpenAiConfig {
    pub fn from_env() -> Self {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            base_url: non_empty("LLM_BASE_URL").unwrap_or(defaults.base_url),
            api_key: non_empty("LLM_API_KEY"),
            api_version: non_empty("LLM_API_VERSION"),
            auth: non_empty("LLM_AUTH").map_or(defaults.auth, |v| AuthStyle::from_env_value(&v)),
            timeout_secs: non_empty("LLM_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// OpenAI-compatible completion client
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    /// Create from configuration
    pub fn from_config(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AssistantError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(OpenAiConfig::from_env())
    }

    pub const fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, self.config.endpoint(path));
        if let Some(version) = &self.config.api_version {
            builder = builder.query(&[("api-version", version)]);
        }
        match (&self.config.api_key, self.config.auth) {
            (Some(key), AuthStyle::Bearer) => builder.bearer_auth(key),
            (Some(key), AuthStyle::ApiKeyHeader) => builder.header("api-key", key),
            (None, _) => builder,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "OpenAI-compatible"
    }

    async fn health_check(&self) -> Result<bool> {
        match self.request(reqwest::Method::GET, "models").send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!("Completion endpoint health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let body = create_request(messages, tools, options);

        let response = self
            .request(reqwest::Method::POST, "chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::ModelTransport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(500).collect();
            return Err(AssistantError::ModelTransport(format!("{status}: {detail}")));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::ModelTransport(format!("invalid completion body: {e}")))?;

        convert_response(parsed, &options.model)
    }
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Serialize)]
struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct WireTool {
    r#type: &'static str,
    function: FunctionTool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(default = "function_type")]
    r#type: String,
    function: FunctionCall,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum WireMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<WireToolCall>>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Clone, Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Clone, Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// -----------
// Conversions
// -----------

fn create_request(
    messages: &[Message],
    tools: &[ToolSchema],
    options: &GenerationOptions,
) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: options.model.clone(),
        messages: messages.iter().map(create_message).collect(),
        tools: tools.iter().map(create_tool).collect(),
        tool_choice: (!tools.is_empty()).then_some("auto"),
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        top_p: options.top_p,
        stop: options.stop_sequences.clone(),
    }
}

fn create_message(msg: &Message) -> WireMessage {
    match msg.role {
        Role::System => WireMessage::System {
            content: msg.content.clone(),
        },
        Role::User => WireMessage::User {
            content: msg.content.clone(),
        },
        Role::Assistant => WireMessage::Assistant {
            content: (!msg.content.is_empty() || msg.tool_calls.is_empty())
                .then(|| msg.content.clone()),
            tool_calls: msg.requests_tools().then(|| {
                msg.tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: Some(call.id.clone()),
                        r#type: function_type(),
                        function: FunctionCall {
                            name: call.name.clone(),
                            arguments: Some(Value::Object(call.arguments.clone()).to_string()),
                        },
                    })
                    .collect()
            }),
        },
        Role::Tool => WireMessage::Tool {
            tool_call_id: msg.tool_call_id().unwrap_or_default().to_string(),
            content: msg.content.clone(),
        },
    }
}

fn create_tool(tool: &ToolSchema) -> WireTool {
    WireTool {
        r#type: "function",
        function: FunctionTool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters_json(),
        },
    }
}

fn parse_arguments(name: &str, raw: Option<&str>) -> ToolArguments {
    let raw = raw.unwrap_or("{}");
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            // Leave validation to the dispatcher; it reports the missing fields.
            tracing::warn!(tool = name, "Tool call arguments are not a JSON object");
            ToolArguments::new()
        }
    }
}

fn convert_response(response: ChatCompletionResponse, requested_model: &str) -> Result<Completion> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AssistantError::ModelTransport("completion had no choices".into()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let arguments = parse_arguments(&call.function.name, call.function.arguments.as_deref());
            match call.id {
                Some(id) => ToolCall::new(id, call.function.name, arguments),
                None => ToolCall::generated(call.function.name, arguments),
            }
        })
        .collect();

    Ok(Completion {
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
        model: response.model.unwrap_or_else(|| requested_model.to_string()),
        usage: response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
        finish_reason: choice.finish_reason.as_deref().map(FinishReason::from_wire),
    })
}
