//! Tool System
//!
//! Tool call requests emitted by the model, the result envelope fed back into
//! the conversation, JSON-schema shaped declarations, and the dispatcher seam
//! the orchestrator executes calls through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Untyped arguments as emitted by the model
pub type ToolArguments = Map<String, Value>;

/// Tool call request from the LLM
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID used to correlate the tool turn with the request
    pub id: String,

    /// Tool identifier
    pub name: String,

    /// Arguments as key-value pairs
    #[serde(default)]
    pub arguments: ToolArguments,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Create a call with a freshly generated ID
    pub fn generated(name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self::new(format!("call_{}", uuid::Uuid::new_v4().simple()), name, arguments)
    }
}

/// Result envelope from tool execution
///
/// Failures are data: they are rendered into the conversation so the model
/// can self-correct.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Call ID (copied from the request)
    pub id: Option<String>,

    /// Whether execution succeeded
    pub success: bool,

    /// Output (rendered table/text or error string)
    pub output: String,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: false,
            output: error.into(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
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
}

impl ParameterSchema {
    pub fn required(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: true,
        }
    }
}

/// Tool declaration sent to the completion endpoint
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,
}

impl ToolSchema {
    /// JSON-schema object describing the arguments
    pub fn parameters_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    json!({ "type": p.param_type, "description": p.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Executes tool calls against whatever the tools are bound to
///
/// `dispatch` never fails: every error is normalized into a failed
/// [`ToolResult`] so it can be fed back to the model.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Tools currently declared to the model
    fn declarations(&self) -> Vec<ToolSchema>;

    /// Whether `name` is in the declared set
    fn is_declared(&self, name: &str) -> bool {
        self.declarations().iter().any(|schema| schema.name == name)
    }

    /// Execute one call
    async fn dispatch(&self, call: &ToolCall) -> ToolResult;
}
