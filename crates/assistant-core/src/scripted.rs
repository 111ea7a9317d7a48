//! Scripted Provider
//!
//! A local fake completion client for tests and offline demos. Responses are
//! replayed in order; once the script runs out every request fails with a
//! transport error.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{AssistantError, Result};
use crate::message::Message;
use crate::provider::{Completion, GenerationOptions, LlmProvider};
use crate::tool::{ToolArguments, ToolCall, ToolSchema};

enum Step {
    Reply(Completion),
    Fail(String),
}

/// What the provider was asked, recorded per request
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// Completion client that replays a fixed script
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a final answer
    #[must_use]
    pub fn then_text(self, content: impl Into<String>) -> Self {
        self.then(Completion::text(content))
    }

    /// Queue a single tool call; `arguments` must be a JSON object
    #[must_use]
    pub fn then_call(self, id: &str, name: &str, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => ToolArguments::new(),
        };
        self.then(Completion::tool_calls(vec![ToolCall::new(id, name, arguments)]))
    }

    /// Queue an arbitrary completion
    #[must_use]
    pub fn then(mut self, completion: Completion) -> Self {
        self.script.get_mut().push_back(Step::Reply(completion));
        self
    }

    /// Queue a transport failure
    #[must_use]
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.script.get_mut().push_back(Step::Fail(message.into()));
        self
    }

    /// Number of completion requests received so far
    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// All recorded requests
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        self.requests.lock().await.push(RecordedRequest {
            messages: messages.to_vec(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
        });

        match self.script.lock().await.pop_front() {
            Some(Step::Reply(mut completion)) => {
                if completion.model.is_empty() {
                    completion.model.clone_from(&options.model);
                }
                Ok(completion)
            }
            Some(Step::Fail(message)) => Err(AssistantError::ModelTransport(message)),
            None => Err(AssistantError::ModelTransport("script exhausted".into())),
        }
    }
}
