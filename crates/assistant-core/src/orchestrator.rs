//! Orchestrator
//!
//! The tool-calling control loop. One user message drives the state machine
//!
//! ```text
//!  AwaitingModel ──tool calls──▶ ExecutingTools
//!       ▲   │                         │
//!       │   └──final answer──▶ Done ◀─┤ undeclared tool
//!       └─────── batch finished ──────┘
//! ```
//!
//! A failed query is not special-cased: its error text becomes a tool turn and
//! the model is expected to ask for `debug_sql_query` and retry on the next
//! round-trip. The number of model round-trips per message is bounded.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{AssistantError, Result};
use crate::message::{Conversation, Message};
use crate::provider::{GenerationOptions, LlmProvider};
use crate::tool::{ToolCall, ToolDispatcher};

/// Appended when the model asks for a tool outside the declared set
pub const REFUSAL_MESSAGE: &str = "I'm sorry, I cannot perform the requested action.";

/// Tool output recorded for calls after a refused one in the same batch
pub const SKIPPED_CALL_MESSAGE: &str = "Not executed: an earlier call in this batch was refused.";

/// Appended when the round-trip bound is exhausted
pub const ROUND_TRIP_LIMIT_MESSAGE: &str = "I could not complete this request within the allowed number of steps. \
     The last query kept failing; please rephrase or narrow the question.";

/// Orchestrator configuration
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Maximum model round-trips for one user message
    pub max_round_trips: usize,

    /// Generation options
    pub generation: GenerationOptions,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_round_trips: 8,
            generation: GenerationOptions::default(),
        }
    }
}

/// States of one chat exchange
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnState {
    AwaitingModel,
    ExecutingTools,
    Done,
}

/// Why the loop reached `Done`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The model produced a final answer
    #[default]
    Answered,
    /// The model asked for an undeclared tool
    Refused,
    /// The round-trip bound was exhausted
    RoundTripLimit,
}

/// Everything the caller gets back from one exchange
#[derive(Clone, Debug, Default, Serialize)]
pub struct TurnOutcome {
    /// Final answer shown to the user
    pub answer: String,

    /// Execution log (model replies, tool calls, tool output)
    pub logs: Vec<String>,

    /// Output of the last executed tool
    pub database_response: String,

    /// Short progress lines ("Running execute_sql_function", ...)
    pub status_updates: Vec<String>,

    /// Number of completion requests made
    pub model_calls: usize,

    /// States visited, in order
    pub trace: Vec<TurnState>,

    pub termination: Termination,
}

enum Step {
    AwaitingModel,
    ExecutingTools(Vec<ToolCall>),
    Done(Termination),
}

impl Step {
    const fn state(&self) -> TurnState {
        match self {
            Self::AwaitingModel => TurnState::AwaitingModel,
            Self::ExecutingTools(_) => TurnState::ExecutingTools,
            Self::Done(_) => TurnState::Done,
        }
    }
}

/// Drives the model/tool loop for one user message
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn LlmProvider>, config: OrchestratorConfig) -> Self {
        Self { provider, config }
    }

    /// Create with default configuration
    pub fn with_defaults(provider: Arc<dyn LlmProvider>) -> Self {
        Self::new(provider, OrchestratorConfig::default())
    }

    /// Run the loop until `Done`
    ///
    /// `conversation` must already end with the user turn. Turns are only
    /// appended; on a model transport error the error is returned and the
    /// caller is expected to discard `conversation`.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        tools: &dyn ToolDispatcher,
    ) -> Result<TurnOutcome> {
        let declarations = tools.declarations();
        let mut outcome = TurnOutcome::default();
        let mut step = Step::AwaitingModel;

        loop {
            outcome.trace.push(step.state());

            step = match step {
                Step::AwaitingModel => {
                    if outcome.model_calls >= self.config.max_round_trips {
                        tracing::warn!(
                            max = self.config.max_round_trips,
                            "Round-trip limit reached"
                        );
                        conversation.push(Message::assistant(ROUND_TRIP_LIMIT_MESSAGE));
                        outcome.answer = ROUND_TRIP_LIMIT_MESSAGE.into();
                        Step::Done(Termination::RoundTripLimit)
                    } else {
                        outcome.model_calls += 1;
                        tracing::debug!(round_trip = outcome.model_calls, "Requesting completion");

                        let completion = self
                            .provider
                            .complete(conversation.messages(), &declarations, &self.config.generation)
                            .await
                            .inspect_err(|e| tracing::error!("Completion failed: {}", e))?;

                        outcome.logs.push(format!(
                            "Assistant response: {}",
                            describe_reply(&completion.content, &completion.tool_calls)
                        ));

                        if completion.has_tool_calls() {
                            conversation.push(
                                Message::assistant_with_calls(
                                    completion.content,
                                    completion.tool_calls.clone(),
                                )
                                .with_model(completion.model),
                            );
                            Step::ExecutingTools(completion.tool_calls)
                        } else {
                            outcome.status_updates.push("Generating final response".into());
                            outcome.answer.clone_from(&completion.content);
                            conversation.push(
                                Message::assistant(completion.content).with_model(completion.model),
                            );
                            Step::Done(Termination::Answered)
                        }
                    }
                }

                Step::ExecutingTools(calls) => self.execute_batch(calls, conversation, tools, &mut outcome).await,

                Step::Done(termination) => {
                    outcome.termination = termination;
                    return Ok(outcome);
                }
            };
        }
    }

    /// Dispatch a batch in request order; stops at the first undeclared tool
    async fn execute_batch(
        &self,
        calls: Vec<ToolCall>,
        conversation: &mut Conversation,
        tools: &dyn ToolDispatcher,
        outcome: &mut TurnOutcome,
    ) -> Step {
        let mut calls = calls.into_iter();
        while let Some(call) = calls.next() {
            let arguments = serde_json::Value::Object(call.arguments.clone());
            tracing::info!(tool = %call.name, id = %call.id, "Function call");
            outcome.logs.push(format!(
                "Function call - Name: {}, Arguments: {}",
                call.name, arguments
            ));
            outcome.status_updates.push(format!("Running {}", call.name));

            if !tools.is_declared(&call.name) {
                tracing::warn!(tool = %call.name, "Model requested an undeclared tool");
                // Every requested call id must be answered before the next assistant turn.
                let refused = AssistantError::UnknownTool(call.name.clone()).to_string();
                conversation.push(Message::tool(refused, call.id, call.name));
                for skipped in calls {
                    conversation.push(Message::tool(SKIPPED_CALL_MESSAGE, skipped.id, skipped.name));
                }
                conversation.push(Message::assistant(REFUSAL_MESSAGE));
                outcome.answer = REFUSAL_MESSAGE.into();
                return Step::Done(Termination::Refused);
            }

            let result = tools.dispatch(&call).await;
            tracing::debug!(tool = %call.name, success = result.success, "Function finished");

            outcome.logs.push(format!("Function response: {}", result.output));
            outcome.database_response.clone_from(&result.output);
            conversation.push(Message::tool(result.output, call.id, call.name));
        }

        Step::AwaitingModel
    }

    /// Get configuration
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }
}

fn describe_reply(content: &str, calls: &[ToolCall]) -> String {
    if calls.is_empty() {
        return content.to_string();
    }
    let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
    if content.is_empty() {
        format!("tool calls [{}]", names.join(", "))
    } else {
        format!("{} (tool calls [{}])", content, names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    use super::*;
    use crate::message::Role;
    use crate::scripted::ScriptedProvider;
    use crate::tool::{ParameterSchema, ToolResult, ToolSchema};
    use crate::AssistantError;

    /// Fails any query containing "SELEC " and echoes everything else.
    #[derive(Default)]
    struct FakeSqlTools {
        executed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ToolDispatcher for FakeSqlTools {
        fn declarations(&self) -> Vec<ToolSchema> {
            vec![
                ToolSchema {
                    name: "execute_sql_function".into(),
                    description: "run".into(),
                    parameters: vec![ParameterSchema::required("query", "string", "sql")],
                },
                ToolSchema {
                    name: "debug_sql_query".into(),
                    description: "fix".into(),
                    parameters: vec![
                        ParameterSchema::required("query", "string", "sql"),
                        ParameterSchema::required("error_message", "string", "err"),
                    ],
                },
            ]
        }

        async fn dispatch(&self, call: &ToolCall) -> ToolResult {
            let query = call.arguments["query"].as_str().unwrap_or_default().to_string();
            self.executed.lock().await.push(format!("{}:{}", call.name, query));
            match call.name.as_str() {
                "debug_sql_query" => ToolResult::success(&call.name, "SELECT name FROM artists"),
                _ if query.contains("SELEC ") => {
                    ToolResult::failure(&call.name, "near \"SELEC\": syntax error")
                }
                _ => ToolResult::success(&call.name, "| name |\n|------|\n| AC/DC |"),
            }
        }
    }

    fn conversation() -> Conversation {
        let mut conv = Conversation::with_system_prompt("You answer questions about a SQLite database.");
        conv.push(Message::user("Which artists are there?"));
        conv
    }

    #[tokio::test]
    async fn test_final_answer_takes_one_model_call() {
        let provider = Arc::new(ScriptedProvider::new().then_text("There are 275 artists."));
        let orchestrator = Orchestrator::with_defaults(provider.clone());
        let tools = FakeSqlTools::default();
        let mut conv = conversation();

        let outcome = orchestrator.run(&mut conv, &tools).await.unwrap();

        assert_eq!(provider.request_count().await, 1);
        assert_eq!(outcome.model_calls, 1);
        assert_eq!(outcome.answer, "There are 275 artists.");
        assert_eq!(outcome.trace, vec![TurnState::AwaitingModel, TurnState::Done]);
        assert_eq!(conv.roles(), vec![Role::System, Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn test_self_correction_path() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .then_call("c1", "execute_sql_function", json!({"query": "SELEC name FROM artists"}))
                .then_call(
                    "c2",
                    "debug_sql_query",
                    json!({"query": "SELEC name FROM artists", "error_message": "near \"SELEC\": syntax error"}),
                )
                .then_call("c3", "execute_sql_function", json!({"query": "SELECT name FROM artists"}))
                .then_text("The artists include AC/DC."),
        );
        let orchestrator = Orchestrator::with_defaults(provider.clone());
        let tools = FakeSqlTools::default();
        let mut conv = conversation();

        let outcome = orchestrator.run(&mut conv, &tools).await.unwrap();

        assert_eq!(
            conv.roles(),
            vec![
                Role::System,
                Role::User,
                Role::Assistant,
                Role::Tool,
                Role::Assistant,
                Role::Tool,
                Role::Assistant,
                Role::Tool,
                Role::Assistant,
            ]
        );
        let messages = conv.messages();
        assert!(messages[3].content.contains("syntax error"));
        assert_eq!(messages[3].tool_call_id(), Some("c1"));
        assert_eq!(messages[5].content, "SELECT name FROM artists");
        assert_eq!(messages[7].tool_call_id(), Some("c3"));
        assert_eq!(outcome.model_calls, 4);
        assert_eq!(outcome.termination, Termination::Answered);
        assert!(outcome.database_response.contains("AC/DC"));
        assert_eq!(
            outcome.status_updates,
            vec![
                "Running execute_sql_function",
                "Running debug_sql_query",
                "Running execute_sql_function",
                "Generating final response",
            ]
        );
        assert_eq!(
            *tools.executed.lock().await,
            vec![
                "execute_sql_function:SELEC name FROM artists",
                "debug_sql_query:SELEC name FROM artists",
                "execute_sql_function:SELECT name FROM artists",
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_refused_without_dispatch() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .then_call("c1", "drop_database", json!({}))
                .then_text("never reached"),
        );
        let orchestrator = Orchestrator::with_defaults(provider.clone());
        let tools = FakeSqlTools::default();
        let mut conv = conversation();

        let outcome = orchestrator.run(&mut conv, &tools).await.unwrap();

        assert_eq!(outcome.answer, REFUSAL_MESSAGE);
        assert_eq!(outcome.termination, Termination::Refused);
        assert_eq!(provider.request_count().await, 1);
        assert!(tools.executed.lock().await.is_empty());
        assert_eq!(conv.last().unwrap().content, REFUSAL_MESSAGE);
        assert_eq!(outcome.trace.last(), Some(&TurnState::Done));
        assert_eq!(
            conv.roles(),
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert_eq!(conv.messages()[3].tool_call_id(), Some("c1"));
        assert!(conv.messages()[3].content.contains("drop_database"));
    }

    fn requested_and_answered(conv: &Conversation) -> (Vec<String>, Vec<String>) {
        let requested = conv
            .messages()
            .iter()
            .flat_map(|m| m.tool_calls.iter().map(|c| c.id.clone()))
            .collect();
        let answered = conv
            .messages()
            .iter()
            .filter_map(Message::tool_call_id)
            .map(str::to_string)
            .collect();
        (requested, answered)
    }

    #[tokio::test]
    async fn test_refused_batch_answers_every_call_id() {
        let args = |q: &str| json!({"query": q}).as_object().cloned().unwrap();
        let calls = vec![
            ToolCall::new("a", "execute_sql_function", args("SELECT 1")),
            ToolCall::new("b", "drop_database", args("")),
            ToolCall::new("c", "execute_sql_function", args("SELECT 2")),
        ];
        let provider = Arc::new(
            ScriptedProvider::new()
                .then(crate::provider::Completion::tool_calls(calls))
                .then_text("Here is the answer."),
        );
        let orchestrator = Orchestrator::with_defaults(provider.clone());
        let tools = FakeSqlTools::default();
        let mut conv = conversation();

        let outcome = orchestrator.run(&mut conv, &tools).await.unwrap();
        assert_eq!(outcome.termination, Termination::Refused);
        assert_eq!(*tools.executed.lock().await, vec!["execute_sql_function:SELECT 1"]);

        let (requested, answered) = requested_and_answered(&conv);
        assert_eq!(requested, vec!["a", "b", "c"]);
        assert_eq!(answered, requested);
        assert_eq!(conv.messages()[5].content, SKIPPED_CALL_MESSAGE);

        // The committed history stays valid for the next message.
        conv.push(Message::user("Which albums are there?"));
        let outcome = orchestrator.run(&mut conv, &tools).await.unwrap();
        assert_eq!(outcome.answer, "Here is the answer.");
        let sent = &provider.requests().await[1].messages;
        let sent_calls = sent.iter().flat_map(|m| m.tool_calls.iter()).count();
        let sent_answers = sent.iter().filter(|m| m.tool_call_id().is_some()).count();
        assert_eq!(sent_calls, sent_answers);
    }

    #[tokio::test]
    async fn test_batch_runs_in_request_order() {
        let calls = vec![
            ToolCall::new("a", "execute_sql_function", json!({"query": "SELECT 1"}).as_object().cloned().unwrap()),
            ToolCall::new("b", "execute_sql_function", json!({"query": "SELECT 2"}).as_object().cloned().unwrap()),
        ];
        let provider = Arc::new(
            ScriptedProvider::new()
                .then(crate::provider::Completion::tool_calls(calls))
                .then_text("done"),
        );
        let orchestrator = Orchestrator::with_defaults(provider);
        let tools = FakeSqlTools::default();
        let mut conv = conversation();

        orchestrator.run(&mut conv, &tools).await.unwrap();

        let ids: Vec<_> = conv.messages().iter().filter_map(Message::tool_call_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(
            *tools.executed.lock().await,
            vec!["execute_sql_function:SELECT 1", "execute_sql_function:SELECT 2"]
        );
    }

    #[tokio::test]
    async fn test_round_trip_limit_ends_with_answer() {
        let mut provider = ScriptedProvider::new();
        for i in 0..5 {
            provider = provider.then_call(&format!("c{i}"), "execute_sql_function", json!({"query": "SELEC 1"}));
        }
        let provider = Arc::new(provider);
        let config = OrchestratorConfig {
            max_round_trips: 3,
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(provider.clone(), config);
        let tools = FakeSqlTools::default();
        let mut conv = conversation();

        let outcome = orchestrator.run(&mut conv, &tools).await.unwrap();

        assert_eq!(outcome.termination, Termination::RoundTripLimit);
        assert_eq!(outcome.answer, ROUND_TRIP_LIMIT_MESSAGE);
        assert_eq!(provider.request_count().await, 3);
        assert_eq!(conv.last().unwrap().role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_transport_error_aborts() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .then_call("c1", "execute_sql_function", json!({"query": "SELECT 1"}))
                .then_fail("503 Service Unavailable"),
        );
        let orchestrator = Orchestrator::with_defaults(provider);
        let tools = FakeSqlTools::default();
        let mut conv = conversation();

        let result = orchestrator.run(&mut conv, &tools).await;
        assert!(matches!(result, Err(AssistantError::ModelTransport(_))));
    }

    #[tokio::test]
    async fn test_declarations_are_offered_every_round_trip() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .then_call("c1", "execute_sql_function", json!({"query": "SELECT 1"}))
                .then_text("ok"),
        );
        let orchestrator = Orchestrator::with_defaults(provider.clone());
        let mut conv = conversation();

        orchestrator.run(&mut conv, &FakeSqlTools::default()).await.unwrap();

        for request in provider.requests().await {
            assert_eq!(request.tool_names, vec!["execute_sql_function", "debug_sql_query"]);
        }
    }
}
