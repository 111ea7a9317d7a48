//! Assistant Service
//!
//! Owns the process-wide state: the active backend (profile, connection and
//! schema description as one unit) and the conversation store.
//!
//! ```text
//!   reconnect ──build──▶ ActiveBackend ──swap (write lock)──▶ clear_all
//!   chat ──read lock: snapshot backend + seed conversation──▶ orchestrate ──▶ commit
//! ```
//!
//! Model and backend calls happen outside both locks. A chat that started
//! before a reconnect finishes against the backend it started with and its
//! history is dropped at commit.

use std::sync::Arc;

use assistant_core::{
    AssistantError, Conversation, ConversationKey, ConversationStore, LlmProvider, Message,
    Orchestrator, OrchestratorConfig, Result, TurnOutcome,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::catalog::SchemaCatalog;
use crate::connection::BackendConnection;
use crate::model::{BackendKind, ConnectionProfile};
use crate::prompts::system_prompt;
use crate::tools::Toolbox;

/// Profile, connection and schema of the current backend; replaced as a unit
pub struct ActiveBackend {
    profile: ConnectionProfile,
    connection: BackendConnection,
    catalog: SchemaCatalog,
    description: String,
    system_prompt: String,
    connected_at: DateTime<Utc>,
}

impl ActiveBackend {
    /// Open the backend and build its schema description
    ///
    /// If introspection fails the fresh connection is closed again.
    pub async fn connect(profile: ConnectionProfile) -> crate::Result<Self> {
        let connection = BackendConnection::open(&profile).await?;

        match SchemaCatalog::build(&connection, profile.namespace()).await {
            Ok(catalog) => Ok(Self::from_parts(profile, connection, catalog)),
            Err(e) => {
                connection.close().await;
                Err(e)
            }
        }
    }

    pub fn from_parts(
        profile: ConnectionProfile,
        connection: BackendConnection,
        catalog: SchemaCatalog,
    ) -> Self {
        let description = catalog.describe();
        let system_prompt = system_prompt(&profile);
        Self {
            profile,
            connection,
            catalog,
            description,
            system_prompt,
            connected_at: Utc::now(),
        }
    }

    pub const fn kind(&self) -> BackendKind {
        self.profile.kind()
    }

    pub const fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    pub const fn connection(&self) -> &BackendConnection {
        &self.connection
    }

    pub const fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Schema description text
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn status(&self) -> BackendStatus {
        BackendStatus {
            backend: self.kind(),
            display_name: self.profile.display_name(),
            namespace: self.profile.namespace().map(str::to_string),
            table_count: self.catalog.table_count(),
            connected_at: self.connected_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStatus {
    pub backend: BackendKind,
    pub display_name: String,
    pub namespace: Option<String>,
    pub table_count: usize,
    pub connected_at: DateTime<Utc>,
}

/// Chat response contract
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub message: String,
    pub logs: Vec<String>,
    pub database_response: String,
    pub status_updates: Vec<String>,
}

impl From<TurnOutcome> for ChatReply {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            message: outcome.answer,
            logs: outcome.logs,
            database_response: outcome.database_response,
            status_updates: outcome.status_updates,
        }
    }
}

pub struct AssistantService {
    provider: Arc<dyn LlmProvider>,
    orchestrator: Orchestrator,
    active: RwLock<Arc<ActiveBackend>>,
    conversations: ConversationStore,
}

impl AssistantService {
    /// Connect the initial backend and build the service around it
    pub async fn start(
        provider: Arc<dyn LlmProvider>,
        profile: ConnectionProfile,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        let backend = ActiveBackend::connect(profile).await?;
        tracing::info!(backend = %backend.kind(), "Initial backend connected");
        Ok(Self::with_backend(provider, backend, config))
    }

    pub fn with_backend(
        provider: Arc<dyn LlmProvider>,
        backend: ActiveBackend,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            orchestrator: Orchestrator::new(Arc::clone(&provider), config),
            provider,
            active: RwLock::new(Arc::new(backend)),
            conversations: ConversationStore::new(),
        }
    }

    /// Replace the backend or fail leaving everything as it was
    ///
    /// On success every conversation is cleared.
    pub async fn reconnect(&self, profile: ConnectionProfile) -> Result<BackendStatus> {
        let kind = profile.kind();
        tracing::info!(backend = %kind, "Reconnecting");

        let next = match ActiveBackend::connect(profile).await {
            Ok(backend) => Arc::new(backend),
            Err(e) => {
                tracing::warn!(backend = %kind, error = %e, "Reconnect failed; keeping current backend");
                return Err(AssistantError::ConnectionFailure(e.to_string()));
            }
        };

        let cleared = {
            let mut active = self.active.write().await;
            *active = Arc::clone(&next);
            self.conversations.clear_all().await
        };

        tracing::info!(backend = %kind, tables = next.catalog().table_count(), cleared, "Reconnected");
        Ok(next.status())
    }

    /// Current schema description
    pub async fn schema(&self) -> String {
        self.active.read().await.description().to_string()
    }

    pub async fn current(&self) -> Arc<ActiveBackend> {
        Arc::clone(&*self.active.read().await)
    }

    pub async fn status(&self) -> BackendStatus {
        self.active.read().await.status()
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub async fn conversation(&self, key: &ConversationKey) -> Option<Conversation> {
        self.conversations.get(key).await
    }

    /// Run one user message through the orchestrator
    ///
    /// Same-key calls are serialized. On a model transport error nothing is
    /// committed for this turn.
    pub async fn chat(&self, key: &ConversationKey, message: &str) -> Result<ChatReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AssistantError::Validation("message must not be empty".into()));
        }

        let _turn = self.conversations.lock_key(key).await;

        let (backend, snapshot) = {
            let active = self.active.read().await;
            let backend = Arc::clone(&*active);
            let snapshot = self.conversations.get_or_create(key, backend.system_prompt()).await;
            (backend, snapshot)
        };

        let mut conversation = snapshot.conversation;
        conversation.push(Message::user(message));

        let toolbox = Toolbox::new(
            backend,
            Arc::clone(&self.provider),
            self.orchestrator.config().generation.clone(),
        );
        let outcome = self.orchestrator.run(&mut conversation, &toolbox).await?;

        tracing::debug!(
            conversation = %key,
            model_calls = outcome.model_calls,
            termination = ?outcome.termination,
            "Chat turn finished"
        );
        self.conversations
            .commit(key, snapshot.generation, conversation)
            .await;

        Ok(outcome.into())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assistant_core::orchestrator::REFUSAL_MESSAGE;
    use assistant_core::{Completion, GenerationOptions, Role, ScriptedProvider, ToolSchema};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    use super::*;
    use crate::model::TicketingProfile;
    use crate::sql::seed_music_db;
    use crate::tools::CountingBackend;

    fn ticketing_profile() -> ConnectionProfile {
        ConnectionProfile::Ticketing(TicketingProfile {
            base_url: "https://dev.example.com".into(),
            username: "admin".into(),
            password: "pw".into(),
            instance_name: Some("dev".into()),
            accept_invalid_certs: false,
        })
    }

    /// Parks every completion request until the test releases it
    struct GatedProvider {
        script: ScriptedProvider,
        entries: AtomicUsize,
        entered: Notify,
        release: Notify,
    }

    impl GatedProvider {
        fn new(script: ScriptedProvider) -> Arc<Self> {
            Arc::new(Self {
                script,
                entries: AtomicUsize::new(0),
                entered: Notify::new(),
                release: Notify::new(),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for GatedProvider {
        fn name(&self) -> &str {
            "Gated"
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
            self.entries.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            self.script.complete(messages, tools, options).await
        }
    }

    async fn sqlite_service(dir: &Path, provider: Arc<dyn LlmProvider>) -> AssistantService {
        let path = seed_music_db(dir).await;
        AssistantService::start(provider, ConnectionProfile::sqlite(path), OrchestratorConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_self_correction_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(
            ScriptedProvider::new()
                .then_call("c1", "execute_sql_function", json!({"query": "SELECT Nmae FROM artists"}))
                .then_call(
                    "c2",
                    "debug_sql_query",
                    json!({"query": "SELECT Nmae FROM artists", "error_message": "no such column: Nmae"}),
                )
                .then_text("SELECT Name FROM artists ORDER BY ArtistId")
                .then_call(
                    "c3",
                    "execute_sql_function",
                    json!({"query": "SELECT Name FROM artists ORDER BY ArtistId"}),
                )
                .then_text("The artists are AC/DC and Accept."),
        );
        let service = sqlite_service(dir.path(), Arc::<ScriptedProvider>::clone(&provider)).await;
        let key = ConversationKey::default();

        let reply = service.chat(&key, "Which artists are there?").await.unwrap();

        assert_eq!(reply.message, "The artists are AC/DC and Accept.");
        assert!(reply.database_response.contains("Accept"));
        assert_eq!(
            reply.status_updates,
            vec![
                "Running execute_sql_function",
                "Running debug_sql_query",
                "Running execute_sql_function",
                "Generating final response",
            ]
        );
        assert_eq!(provider.request_count().await, 5);

        let history = service.conversation(&key).await.unwrap();
        assert_eq!(
            history.roles(),
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
        let messages = history.messages();
        assert!(messages[3].content.contains("no such column"));
        assert_eq!(messages[5].content, "SELECT Name FROM artists ORDER BY ArtistId");
        assert_eq!(messages[7].tool_call_id(), Some("c3"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_refused_without_backend_call() {
        let backend = CountingBackend::with_rows(&["n"], &[&["1"]]);
        let connection = BackendConnection::Sql(Arc::clone(&backend) as _);
        let catalog = SchemaCatalog::build(&connection, None).await.unwrap();
        let active = ActiveBackend::from_parts(ConnectionProfile::sqlite("fake.db"), connection, catalog);
        let provider = Arc::new(ScriptedProvider::new().then_call("c1", "drop_database", json!({})));
        let service =
            AssistantService::with_backend(provider.clone(), active, OrchestratorConfig::default());

        let reply = service.chat(&ConversationKey::default(), "drop everything").await.unwrap();

        assert_eq!(reply.message, REFUSAL_MESSAGE);
        assert_eq!(backend.fetch_count(), 0);
        assert_eq!(provider.request_count().await, 1);

        let history = service.conversation(&ConversationKey::default()).await.unwrap();
        assert_eq!(
            history.roles(),
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert_eq!(history.messages()[3].tool_call_id(), Some("c1"));
    }

    #[tokio::test]
    async fn test_transport_error_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new().then_fail("connection reset"));
        let service = sqlite_service(dir.path(), provider).await;
        let key = ConversationKey::from_string("k1");

        let err = service.chat(&key, "hello").await.unwrap_err();
        assert!(matches!(err, AssistantError::ModelTransport(_)));

        let history = service.conversation(&key).await.unwrap();
        assert_eq!(history.roles(), vec![Role::System]);
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let service = sqlite_service(dir.path(), Arc::new(ScriptedProvider::new())).await;

        let err = service.chat(&ConversationKey::default(), "   ").await.unwrap_err();
        assert!(matches!(err, AssistantError::Validation(_)));
    }

    #[tokio::test]
    async fn test_reconnect_is_idempotent_and_clears_conversations() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new().then_text("hi").then_text("hi again"));
        let service = sqlite_service(dir.path(), provider).await;
        let profile = service.current().await.profile().clone();
        let key = ConversationKey::default();

        service.chat(&key, "hello").await.unwrap();
        assert_eq!(service.conversations().len().await, 1);

        service.reconnect(profile.clone()).await.unwrap();
        let first = service.schema().await;
        assert!(service.conversations().is_empty().await);

        service.chat(&key, "hello").await.unwrap();
        service.reconnect(profile).await.unwrap();
        assert_eq!(service.schema().await, first);
        assert!(service.conversations().is_empty().await);
        assert_eq!(service.conversations().generation().await, 2);
    }

    #[tokio::test]
    async fn test_failed_reconnect_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new().then_text("hi"));
        let service = sqlite_service(dir.path(), provider).await;
        let key = ConversationKey::default();
        service.chat(&key, "hello").await.unwrap();
        let before = service.schema().await;

        let err = service
            .reconnect(ConnectionProfile::sqlite(dir.path().join("missing.db")))
            .await
            .unwrap_err();

        assert!(matches!(err, AssistantError::ConnectionFailure(_)));
        assert_eq!(service.schema().await, before);
        assert_eq!(service.status().await.backend, BackendKind::Sqlite);
        assert_eq!(service.conversation(&key).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_switching_to_ticketing_swaps_tools_and_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new().then_text("ok"));
        let service = sqlite_service(dir.path(), Arc::<ScriptedProvider>::clone(&provider)).await;

        let status = service.reconnect(ticketing_profile()).await.unwrap();
        assert_eq!(status.backend, BackendKind::Ticketing);
        assert_eq!(status.display_name, "dev");
        assert!(service.schema().await.contains("/api/now/table/problem"));

        service.chat(&ConversationKey::default(), "open problems?").await.unwrap();
        let request = &provider.requests().await[0];
        assert_eq!(request.tool_names, vec!["execute_api_call"]);
        assert!(request.messages[0].content.contains("ServiceNow API"));
    }

    #[tokio::test]
    async fn test_concurrent_reconnects_stay_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let sqlite = ConnectionProfile::sqlite(seed_music_db(dir.path()).await);
        let service = Arc::new(
            AssistantService::start(
                Arc::new(ScriptedProvider::new()),
                sqlite.clone(),
                OrchestratorConfig::default(),
            )
            .await
            .unwrap(),
        );

        for _ in 0..10 {
            let a = {
                let service = Arc::clone(&service);
                let profile = sqlite.clone();
                tokio::spawn(async move { service.reconnect(profile).await })
            };
            let b = {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.reconnect(ticketing_profile()).await })
            };
            a.await.unwrap().unwrap();
            b.await.unwrap().unwrap();

            let current = service.current().await;
            let kind = current.kind();
            assert_eq!(current.connection().kind(), kind);
            match current.catalog() {
                SchemaCatalog::Relational { kind: catalog_kind, .. } => {
                    assert_eq!(*catalog_kind, kind);
                }
                SchemaCatalog::Api { .. } => assert_eq!(kind, BackendKind::Ticketing),
            }
            let tools = Toolbox::new(
                Arc::clone(&current),
                Arc::clone(service.provider()),
                Default::default(),
            );
            let names: Vec<String> =
                assistant_core::ToolDispatcher::declarations(&tools).into_iter().map(|d| d.name).collect();
            let expected: Vec<&str> = crate::tools::ToolName::for_backend(kind)
                .iter()
                .map(|t| t.as_str())
                .collect();
            assert_eq!(names, expected);
            assert_eq!(service.schema().await, current.description());
        }
    }

    #[tokio::test]
    async fn test_reconnect_during_chat_drops_its_history() {
        let dir = tempfile::tempdir().unwrap();
        let provider = GatedProvider::new(ScriptedProvider::new().then_text("late").then_text("fresh"));
        let service = Arc::new(sqlite_service(dir.path(), provider.clone()).await);
        let key = ConversationKey::default();

        let in_flight = {
            let service = Arc::clone(&service);
            let key = key.clone();
            tokio::spawn(async move { service.chat(&key, "hello").await })
        };
        provider.entered.notified().await;

        service.reconnect(ticketing_profile()).await.unwrap();
        provider.release.notify_one();

        let reply = in_flight.await.unwrap().unwrap();
        assert_eq!(reply.message, "late");
        assert!(service.conversation(&key).await.is_none());
        assert_eq!(service.conversations().generation().await, 1);

        provider.release.notify_one();
        service.chat(&key, "open problems?").await.unwrap();

        let history = service.conversation(&key).await.unwrap();
        assert_eq!(history.roles(), vec![Role::System, Role::User, Role::Assistant]);
        assert!(history.messages()[0].content.contains("ServiceNow API"));
        let sent = &provider.script.requests().await[1];
        assert_eq!(sent.tool_names, vec!["execute_api_call"]);
        assert_eq!(sent.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_same_key_chats_run_one_after_another() {
        let dir = tempfile::tempdir().unwrap();
        let provider = GatedProvider::new(ScriptedProvider::new().then_text("first").then_text("second"));
        let service = Arc::new(sqlite_service(dir.path(), provider.clone()).await);
        let key = ConversationKey::from_string("shared");

        let spawn_chat = |message: &'static str| {
            let service = Arc::clone(&service);
            let key = key.clone();
            tokio::spawn(async move { service.chat(&key, message).await })
        };

        let first = spawn_chat("one");
        provider.entered.notified().await;
        let second = spawn_chat("two");
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        // The second exchange waits on the key, not on the model.
        assert_eq!(provider.entries.load(Ordering::SeqCst), 1);

        provider.release.notify_one();
        assert_eq!(first.await.unwrap().unwrap().message, "first");

        provider.entered.notified().await;
        assert_eq!(provider.entries.load(Ordering::SeqCst), 2);
        provider.release.notify_one();
        assert_eq!(second.await.unwrap().unwrap().message, "second");

        let requests = provider.script.requests().await;
        assert_eq!(
            requests[1].messages.iter().map(|m| m.role).collect::<Vec<_>>(),
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(requests[1].messages[2].content, "first");

        let history = service.conversation(&key).await.unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history.messages()[3].content, "two");
    }
}
