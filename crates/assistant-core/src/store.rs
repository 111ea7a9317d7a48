//! Conversation Store
//!
//! Per-conversation turn history shared by concurrent chat requests.
//!
//! The store lock is only held for read-modify-write of the map, never across
//! a model or backend call. Every [`ConversationStore::clear_all`] starts a new
//! backend generation; histories committed under an older generation are
//! dropped so a reconnect always wins over chats that were in flight.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{AssistantError, Result};
use crate::message::{Conversation, Message};

/// Conversation identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationKey {
    /// The single shared conversation used when callers do not pick a key
    fn default() -> Self {
        Self("default".into())
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A conversation copy plus the generation it was read under
#[derive(Clone, Debug)]
pub struct ConversationSnapshot {
    pub conversation: Conversation,
    pub generation: u64,
}

#[derive(Default)]
struct StoreInner {
    generation: u64,
    conversations: HashMap<ConversationKey, Conversation>,
}

/// In-memory conversation store
#[derive(Default)]
pub struct ConversationStore {
    inner: Mutex<StoreInner>,
    turn_locks: Mutex<HashMap<ConversationKey, Arc<Mutex<()>>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the history for `key`, seeding it with a system turn if absent
    pub async fn get_or_create(
        &self,
        key: &ConversationKey,
        system_prompt: &str,
    ) -> ConversationSnapshot {
        let mut inner = self.inner.lock().await;
        let generation = inner.generation;
        let conversation = inner
            .conversations
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::debug!(conversation = %key, generation, "Seeding conversation");
                Conversation::with_system_prompt(system_prompt)
            })
            .clone();

        ConversationSnapshot {
            conversation,
            generation,
        }
    }

    /// Append a turn to an existing conversation
    pub async fn append(&self, key: &ConversationKey, message: Message) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let conversation = inner
            .conversations
            .get_mut(key)
            .ok_or_else(|| AssistantError::Session(format!("conversation '{key}' was never seeded")))?;
        conversation.push(message);
        Ok(())
    }

    /// Replace the history for `key` with the result of a finished exchange
    ///
    /// Returns `false` (and stores nothing) when the store was cleared since
    /// `generation` was read.
    pub async fn commit(
        &self,
        key: &ConversationKey,
        generation: u64,
        conversation: Conversation,
    ) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            tracing::warn!(
                conversation = %key,
                stale = generation,
                current = inner.generation,
                "Dropping history from before a reconnect"
            );
            return false;
        }
        inner.conversations.insert(key.clone(), conversation);
        true
    }

    /// Wipe every conversation and start a new generation
    pub async fn clear_all(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let cleared = inner.conversations.len();
        inner.conversations.clear();
        inner.generation += 1;
        tracing::info!(cleared, generation = inner.generation, "Cleared conversations");
        cleared
    }

    /// Serialize whole chat exchanges on one key
    ///
    /// Locks nobody holds or waits on are pruned here, so the map only tracks
    /// keys with an exchange in flight.
    pub async fn lock_key(&self, key: &ConversationKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.turn_locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Copy of the history for `key`, if seeded
    pub async fn get(&self, key: &ConversationKey) -> Option<Conversation> {
        self.inner.lock().await.conversations.get(key).cloned()
    }

    pub async fn generation(&self) -> u64 {
        self.inner.lock().await.generation
    }

    /// Number of live conversations
    pub async fn len(&self) -> usize {
        self.inner.lock().await.conversations.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
