//! Persistence traits: the conversation store and the persona catalog.
//!
//! The engine never holds a conversation between requests: it loads a
//! record, runs one turn, and hands the result back through
//! [`ConversationStore::append_exchange`] (or
//! [`ConversationStore::create_with_exchange`] for a new conversation), which
//! must apply all of it or none of it.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::{ConversationId, ConversationRecord, Turn};
use crate::persona::{Persona, PersonaId};

/// Everything one completed turn adds to a conversation.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub user: Turn,
    pub assistant: Turn,
    /// Full replacement for the stored score history
    pub score_history: Vec<u32>,
}

/// Conversation persistence.
///
/// Concurrent turns on the same conversation are not serialized by the
/// engine; implementations decide between last-write-wins and per-id locking.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &str;

    /// Load a conversation with its turns in order.
    async fn load(&self, id: &ConversationId) -> Result<ConversationRecord, StoreError>;

    /// Create an empty conversation bound to a persona.
    async fn create(&self, persona_id: &PersonaId) -> Result<ConversationRecord, StoreError>;

    /// Persist a new conversation together with its first exchange.
    ///
    /// Either both land or neither does, so a turn that fails before this
    /// call leaves no record behind.
    async fn create_with_exchange(
        &self,
        record: ConversationRecord,
        exchange: Exchange,
    ) -> Result<(), StoreError>;

    /// Atomically append the exchange and replace the score history.
    async fn append_exchange(
        &self,
        id: &ConversationId,
        exchange: Exchange,
    ) -> Result<(), StoreError>;
}

/// Read access to persona definitions.
#[async_trait]
pub trait PersonaCatalog: Send + Sync {
    async fn get(&self, id: &PersonaId) -> Result<Persona, StoreError>;

    /// All personas, oldest first.
    async fn list(&self) -> Result<Vec<Persona>, StoreError>;
}
