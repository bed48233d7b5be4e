//! In-memory store: used by tests and ephemeral sessions.

use async_trait::async_trait;
use charmline_core::error::StoreError;
use charmline_core::message::{ConversationId, ConversationRecord};
use charmline_core::persona::{Persona, PersonaId};
use charmline_core::store::{ConversationStore, Exchange, PersonaCatalog};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::seed::PersonaSink;

/// Conversations and personas held in process memory.
pub struct InMemoryStore {
    conversations: Arc<RwLock<HashMap<ConversationId, ConversationRecord>>>,
    /// Insertion order is catalog order.
    personas: Arc<RwLock<Vec<Persona>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
            personas: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Build a store pre-loaded with personas.
    pub fn with_personas(personas: impl IntoIterator<Item = Persona>) -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
            personas: Arc::new(RwLock::new(personas.into_iter().collect())),
        }
    }

    pub async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load(&self, id: &ConversationId) -> Result<ConversationRecord, StoreError> {
        self.conversations
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Conversation {id}")))
    }

    async fn create(&self, persona_id: &PersonaId) -> Result<ConversationRecord, StoreError> {
        let record = ConversationRecord::new(persona_id.clone());
        self.conversations
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn create_with_exchange(
        &self,
        record: ConversationRecord,
        exchange: Exchange,
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        if conversations.contains_key(&record.id) {
            return Err(StoreError::Unavailable(format!(
                "Conversation {} already exists",
                record.id
            )));
        }

        let mut record = record;
        record.turns.push(exchange.user);
        record.turns.push(exchange.assistant);
        record.score_history = exchange.score_history;
        record.updated_at = Utc::now();
        conversations.insert(record.id.clone(), record);
        Ok(())
    }

    async fn append_exchange(
        &self,
        id: &ConversationId,
        exchange: Exchange,
    ) -> Result<(), StoreError> {
        // The write guard spans the whole append.
        let mut conversations = self.conversations.write().await;
        let record = conversations
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("Conversation {id}")))?;

        record.turns.push(exchange.user);
        record.turns.push(exchange.assistant);
        record.score_history = exchange.score_history;
        record.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl PersonaCatalog for InMemoryStore {
    async fn get(&self, id: &PersonaId) -> Result<Persona, StoreError> {
        self.personas
            .read()
            .await
            .iter()
            .find(|p| &p.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Persona {id}")))
    }

    async fn list(&self) -> Result<Vec<Persona>, StoreError> {
        Ok(self.personas.read().await.clone())
    }
}

#[async_trait]
impl PersonaSink for InMemoryStore {
    async fn upsert_persona(&self, persona: Persona) -> Result<(), StoreError> {
        let mut personas = self.personas.write().await;
        match personas.iter_mut().find(|p| p.id == persona.id) {
            Some(existing) => *existing = persona,
            None => personas.push(persona),
        }
        Ok(())
    }
}
