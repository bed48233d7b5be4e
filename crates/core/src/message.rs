//! Turn and conversation domain types.
//!
//! These are the value objects that flow through the whole system:
//! user sends a message → engine windows the history → provider replies →
//! store appends the exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::persona::PersonaId;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The persona
    Assistant,
    /// Instructions sent to a backend; never persisted
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// A single message in a conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: String,

    /// Who wrote this turn
    pub role: Role,

    /// The text content
    pub content: String,

    pub timestamp: DateTime<Utc>,
}

impl Turn {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a system instruction (request-only).
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }
}

/// A stored conversation bound to one persona.
///
/// The score history lives beside the turns rather than inside them, so
/// `turns` is exactly the user/assistant sequence shown to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: ConversationId,

    pub persona_id: PersonaId,

    /// Ordered user/assistant turns, oldest first
    pub turns: Vec<Turn>,

    /// One impression score (1–100) per scored user turn
    #[serde(default)]
    pub score_history: Vec<u32>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl ConversationRecord {
    /// Create a new empty conversation for a persona.
    pub fn new(persona_id: PersonaId) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            persona_id,
            turns: Vec::new(),
            score_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_turn() {
        let turn = Turn::user("Hello there");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.content, "Hello there");
        assert!(!turn.id.is_empty());
    }

    #[test]
    fn role_parses_from_wire_names() {
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert_eq!(Role::User.as_str().parse::<Role>().unwrap(), Role::User);
        assert!("ai".parse::<Role>().is_err());
    }

    #[test]
    fn conversation_id_serializes_as_plain_string() {
        let id = ConversationId::from("conv-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"conv-1\"");
    }

    #[test]
    fn new_record_is_empty() {
        let record = ConversationRecord::new(PersonaId::from("ava"));
        assert!(record.is_empty());
        assert!(record.score_history.is_empty());
        assert_eq!(record.created_at, record.updated_at);
    }
}
