//! Persona: the scripted character a conversation is bound to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a persona in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonaId(pub String);

impl PersonaId {
    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PersonaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persona definition, owned by the catalog and read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: PersonaId,

    /// Display name
    pub name: String,

    /// Base character prompt
    pub prompt: String,

    /// Rolling-average score (1–100) at which rewards unlock
    pub threshold: u32,

    #[serde(default)]
    pub kinks: Vec<String>,

    #[serde(default)]
    pub categories: Vec<String>,

    /// Reward image URLs
    #[serde(default)]
    pub gallery: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,

    #[serde(default)]
    pub likes: u64,

    #[serde(default)]
    pub stans: u64,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Persona {
    /// Create a persona with no tags or gallery.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        prompt: impl Into<String>,
        threshold: u32,
    ) -> Self {
        Self {
            id: PersonaId(id.into()),
            name: name.into(),
            prompt: prompt.into(),
            threshold,
            kinks: Vec::new(),
            categories: Vec::new(),
            gallery: Vec::new(),
            thumbnail_url: None,
            likes: 0,
            stans: 0,
            created_at: Utc::now(),
        }
    }

    /// The base prompt with the tag lists folded in.
    ///
    /// Pure: computed once per request and never written back.
    pub fn enhanced_prompt(&self) -> String {
        format!(
            "{} Kinks: {} Categories: {}",
            self.prompt,
            self.kinks.join(", "),
            self.categories.join(", ")
        )
    }

    /// Copy of this persona with the gallery cut down to `limit` images.
    pub fn with_gallery_preview(&self, limit: usize) -> Self {
        let mut preview = self.clone();
        preview.gallery.truncate(limit);
        preview
    }
}
