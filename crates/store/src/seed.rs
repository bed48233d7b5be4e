//! Seeding the persona catalog from a TOML file.
//!
//! ```toml
//! [[personas]]
//! id = "ava"
//! name = "Ava"
//! prompt = "You are Ava, a playful barista who loves wordplay."
//! threshold = 70
//! kinks = ["banter"]
//! categories = ["cafe"]
//! gallery = ["https://cdn.example.com/ava/1.jpg"]
//! ```

use async_trait::async_trait;
use charmline_core::error::StoreError;
use charmline_core::persona::Persona;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Write access to the persona catalog.
#[async_trait]
pub trait PersonaSink: Send + Sync {
    /// Insert a persona, replacing any existing one with the same id.
    async fn upsert_persona(&self, persona: Persona) -> Result<(), StoreError>;
}

/// The on-disk seed format.
#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub personas: Vec<Persona>,
}

/// Parse a personas file.
pub fn load_personas_file(path: &Path) -> Result<Vec<Persona>, StoreError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        StoreError::Unavailable(format!("Cannot read {}: {e}", path.display()))
    })?;
    parse_personas(&content)
        .map_err(|e| StoreError::Unavailable(format!("Invalid personas file {}: {e}", path.display())))
}

fn parse_personas(content: &str) -> Result<Vec<Persona>, String> {
    let seed: SeedFile = toml::from_str(content).map_err(|e| e.to_string())?;
    for persona in &seed.personas {
        if !(1..=100).contains(&persona.threshold) {
            return Err(format!(
                "persona '{}' threshold must be between 1 and 100",
                persona.id
            ));
        }
    }
    Ok(seed.personas)
}

/// Load a personas file into a sink. Returns how many were written.
pub async fn seed_catalog(sink: &dyn PersonaSink, path: &Path) -> Result<usize, StoreError> {
    let personas = load_personas_file(path)?;
    let count = personas.len();
    for persona in personas {
        sink.upsert_persona(persona).await?;
    }
    info!(count, path = %path.display(), "Seeded persona catalog");
    Ok(count)
}
