//! Persistence adapters for Charmline.
//!
//! Every adapter implements the conversation store, the persona catalog and
//! the seed sink, so one instance serves the whole application.

pub mod in_memory;
pub mod seed;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use seed::{PersonaSink, SeedFile, load_personas_file, seed_catalog};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use charmline_config::StoreConfig;
use charmline_core::error::StoreError;
use charmline_core::store::{ConversationStore, PersonaCatalog};
use std::sync::Arc;

/// A full persistence backend.
pub trait Storage: ConversationStore + PersonaCatalog + PersonaSink {}

impl<T: ConversationStore + PersonaCatalog + PersonaSink> Storage for T {}

/// Open the backend named in configuration.
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn Storage>, StoreError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let path = config.database_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!("Cannot create {}: {e}", parent.display()))
                })?;
            }
            let url = format!("sqlite://{}", path.display());
            Ok(Arc::new(SqliteStore::new(&url).await?))
        }
        other => Err(StoreError::Unavailable(format!(
            "store backend '{other}' is not available"
        ))),
    }
}
