//! SQLite backend.
//!
//! Tables:
//! - `personas`, `persona_tags`, `persona_gallery`: the catalog
//! - `conversations`: one row per conversation, score history as JSON
//! - `turns`: ordered by an integer rowid alias

use async_trait::async_trait;
use charmline_core::error::StoreError;
use charmline_core::message::{ConversationId, ConversationRecord, Role, Turn};
use charmline_core::persona::{Persona, PersonaId};
use charmline_core::store::{ConversationStore, Exchange, PersonaCatalog};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use crate::seed::PersonaSink;

const TAG_KINK: &str = "kink";
const TAG_CATEGORY: &str = "category";

/// A SQLite conversation store and persona catalog.
pub struct SqliteStore {
    pool: SqlitePool,
}

fn unavailable(context: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| StoreError::Unavailable(format!("{context}: {e}"))
}

fn counter_to_i64(field: &str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::Unavailable(format!("{field} value {value} exceeds the SQLite integer range")))
}

fn scores_to_json(scores: &[u32]) -> Result<String, StoreError> {
    serde_json::to_string(scores)
        .map_err(|e| StoreError::Unavailable(format!("Score serialization: {e}")))
}

/// Insert the user and assistant turns of an exchange, in order.
async fn insert_turns(
    conn: &mut SqliteConnection,
    id: &ConversationId,
    exchange: &Exchange,
) -> Result<(), StoreError> {
    for turn in [&exchange.user, &exchange.assistant] {
        sqlx::query(
            r#"
            INSERT INTO turns (id, conversation_id, role, content, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&turn.id)
        .bind(id.as_str())
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(turn.timestamp.to_rfc3339())
        .execute(&mut *conn)
        .await
        .map_err(unavailable("Turn insert failed"))?;
    }
    Ok(())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Unavailable(format!("Corrupt timestamp '{s}': {e}")))
}

impl SqliteStore {
    /// Open (or create) a database.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Unavailable(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // Every connection to `:memory:` is a separate database.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(unavailable("Failed to open SQLite"))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Number of stored conversations.
    pub async fn conversation_count(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM conversations")
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable("Conversation count failed"))?
            .get("n");
        Ok(count.max(0) as usize)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements: [(&'static str, &str); 6] = [
            (
                "personas table",
                r#"
                CREATE TABLE IF NOT EXISTS personas (
                    id            TEXT PRIMARY KEY,
                    name          TEXT NOT NULL,
                    prompt        TEXT NOT NULL,
                    threshold     INTEGER NOT NULL,
                    thumbnail_url TEXT,
                    likes         INTEGER NOT NULL DEFAULT 0,
                    stans         INTEGER NOT NULL DEFAULT 0,
                    created_at    TEXT NOT NULL
                )
                "#,
            ),
            (
                "persona_tags table",
                r#"
                CREATE TABLE IF NOT EXISTS persona_tags (
                    persona_id TEXT NOT NULL REFERENCES personas(id) ON DELETE CASCADE,
                    kind       TEXT NOT NULL,
                    position   INTEGER NOT NULL,
                    value      TEXT NOT NULL,
                    PRIMARY KEY (persona_id, kind, position)
                )
                "#,
            ),
            (
                "persona_gallery table",
                r#"
                CREATE TABLE IF NOT EXISTS persona_gallery (
                    persona_id TEXT NOT NULL REFERENCES personas(id) ON DELETE CASCADE,
                    position   INTEGER NOT NULL,
                    url        TEXT NOT NULL,
                    PRIMARY KEY (persona_id, position)
                )
                "#,
            ),
            (
                "conversations table",
                r#"
                CREATE TABLE IF NOT EXISTS conversations (
                    id            TEXT PRIMARY KEY,
                    persona_id    TEXT NOT NULL,
                    score_history TEXT NOT NULL DEFAULT '[]',
                    created_at    TEXT NOT NULL,
                    updated_at    TEXT NOT NULL
                )
                "#,
            ),
            (
                "turns table",
                r#"
                CREATE TABLE IF NOT EXISTS turns (
                    iid             INTEGER PRIMARY KEY AUTOINCREMENT,
                    id              TEXT UNIQUE NOT NULL,
                    conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                    role            TEXT NOT NULL,
                    content         TEXT NOT NULL,
                    created_at      TEXT NOT NULL
                )
                "#,
            ),
            (
                "turns index",
                "CREATE INDEX IF NOT EXISTS idx_turns_conversation ON turns(conversation_id, iid)",
            ),
        ];

        for (label, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Unavailable(format!("Migration failed ({label}): {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<Turn, StoreError> {
        let id: String = row.try_get("id").map_err(unavailable("id column"))?;
        let role: String = row.try_get("role").map_err(unavailable("role column"))?;
        let content: String = row
            .try_get("content")
            .map_err(unavailable("content column"))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(unavailable("created_at column"))?;

        let role = Role::from_str(&role).map_err(StoreError::Unavailable)?;

        Ok(Turn {
            id,
            role,
            content,
            timestamp: parse_timestamp(&created_at)?,
        })
    }

    /// Fill tags and gallery for a persona row.
    async fn hydrate_persona(&self, row: &sqlx::sqlite::SqliteRow) -> Result<Persona, StoreError> {
        let id: String = row.try_get("id").map_err(unavailable("id column"))?;
        let threshold: i64 = row
            .try_get("threshold")
            .map_err(unavailable("threshold column"))?;
        let likes: i64 = row.try_get("likes").map_err(unavailable("likes column"))?;
        let stans: i64 = row.try_get("stans").map_err(unavailable("stans column"))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(unavailable("created_at column"))?;

        let tag_rows = sqlx::query(
            "SELECT kind, value FROM persona_tags WHERE persona_id = ?1 ORDER BY kind, position",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable("Tag query failed"))?;

        let mut kinks = Vec::new();
        let mut categories = Vec::new();
        for tag in &tag_rows {
            let kind: String = tag.try_get("kind").map_err(unavailable("kind column"))?;
            let value: String = tag.try_get("value").map_err(unavailable("value column"))?;
            match kind.as_str() {
                TAG_KINK => kinks.push(value),
                TAG_CATEGORY => categories.push(value),
                _ => {}
            }
        }

        let gallery = sqlx::query(
            "SELECT url FROM persona_gallery WHERE persona_id = ?1 ORDER BY position",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable("Gallery query failed"))?
        .iter()
        .map(|r| r.try_get::<String, _>("url"))
        .collect::<Result<Vec<_>, _>>()
        .map_err(unavailable("url column"))?;

        Ok(Persona {
            id: PersonaId(id),
            name: row.try_get("name").map_err(unavailable("name column"))?,
            prompt: row.try_get("prompt").map_err(unavailable("prompt column"))?,
            threshold: threshold.clamp(0, u32::MAX as i64) as u32,
            kinks,
            categories,
            gallery,
            thumbnail_url: row
                .try_get("thumbnail_url")
                .map_err(unavailable("thumbnail_url column"))?,
            likes: likes.max(0) as u64,
            stans: stans.max(0) as u64,
            created_at: parse_timestamp(&created_at)?,
        })
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self, id: &ConversationId) -> Result<ConversationRecord, StoreError> {
        // One snapshot for the row and its turns.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(unavailable("Failed to begin transaction"))?;

        let row = sqlx::query(
            "SELECT persona_id, score_history, created_at, updated_at FROM conversations WHERE id = ?1",
        )
        .bind(id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(unavailable("Conversation query failed"))?
        .ok_or_else(|| StoreError::NotFound(format!("Conversation {id}")))?;

        let persona_id: String = row
            .try_get("persona_id")
            .map_err(unavailable("persona_id column"))?;
        let scores_json: String = row
            .try_get("score_history")
            .map_err(unavailable("score_history column"))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(unavailable("created_at column"))?;
        let updated_at: String = row
            .try_get("updated_at")
            .map_err(unavailable("updated_at column"))?;

        let score_history: Vec<u32> = serde_json::from_str(&scores_json)
            .map_err(|e| StoreError::Unavailable(format!("Corrupt score history: {e}")))?;

        let turns = sqlx::query(
            "SELECT id, role, content, created_at FROM turns WHERE conversation_id = ?1 ORDER BY iid",
        )
        .bind(id.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(unavailable("Turn query failed"))?
        .iter()
        .map(Self::row_to_turn)
        .collect::<Result<Vec<_>, _>>()?;

        tx.commit()
            .await
            .map_err(unavailable("Failed to end read transaction"))?;

        Ok(ConversationRecord {
            id: id.clone(),
            persona_id: PersonaId(persona_id),
            turns,
            score_history,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }

    async fn create(&self, persona_id: &PersonaId) -> Result<ConversationRecord, StoreError> {
        let record = ConversationRecord::new(persona_id.clone());

        sqlx::query(
            r#"
            INSERT INTO conversations (id, persona_id, score_history, created_at, updated_at)
            VALUES (?1, ?2, '[]', ?3, ?4)
            "#,
        )
        .bind(record.id.as_str())
        .bind(persona_id.as_str())
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(unavailable("Conversation insert failed"))?;

        debug!(conversation_id = %record.id, persona_id = %persona_id, "Created conversation");
        Ok(record)
    }

    async fn create_with_exchange(
        &self,
        record: ConversationRecord,
        exchange: Exchange,
    ) -> Result<(), StoreError> {
        let scores_json = scores_to_json(&exchange.score_history)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(unavailable("Failed to begin transaction"))?;

        sqlx::query(
            r#"
            INSERT INTO conversations (id, persona_id, score_history, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(record.id.as_str())
        .bind(record.persona_id.as_str())
        .bind(&scores_json)
        .bind(record.created_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(unavailable("Conversation insert failed"))?;

        insert_turns(&mut tx, &record.id, &exchange).await?;

        tx.commit()
            .await
            .map_err(unavailable("Failed to commit conversation"))?;

        debug!(
            conversation_id = %record.id,
            persona_id = %record.persona_id,
            "Created conversation with first exchange"
        );
        Ok(())
    }

    async fn append_exchange(
        &self,
        id: &ConversationId,
        exchange: Exchange,
    ) -> Result<(), StoreError> {
        let scores_json = scores_to_json(&exchange.score_history)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(unavailable("Failed to begin transaction"))?;

        let updated = sqlx::query(
            "UPDATE conversations SET score_history = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(&scores_json)
        .bind(Utc::now().to_rfc3339())
        .bind(id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(unavailable("Conversation update failed"))?;

        if updated.rows_affected() == 0 {
            // Dropping the transaction rolls it back.
            return Err(StoreError::NotFound(format!("Conversation {id}")));
        }

        insert_turns(&mut tx, id, &exchange).await?;

        tx.commit()
            .await
            .map_err(unavailable("Failed to commit exchange"))?;

        debug!(conversation_id = %id, scores = exchange.score_history.len(), "Appended exchange");
        Ok(())
    }
}

#[async_trait]
impl PersonaCatalog for SqliteStore {
    async fn get(&self, id: &PersonaId) -> Result<Persona, StoreError> {
        let row = sqlx::query("SELECT * FROM personas WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable("Persona query failed"))?
            .ok_or_else(|| StoreError::NotFound(format!("Persona {id}")))?;

        self.hydrate_persona(&row).await
    }

    async fn list(&self) -> Result<Vec<Persona>, StoreError> {
        let rows = sqlx::query("SELECT * FROM personas ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable("Persona list failed"))?;

        let mut personas = Vec::with_capacity(rows.len());
        for row in &rows {
            personas.push(self.hydrate_persona(row).await?);
        }
        Ok(personas)
    }
}

#[async_trait]
impl PersonaSink for SqliteStore {
    async fn upsert_persona(&self, persona: Persona) -> Result<(), StoreError> {
        let likes = counter_to_i64("likes", persona.likes)?;
        let stans = counter_to_i64("stans", persona.stans)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(unavailable("Failed to begin transaction"))?;

        sqlx::query(
            r#"
            INSERT INTO personas (id, name, prompt, threshold, thumbnail_url, likes, stans, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                prompt = excluded.prompt,
                threshold = excluded.threshold,
                thumbnail_url = excluded.thumbnail_url,
                likes = excluded.likes,
                stans = excluded.stans
            "#,
        )
        .bind(persona.id.as_str())
        .bind(&persona.name)
        .bind(&persona.prompt)
        .bind(i64::from(persona.threshold))
        .bind(&persona.thumbnail_url)
        .bind(likes)
        .bind(stans)
        .bind(persona.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(unavailable("Persona upsert failed"))?;

        sqlx::query("DELETE FROM persona_tags WHERE persona_id = ?1")
            .bind(persona.id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(unavailable("Tag cleanup failed"))?;
        sqlx::query("DELETE FROM persona_gallery WHERE persona_id = ?1")
            .bind(persona.id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(unavailable("Gallery cleanup failed"))?;

        let tags = persona
            .kinks
            .iter()
            .enumerate()
            .map(|(i, v)| (TAG_KINK, i, v))
            .chain(
                persona
                    .categories
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (TAG_CATEGORY, i, v)),
            );
        for (kind, position, value) in tags {
            sqlx::query(
                "INSERT INTO persona_tags (persona_id, kind, position, value) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(persona.id.as_str())
            .bind(kind)
            .bind(position as i64)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(unavailable("Tag insert failed"))?;
        }

        for (position, url) in persona.gallery.iter().enumerate() {
            sqlx::query(
                "INSERT INTO persona_gallery (persona_id, position, url) VALUES (?1, ?2, ?3)",
            )
            .bind(persona.id.as_str())
            .bind(position as i64)
            .bind(url)
            .execute(&mut *tx)
            .await
            .map_err(unavailable("Gallery insert failed"))?;
        }

        tx.commit()
            .await
            .map_err(unavailable("Failed to commit persona"))?;

        debug!(persona_id = %persona.id, "Upserted persona");
        Ok(())
    }
}
