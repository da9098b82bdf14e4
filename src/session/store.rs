//! SQLite persistence for sessions and message history.

use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::core::errors::ApiError;
use crate::orchestrator::SourceDescriptor;

/// The original and rewritten form of the last retrieval query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewrittenQuery {
    pub original: String,
    pub rewritten: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    pub use_web_search: bool,
    /// Source names already ingested into this session.
    pub processed_sources: Vec<String>,
    /// Last turn's query rewrite, if any turn has run.
    pub rewritten_query: Option<RewrittenQuery>,
    /// Web sources from the last turn.
    pub search_sources: Vec<SourceDescriptor>,
    /// Document sources from the last turn.
    pub doc_sources: Vec<SourceDescriptor>,
    /// Degradation notices surfaced to the user.
    pub info_messages: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRecord {
    pub id: i64,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::persistence)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                use_web_search INTEGER NOT NULL DEFAULT 1,
                processed_sources TEXT NOT NULL DEFAULT '[]',
                rewritten_original TEXT,
                rewritten TEXT,
                search_sources TEXT NOT NULL DEFAULT '[]',
                doc_sources TEXT NOT NULL DEFAULT '[]',
                info_messages TEXT NOT NULL DEFAULT '[]'
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::persistence)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::persistence)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::persistence)?;

        Ok(())
    }

    pub async fn create_session(&self, title: Option<String>) -> Result<SessionRecord, ApiError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let title = title.unwrap_or_else(|| super::PLACEHOLDER_TITLE.to_string());

        sqlx::query(
            "INSERT INTO sessions (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        )
        .bind(&id)
        .bind(&title)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(ApiError::persistence)?;

        Ok(SessionRecord {
            id,
            title,
            created_at: now.clone(),
            updated_at: now,
            use_web_search: true,
            processed_sources: Vec::new(),
            rewritten_query: None,
            search_sources: Vec::new(),
            doc_sources: Vec::new(),
            info_messages: Vec::new(),
        })
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, ApiError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::persistence)?;

        Ok(row.map(|row| {
            let rewritten_original: Option<String> = row.get("rewritten_original");
            let rewritten: Option<String> = row.get("rewritten");
            let rewritten_query = match (rewritten_original, rewritten) {
                (Some(original), Some(rewritten)) => Some(RewrittenQuery { original, rewritten }),
                _ => None,
            };

            SessionRecord {
                id: row.get("id"),
                title: row.get("title"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
                use_web_search: row.get::<i64, _>("use_web_search") != 0,
                processed_sources: parse_json_column(row.get("processed_sources")),
                rewritten_query,
                search_sources: parse_json_column(row.get("search_sources")),
                doc_sources: parse_json_column(row.get("doc_sources")),
                info_messages: parse_json_column(row.get("info_messages")),
            }
        }))
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, title, created_at, updated_at FROM sessions ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::persistence)?;

        Ok(rows
            .into_iter()
            .map(|row| SessionSummary {
                id: row.get("id"),
                title: row.get("title"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    /// Delete a session and its messages. Returns false when it did not exist.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::persistence)?;

        Ok(result.rows_affected() > 0)
    }

    /// Append a message. Never creates the session implicitly; an unknown
    /// session id is a NotFound.
    pub async fn add_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
    ) -> Result<(), ApiError> {
        let now = Utc::now().to_rfc3339();

        let touched = sqlx::query("UPDATE sessions SET updated_at = ?1 WHERE id = ?2")
            .bind(&now)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::persistence)?;

        if touched.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("session {}", session_id)));
        }

        sqlx::query(
            "INSERT INTO messages (session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(session_id)
        .bind(role)
        .bind(content)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(ApiError::persistence)?;

        Ok(())
    }

    pub async fn get_history(&self, session_id: &str) -> Result<Vec<MessageRecord>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, session_id, role, content, created_at
             FROM messages WHERE session_id = ?1 ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::persistence)?;

        Ok(rows
            .into_iter()
            .map(|row| MessageRecord {
                id: row.get("id"),
                session_id: row.get("session_id"),
                role: row.get("role"),
                content: row.get("content"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    pub async fn update_session_title(
        &self,
        session_id: &str,
        title: &str,
    ) -> Result<(), ApiError> {
        let result = sqlx::query("UPDATE sessions SET title = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(title)
            .bind(Utc::now().to_rfc3339())
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::persistence)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("session {}", session_id)));
        }
        Ok(())
    }

    pub async fn set_web_search_enabled(
        &self,
        session_id: &str,
        enabled: bool,
    ) -> Result<(), ApiError> {
        let result = sqlx::query(
            "UPDATE sessions SET use_web_search = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(enabled as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::persistence)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("session {}", session_id)));
        }
        Ok(())
    }

    /// Record newly ingested source names on the session.
    pub async fn record_ingest(
        &self,
        session_id: &str,
        processed_sources: &[String],
    ) -> Result<(), ApiError> {
        let json = serde_json::to_string(processed_sources).map_err(ApiError::persistence)?;

        let result = sqlx::query(
            "UPDATE sessions SET processed_sources = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(&json)
        .bind(Utc::now().to_rfc3339())
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::persistence)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("session {}", session_id)));
        }
        Ok(())
    }

    /// Overwrite the last-turn snapshots on the session row.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_turn_snapshots(
        &self,
        session_id: &str,
        original_query: &str,
        rewritten_query: &str,
        search_sources: &[SourceDescriptor],
        doc_sources: &[SourceDescriptor],
        info_messages: &[String],
    ) -> Result<(), ApiError> {
        let search_json = serde_json::to_string(search_sources).map_err(ApiError::persistence)?;
        let doc_json = serde_json::to_string(doc_sources).map_err(ApiError::persistence)?;
        let info_json = serde_json::to_string(info_messages).map_err(ApiError::persistence)?;

        let result = sqlx::query(
            "UPDATE sessions
             SET rewritten_original = ?1, rewritten = ?2,
                 search_sources = ?3, doc_sources = ?4, info_messages = ?5,
                 updated_at = ?6
             WHERE id = ?7",
        )
        .bind(original_query)
        .bind(rewritten_query)
        .bind(&search_json)
        .bind(&doc_json)
        .bind(&info_json)
        .bind(Utc::now().to_rfc3339())
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::persistence)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("session {}", session_id)));
        }
        Ok(())
    }
}

fn parse_json_column<T: serde::de::DeserializeOwned + Default>(raw: String) -> T {
    serde_json::from_str(&raw).unwrap_or_default()
}
