//! Conversation history append sink.
//!
//! The agent core treats history as write-only: rows are appended per
//! turn and nothing in the pipeline ever reads them back.

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::warn;

#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub async fn open(url: &str) -> Result<Self> {
        // A single connection keeps in-memory databases coherent and is
        // plenty for an append-only sink.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversation_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Appends one message. A sink failure is logged and swallowed: the
    /// caller's answer must not depend on history bookkeeping.
    pub async fn append(&self, conversation_id: &str, role: &str, content: &str) {
        let result = sqlx::query(
            "INSERT INTO conversation_messages (conversation_id, role, content) VALUES ($1, $2, $3)",
        )
        .bind(conversation_id)
        .bind(role)
        .bind(content)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!("failed to append conversation history: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_survive_round_trip() {
        let store = HistoryStore::open("sqlite::memory:").await.unwrap();
        store.append("conv-1", "user", "how many orders?").await;
        store.append("conv-1", "assistant", "42").await;

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM conversation_messages WHERE conversation_id = $1")
                .bind("conv-1")
                .fetch_one(&store.pool)
                .await
                .unwrap();
        assert_eq!(count, 2);
    }
}
