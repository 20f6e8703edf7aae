use anyhow::{Error, Result};
use async_trait::async_trait;
use tokio_rusqlite::{Connection, params};

use super::models::{ChatMessage, SessionMeta};
use super::store::HistoryStore;

/// Chat history in the `session` and `chat_message` tables. Each
/// message is stored as a JSON document so its metadata (including
/// the identifier) travels with it.
pub struct SqliteHistoryStore {
    db: Connection,
}

impl SqliteHistoryStore {
    pub fn new(db: Connection) -> Self {
        Self { db }
    }
}

fn session_from_row(row: &rusqlite::Row) -> Result<SessionMeta, rusqlite::Error> {
    Ok(SessionMeta {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn session(&self, session_id: &str) -> Result<Option<SessionMeta>, Error> {
        let s_id = session_id.to_owned();
        let session = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, title, created_at, updated_at FROM session WHERE id = ?",
                )?;
                let session = stmt
                    .query_map([s_id], session_from_row)?
                    .next()
                    .transpose()?;
                Ok(session)
            })
            .await?;
        Ok(session)
    }

    async fn upsert_session(&self, meta: &SessionMeta) -> Result<(), Error> {
        let meta = meta.clone();
        self.db
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO session (id, user_id, title, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(id) DO UPDATE SET
                        user_id = excluded.user_id,
                        title = excluded.title,
                        created_at = excluded.created_at,
                        updated_at = excluded.updated_at
                    "#,
                    params![
                        meta.id,
                        meta.user_id,
                        meta.title,
                        meta.created_at,
                        meta.updated_at
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn list_sessions(
        &self,
        user_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SessionMeta>, Error> {
        let user_id = user_id.map(String::from);
        let sessions = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, user_id, title, created_at, updated_at
                    FROM session
                    WHERE user_id IS NULL OR (?1 IS NOT NULL AND user_id = ?1)
                    ORDER BY updated_at DESC
                    LIMIT ?2 OFFSET ?3
                    "#,
                )?;
                let sessions = stmt
                    .query_map(params![user_id, limit, offset], session_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(sessions)
            })
            .await?;
        Ok(sessions)
    }

    async fn count_sessions(&self, user_id: Option<&str>) -> Result<i64, Error> {
        let user_id = user_id.map(String::from);
        let count = self
            .db
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM session WHERE user_id IS NULL OR (?1 IS NOT NULL AND user_id = ?1)",
                    params![user_id],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    async fn messages(&self, session_id: &str) -> Result<Vec<ChatMessage>, Error> {
        let s_id = session_id.to_owned();
        let rows = self
            .db
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT data FROM chat_message WHERE session_id = ? ORDER BY seq")?;
                let rows = stmt
                    .query_map([s_id], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.iter()
            .map(|data| serde_json::from_str::<ChatMessage>(data).map_err(Error::from))
            .collect()
    }

    async fn add_messages(
        &self,
        session_id: &str,
        messages: &[ChatMessage],
    ) -> Result<(), Error> {
        let s_id = session_id.to_owned();
        let data = messages
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt =
                        tx.prepare("INSERT INTO chat_message (session_id, data) VALUES (?, ?)")?;
                    for d in data {
                        stmt.execute(params![s_id, d])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<(), Error> {
        let s_id = session_id.to_owned();
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM chat_message WHERE session_id = ?", [&s_id])?;
                tx.execute("DELETE FROM session WHERE id = ?", [&s_id])?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}
