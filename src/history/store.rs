use std::sync::Arc;

use anyhow::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::Connection;

use super::file::FileHistoryStore;
use super::memory::MemoryHistoryStore;
use super::models::{ChatMessage, SessionMeta};
use super::sqlite::SqliteHistoryStore;
use crate::core::{AppConfig, HistoryBackend};

/// Storage for chat sessions and their messages.
///
/// Implementations are deliberately dumb: they keep messages in the
/// order they were added and never interpret them. Deduplication,
/// identifiers and rewrites live in `history::service`.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn session(&self, session_id: &str) -> Result<Option<SessionMeta>, Error>;

    async fn upsert_session(&self, meta: &SessionMeta) -> Result<(), Error>;

    /// Sessions visible to `user_id`, most recently updated first.
    async fn list_sessions(
        &self,
        user_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SessionMeta>, Error>;

    async fn count_sessions(&self, user_id: Option<&str>) -> Result<i64, Error>;

    async fn messages(&self, session_id: &str) -> Result<Vec<ChatMessage>, Error>;

    async fn add_messages(&self, session_id: &str, messages: &[ChatMessage])
    -> Result<(), Error>;

    /// Remove every message and the session metadata.
    async fn clear(&self, session_id: &str) -> Result<(), Error>;
}

pub type SharedHistoryStore = Arc<dyn HistoryStore>;

/// Everything stored for one session by the stores that keep a
/// session as a single document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct SessionRecord {
    #[serde(default)]
    pub session: Option<SessionMeta>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Sort and page sessions the same way the SQL backend does.
pub(crate) fn page_sessions(
    mut sessions: Vec<SessionMeta>,
    limit: usize,
    offset: usize,
) -> Vec<SessionMeta> {
    sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    sessions.into_iter().skip(offset).take(limit).collect()
}

pub async fn open_history_store(
    config: &AppConfig,
    db: &Connection,
) -> Result<SharedHistoryStore, Error> {
    tracing::info!("Using {} chat history backend", config.history_backend);
    let store: SharedHistoryStore = match config.history_backend {
        HistoryBackend::Sqlite => Arc::new(SqliteHistoryStore::new(db.clone())),
        HistoryBackend::File => Arc::new(FileHistoryStore::open(&config.history_path).await?),
        HistoryBackend::Memory => Arc::new(MemoryHistoryStore::default()),
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::async_db_in_memory;
    use crate::openai::Role;
    use chrono::{Duration, Utc};

    async fn backends(dir: &std::path::Path) -> Vec<(&'static str, SharedHistoryStore)> {
        let db = async_db_in_memory().await.unwrap();
        vec![
            ("sqlite", Arc::new(SqliteHistoryStore::new(db)) as SharedHistoryStore),
            (
                "file",
                Arc::new(FileHistoryStore::open(dir.to_str().unwrap()).await.unwrap()),
            ),
            ("memory", Arc::new(MemoryHistoryStore::default())),
        ]
    }

    fn msg(role: Role, content: &str, id: &str) -> ChatMessage {
        ChatMessage::with_id(role, content, id)
    }

    #[tokio::test]
    async fn test_messages_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        for (name, store) in backends(dir.path()).await {
            store
                .add_messages("s1", &[msg(Role::User, "q1", "u1"), msg(Role::Assistant, "a1", "a1")])
                .await
                .unwrap();
            store
                .add_messages("s1", &[msg(Role::User, "q2", "u2")])
                .await
                .unwrap();

            let messages = store.messages("s1").await.unwrap();
            let ids: Vec<_> = messages.iter().map(|m| m.id().unwrap()).collect();
            assert_eq!(ids, vec!["u1", "a1", "u2"], "backend {}", name);
            assert!(store.messages("other").await.unwrap().is_empty(), "backend {}", name);
        }
    }

    #[tokio::test]
    async fn test_metadata_survives_storage() {
        let dir = tempfile::tempdir().unwrap();
        for (name, store) in backends(dir.path()).await {
            let mut message = msg(Role::Assistant, "answer", "a1");
            message
                .metadata
                .extra
                .insert("feedback".into(), serde_json::json!("thumbs_up"));
            store.add_messages("s1", &[message.clone()]).await.unwrap();

            let stored = store.messages("s1").await.unwrap();
            assert_eq!(stored, vec![message], "backend {}", name);
        }
    }

    #[tokio::test]
    async fn test_upsert_and_clear_session() {
        let dir = tempfile::tempdir().unwrap();
        for (name, store) in backends(dir.path()).await {
            let mut meta = SessionMeta::new("s1", Some("alice"));
            store.upsert_session(&meta).await.unwrap();
            meta.title = Some("Refunds".into());
            store.upsert_session(&meta).await.unwrap();
            store
                .add_messages("s1", &[msg(Role::User, "q1", "u1")])
                .await
                .unwrap();

            let stored = store.session("s1").await.unwrap().unwrap();
            assert_eq!(stored.title.as_deref(), Some("Refunds"), "backend {}", name);
            assert_eq!(stored.user_id.as_deref(), Some("alice"), "backend {}", name);

            store.clear("s1").await.unwrap();
            assert!(store.session("s1").await.unwrap().is_none(), "backend {}", name);
            assert!(store.messages("s1").await.unwrap().is_empty(), "backend {}", name);

            // Clearing something that doesn't exist is fine
            store.clear("never-existed").await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_list_sessions_by_visibility_and_recency() {
        let dir = tempfile::tempdir().unwrap();
        for (name, store) in backends(dir.path()).await {
            let now = Utc::now();
            let mut older = SessionMeta::new("older", Some("alice"));
            older.updated_at = now - Duration::minutes(5);
            let newer = SessionMeta::new("newer", Some("alice"));
            let shared = SessionMeta::new("shared", None);
            let mut other = SessionMeta::new("other", Some("bob"));
            other.updated_at = now + Duration::minutes(5);
            for meta in [&older, &newer, &shared, &other] {
                store.upsert_session(meta).await.unwrap();
            }

            let alice = store.list_sessions(Some("alice"), 10, 0).await.unwrap();
            let alice_ids: Vec<_> = alice.iter().map(|s| s.id.as_str()).collect();
            assert_eq!(alice_ids.len(), 3, "backend {}", name);
            assert!(!alice_ids.contains(&"other"), "backend {}", name);
            assert_eq!(alice_ids.last(), Some(&"older"), "backend {}", name);
            assert_eq!(store.count_sessions(Some("alice")).await.unwrap(), 3);

            let anonymous = store.list_sessions(None, 10, 0).await.unwrap();
            assert_eq!(anonymous.len(), 1, "backend {}", name);
            assert_eq!(anonymous[0].id, "shared");
            assert_eq!(store.count_sessions(None).await.unwrap(), 1);

            let paged = store.list_sessions(Some("alice"), 1, 2).await.unwrap();
            assert_eq!(paged.len(), 1, "backend {}", name);
            assert_eq!(paged[0].id, "older", "backend {}", name);
        }
    }

    #[tokio::test]
    async fn test_open_history_store_memory() {
        let mut config = AppConfig::from_env().unwrap();
        config.history_backend = HistoryBackend::Memory;
        let db = async_db_in_memory().await.unwrap();
        let store = open_history_store(&config, &db).await.unwrap();
        assert!(store.messages("s1").await.unwrap().is_empty());
    }
}
