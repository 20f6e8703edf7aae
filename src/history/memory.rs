use std::collections::HashMap;

use anyhow::{Error, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::models::{ChatMessage, SessionMeta};
use super::store::{HistoryStore, SessionRecord, page_sessions};

/// Process-local chat history. Everything is lost on restart.
#[derive(Default)]
pub struct MemoryHistoryStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn session(&self, session_id: &str) -> Result<Option<SessionMeta>, Error> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).and_then(|r| r.session.clone()))
    }

    async fn upsert_session(&self, meta: &SessionMeta) -> Result<(), Error> {
        let mut sessions = self.sessions.write().await;
        sessions.entry(meta.id.clone()).or_default().session = Some(meta.clone());
        Ok(())
    }

    async fn list_sessions(
        &self,
        user_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SessionMeta>, Error> {
        let sessions = self.sessions.read().await;
        let visible = sessions
            .values()
            .filter_map(|r| r.session.clone())
            .filter(|s| s.is_visible_to(user_id))
            .collect();
        Ok(page_sessions(visible, limit, offset))
    }

    async fn count_sessions(&self, user_id: Option<&str>) -> Result<i64, Error> {
        let sessions = self.sessions.read().await;
        let count = sessions
            .values()
            .filter_map(|r| r.session.as_ref())
            .filter(|s| s.is_visible_to(user_id))
            .count();
        Ok(count as i64)
    }

    async fn messages(&self, session_id: &str) -> Result<Vec<ChatMessage>, Error> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .map(|r| r.messages.clone())
            .unwrap_or_default())
    }

    async fn add_messages(
        &self,
        session_id: &str,
        messages: &[ChatMessage],
    ) -> Result<(), Error> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .messages
            .extend_from_slice(messages);
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<(), Error> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }
}
