use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Error, Result};
use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use super::models::{ChatMessage, SessionMeta};
use super::store::{HistoryStore, SessionRecord, page_sessions};
use super::validate_session_id;

/// Chat history as one JSON document per session under `root`.
///
/// Every change rewrites the whole document. Writes go to a
/// temporary file first and are renamed into place, and a single
/// mutex serializes read-modify-write cycles within the process.
pub struct FileHistoryStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileHistoryStore {
    pub async fn open(root: &str) -> Result<Self, Error> {
        fs::create_dir_all(root).await?;
        Ok(Self {
            root: PathBuf::from(root),
            lock: Mutex::new(()),
        })
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf, Error> {
        validate_session_id(session_id)?;
        Ok(self.root.join(format!("{}.json", session_id)))
    }

    async fn read_record(path: &Path) -> Result<Option<SessionRecord>, Error> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_record(path: &Path, record: &SessionRecord) -> Result<(), Error> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(record)?).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn all_sessions(&self) -> Result<Vec<SessionMeta>, Error> {
        let mut sessions = vec![];
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(Some(SessionRecord {
                    session: Some(meta),
                    ..
                })) => sessions.push(meta),
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping unreadable session file {:?}: {}", path, e),
            }
        }
        Ok(sessions)
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn session(&self, session_id: &str) -> Result<Option<SessionMeta>, Error> {
        let path = self.path_for(session_id)?;
        let _guard = self.lock.lock().await;
        Ok(Self::read_record(&path).await?.and_then(|r| r.session))
    }

    async fn upsert_session(&self, meta: &SessionMeta) -> Result<(), Error> {
        let path = self.path_for(&meta.id)?;
        let _guard = self.lock.lock().await;
        let mut record = Self::read_record(&path).await?.unwrap_or_default();
        record.session = Some(meta.clone());
        Self::write_record(&path, &record).await
    }

    async fn list_sessions(
        &self,
        user_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SessionMeta>, Error> {
        let _guard = self.lock.lock().await;
        let visible = self
            .all_sessions()
            .await?
            .into_iter()
            .filter(|s| s.is_visible_to(user_id))
            .collect();
        Ok(page_sessions(visible, limit, offset))
    }

    async fn count_sessions(&self, user_id: Option<&str>) -> Result<i64, Error> {
        let _guard = self.lock.lock().await;
        let count = self
            .all_sessions()
            .await?
            .iter()
            .filter(|s| s.is_visible_to(user_id))
            .count();
        Ok(count as i64)
    }

    async fn messages(&self, session_id: &str) -> Result<Vec<ChatMessage>, Error> {
        let path = self.path_for(session_id)?;
        let _guard = self.lock.lock().await;
        Ok(Self::read_record(&path)
            .await?
            .map(|r| r.messages)
            .unwrap_or_default())
    }

    async fn add_messages(
        &self,
        session_id: &str,
        messages: &[ChatMessage],
    ) -> Result<(), Error> {
        let path = self.path_for(session_id)?;
        let _guard = self.lock.lock().await;
        let mut record = Self::read_record(&path).await?.unwrap_or_default();
        record.messages.extend_from_slice(messages);
        Self::write_record(&path, &record).await
    }

    async fn clear(&self, session_id: &str) -> Result<(), Error> {
        let path = self.path_for(session_id)?;
        let _guard = self.lock.lock().await;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
