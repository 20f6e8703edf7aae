//! Conversation history: storage backends and the logic that keeps
//! message identifiers stable across retries and deletions.

mod file;
mod memory;
pub mod models;
pub mod reconcile;
pub mod service;
mod sqlite;
mod store;

pub use file::FileHistoryStore;
pub use memory::MemoryHistoryStore;
pub use models::{ChatMessage, MessageMetadata, SessionMeta};
pub use sqlite::SqliteHistoryStore;
pub use store::{HistoryStore, SharedHistoryStore, open_history_store};

use crate::core::ChatError;

const MAX_SESSION_ID_LEN: usize = 128;

/// Session ids end up in file names and URLs so only a conservative
/// set of characters is allowed.
pub fn validate_session_id(session_id: &str) -> Result<(), ChatError> {
    let valid = !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID_LEN
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ChatError::InvalidSessionId(session_id.to_string()))
    }
}
