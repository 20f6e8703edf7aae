//! Session operations built on top of any `HistoryStore`.
use anyhow::{Error, Result};
use chrono::Utc;

use super::models::{ChatMessage, SessionMeta};
use super::reconcile::{derive_title, ensure_ids, plan_append, rederive_session, remove_message};
use super::store::HistoryStore;
use super::validate_session_id;
use crate::core::ChatError;

/// Load the session metadata and check that `user_id` may see it.
pub async fn authorize_session(
    store: &dyn HistoryStore,
    session_id: &str,
    user_id: Option<&str>,
) -> Result<Option<SessionMeta>, Error> {
    validate_session_id(session_id)?;
    let meta = store.session(session_id).await?;
    if let Some(meta) = &meta {
        if !meta.is_visible_to(user_id) {
            return Err(ChatError::Forbidden(session_id.to_string()).into());
        }
    }
    Ok(meta)
}

/// Clear the session and write it back from scratch. The store has
/// no way to edit in place so this is how any change to existing
/// messages is made.
async fn rewrite_session(
    store: &dyn HistoryStore,
    meta: &SessionMeta,
    messages: &[ChatMessage],
) -> Result<(), Error> {
    store.clear(&meta.id).await?;
    store.upsert_session(meta).await?;
    store.add_messages(&meta.id, messages).await?;
    Ok(())
}

/// All messages in the session, each with an identifier. Messages
/// stored before identifiers existed get one here and the session is
/// rewritten so the identifiers stay stable.
pub async fn transcript(
    store: &dyn HistoryStore,
    session_id: &str,
    user_id: Option<&str>,
) -> Result<Vec<ChatMessage>, Error> {
    let meta = authorize_session(store, session_id, user_id).await?;
    let mut messages = store.messages(session_id).await?;
    if meta.is_none() && messages.is_empty() {
        return Err(ChatError::SessionNotFound(session_id.to_string()).into());
    }

    if ensure_ids(&mut messages) {
        tracing::info!("Backfilling message ids for session {}", session_id);
        let meta = rederive_session(meta.as_ref(), session_id, &messages);
        // Not atomic: a crash between clear and add_messages loses the session
        rewrite_session(store, &meta, &messages).await?;
    }

    Ok(messages)
}

#[derive(Debug)]
pub struct CommitOutcome {
    pub inserted: usize,
    pub skipped: usize,
    /// The committed messages with their stored identifiers
    pub messages: Vec<ChatMessage>,
}

/// Append a finished exchange to the session unless (part of) it is
/// already there, creating the session if needed.
pub async fn commit_exchange(
    store: &dyn HistoryStore,
    session_id: &str,
    user_id: Option<&str>,
    mut incoming: Vec<ChatMessage>,
) -> Result<CommitOutcome, Error> {
    let meta = authorize_session(store, session_id, user_id).await?;
    ensure_ids(&mut incoming);

    let existing = store.messages(session_id).await?;
    let plan = plan_append(&existing, &incoming);

    let mut meta = meta.unwrap_or_else(|| SessionMeta::new(session_id, user_id));
    if meta.title.is_none() {
        meta.title = derive_title(&existing).or_else(|| derive_title(&incoming));
    }
    if !plan.to_insert.is_empty() {
        meta.updated_at = Utc::now();
    }
    store.upsert_session(&meta).await?;

    if plan.skipped > 0 {
        tracing::info!(
            "Suppressed {} duplicate message(s) in session {}",
            plan.skipped,
            session_id
        );
    }
    if !plan.to_insert.is_empty() {
        store.add_messages(session_id, &plan.to_insert).await?;
    }

    Ok(CommitOutcome {
        inserted: plan.to_insert.len(),
        skipped: plan.skipped,
        messages: plan.resolved,
    })
}

/// Remove one message by identifier. The rest of the session is
/// written back in order with its metadata intact.
pub async fn delete_message(
    store: &dyn HistoryStore,
    session_id: &str,
    message_id: &str,
    user_id: Option<&str>,
) -> Result<ChatMessage, Error> {
    let previous = authorize_session(store, session_id, user_id).await?;
    let messages = store.messages(session_id).await?;
    if previous.is_none() && messages.is_empty() {
        return Err(ChatError::SessionNotFound(session_id.to_string()).into());
    }

    let (remaining, removed) = remove_message(session_id, messages, message_id)?;
    let meta = rederive_session(previous.as_ref(), session_id, &remaining);
    rewrite_session(store, &meta, &remaining).await?;

    tracing::info!(
        "Deleted message {} from session {} ({} remaining)",
        message_id,
        session_id,
        remaining.len()
    );
    Ok(removed)
}

pub async fn delete_session(
    store: &dyn HistoryStore,
    session_id: &str,
    user_id: Option<&str>,
) -> Result<(), Error> {
    let meta = authorize_session(store, session_id, user_id).await?;
    if meta.is_none() && store.messages(session_id).await?.is_empty() {
        return Err(ChatError::SessionNotFound(session_id.to_string()).into());
    }
    store.clear(session_id).await
}

/// One page of sessions plus the total number visible to `user_id`.
pub async fn list_sessions(
    store: &dyn HistoryStore,
    user_id: Option<&str>,
    page: usize,
    limit: usize,
) -> Result<(Vec<SessionMeta>, i64), Error> {
    let offset = page.saturating_sub(1) * limit;
    let total = store.count_sessions(user_id).await?;
    let sessions = store.list_sessions(user_id, limit, offset).await?;
    Ok((sessions, total))
}
