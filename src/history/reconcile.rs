//! Pure functions for keeping a session's message list consistent:
//! identifiers, duplicate suppression and single message removal.
//! Nothing in here touches storage.
use chrono::Utc;
use uuid::Uuid;

use super::models::{ChatMessage, SessionMeta};
use crate::core::ChatError;
use crate::openai::Role;

const TITLE_MAX_CHARS: usize = 60;

pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Give every message without an identifier a new one. Returns true
/// if anything changed and the session needs to be rewritten.
pub fn ensure_ids(messages: &mut [ChatMessage]) -> bool {
    let mut changed = false;
    for msg in messages.iter_mut() {
        let missing = msg.metadata.id.as_deref().is_none_or(str::is_empty);
        if missing {
            msg.metadata.id = Some(new_message_id());
            changed = true;
        }
    }
    changed
}

#[derive(Debug)]
pub struct AppendPlan {
    /// Messages that still need to be written, in order
    pub to_insert: Vec<ChatMessage>,
    /// Number of incoming messages already present in the session
    pub skipped: usize,
    /// All incoming messages, with the identifiers they end up with
    /// in storage. Skipped messages take the stored identifier.
    pub resolved: Vec<ChatMessage>,
}

/// Work out which of `incoming` still need to be appended to
/// `existing`.
///
/// A retried request (or a stream that was interrupted after part of
/// the exchange was committed) repeats messages already at the end of
/// the session. The longest tail of `existing` that matches the start
/// of `incoming` by role and content is treated as already written.
pub fn plan_append(existing: &[ChatMessage], incoming: &[ChatMessage]) -> AppendPlan {
    let max_overlap = existing.len().min(incoming.len());
    let overlap = (1..=max_overlap)
        .rev()
        .find(|&k| {
            existing[existing.len() - k..]
                .iter()
                .zip(&incoming[..k])
                .all(|(a, b)| a.same_content(b))
        })
        .unwrap_or(0);

    let mut resolved: Vec<ChatMessage> = incoming.to_vec();
    for (stored, msg) in existing[existing.len() - overlap..]
        .iter()
        .zip(resolved.iter_mut())
    {
        if stored.id().is_some() {
            msg.metadata.id = stored.metadata.id.clone();
        }
    }

    AppendPlan {
        to_insert: incoming[overlap..].to_vec(),
        skipped: overlap,
        resolved,
    }
}

/// Split out the message with identifier `message_id`, keeping the
/// order of everything else.
pub fn remove_message(
    session_id: &str,
    messages: Vec<ChatMessage>,
    message_id: &str,
) -> Result<(Vec<ChatMessage>, ChatMessage), ChatError> {
    let mut removed = None;
    let mut remaining = Vec::with_capacity(messages.len());
    for msg in messages {
        if removed.is_none() && msg.id() == Some(message_id) {
            removed = Some(msg);
        } else {
            remaining.push(msg);
        }
    }

    match removed {
        Some(msg) => Ok((remaining, msg)),
        None => Err(ChatError::MessageNotFound {
            session_id: session_id.to_string(),
            message_id: message_id.to_string(),
        }),
    }
}

/// A short title from the first thing the user said.
pub fn derive_title(messages: &[ChatMessage]) -> Option<String> {
    let first = messages
        .iter()
        .find(|m| m.role == Role::User && !m.content.trim().is_empty())?;
    let collapsed = first.content.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= TITLE_MAX_CHARS {
        return Some(collapsed);
    }
    let truncated: String = collapsed.chars().take(TITLE_MAX_CHARS).collect();
    Some(format!("{}…", truncated.trim_end()))
}

/// Session metadata to write back after the session was cleared and
/// is about to be refilled with `remaining`.
pub fn rederive_session(
    previous: Option<&SessionMeta>,
    session_id: &str,
    remaining: &[ChatMessage],
) -> SessionMeta {
    let mut meta = match previous {
        Some(prev) => prev.clone(),
        None => SessionMeta::new(session_id, None),
    };
    let has_title = meta.title.as_deref().is_some_and(|t| !t.trim().is_empty());
    if !has_title {
        meta.title = derive_title(remaining);
    }
    meta.updated_at = Utc::now();
    meta
}
