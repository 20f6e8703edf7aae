//! One question and answer in a session, from retrieval through to
//! the committed exchange.
use anyhow::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rusqlite::Connection;

use super::prompt::system_prompt;
use super::protocol::StreamEvent;
use crate::core::{AppConfig, ChatError};
use crate::history::reconcile::new_message_id;
use crate::history::service::{CommitOutcome, authorize_session, commit_exchange};
use crate::history::{ChatMessage, HistoryStore, SharedHistoryStore, validate_session_id};
use crate::openai::{Message, Role, completion, completion_stream};
use crate::retrieval::{Document, Embedder, search_documents};

const MAX_TOP_K: usize = 20;

fn default_stream() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub message: String,
    #[serde(default = "default_stream")]
    pub stream: bool,
    pub top_k: Option<usize>,
}

impl ChatRequest {
    pub fn new(session_id: Option<&str>, message: &str) -> Self {
        Self {
            session_id: session_id.map(String::from),
            message: message.to_string(),
            stream: true,
            top_k: None,
        }
    }

    /// Check the request and return the session it belongs to, a new
    /// one when the caller didn't name a session.
    pub fn validate(&self) -> Result<String, ChatError> {
        if self.message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        match &self.session_id {
            Some(id) => {
                validate_session_id(id)?;
                Ok(id.clone())
            }
            None => Ok(uuid::Uuid::new_v4().to_string()),
        }
    }
}

/// Response body for a turn that wasn't streamed.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub answer: String,
    pub data_points: Vec<Document>,
    pub user_message_id: String,
    pub assistant_message_id: String,
    pub persisted: bool,
}

/// Everything needed to ask the model, gathered before any output
/// is produced so that request errors surface as a status code.
#[derive(Debug)]
pub struct PreparedTurn {
    pub session_id: String,
    pub user_id: Option<String>,
    pub user_message: ChatMessage,
    pub assistant_message_id: String,
    pub data_points: Vec<Document>,
    pub transcript: Vec<Message>,
}

impl PreparedTurn {
    fn exchange(&self, answer: &str) -> Vec<ChatMessage> {
        vec![
            self.user_message.clone(),
            ChatMessage::with_id(Role::Assistant, answer, &self.assistant_message_id),
        ]
    }

    /// Identifiers to report after a commit. A suppressed duplicate
    /// resolves to the messages that were already stored.
    fn committed_ids(&self, outcome: &CommitOutcome) -> (String, String) {
        let id_at = |i: usize, fallback: &str| {
            outcome
                .messages
                .get(i)
                .and_then(|m| m.id())
                .unwrap_or(fallback)
                .to_string()
        };
        let user_id = self.user_message.id().unwrap_or_default();
        (
            id_at(0, user_id),
            id_at(1, &self.assistant_message_id),
        )
    }
}

/// A retry of the last question must be answered from the same context
/// as the first attempt, so the stored exchange it repeats is left out.
/// The commit later resolves it to the stored messages.
fn drop_retried_exchange(previous: &mut Vec<ChatMessage>, question: &ChatMessage) {
    let tail = match previous.as_slice() {
        [.., user, last] if last.role == Role::Assistant && user.same_content(question) => 2,
        [.., last] if last.same_content(question) => 1,
        _ => 0,
    };
    previous.truncate(previous.len() - tail);
}

pub async fn prepare_turn(
    history: &dyn HistoryStore,
    db: &Connection,
    embedder: &dyn Embedder,
    config: &AppConfig,
    request: &ChatRequest,
    user_id: Option<&str>,
) -> Result<PreparedTurn, Error> {
    let session_id = request.validate()?;
    authorize_session(history, &session_id, user_id).await?;

    let mut previous = history.messages(&session_id).await?;
    drop_retried_exchange(
        &mut previous,
        &ChatMessage::new(Role::User, &request.message),
    );
    if previous.len() > config.max_history_messages {
        previous.drain(..previous.len() - config.max_history_messages);
    }

    let top_k = request
        .top_k
        .unwrap_or(config.retrieval_top_k)
        .min(MAX_TOP_K);
    let data_points = search_documents(db, embedder, &request.message, top_k).await?;

    let mut transcript = vec![Message::new(
        Role::System,
        &system_prompt(&config.system_message, &data_points)?,
    )];
    transcript.extend(previous.iter().map(Message::from));
    transcript.push(Message::new(Role::User, &request.message));

    Ok(PreparedTurn {
        user_message: ChatMessage::with_id(Role::User, &request.message, &new_message_id()),
        assistant_message_id: new_message_id(),
        session_id,
        user_id: user_id.map(String::from),
        data_points,
        transcript,
    })
}

/// Answer in a single response and commit the exchange.
pub async fn run_blocking_turn(
    history: &dyn HistoryStore,
    config: &AppConfig,
    turn: PreparedTurn,
) -> Result<ChatResponse, Error> {
    let answer = completion(
        &turn.transcript,
        &config.openai_api_hostname,
        &config.openai_api_key,
        &config.openai_model,
    )
    .await?;

    let (user_message_id, assistant_message_id, persisted) = if answer.trim().is_empty() {
        tracing::warn!("Empty answer for session {}, not saving", turn.session_id);
        let user_message_id = turn.user_message.id().unwrap_or_default().to_string();
        (user_message_id, turn.assistant_message_id.clone(), false)
    } else {
        let outcome = commit_exchange(
            history,
            &turn.session_id,
            turn.user_id.as_deref(),
            turn.exchange(&answer),
        )
        .await?;
        let (user_message_id, assistant_message_id) = turn.committed_ids(&outcome);
        (user_message_id, assistant_message_id, true)
    };

    Ok(ChatResponse {
        session_id: turn.session_id,
        answer,
        data_points: turn.data_points,
        user_message_id,
        assistant_message_id,
        persisted,
    })
}

/// Stream the answer as events on `tx` and commit it once the model
/// is done. Generation and the commit carry on when the receiver is
/// dropped.
pub fn spawn_streaming_turn(
    history: SharedHistoryStore,
    config: AppConfig,
    turn: PreparedTurn,
    tx: mpsc::UnboundedSender<StreamEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let _ = tx.send(StreamEvent::Context {
            session_id: turn.session_id.clone(),
            data_points: turn.data_points.clone(),
        });

        let (delta_tx, mut delta_rx) = mpsc::unbounded_channel::<String>();
        let generate = completion_stream(
            delta_tx,
            &turn.transcript,
            &config.openai_api_hostname,
            &config.openai_api_key,
            &config.openai_model,
        );
        let forward = async {
            let mut answer = String::new();
            let mut disconnected = false;
            while let Some(fragment) = delta_rx.recv().await {
                answer.push_str(&fragment);
                let sent = tx.send(StreamEvent::Delta { content: fragment });
                if sent.is_err() && !disconnected {
                    disconnected = true;
                    tracing::info!(
                        "Client disconnected from session {}, finishing in the background",
                        turn.session_id
                    );
                }
            }
            answer
        };
        let (result, answer) = tokio::join!(generate, forward);

        if let Err(e) = result {
            tracing::error!(
                "Chat completion failed for session {}: {}. Root cause: {}",
                turn.session_id,
                e,
                e.root_cause()
            );
            let _ = tx.send(StreamEvent::Error {
                message: format!("Something went wrong: {}", e),
            });
            return;
        }

        if answer.trim().is_empty() {
            tracing::warn!("Empty answer for session {}, not saving", turn.session_id);
            let _ = tx.send(StreamEvent::Done {
                session_id: turn.session_id.clone(),
                user_message_id: turn.user_message.id().unwrap_or_default().to_string(),
                assistant_message_id: turn.assistant_message_id.clone(),
                persisted: false,
            });
            return;
        }

        let committed = commit_exchange(
            history.as_ref(),
            &turn.session_id,
            turn.user_id.as_deref(),
            turn.exchange(&answer),
        )
        .await;

        let event = match committed {
            Ok(outcome) => {
                tracing::debug!(
                    "Committed session {} ({} new, {} duplicate)",
                    turn.session_id,
                    outcome.inserted,
                    outcome.skipped
                );
                let (user_message_id, assistant_message_id) = turn.committed_ids(&outcome);
                StreamEvent::Done {
                    session_id: turn.session_id.clone(),
                    user_message_id,
                    assistant_message_id,
                    persisted: true,
                }
            }
            Err(e) => {
                tracing::error!("Failed to save session {}: {}", turn.session_id, e);
                StreamEvent::Error {
                    message: format!("Failed to save the conversation: {}", e),
                }
            }
        };
        let _ = tx.send(event);
    })
}
