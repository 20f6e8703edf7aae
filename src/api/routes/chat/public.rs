//! Public types for the chat API
use serde::{Deserialize, Serialize};

use crate::history::{ChatMessage, SessionMeta};

pub use crate::chat::{ChatRequest, ChatResponse, StreamEvent};

#[derive(Debug, Deserialize)]
pub struct ChatSessionsQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatSessionsResponse {
    pub sessions: Vec<SessionMeta>,
    pub page: usize,
    pub limit: usize,
    pub total_sessions: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatTranscriptResponse {
    pub session_id: String,
    pub session: Option<SessionMeta>,
    pub transcript: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteMessageResponse {
    pub session_id: String,
    pub deleted: ChatMessage,
}
