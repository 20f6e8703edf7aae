//! HTTP client for the chat API. Streamed answers are decoded as they
//! arrive and each delta is republished after a short delay so that
//! output renders at a steady pace even when the server sends large
//! bursts.
use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::de::DeserializeOwned;

use crate::api::public::chat::{
    ChatRequest, ChatSessionsResponse, ChatTranscriptResponse, DeleteMessageResponse,
};
use crate::chat::{NdjsonDecoder, StreamEvent};

pub const DEFAULT_DELTA_DELAY: Duration = Duration::from_millis(20);

#[derive(Clone, Debug)]
pub struct ChatClient {
    base_url: String,
    auth_header: String,
    user_id: Option<String>,
    delta_delay: Duration,
    http: reqwest::Client,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header: String::from("x-ms-client-principal-id"),
            user_id: None,
            delta_delay: DEFAULT_DELTA_DELAY,
            http: reqwest::Client::new(),
        }
    }

    /// Identify as `user_id` using the given header on every request.
    pub fn with_user(mut self, auth_header: &str, user_id: &str) -> Self {
        self.auth_header = auth_header.to_string();
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn with_delta_delay(mut self, delay: Duration) -> Self {
        self.delta_delay = delay;
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        match &self.user_id {
            Some(user_id) => builder.header(self.auth_header.as_str(), user_id),
            None => builder,
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, Error> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Request failed with {}: {}", status, body));
        }
        Ok(response.json().await?)
    }

    /// Send a message and stream the answer as events. The stream ends
    /// after a `done` or `error` event or when the server closes the
    /// connection.
    pub fn stream_chat(&self, request: ChatRequest) -> BoxStream<'static, Result<StreamEvent>> {
        let client = self.clone();
        let request = ChatRequest {
            stream: true,
            ..request
        };

        Box::pin(async_stream::try_stream! {
            let response = client
                .request(reqwest::Method::POST, "/api/chat")
                .json(&request)
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                Err::<(), Error>(anyhow!("Chat request failed with {}: {}", status, body))?;
                return;
            }

            let mut decoder = NdjsonDecoder::new();
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                for event in decoder.push(&chunk?)? {
                    if matches!(event, StreamEvent::Delta { .. }) && !client.delta_delay.is_zero() {
                        tokio::time::sleep(client.delta_delay).await;
                    }
                    let terminal = event.is_terminal();
                    yield event;
                    if terminal {
                        return;
                    }
                }
            }
            if let Some(event) = decoder.finish()? {
                yield event;
            }
        })
    }

    pub async fn transcript(&self, session_id: &str) -> Result<ChatTranscriptResponse, Error> {
        self.send_json(self.request(reqwest::Method::GET, &format!("/api/chat/{}", session_id)))
            .await
    }

    pub async fn sessions(&self, page: usize, limit: usize) -> Result<ChatSessionsResponse, Error> {
        let path = format!("/api/chat/sessions?page={}&limit={}", page, limit);
        self.send_json(self.request(reqwest::Method::GET, &path)).await
    }

    pub async fn delete_message(
        &self,
        session_id: &str,
        message_id: &str,
    ) -> Result<DeleteMessageResponse, Error> {
        let path = format!("/api/chat/{}/messages/{}", session_id, message_id);
        self.send_json(self.request(reqwest::Method::DELETE, &path)).await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), Error> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/api/chat/{}", session_id))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Delete failed with {}: {}", status, body));
        }
        Ok(())
    }
}
