use std::time::Duration;
use tokio::sync::mpsc;

use anyhow::{Error, Result, anyhow};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
}

/// A message in the shape the chat completions API expects.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: content.to_string(),
        }
    }
}

fn completions_url(api_hostname: &str) -> String {
    format!("{}/v1/chat/completions", api_hostname.trim_end_matches('/'))
}

/// Get the next assistant message for `messages` in one response.
pub async fn completion(
    messages: &[Message],
    api_hostname: &str,
    api_key: &str,
    model: &str,
) -> Result<String, Error> {
    let payload = json!({
        "model": model,
        "messages": messages,
    });
    let response: Value = reqwest::Client::new()
        .post(completions_url(api_hostname))
        .bearer_auth(api_key)
        .header("Content-Type", "application/json")
        .timeout(Duration::from_secs(60 * 10))
        .json(&payload)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    response["choices"][0]["message"]["content"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| anyhow!("No message received. Resp:\n\n {}", response))
}

// Deltas are loosely typed across OpenAI compatible servers. Some
// send `"content": null` alongside the role on the first chunk and
// reasoning models stream a separate `reasoning` field.
#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunkChoice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<CompletionChunkChoice>,
}

/// Stream the next assistant message for `messages`. Every content
/// fragment is sent to `tx` as soon as it arrives and the full text
/// is returned once the model finishes.
///
/// The receiving side going away does not stop the stream; the
/// caller still gets the complete answer.
pub async fn completion_stream(
    tx: mpsc::UnboundedSender<String>,
    messages: &[Message],
    api_hostname: &str,
    api_key: &str,
    model: &str,
) -> Result<String, Error> {
    let payload = json!({
        "model": model,
        "messages": messages,
        "stream": true,
        "stream_options": {"include_usage": true}
    });
    let response = reqwest::Client::new()
        .post(completions_url(api_hostname))
        .bearer_auth(api_key)
        .header("Content-Type", "application/json")
        .timeout(Duration::from_secs(60 * 5))
        .json(&payload)
        .send()
        .await?
        .error_for_status()?;

    let mut stream = response.bytes_stream();

    let mut content_buf = String::new();
    let mut reasoning_buf = String::new();
    // Raw bytes, since an event (or a multi-byte character) can be
    // split across HTTP frames
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        buffer.extend_from_slice(&chunk?);

        // Process all complete SSE events from the buffer
        while let Some((event_end, delimiter_len)) = find_event_end(&buffer) {
            let event: Vec<u8> = buffer.drain(..event_end + delimiter_len).collect();
            if handle_event(&event[..event_end], &tx, &mut content_buf, &mut reasoning_buf)? {
                return Ok(finish(content_buf, reasoning_buf));
            }
        }
    }

    // The last event may not be followed by a blank line
    if !buffer.is_empty() {
        handle_event(&buffer, &tx, &mut content_buf, &mut reasoning_buf)?;
    }

    Ok(finish(content_buf, reasoning_buf))
}

fn finish(content_buf: String, reasoning_buf: String) -> String {
    if !reasoning_buf.is_empty() {
        tracing::debug!("Model reasoning: {}", reasoning_buf);
    }
    content_buf
}

/// Apply one SSE event to the buffers. Returns true once the model
/// signals the end of the answer.
fn handle_event(
    event: &[u8],
    tx: &mpsc::UnboundedSender<String>,
    content_buf: &mut String,
    reasoning_buf: &mut String,
) -> Result<bool, Error> {
    let event = std::str::from_utf8(event)?;
    let data = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");

    // Data can sometimes be empty
    if data.is_empty() {
        return Ok(false);
    }
    if data == "[DONE]" {
        return Ok(true);
    }

    let chunk = serde_json::from_str::<CompletionChunk>(&data).inspect_err(|e| {
        tracing::error!("Parsing completion chunk failed for {}\nError:{}", data, e)
    })?;

    // The usage chunk at the end has no choices
    let Some(choice) = chunk.choices.first() else {
        return Ok(false);
    };

    if let Some(reasoning) = &choice.delta.reasoning {
        reasoning_buf.push_str(reasoning);
    }
    if let Some(content) = &choice.delta.content {
        if !content.is_empty() {
            content_buf.push_str(content);
            // Ignored so a disconnected receiver doesn't stop
            // the answer from being completed
            let _ = tx.send(content.clone());
        }
    }
    Ok(choice.finish_reason.is_some())
}

/// Position of the first blank line ending an event and the length of
/// that delimiter. Servers frame events with either LF or CRLF.
fn find_event_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if b.0 < a.0 { b } else { a }),
        (a, b) => a.or(b),
    }
}
