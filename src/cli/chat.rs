use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use futures_util::StreamExt;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::chat::{ChatRequest, StreamEvent};
use crate::client::ChatClient;

const HELP: &str = "Commands: /history, /delete <message id>, /quit";

async fn ask(client: &ChatClient, session_id: &str, line: &str) -> Result<()> {
    let mut events = client.stream_chat(ChatRequest::new(Some(session_id), line));
    let mut stdout = std::io::stdout();

    while let Some(event) = events.next().await {
        match event? {
            StreamEvent::Context { data_points, .. } => {
                for doc in data_points {
                    println!("  [{}] {:.3}", doc.source, doc.score);
                }
            }
            StreamEvent::Delta { content } => {
                print!("{}", content);
                stdout.flush()?;
            }
            StreamEvent::Done {
                assistant_message_id,
                persisted,
                ..
            } => {
                println!();
                if !persisted {
                    println!("(answer was empty and not saved)");
                }
                tracing::debug!("Answer saved as {}", assistant_message_id);
            }
            StreamEvent::Error { message } => {
                println!();
                eprintln!("Error: {}", message);
            }
        }
    }
    Ok(())
}

async fn history(client: &ChatClient, session_id: &str) -> Result<()> {
    let resp = client.transcript(session_id).await?;
    for msg in resp.transcript {
        println!(
            "{} {:?}: {}",
            msg.id().unwrap_or("-"),
            msg.role,
            msg.content
        );
    }
    Ok(())
}

pub async fn run(client: ChatClient, session_id: Option<String>, delay_ms: u64) -> Result<()> {
    let client = client.with_delta_delay(Duration::from_millis(delay_ms));
    let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut rl = DefaultEditor::new()?;

    println!("Session {}", session_id);
    println!("{}", HELP);

    loop {
        let readline = rl.readline(">>> ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                let result = match line.split_once(' ') {
                    _ if line == "/quit" => break,
                    _ if line == "/history" => history(&client, &session_id).await,
                    Some(("/delete", message_id)) => client
                        .delete_message(&session_id, message_id.trim())
                        .await
                        .map(|resp| println!("Deleted: {}", resp.deleted.content)),
                    _ if line.starts_with('/') => {
                        println!("{}", HELP);
                        Ok(())
                    }
                    _ => ask(&client, &session_id, line).await,
                };
                if let Err(err) = result {
                    eprintln!("Error: {}", err);
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}
