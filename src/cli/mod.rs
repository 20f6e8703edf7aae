use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod chat;
pub mod delete_message;
pub mod index;
pub mod init;
pub mod migrate;
pub mod query;
pub mod serve;
pub mod sessions;

use crate::core::AppConfig;

const DEFAULT_API_URL: &str = "http://127.0.0.1:2222";

#[derive(Subcommand)]
enum Command {
    /// Create the database schema
    Init {
        #[arg(long, action, default_value = "false")]
        db: bool,
    },
    /// Migrate the db schema
    Migrate {
        #[arg(long, action, default_value = "false")]
        db: bool,
    },
    /// Run the API server
    Serve {
        /// Set the server host address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Set the server port
        #[arg(long, default_value = "2222")]
        port: String,
    },
    /// Embed and index the text files in a directory
    Index {
        #[arg(long)]
        path: String,
    },
    /// Query the document index
    Query {
        #[arg(long)]
        term: String,
        #[arg(long, default_value = "5")]
        limit: usize,
    },
    /// Start a chat session against a running server
    Chat {
        #[arg(long, default_value = DEFAULT_API_URL)]
        url: String,
        /// Continue an existing session
        #[arg(long)]
        session_id: Option<String>,
        /// Identify as this user
        #[arg(long)]
        user: Option<String>,
        /// Pause between rendered deltas
        #[arg(long, default_value = "20")]
        delay_ms: u64,
    },
    /// List chat sessions
    Sessions {
        #[arg(long, default_value = DEFAULT_API_URL)]
        url: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long, default_value = "1")]
        page: usize,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Delete one message from a chat session
    DeleteMessage {
        #[arg(long, default_value = DEFAULT_API_URL)]
        url: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        session_id: String,
        #[arg(long)]
        message_id: String,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{}=info", env!("CARGO_CRATE_NAME")).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    let config = AppConfig::from_env()?;

    // The server sets up its own logging
    if !matches!(args.command, Some(Command::Serve { .. }) | None) {
        init_logging();
    }

    // Handle each sub command
    match args.command {
        Some(Command::Init { db }) => {
            init::run(db, &config.db_path).await?;
        }
        Some(Command::Migrate { db }) => {
            migrate::run(db, &config.db_path).await?;
        }
        Some(Command::Serve { host, port }) => {
            serve::run(host, port, config).await?;
        }
        Some(Command::Index { path }) => {
            index::run(&path, &config).await?;
        }
        Some(Command::Query { term, limit }) => {
            query::run(&term, limit, &config).await?;
        }
        Some(Command::Chat {
            url,
            session_id,
            user,
            delay_ms,
        }) => {
            let client = client_for(&url, user.as_deref(), &config);
            chat::run(client, session_id, delay_ms).await?;
        }
        Some(Command::Sessions {
            url,
            user,
            page,
            limit,
        }) => {
            let client = client_for(&url, user.as_deref(), &config);
            sessions::run(&client, page, limit).await?;
        }
        Some(Command::DeleteMessage {
            url,
            user,
            session_id,
            message_id,
        }) => {
            let client = client_for(&url, user.as_deref(), &config);
            delete_message::run(&client, &session_id, &message_id).await?;
        }
        None => {}
    }

    Ok(())
}

fn client_for(url: &str, user: Option<&str>, config: &AppConfig) -> crate::client::ChatClient {
    let client = crate::client::ChatClient::new(url);
    match user {
        Some(user) => client.with_user(&config.auth_header, user),
        None => client,
    }
}
