use std::env;
use std::fmt;
use std::str::FromStr;

use anyhow::{Error, anyhow};

/// Where chat history is persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryBackend {
    Sqlite,
    File,
    Memory,
}

impl FromStr for HistoryBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow!("Unknown history backend: {}", other)),
        }
    }
}

impl fmt::Display for HistoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Sqlite => "sqlite",
            Self::File => "file",
            Self::Memory => "memory",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub storage_path: String,
    pub db_path: String,
    pub history_backend: HistoryBackend,
    pub history_path: String,
    pub openai_api_hostname: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub embedding_model: String,
    pub system_message: String,
    pub retrieval_top_k: usize,
    pub max_history_messages: usize,
    pub require_auth: bool,
    pub auth_header: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(val) => val.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid value for {}: {}", key, val);
            default
        }),
        Err(_) => default,
    }
}

impl AppConfig {
    /// Read the config from the environment. Fails only on values
    /// that can't be defaulted safely, like an unknown history backend.
    pub fn from_env() -> Result<Self, Error> {
        let storage_path = env_or("RAGCHAT_STORAGE_PATH", "./");
        let storage_path = storage_path.trim_end_matches('/').to_string();
        let storage_path = if storage_path.is_empty() {
            String::from(".")
        } else {
            storage_path
        };
        let db_path = format!("{}/db", storage_path);
        let history_path = format!("{}/history", storage_path);
        let history_backend: HistoryBackend = env_or("RAGCHAT_HISTORY_BACKEND", "sqlite").parse()?;

        Ok(Self {
            db_path,
            history_backend,
            history_path,
            openai_api_hostname: env_or("RAGCHAT_LLM_HOST", "https://api.openai.com"),
            openai_api_key: env_or("OPENAI_API_KEY", "thiswontworkforopenai"),
            openai_model: env_or("RAGCHAT_LLM_MODEL", "gpt-4.1-mini"),
            embedding_model: env_or("RAGCHAT_EMBEDDING_MODEL", "text-embedding-3-small"),
            system_message: env_or(
                "RAGCHAT_SYSTEM_MESSAGE",
                "You are a helpful assistant that answers questions using the provided sources.",
            ),
            retrieval_top_k: env_parse("RAGCHAT_TOP_K", 3),
            max_history_messages: env_parse("RAGCHAT_MAX_HISTORY", 20),
            require_auth: env_parse("RAGCHAT_REQUIRE_AUTH", false),
            auth_header: env_or("RAGCHAT_AUTH_HEADER", "x-ms-client-principal-id"),
            storage_path,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env().expect("Invalid configuration")
    }
}
