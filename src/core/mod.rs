pub mod config;
pub mod db;
pub mod errors;

pub use config::{AppConfig, HistoryBackend};
pub use errors::ChatError;
