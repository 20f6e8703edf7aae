use std::sync::{Arc, RwLock};

use tokio_rusqlite::Connection;

use crate::core::AppConfig;
use crate::history::SharedHistoryStore;

pub type SharedState = Arc<RwLock<AppState>>;

pub struct AppState {
    // Documents and their embeddings, also chat history when the
    // sqlite backend is used
    pub db: Connection,
    pub config: AppConfig,
    pub history: SharedHistoryStore,
}

impl AppState {
    pub fn new(db: Connection, config: AppConfig, history: SharedHistoryStore) -> Self {
        Self {
            db,
            config,
            history,
        }
    }
}
