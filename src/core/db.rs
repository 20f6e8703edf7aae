use std::path::Path;
use std::sync::Once;

use anyhow::{Error, Result};
use rusqlite::Connection as SyncConnection;
use sqlite_vec::sqlite3_vec_init;
use tokio_rusqlite::Connection;

static SQLITE_VEC_INIT: Once = Once::new();

/// Registers sqlite-vec for every connection opened afterwards in
/// this process. Must run before the first connection is opened.
#[allow(clippy::missing_transmute_annotations)]
pub fn register_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| {
        // SAFETY: `sqlite3_vec_init` is a statically linked extension
        // entry point with the signature `sqlite3_auto_extension`
        // expects once cast to a plain fn pointer.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite3_vec_init as *const (),
            )));
        }
        tracing::debug!("sqlite-vec extension registered");
    });
}

/// Open (or create) the database stored in the directory `db_path`.
pub async fn async_db(db_path: &str) -> Result<Connection, Error> {
    register_sqlite_vec();
    std::fs::create_dir_all(db_path)?;
    let file = Path::new(db_path).join("ragchat.db");
    let db = Connection::open(file).await?;
    Ok(db)
}

/// In-memory database with sqlite-vec loaded and the schema applied.
pub async fn async_db_in_memory() -> Result<Connection, Error> {
    register_sqlite_vec();
    let db = Connection::open_in_memory().await?;
    db.call(|conn| {
        initialize_db(conn)?;
        Ok(())
    })
    .await?;
    Ok(db)
}

const CREATE_TABLES: &str = r"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS session (
        id TEXT PRIMARY KEY,
        user_id TEXT,
        title TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS chat_message (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        data TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS document (
        id TEXT PRIMARY KEY,
        source TEXT NOT NULL,
        chunk INTEGER NOT NULL,
        content TEXT NOT NULL,
        embedding BLOB NOT NULL
    );
";

// Indexes reference columns that older tables may lack so they are
// created only once every column exists.
const CREATE_INDEXES: &str = r"
    CREATE INDEX IF NOT EXISTS session_user_idx ON session(user_id);
    CREATE INDEX IF NOT EXISTS chat_message_session_idx ON chat_message(session_id, seq);
    CREATE INDEX IF NOT EXISTS document_source_idx ON document(source);
";

pub fn initialize_db(conn: &SyncConnection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(CREATE_TABLES)?;
    conn.execute_batch(CREATE_INDEXES)
}

/// Additive schema changes for databases created by older versions.
pub fn migrate_db(conn: &SyncConnection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(CREATE_TABLES)?;

    let has_user_id = conn
        .prepare("SELECT 1 FROM pragma_table_info('session') WHERE name = 'user_id'")?
        .exists([])?;
    if !has_user_id {
        conn.execute_batch("ALTER TABLE session ADD COLUMN user_id TEXT")?;
    }

    conn.execute_batch(CREATE_INDEXES)
}
