use std::path::Path;

use anyhow::{Result, anyhow};

use crate::core::AppConfig;
use crate::core::db::{async_db, initialize_db};
use crate::retrieval::{OpenAiEmbedder, document_count, index_documents};

pub async fn run(path: &str, config: &AppConfig) -> Result<()> {
    let dir = Path::new(path);
    if !dir.is_dir() {
        return Err(anyhow!("Not a directory: {}", path));
    }

    let db = async_db(&config.db_path).await?;
    db.call(|conn| {
        initialize_db(conn)?;
        Ok(())
    })
    .await?;

    let embedder = OpenAiEmbedder::from_config(config);
    let indexed = index_documents(&db, &embedder, dir).await?;
    let total = document_count(&db).await?;
    println!("Indexed {} chunk(s), {} in total", indexed, total);

    Ok(())
}
