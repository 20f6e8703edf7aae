use anyhow::Result;

use crate::core::AppConfig;
use crate::core::db::async_db;
use crate::retrieval::{OpenAiEmbedder, search_documents};

pub async fn run(term: &str, limit: usize, config: &AppConfig) -> Result<()> {
    let db = async_db(&config.db_path).await?;
    let embedder = OpenAiEmbedder::from_config(config);
    let results = search_documents(&db, &embedder, term, limit).await?;

    if results.is_empty() {
        println!("No documents found");
    }
    for doc in results {
        println!("[{:.3}] {} ({})", doc.score, doc.source, doc.id);
        println!("{}\n", doc.content);
    }

    Ok(())
}
