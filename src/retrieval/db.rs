use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Error, Result, anyhow};
use serde::{Deserialize, Serialize};
use text_splitter::TextSplitter;
use tokio_rusqlite::{Connection, params};

use super::embedder::Embedder;

const CHUNK_MAX_CHARS: usize = 1000;
const EMBEDDING_BATCH_SIZE: usize = 64;
const INDEXED_EXTENSIONS: [&str; 3] = ["md", "txt", "org"];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub source: String,
    pub content: String,
    /// Cosine similarity to the query, higher is closer
    pub score: f32,
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub async fn document_count(db: &Connection) -> Result<i64, Error> {
    let count = db
        .call(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM document", [], |row| row.get(0))?;
            Ok(count)
        })
        .await?;
    Ok(count)
}

/// The `limit` documents closest to `query`.
pub async fn search_documents(
    db: &Connection,
    embedder: &dyn Embedder,
    query: &str,
    limit: usize,
) -> Result<Vec<Document>, Error> {
    if limit == 0 || document_count(db).await? == 0 {
        tracing::debug!("Skipping retrieval, nothing to search");
        return Ok(vec![]);
    }

    let embedding = embedder
        .embed(&[query.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No embedding returned for query"))?;
    let blob = embedding_to_blob(&embedding);

    let results = db
        .call(move |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT id, source, content, vec_distance_cosine(embedding, ?1) AS distance
                FROM document
                ORDER BY distance
                LIMIT ?2
                "#,
            )?;
            let results = stmt
                .query_map(params![blob, limit], |row| {
                    let distance: f64 = row.get(3)?;
                    Ok(Document {
                        id: row.get(0)?,
                        source: row.get(1)?,
                        content: row.get(2)?,
                        score: (1.0 - distance) as f32,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(results)
        })
        .await?;

    tracing::debug!("Retrieved {} document(s) for query", results.len());
    Ok(results)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| INDEXED_EXTENSIONS.contains(&ext))
        {
            files.push(path);
        }
    }
    Ok(())
}

/// Split a file's text into the chunks that get embedded.
pub fn chunk_text(text: &str) -> Vec<String> {
    TextSplitter::new(CHUNK_MAX_CHARS)
        .chunks(text)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

async fn replace_source(
    db: &Connection,
    source: &str,
    chunks: Vec<String>,
    embeddings: Vec<Vec<f32>>,
) -> Result<(), Error> {
    let source = source.to_string();
    db.call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM document WHERE source = ?", [&source])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO document (id, source, chunk, content, embedding) VALUES (?, ?, ?, ?, ?)",
            )?;
            for (i, (content, embedding)) in chunks.iter().zip(embeddings.iter()).enumerate() {
                let id = format!("{}#{}", source, i);
                stmt.execute(params![id, source, i, content, embedding_to_blob(embedding)])?;
            }
        }
        tx.commit()?;
        Ok(())
    })
    .await?;
    Ok(())
}

/// Delete chunks for every source not in `seen`. Returns the number of
/// sources removed.
async fn prune_sources(db: &Connection, seen: HashSet<String>) -> Result<usize, Error> {
    let pruned = db
        .call(move |conn| {
            let tx = conn.transaction()?;
            let stale: Vec<String> = {
                let mut stmt = tx.prepare("SELECT DISTINCT source FROM document")?;
                stmt.query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?
                    .into_iter()
                    .filter(|source| !seen.contains(source))
                    .collect()
            };
            for source in &stale {
                tx.execute("DELETE FROM document WHERE source = ?", [source])?;
            }
            tx.commit()?;
            Ok(stale.len())
        })
        .await?;
    Ok(pruned)
}

/// Embed every text file under `dir`, replacing whatever was indexed
/// for the same file before. The index mirrors `dir`, so files that
/// are gone have their chunks removed. Returns the number of chunks
/// written.
pub async fn index_documents(
    db: &Connection,
    embedder: &dyn Embedder,
    dir: &Path,
) -> Result<usize, Error> {
    let root = dir.to_path_buf();
    let files = tokio::task::spawn_blocking(move || {
        let mut files = vec![];
        collect_files(&root, &mut files).map(|_| files)
    })
    .await??;

    let mut total = 0;
    let mut seen = HashSet::with_capacity(files.len());
    for path in files {
        let source = path
            .strip_prefix(dir)
            .unwrap_or(&path)
            .display()
            .to_string();
        let text = tokio::fs::read_to_string(&path).await?;
        let chunks = chunk_text(&text);

        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBEDDING_BATCH_SIZE) {
            embeddings.extend(embedder.embed(batch).await?);
        }

        tracing::info!("Indexed {} chunk(s) from {}", chunks.len(), source);
        total += chunks.len();
        replace_source(db, &source, chunks, embeddings).await?;
        seen.insert(source);
    }

    let pruned = prune_sources(db, seen).await?;
    if pruned > 0 {
        tracing::info!("Removed {} source(s) no longer on disk", pruned);
    }

    Ok(total)
}
