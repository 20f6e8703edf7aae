//! Vector retrieval over documents stored in SQLite with sqlite-vec.

mod db;
mod embedder;

pub use db::{Document, chunk_text, document_count, index_documents, search_documents};
pub use embedder::{Embedder, OpenAiEmbedder};
