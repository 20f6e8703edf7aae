//! Bindings for OpenAI compatible chat completion and embedding APIs.

mod core;
mod embeddings;

pub use self::core::{Message, Role, completion, completion_stream};
pub use embeddings::embeddings;
