use anyhow::{Error, Result};
use async_trait::async_trait;

use crate::core::AppConfig;
use crate::openai;

/// Turns text into vectors for similarity search.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, Error>;
}

pub struct OpenAiEmbedder {
    api_hostname: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(api_hostname: &str, api_key: &str, model: &str) -> Self {
        Self {
            api_hostname: api_hostname.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.openai_api_hostname,
            &config.openai_api_key,
            &config.embedding_model,
        )
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, Error> {
        openai::embeddings(inputs, &self.api_hostname, &self.api_key, &self.model).await
    }
}
