use std::time::Duration;

use anyhow::{Error, Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

/// Embed each of `inputs` with an OpenAI compatible embeddings
/// endpoint. Vectors are returned in the same order as the inputs.
pub async fn embeddings(
    inputs: &[String],
    api_hostname: &str,
    api_key: &str,
    model: &str,
) -> Result<Vec<Vec<f32>>, Error> {
    if inputs.is_empty() {
        return Ok(vec![]);
    }

    let url = format!("{}/v1/embeddings", api_hostname.trim_end_matches('/'));
    let mut response: EmbeddingResponse = reqwest::Client::new()
        .post(url)
        .bearer_auth(api_key)
        .timeout(Duration::from_secs(60))
        .json(&EmbeddingRequest {
            model,
            input: inputs,
        })
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    if response.data.len() != inputs.len() {
        bail!(
            "Expected {} embeddings but received {}",
            inputs.len(),
            response.data.len()
        );
    }

    response.data.sort_by_key(|d| d.index);
    Ok(response.data.into_iter().map(|d| d.embedding).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embeddings_ordered_by_index() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"{
            "object": "list",
            "model": "text-embedding-3-small",
            "data": [
                {"object": "embedding", "index": 1, "embedding": [0.0, 1.0]},
                {"object": "embedding", "index": 0, "embedding": [1.0, 0.0]}
            ]
        }"#;
        let mock = server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let inputs = vec![String::from("first"), String::from("second")];
        let result = embeddings(&inputs, &server.url(), "key", "text-embedding-3-small")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_embeddings_empty_input_skips_request() {
        // Unroutable host, would fail if a request was made
        let result = embeddings(&[], "http://127.0.0.1:1", "key", "model").await;
        assert!(result.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embeddings_count_mismatch() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": []}"#)
            .create_async()
            .await;

        let inputs = vec![String::from("first")];
        let result = embeddings(&inputs, &server.url(), "key", "model").await;
        assert!(result.is_err());
    }
}
