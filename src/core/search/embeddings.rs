//! OpenAI embeddings client for query vectorization.

use serde::{Deserialize, Serialize};

use super::SearchError;

pub const DEFAULT_EMBEDDINGS_BASE_URL: &str = "https://api.openai.com";

/// Client for the OpenAI embeddings endpoint.
#[derive(Clone)]
pub struct EmbeddingsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

impl EmbeddingsClient {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        api_key: Option<String>,
        model: String,
    ) -> Self {
        Self {
            http,
            base_url,
            api_key,
            model,
        }
    }

    /// Embed a search query into a similarity vector.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SearchError::Embedding("OpenAI API key not configured".to_string()))?;

        let response = self
            .http
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Embedding(format!(
                "embeddings request returned {status}: {body}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Embedding(format!("invalid embeddings response: {e}")))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| SearchError::Embedding("empty embeddings response".to_string()))
    }
}
