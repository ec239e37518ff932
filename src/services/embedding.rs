//! HTTP client for the embedding generation service.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::http;
use crate::services::vector::parse_base_url;
use crate::services::EmbeddingService;
use crate::types::EmbeddingModel;

/// HTTP client for the internal `/embed` endpoint.
pub struct HttpEmbeddingService {
    base: Url,
    client: reqwest::Client,
}

impl HttpEmbeddingService {
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the configured URL is invalid.
    pub fn new(cfg: &SearchConfig) -> Result<Self> {
        let base = parse_base_url(&cfg.embedding_url)?;
        let client = http::build_client(cfg.index_timeout_secs)?;
        Ok(Self { base, client })
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingService {
    async fn embed(&self, text: &str, model: EmbeddingModel) -> Result<Vec<f32>> {
        let url = self
            .base
            .join("embed")
            .map_err(|e| SearchError::Config(format!("invalid embed URL: {e}")))?;

        let response = self
            .client
            .post(url)
            .json(&json!({ "text": text, "model": model.slug() }))
            .send()
            .await
            .map_err(|e| SearchError::Http(format!("embedding request failed: {e}")))?
            .error_for_status()
            .map_err(|e| SearchError::Http(format!("embedding HTTP error: {e}")))?;

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Parse(format!("embedding response: {e}")))?;

        if parsed.vector.len() != model.dim() {
            return Err(SearchError::Parse(format!(
                "embedding dimensionality mismatch: expected {}, got {}",
                model.dim(),
                parsed.vector.len()
            )));
        }
        Ok(parsed.vector)
    }
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    vector: Vec<f32>,
}
