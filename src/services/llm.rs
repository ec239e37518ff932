//! OpenAI-compatible completion client for expansion and reranking calls.
//!
//! Requests run at temperature 0 and carry a caller-side timeout enforced
//! with [`tokio::time::timeout`], so expiry surfaces as
//! [`SearchError::Timeout`] rather than a generic transport error — the
//! reranker needs that distinction for its `timed_out` flag.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::http;
use crate::services::vector::parse_base_url;
use crate::services::CompletionService;

/// HTTP client for an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiCompletionService {
    base: Url,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompletionService {
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the configured URL is invalid.
    pub fn new(cfg: &SearchConfig) -> Result<Self> {
        let base = parse_base_url(&cfg.completion_url)?;
        let client = http::build_untimed_client()?;
        Ok(Self {
            base,
            api_key: cfg.completion_api_key.clone(),
            client,
        })
    }

    async fn request(&self, prompt: &str, model: &str) -> Result<String> {
        let url = self
            .base
            .join("v1/chat/completions")
            .map_err(|e| SearchError::Config(format!("invalid completions URL: {e}")))?;

        let body = json!({
            "model": model,
            "temperature": 0,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let mut request = self.client.post(url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SearchError::Http(format!("completion request failed: {e}")))?
            .error_for_status()
            .map_err(|e| SearchError::Http(format!("completion HTTP error: {e}")))?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Parse(format!("completion response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| SearchError::Parse("completion returned no choices".into()))
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletionService {
    async fn complete(&self, prompt: &str, model: &str, timeout: Duration) -> Result<String> {
        match tokio::time::timeout(timeout, self.request(prompt, model)).await {
            Ok(result) => result,
            Err(_) => Err(SearchError::Timeout("completion".into(), timeout)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}
