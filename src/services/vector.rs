//! Qdrant-style REST client for the vector similarity service.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::http;
use crate::services::{ScoredPoint, SearchFilter, VectorIndex};

/// HTTP client for a Qdrant-compatible points-search endpoint.
pub struct QdrantVectorIndex {
    base: Url,
    client: reqwest::Client,
}

impl QdrantVectorIndex {
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the configured URL is invalid.
    pub fn new(cfg: &SearchConfig) -> Result<Self> {
        let base = parse_base_url(&cfg.vector_url)?;
        let client = http::build_client(cfg.index_timeout_secs)?;
        Ok(Self { base, client })
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>> {
        let url = self
            .base
            .join(&format!("collections/{collection}/points/search"))
            .map_err(|e| SearchError::Config(format!("invalid collection URL: {e}")))?;

        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "score_threshold": score_threshold,
            "with_payload": true,
        });
        if let Some(book_id) = filter.and_then(|f| f.book_id) {
            body["filter"] = json!({
                "must": [{ "key": "book_id", "match": { "value": book_id } }]
            });
        }

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Http(format!("vector search request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SearchError::IndexNotReady(collection.to_owned()));
        }
        let response = response
            .error_for_status()
            .map_err(|e| SearchError::Http(format!("vector search HTTP error: {e}")))?;

        let parsed: PointsSearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Parse(format!("vector search response: {e}")))?;

        tracing::trace!(collection, count = parsed.result.len(), "vector hits");

        Ok(parsed
            .result
            .into_iter()
            .map(|p| ScoredPoint {
                score: p.score,
                payload: p.payload,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct PointsSearchResponse {
    #[serde(default)]
    result: Vec<RawPoint>,
}

#[derive(Debug, Deserialize)]
struct RawPoint {
    score: f32,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Parse a base URL, ensuring a trailing slash so joins keep the path.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url> {
    let with_slash = if raw.ends_with('/') {
        raw.to_owned()
    } else {
        format!("{raw}/")
    };
    Url::parse(&with_slash).map_err(|e| SearchError::Config(format!("invalid base URL {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let base = parse_base_url("http://localhost:6333").expect("parse");
        let joined = base.join("collections/x/points/search").expect("join");
        assert_eq!(
            joined.as_str(),
            "http://localhost:6333/collections/x/points/search"
        );
    }

    #[test]
    fn base_url_with_path_preserved() {
        let base = parse_base_url("http://host/qdrant").expect("parse");
        let joined = base.join("collections/x/points/search").expect("join");
        assert_eq!(
            joined.as_str(),
            "http://host/qdrant/collections/x/points/search"
        );
    }

    #[test]
    fn invalid_base_url_rejected() {
        assert!(parse_base_url("not a url").is_err());
    }

    #[test]
    fn response_parses_without_payload() {
        let raw = r#"{"result":[{"score":0.87},{"score":0.72,"payload":{"book_id":3}}]}"#;
        let parsed: PointsSearchResponse = serde_json::from_str(raw).expect("parse");
        assert_eq!(parsed.result.len(), 2);
        assert!(parsed.result[0].payload.is_null());
        assert_eq!(parsed.result[1].payload["book_id"], 3);
    }

    #[test]
    fn client_constructs_from_default_config() {
        assert!(QdrantVectorIndex::new(&SearchConfig::default()).is_ok());
    }
}
