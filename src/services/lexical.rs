//! Elasticsearch-style REST client for the lexical (BM25) search service.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::http;
use crate::services::vector::parse_base_url;
use crate::services::{LexicalHit, LexicalIndex, SearchFilter};

/// HTTP client for an Elasticsearch-compatible `_search` endpoint.
pub struct ElasticLexicalIndex {
    base: Url,
    client: reqwest::Client,
}

impl ElasticLexicalIndex {
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the configured URL is invalid.
    pub fn new(cfg: &SearchConfig) -> Result<Self> {
        let base = parse_base_url(&cfg.lexical_url)?;
        let client = http::build_client(cfg.index_timeout_secs)?;
        Ok(Self { base, client })
    }
}

#[async_trait]
impl LexicalIndex for ElasticLexicalIndex {
    async fn search(
        &self,
        index: &str,
        query: &str,
        limit: usize,
        filter: Option<&SearchFilter>,
        fuzzy: bool,
    ) -> Result<Vec<LexicalHit>> {
        let url = self
            .base
            .join(&format!("{index}/_search"))
            .map_err(|e| SearchError::Config(format!("invalid index URL: {e}")))?;

        let mut match_clause = json!({ "query": query });
        if fuzzy {
            match_clause["fuzziness"] = json!("AUTO");
        }
        let mut bool_query = json!({ "must": [{ "match": { "text": match_clause } }] });
        if let Some(book_id) = filter.and_then(|f| f.book_id) {
            bool_query["filter"] = json!([{ "term": { "book_id": book_id } }]);
        }
        let body = json!({
            "size": limit,
            "query": { "bool": bool_query },
            "highlight": { "fields": { "text": {} } },
        });

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Http(format!("lexical search request failed: {e}")))?
            .error_for_status()
            .map_err(|e| SearchError::Http(format!("lexical search HTTP error: {e}")))?;

        let parsed: EsSearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Parse(format!("lexical search response: {e}")))?;

        tracing::trace!(index, count = parsed.hits.hits.len(), fuzzy, "lexical hits");

        Ok(parsed
            .hits
            .hits
            .into_iter()
            .map(|h| LexicalHit {
                score: h.score.unwrap_or(0.0),
                highlighted: h.highlight.and_then(|hl| hl.text.into_iter().next()),
                payload: h.source,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct EsSearchResponse {
    hits: EsHits,
}

#[derive(Debug, Deserialize)]
struct EsHits {
    #[serde(default)]
    hits: Vec<EsHit>,
}

#[derive(Debug, Deserialize)]
struct EsHit {
    #[serde(rename = "_score")]
    score: Option<f32>,
    #[serde(rename = "_source", default)]
    source: serde_json::Value,
    #[serde(default)]
    highlight: Option<EsHighlight>,
}

#[derive(Debug, Deserialize)]
struct EsHighlight {
    #[serde(default)]
    text: Vec<String>,
}
