//! Collaborator service interfaces and their HTTP implementations.
//!
//! The engine never implements an index or a model; it calls five narrow
//! interfaces. Each is a trait so the orchestrator can be exercised with
//! fakes, with a thin `reqwest`-backed client as the production
//! implementation.

pub mod embedding;
pub mod lexical;
pub mod llm;
pub mod vector;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::cache::ExpansionCache;
use crate::error::Result;
use crate::types::{Author, EmbeddingModel};

/// A scored hit from the vector similarity service.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Cosine similarity, 0–1.
    pub score: f32,
    /// Stored payload, mapped into a typed payload at the adapter boundary.
    pub payload: serde_json::Value,
}

/// A scored hit from the lexical search service.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    /// Raw BM25 score, unbounded.
    pub score: f32,
    /// Highlighted snippet, when the service produced one.
    pub highlighted: Option<String>,
    /// Stored payload, mapped into a typed payload at the adapter boundary.
    pub payload: serde_json::Value,
}

/// Metadata filter narrowing retrieval to a subset of the corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchFilter {
    /// Restrict book-page retrieval to a single book.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_id: Option<i64>,
}

/// Vector similarity service, one collection per (content type × model).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// # Errors
    ///
    /// Returns [`SearchError::IndexNotReady`](crate::SearchError::IndexNotReady)
    /// when the collection does not exist, [`SearchError::Http`](crate::SearchError::Http)
    /// or [`SearchError::Parse`](crate::SearchError::Parse) otherwise.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>>;
}

/// Full-text (BM25) search service with an optional fuzzy mode.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    async fn search(
        &self,
        index: &str,
        query: &str,
        limit: usize,
        filter: Option<&SearchFilter>,
        fuzzy: bool,
    ) -> Result<Vec<LexicalHit>>;
}

/// Embedding generation service.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str, model: EmbeddingModel) -> Result<Vec<f32>>;
}

/// LLM completion service, used for query expansion and listwise reranking.
///
/// Implementations must enforce the caller-supplied timeout and report its
/// expiry as [`SearchError::Timeout`](crate::SearchError::Timeout) so
/// callers can distinguish timeouts from transport failures.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str, model: &str, timeout: Duration) -> Result<String>;
}

/// Relational metadata store. Point lookups for final enrichment only —
/// never queried on the fusion/rerank hot path.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn authors_for_books(&self, book_ids: &[i64]) -> Result<Vec<Author>>;
}

/// Metadata store that resolves nothing.
///
/// For hosts that render results without author enrichment; real hosts
/// implement [`MetadataStore`] against their relational store.
pub struct NullMetadataStore;

#[async_trait]
impl MetadataStore for NullMetadataStore {
    async fn authors_for_books(&self, _book_ids: &[i64]) -> Result<Vec<Author>> {
        Ok(Vec::new())
    }
}

/// The collaborator bundle a search request runs against.
#[derive(Clone)]
pub struct SearchServices {
    pub vector: Arc<dyn VectorIndex>,
    pub lexical: Arc<dyn LexicalIndex>,
    pub embedding: Arc<dyn EmbeddingService>,
    pub completion: Arc<dyn CompletionService>,
    pub metadata: Arc<dyn MetadataStore>,
    pub expansion_cache: Arc<dyn ExpansionCache>,
}
