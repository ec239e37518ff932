//! # maktaba-search
//!
//! Hybrid retrieval and fusion engine for the Maktaba corpus: books,
//! Quran verses, and Hadith narrations, searched together.
//!
//! This crate answers natural-language (primarily Arabic) queries by
//! combining vector similarity search and lexical BM25 search, fusing the
//! two signals, optionally expanding the query into weighted alternative
//! phrasings, and optionally reranking with an LLM. It is a library — the
//! vector index, lexical index, embedding model, and LLM are external
//! services reached through narrow trait interfaces.
//!
//! ## Design
//!
//! - Queries each retrieval source concurrently and fuses per content type
//!   with RRF plus a confirmation-bonus weighted score
//! - Refine mode: one LLM call expands the query, every phrasing retrieves
//!   concurrently, results merge with weighted RRF, one unified cross-type
//!   rerank orders books, verses, and narrations together
//! - Graceful degradation: a failed source contributes nothing, a failed
//!   reranker keeps the fused order, and an empty result set is a valid
//!   outcome — only invalid input and a missing vector collection fail a
//!   request
//! - The only process-wide state is a TTL cache of expansion results
//!
//! ## Example
//!
//! ```no_run
//! # async fn example() -> maktaba_search::Result<()> {
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use maktaba_search::cache::MokaExpansionCache;
//! use maktaba_search::services::embedding::HttpEmbeddingService;
//! use maktaba_search::services::lexical::ElasticLexicalIndex;
//! use maktaba_search::services::llm::OpenAiCompletionService;
//! use maktaba_search::services::vector::QdrantVectorIndex;
//! use maktaba_search::services::NullMetadataStore;
//! use maktaba_search::{SearchConfig, SearchRequest, SearchServices};
//!
//! let cfg = SearchConfig::default();
//! let services = SearchServices {
//!     vector: Arc::new(QdrantVectorIndex::new(&cfg)?),
//!     lexical: Arc::new(ElasticLexicalIndex::new(&cfg)?),
//!     embedding: Arc::new(HttpEmbeddingService::new(&cfg)?),
//!     completion: Arc::new(OpenAiCompletionService::new(&cfg)?),
//!     metadata: Arc::new(NullMetadataStore),
//!     expansion_cache: Arc::new(MokaExpansionCache::new(Duration::from_secs(
//!         cfg.expansion_cache_ttl_secs,
//!     ))),
//! };
//!
//! let request = SearchRequest::new("فضل قراءة القرآن");
//! let response = maktaba_search::search(&request, &services, &cfg).await?;
//! for ayah in &response.ayahs {
//!     println!("{}:{} — {}", ayah.payload.surah, ayah.payload.ayah, ayah.score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod expand;
pub mod http;
pub mod orchestrator;
pub mod query;
pub mod rerank;
pub mod retrieval;
pub mod services;
pub mod types;

pub use config::SearchConfig;
pub use error::{Result, SearchError};
pub use orchestrator::search::{
    Diagnostics, RefineTuning, SearchRequest, SearchResponse,
};
pub use rerank::Reranker;
pub use services::SearchServices;
pub use types::{ContentType, EmbeddingModel, SearchMode};

/// Execute a search request against the given services.
///
/// Validates the configuration, analyzes the query, fans retrieval out
/// across the enabled content types, fuses (or, in refine mode, expands
/// and merges), reranks, and assembles three ranked result lists.
///
/// # Errors
///
/// Returns [`SearchError::Config`] for invalid configuration,
/// [`SearchError::InvalidQuery`] for an empty or oversized query or a
/// zero limit, and [`SearchError::IndexNotReady`] when a required vector
/// collection does not exist. Upstream failures beyond those degrade to
/// partial or empty results instead of erroring.
pub async fn search(
    request: &SearchRequest,
    services: &SearchServices,
    cfg: &SearchConfig,
) -> Result<SearchResponse> {
    cfg.validate()?;
    orchestrator::search::orchestrate_search(request, services, cfg).await
}
