//! Search configuration with sensible defaults.
//!
//! [`SearchConfig`] controls service endpoints, timeout budgets, fusion
//! tunables, normalizer thresholds, and expansion/rerank behaviour. The
//! defaults are tuned for the Arabic corpus the engine was built against.

use crate::error::SearchError;
use crate::types::EmbeddingModel;

/// Configuration for the hybrid search engine.
///
/// Use [`Default::default()`] for sensible defaults, or construct with
/// field overrides for custom behaviour.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Base URL of the vector similarity service.
    pub vector_url: String,
    /// Base URL of the lexical search service.
    pub lexical_url: String,
    /// Base URL of the embedding service.
    pub embedding_url: String,
    /// Base URL of the LLM completion service (OpenAI-compatible).
    pub completion_url: String,
    /// Optional bearer token for the completion service.
    pub completion_api_key: Option<String>,

    /// Embedding model the corpus collections are indexed under.
    pub embedding_model: EmbeddingModel,
    /// Completion model used for query expansion.
    pub expansion_model: String,

    /// HTTP timeout for vector/lexical/embedding calls, in seconds.
    pub index_timeout_secs: u64,
    /// Timeout for a single-type listwise rerank call, in seconds.
    pub rerank_timeout_secs: u64,
    /// Timeout for the unified cross-type rerank call (larger prompt), in seconds.
    pub unified_rerank_timeout_secs: u64,
    /// Timeout for the query-expansion call, in seconds.
    pub expansion_timeout_secs: u64,

    /// RRF constant K. Larger values flatten the rank contribution curve.
    pub rrf_k: f32,
    /// Cap on how much a confirming keyword match can add to a semantic score.
    pub bonus_multiplier: f32,
    /// Midpoint of the BM25 normalization curve (raw score mapping to 0.5).
    pub bm25_midpoint: f32,
    /// Steepness of the BM25 normalization curve.
    pub bm25_steepness: f32,

    /// Queries with fewer significant characters than this skip vector search.
    pub min_semantic_chars: usize,
    /// Queries longer than this are rejected before retrieval.
    pub max_query_chars: usize,

    /// Weight of the original query in refine-mode merging.
    pub original_weight: f32,
    /// Weight of each machine-generated alternate phrasing.
    pub expanded_weight: f32,
    /// Maximum number of machine-generated alternates per query.
    pub max_expansions: usize,
    /// How long expansion results stay cached, in seconds.
    pub expansion_cache_ttl_secs: u64,

    /// Per-document character budget in listwise rerank prompts.
    pub rerank_doc_chars: usize,
    /// Per-type candidate cap entering the unified cross-type rerank.
    pub unified_per_type_cap: usize,

    /// How many candidates each retrieval path fetches per content type.
    pub candidate_limit: usize,
    /// Retry lexical search with fuzzy matching when the exact pass is empty.
    pub keyword_fuzzy_fallback: bool,
    /// Book ids excluded from results (known-bad scraped sources).
    pub book_denylist: Vec<i64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            vector_url: "http://localhost:6333".into(),
            lexical_url: "http://localhost:9200".into(),
            embedding_url: "http://localhost:8090".into(),
            completion_url: "https://api.openai.com".into(),
            completion_api_key: None,
            embedding_model: EmbeddingModel::BgeM3,
            expansion_model: "gpt-4o-mini".into(),
            index_timeout_secs: 8,
            rerank_timeout_secs: 18,
            unified_rerank_timeout_secs: 25,
            expansion_timeout_secs: 10,
            rrf_k: 60.0,
            bonus_multiplier: 0.15,
            bm25_midpoint: 10.0,
            bm25_steepness: 4.0,
            min_semantic_chars: 4,
            max_query_chars: 500,
            original_weight: 1.0,
            expanded_weight: 0.7,
            max_expansions: 4,
            expansion_cache_ttl_secs: 3600,
            rerank_doc_chars: 800,
            unified_per_type_cap: 30,
            candidate_limit: 20,
            keyword_fuzzy_fallback: true,
            book_denylist: Vec::new(),
        }
    }
}

impl SearchConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - all timeout budgets must be greater than 0
    /// - `rrf_k` must be greater than 0
    /// - `bonus_multiplier` must be within `[0, 1]`
    /// - expansion weights must be within `(0, 1]`
    /// - `candidate_limit`, `rerank_doc_chars`, `unified_per_type_cap`
    ///   and `min_semantic_chars` must be greater than 0
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.index_timeout_secs == 0
            || self.rerank_timeout_secs == 0
            || self.unified_rerank_timeout_secs == 0
            || self.expansion_timeout_secs == 0
        {
            return Err(SearchError::Config(
                "timeout budgets must be greater than 0".into(),
            ));
        }
        if self.rrf_k <= 0.0 {
            return Err(SearchError::Config("rrf_k must be greater than 0".into()));
        }
        if !(0.0..=1.0).contains(&self.bonus_multiplier) {
            return Err(SearchError::Config(
                "bonus_multiplier must be within [0, 1]".into(),
            ));
        }
        if self.bm25_steepness <= 0.0 {
            return Err(SearchError::Config(
                "bm25_steepness must be greater than 0".into(),
            ));
        }
        for (name, weight) in [
            ("original_weight", self.original_weight),
            ("expanded_weight", self.expanded_weight),
        ] {
            if !(weight > 0.0 && weight <= 1.0) {
                return Err(SearchError::Config(format!(
                    "{name} must be within (0, 1]"
                )));
            }
        }
        if self.candidate_limit == 0 {
            return Err(SearchError::Config(
                "candidate_limit must be greater than 0".into(),
            ));
        }
        if self.rerank_doc_chars == 0 {
            return Err(SearchError::Config(
                "rerank_doc_chars must be greater than 0".into(),
            ));
        }
        if self.unified_per_type_cap == 0 {
            return Err(SearchError::Config(
                "unified_per_type_cap must be greater than 0".into(),
            ));
        }
        if self.min_semantic_chars == 0 {
            return Err(SearchError::Config(
                "min_semantic_chars must be greater than 0".into(),
            ));
        }
        if self.max_query_chars == 0 {
            return Err(SearchError::Config(
                "max_query_chars must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
