//! Candidate reranking with interchangeable strategies.
//!
//! Strategies form a closed union dispatched by pattern match. Every
//! strategy obeys the same fallback law: if its upstream call fails or
//! times out, the output is the untouched fused order (sliced to top-N)
//! and `timed_out` reflects the actual cause. Reranking failure is never
//! user-visible as an error.

pub mod listwise;
pub mod unified;

use std::time::Duration;

use futures::future::join_all;

use crate::config::SearchConfig;
use crate::services::SearchServices;
use crate::types::{Fused, Keyed};

pub use unified::{rerank_unified, TypeLimits, UnifiedInput, UnifiedOutcome};

/// Reranking strategy for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reranker {
    /// Identity: slice the fused order to top-N.
    None,
    /// Re-embed query and documents, rank by cosine similarity.
    /// No listwise LLM call, so it cannot time out.
    EmbeddingSimilarity,
    /// Listwise LLM reranking against a named model.
    Listwise { model: String, timeout: Duration },
}

impl Reranker {
    /// Listwise reranking against `model` with the configured single-type
    /// timeout budget.
    pub fn listwise_from(cfg: &SearchConfig, model: impl Into<String>) -> Self {
        Self::Listwise {
            model: model.into(),
            timeout: Duration::from_secs(cfg.rerank_timeout_secs),
        }
    }
}

/// Result of a rerank attempt.
#[derive(Debug, Clone)]
pub struct RerankOutcome<P> {
    pub results: Vec<Fused<P>>,
    /// True when a listwise call hit its timeout budget.
    pub timed_out: bool,
}

/// Rerank one content type's fused results.
pub async fn rerank<P>(
    reranker: &Reranker,
    query: &str,
    input: Vec<Fused<P>>,
    top_n: usize,
    services: &SearchServices,
    cfg: &SearchConfig,
) -> RerankOutcome<P>
where
    P: Keyed,
{
    let mut pool = input;
    pool.truncate(top_n);

    match reranker {
        Reranker::None => RerankOutcome {
            results: pool,
            timed_out: false,
        },
        Reranker::EmbeddingSimilarity => embedding_rerank(query, pool, services, cfg).await,
        Reranker::Listwise { model, timeout } => {
            listwise::rerank_listwise(query, pool, model, *timeout, services, cfg).await
        }
    }
}

/// Rank documents by cosine similarity between fresh query and document
/// embeddings. Any embedding failure falls back to the fused order.
async fn embedding_rerank<P>(
    query: &str,
    pool: Vec<Fused<P>>,
    services: &SearchServices,
    cfg: &SearchConfig,
) -> RerankOutcome<P>
where
    P: Keyed,
{
    if pool.len() <= 1 {
        return RerankOutcome {
            results: pool,
            timed_out: false,
        };
    }

    let model = cfg.embedding_model;
    let query_future = services.embedding.embed(query, model);
    let doc_futures = join_all(
        pool.iter()
            .map(|f| services.embedding.embed(f.candidate.payload.text(), model)),
    );
    let (query_vec, doc_vecs) = tokio::join!(query_future, doc_futures);

    let query_vec = match query_vec {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "query embedding failed, keeping fused order");
            return RerankOutcome {
                results: pool,
                timed_out: false,
            };
        }
    };
    let mut similarities = Vec::with_capacity(pool.len());
    for doc_vec in doc_vecs {
        match doc_vec {
            Ok(v) => similarities.push(cosine(&query_vec, &v)),
            Err(e) => {
                tracing::warn!(error = %e, "document embedding failed, keeping fused order");
                return RerankOutcome {
                    results: pool,
                    timed_out: false,
                };
            }
        }
    }

    let mut indexed: Vec<(usize, f32)> = similarities.into_iter().enumerate().collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let order: Vec<usize> = indexed.into_iter().map(|(i, _)| i).collect();

    RerankOutcome {
        results: listwise::apply_order(pool, &order),
        timed_out: false,
    }
}

/// Cosine similarity of two vectors. Zero when either vector is zero or
/// the dimensions disagree.
pub(crate) fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
