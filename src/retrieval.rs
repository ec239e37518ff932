//! Retrieval adapters: thin, fail-soft wrappers over the vector and
//! lexical services, one pair per content type.
//!
//! Adapters catch every downstream error except a missing vector
//! collection and degrade to an empty list, so the orchestrator can always
//! proceed with partial data. They never decide strategy themselves — the
//! [`QueryPlan`](crate::query::QueryPlan) carries the skip flags.

use serde::de::DeserializeOwned;

use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::query::QueryPlan;
use crate::services::{SearchFilter, SearchServices};
use crate::types::{AyahPayload, Candidate, ContentType, HadithPayload, Keyed, PagePayload};

/// Result of one adapter call.
#[derive(Debug, Clone)]
pub struct AdapterOutput<P> {
    pub results: Vec<Candidate<P>>,
    /// True when the fuzzy lexical fallback produced these results.
    pub used_fallback: bool,
}

impl<P> AdapterOutput<P> {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            used_fallback: false,
        }
    }
}

// ── Semantic adapters ───────────────────────────────────────────────────

/// Vector search for book pages, with the denylist quality filter applied.
pub async fn semantic_pages(
    services: &SearchServices,
    cfg: &SearchConfig,
    plan: &QueryPlan,
    limit: usize,
    filter: Option<&SearchFilter>,
    cutoff: f32,
    embedding: Option<&[f32]>,
) -> Result<AdapterOutput<PagePayload>> {
    let mut out =
        semantic_typed(services, cfg, plan, ContentType::Book, limit, filter, cutoff, embedding)
            .await?;
    out.results = apply_denylist(out.results, &cfg.book_denylist);
    Ok(out)
}

/// Vector search for Quran verses.
pub async fn semantic_ayahs(
    services: &SearchServices,
    cfg: &SearchConfig,
    plan: &QueryPlan,
    limit: usize,
    cutoff: f32,
    embedding: Option<&[f32]>,
) -> Result<AdapterOutput<AyahPayload>> {
    semantic_typed(services, cfg, plan, ContentType::Ayah, limit, None, cutoff, embedding).await
}

/// Vector search for Hadith narrations.
pub async fn semantic_hadiths(
    services: &SearchServices,
    cfg: &SearchConfig,
    plan: &QueryPlan,
    limit: usize,
    cutoff: f32,
    embedding: Option<&[f32]>,
) -> Result<AdapterOutput<HadithPayload>> {
    semantic_typed(services, cfg, plan, ContentType::Hadith, limit, None, cutoff, embedding).await
}

async fn semantic_typed<P>(
    services: &SearchServices,
    cfg: &SearchConfig,
    plan: &QueryPlan,
    ty: ContentType,
    limit: usize,
    filter: Option<&SearchFilter>,
    cutoff: f32,
    embedding: Option<&[f32]>,
) -> Result<AdapterOutput<P>>
where
    P: Keyed + DeserializeOwned,
{
    if plan.skip_semantic {
        return Ok(AdapterOutput::empty());
    }

    // Reuse a precomputed embedding when the caller fanned one out;
    // otherwise request one here.
    let owned_vector;
    let vector: &[f32] = match embedding {
        Some(v) => v,
        None => {
            match services
                .embedding
                .embed(&plan.normalized, cfg.embedding_model)
                .await
            {
                Ok(v) => {
                    owned_vector = v;
                    &owned_vector
                }
                Err(e) => {
                    tracing::warn!(content_type = %ty, error = %e, "embedding unavailable, skipping semantic search");
                    return Ok(AdapterOutput::empty());
                }
            }
        }
    };

    let collection = cfg.embedding_model.collection(ty);
    let points = match services
        .vector
        .search(&collection, vector, limit, filter, cutoff)
        .await
    {
        Ok(points) => points,
        Err(e @ SearchError::IndexNotReady(_)) => return Err(e),
        Err(e) => {
            tracing::warn!(content_type = %ty, error = %e, "vector search failed, degrading to empty");
            return Ok(AdapterOutput::empty());
        }
    };

    let mut results = Vec::with_capacity(points.len());
    for (i, point) in points.into_iter().enumerate() {
        match serde_json::from_value::<P>(point.payload) {
            Ok(payload) => results.push(Candidate::from_semantic(payload, i + 1, point.score)),
            Err(e) => {
                tracing::warn!(content_type = %ty, error = %e, "dropping vector hit with malformed payload");
            }
        }
    }
    tracing::debug!(content_type = %ty, count = results.len(), "semantic candidates");

    Ok(AdapterOutput {
        results,
        used_fallback: false,
    })
}

// ── Keyword adapters ────────────────────────────────────────────────────

/// Lexical search for book pages, with the denylist quality filter applied.
pub async fn keyword_pages(
    services: &SearchServices,
    cfg: &SearchConfig,
    plan: &QueryPlan,
    limit: usize,
    filter: Option<&SearchFilter>,
) -> AdapterOutput<PagePayload> {
    let mut out = keyword_typed(services, cfg, plan, ContentType::Book, limit, filter).await;
    out.results = apply_denylist(out.results, &cfg.book_denylist);
    out
}

/// Lexical search for Quran verses.
pub async fn keyword_ayahs(
    services: &SearchServices,
    cfg: &SearchConfig,
    plan: &QueryPlan,
    limit: usize,
) -> AdapterOutput<AyahPayload> {
    keyword_typed(services, cfg, plan, ContentType::Ayah, limit, None).await
}

/// Lexical search for Hadith narrations.
pub async fn keyword_hadiths(
    services: &SearchServices,
    cfg: &SearchConfig,
    plan: &QueryPlan,
    limit: usize,
) -> AdapterOutput<HadithPayload> {
    keyword_typed(services, cfg, plan, ContentType::Hadith, limit, None).await
}

async fn keyword_typed<P>(
    services: &SearchServices,
    cfg: &SearchConfig,
    plan: &QueryPlan,
    ty: ContentType,
    limit: usize,
    filter: Option<&SearchFilter>,
) -> AdapterOutput<P>
where
    P: Keyed + DeserializeOwned,
{
    if plan.skip_keyword {
        return AdapterOutput::empty();
    }

    let index = ty.lexical_index();
    let hits = match services
        .lexical
        .search(index, &plan.normalized, limit, filter, false)
        .await
    {
        Ok(hits) => hits,
        Err(e) => {
            tracing::warn!(content_type = %ty, error = %e, "lexical search failed, degrading to empty");
            return AdapterOutput::empty();
        }
    };

    // Exact pass came up dry — retry once with fuzzy matching, which
    // rescues misspellings at the cost of precision.
    let (hits, used_fallback) = if hits.is_empty() && cfg.keyword_fuzzy_fallback {
        match services
            .lexical
            .search(index, &plan.normalized, limit, filter, true)
            .await
        {
            Ok(fuzzy_hits) => (fuzzy_hits, true),
            Err(e) => {
                tracing::warn!(content_type = %ty, error = %e, "fuzzy fallback failed");
                (Vec::new(), true)
            }
        }
    } else {
        (hits, false)
    };

    let mut results = Vec::with_capacity(hits.len());
    for (i, hit) in hits.into_iter().enumerate() {
        match serde_json::from_value::<P>(hit.payload) {
            Ok(payload) => {
                results.push(Candidate::from_keyword(payload, i + 1, hit.score, hit.highlighted));
            }
            Err(e) => {
                tracing::warn!(content_type = %ty, error = %e, "dropping lexical hit with malformed payload");
            }
        }
    }
    tracing::debug!(content_type = %ty, count = results.len(), used_fallback, "keyword candidates");

    AdapterOutput {
        results,
        used_fallback,
    }
}

/// Drop book pages whose source book is on the denylist.
fn apply_denylist(
    results: Vec<Candidate<PagePayload>>,
    denylist: &[i64],
) -> Vec<Candidate<PagePayload>> {
    if denylist.is_empty() {
        return results;
    }
    results
        .into_iter()
        .filter(|c| !denylist.contains(&c.payload.book_id))
        .collect()
}
