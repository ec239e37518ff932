//! Core search orchestrator: strategy selection, concurrent retrieval
//! fan-out, fusion or weighted merge, reranking, assembly.
//!
//! # Pipeline
//!
//! 1. Validate the request (the only synchronous rejection point)
//! 2. Analyze the query into a [`QueryPlan`]
//! 3. Fan out retrieval — keyword searches and embedding generation run
//!    concurrently, semantic searches once the embedding resolves
//! 4. Fuse per content type (or, in refine mode, retrieve per expanded
//!    query and merge with weighted RRF)
//! 5. Rerank — per-type in standard mode, one unified cross-type call in
//!    refine mode
//! 6. Assemble three result lists plus author enrichment and diagnostics
//!
//! Every branch is fault-isolated: a failed source logs a warning and
//! contributes nothing. The terminal state always produces three lists,
//! empty at worst — only invalid input and a missing vector collection
//! fail the request.

use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;

use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::expand::{expand, ExpansionSettings};
use crate::orchestrator::fusion::fuse;
use crate::orchestrator::merge::{merge_weighted, WeightedList};
use crate::query::{effective_cutoff, QueryPlan};
use crate::rerank::{rerank, rerank_unified, Reranker, TypeLimits, UnifiedInput};
use crate::retrieval::{
    keyword_ayahs, keyword_hadiths, keyword_pages, semantic_ayahs, semantic_hadiths,
    semantic_pages, AdapterOutput,
};
use crate::services::{SearchFilter, SearchServices};
use crate::types::{
    Author, AyahPayload, Fused, HadithPayload, PagePayload, SearchItem, SearchMode,
};

/// One search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub mode: SearchMode,
    /// Maximum results per content type.
    pub limit: usize,
    pub include_books: bool,
    pub include_quran: bool,
    pub include_hadith: bool,
    pub reranker: Reranker,
    /// Base similarity cutoff; raised for short queries.
    pub similarity_cutoff: f32,
    /// Query expansion + weighted merge + unified rerank.
    pub refine: bool,
    pub refine_tuning: Option<RefineTuning>,
    /// Restrict book-page retrieval to a single book.
    pub book_filter: Option<i64>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            mode: SearchMode::Hybrid,
            limit: 10,
            include_books: true,
            include_quran: true,
            include_hadith: true,
            reranker: Reranker::None,
            similarity_cutoff: 0.45,
            refine: false,
            refine_tuning: None,
            book_filter: None,
        }
    }
}

/// Caller overrides for refine-mode expansion weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefineTuning {
    pub original_weight: Option<f32>,
    pub expanded_weight: Option<f32>,
    pub max_expansions: Option<usize>,
}

/// Non-production introspection payload: stage timings, candidate counts,
/// and the fusion weights the request ran with.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub total_ms: u64,
    pub retrieval_ms: u64,
    pub expansion_ms: u64,
    pub rerank_ms: u64,
    pub semantic_candidates: usize,
    pub keyword_candidates: usize,
    pub expanded_queries: usize,
    pub expansion_cache_hit: bool,
    pub keyword_fallback_used: bool,
    pub rrf_k: f32,
    pub bonus_multiplier: f32,
}

/// The assembled response: three ranked lists, author enrichment, and a
/// soft-warning flag for rerank timeouts.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchItem<PagePayload>>,
    pub ayahs: Vec<SearchItem<AyahPayload>>,
    pub hadiths: Vec<SearchItem<HadithPayload>>,
    pub authors: Vec<Author>,
    pub rerank_timed_out: bool,
    pub diagnostics: Diagnostics,
}

/// Execute one search request end to end.
///
/// # Errors
///
/// [`SearchError::InvalidQuery`] for empty/oversized queries or a zero
/// limit; [`SearchError::IndexNotReady`] when a vector collection is
/// missing. Every other upstream failure degrades.
pub async fn orchestrate_search(
    req: &SearchRequest,
    services: &SearchServices,
    cfg: &SearchConfig,
) -> Result<SearchResponse> {
    validate_request(req, cfg)?;

    let plan = QueryPlan::analyze(&req.query, req.mode, cfg);
    tracing::debug!(
        mode = ?req.mode,
        refine = req.refine,
        skip_semantic = plan.skip_semantic,
        skip_keyword = plan.skip_keyword,
        script = ?plan.script,
        "search strategy"
    );

    if req.refine {
        refine_search(req, &plan, services, cfg).await
    } else {
        standard_search(req, &plan, services, cfg).await
    }
}

fn validate_request(req: &SearchRequest, cfg: &SearchConfig) -> Result<()> {
    if req.query.trim().is_empty() {
        return Err(SearchError::InvalidQuery("query is empty".into()));
    }
    if req.query.chars().count() > cfg.max_query_chars {
        return Err(SearchError::InvalidQuery(format!(
            "query exceeds {} characters",
            cfg.max_query_chars
        )));
    }
    if req.limit == 0 {
        return Err(SearchError::InvalidQuery(
            "limit must be greater than 0".into(),
        ));
    }
    Ok(())
}

// ── Retrieval + fusion (shared by both modes) ───────────────────────────

#[derive(Debug, Default)]
struct RetrievalMeta {
    semantic_candidates: usize,
    keyword_candidates: usize,
    keyword_fallback_used: bool,
}

struct FusedTriple {
    books: Vec<Fused<PagePayload>>,
    ayahs: Vec<Fused<AyahPayload>>,
    hadiths: Vec<Fused<HadithPayload>>,
    meta: RetrievalMeta,
}

/// Run one query's full retrieval (both paths, all enabled content types)
/// and fuse per type.
async fn retrieve_and_fuse(
    plan: &QueryPlan,
    cutoff: f32,
    req: &SearchRequest,
    services: &SearchServices,
    cfg: &SearchConfig,
) -> Result<FusedTriple> {
    let limit = cfg.candidate_limit;
    let book_filter = req.book_filter.map(|book_id| SearchFilter {
        book_id: Some(book_id),
    });

    // Keyword searches and embedding generation run concurrently —
    // keyword does not need the embedding. One embedding per query,
    // reused across the three semantic sub-searches.
    let embedding_future = async {
        if plan.skip_semantic {
            None
        } else {
            match services
                .embedding
                .embed(&plan.normalized, cfg.embedding_model)
                .await
            {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!(error = %e, "embedding unavailable, skipping semantic retrieval");
                    None
                }
            }
        }
    };
    let (kw_books, kw_ayahs, kw_hadiths, embedding) = tokio::join!(
        async {
            if req.include_books {
                keyword_pages(services, cfg, plan, limit, book_filter.as_ref()).await
            } else {
                AdapterOutput::empty()
            }
        },
        async {
            if req.include_quran {
                keyword_ayahs(services, cfg, plan, limit).await
            } else {
                AdapterOutput::empty()
            }
        },
        async {
            if req.include_hadith {
                keyword_hadiths(services, cfg, plan, limit).await
            } else {
                AdapterOutput::empty()
            }
        },
        embedding_future,
    );

    // Semantic searches run once the embedding resolves.
    let (sem_books, sem_ayahs, sem_hadiths) = match &embedding {
        Some(vector) => {
            tokio::join!(
                async {
                    if req.include_books {
                        semantic_pages(
                            services,
                            cfg,
                            plan,
                            limit,
                            book_filter.as_ref(),
                            cutoff,
                            Some(vector.as_slice()),
                        )
                        .await
                    } else {
                        Ok(AdapterOutput::empty())
                    }
                },
                async {
                    if req.include_quran {
                        semantic_ayahs(services, cfg, plan, limit, cutoff, Some(vector.as_slice())).await
                    } else {
                        Ok(AdapterOutput::empty())
                    }
                },
                async {
                    if req.include_hadith {
                        semantic_hadiths(services, cfg, plan, limit, cutoff, Some(vector.as_slice())).await
                    } else {
                        Ok(AdapterOutput::empty())
                    }
                },
            )
        }
        None => (
            Ok(AdapterOutput::<PagePayload>::empty()),
            Ok(AdapterOutput::<AyahPayload>::empty()),
            Ok(AdapterOutput::<HadithPayload>::empty()),
        ),
    };
    let (sem_books, sem_ayahs, sem_hadiths) = (sem_books?, sem_ayahs?, sem_hadiths?);

    let meta = RetrievalMeta {
        semantic_candidates: sem_books.results.len()
            + sem_ayahs.results.len()
            + sem_hadiths.results.len(),
        keyword_candidates: kw_books.results.len()
            + kw_ayahs.results.len()
            + kw_hadiths.results.len(),
        keyword_fallback_used: kw_books.used_fallback
            || kw_ayahs.used_fallback
            || kw_hadiths.used_fallback,
    };

    Ok(FusedTriple {
        books: fuse(sem_books.results, kw_books.results, cfg),
        ayahs: fuse(sem_ayahs.results, kw_ayahs.results, cfg),
        hadiths: fuse(sem_hadiths.results, kw_hadiths.results, cfg),
        meta,
    })
}

// ── Standard (non-refine) lifecycle ─────────────────────────────────────

async fn standard_search(
    req: &SearchRequest,
    plan: &QueryPlan,
    services: &SearchServices,
    cfg: &SearchConfig,
) -> Result<SearchResponse> {
    let started = Instant::now();
    let cutoff = effective_cutoff(plan, req.similarity_cutoff);

    let triple = retrieve_and_fuse(plan, cutoff, req, services, cfg).await?;
    let retrieval_ms = elapsed_ms(started);

    let rerank_started = Instant::now();
    let (books, ayahs, hadiths) = tokio::join!(
        rerank(&req.reranker, &plan.normalized, triple.books, req.limit, services, cfg),
        rerank(&req.reranker, &plan.normalized, triple.ayahs, req.limit, services, cfg),
        rerank(&req.reranker, &plan.normalized, triple.hadiths, req.limit, services, cfg),
    );
    let rerank_ms = elapsed_ms(rerank_started);
    let rerank_timed_out = books.timed_out || ayahs.timed_out || hadiths.timed_out;

    let diagnostics = Diagnostics {
        total_ms: elapsed_ms(started),
        retrieval_ms,
        expansion_ms: 0,
        rerank_ms,
        semantic_candidates: triple.meta.semantic_candidates,
        keyword_candidates: triple.meta.keyword_candidates,
        expanded_queries: 0,
        expansion_cache_hit: false,
        keyword_fallback_used: triple.meta.keyword_fallback_used,
        rrf_k: cfg.rrf_k,
        bonus_multiplier: cfg.bonus_multiplier,
    };

    Ok(assemble(
        services,
        books.results,
        ayahs.results,
        hadiths.results,
        rerank_timed_out,
        diagnostics,
        started,
    )
    .await)
}

// ── Refine lifecycle ────────────────────────────────────────────────────

async fn refine_search(
    req: &SearchRequest,
    plan: &QueryPlan,
    services: &SearchServices,
    cfg: &SearchConfig,
) -> Result<SearchResponse> {
    let started = Instant::now();

    let settings = expansion_settings(req, cfg);
    let expansion = expand(&plan.normalized, services, cfg, settings).await;
    let expansion_ms = elapsed_ms(started);
    tracing::debug!(
        queries = expansion.queries.len(),
        cache_hit = expansion.cache_hit,
        "refine expansion"
    );

    // Each expanded query's full retrieval runs as one concurrent unit.
    let retrieval_started = Instant::now();
    let units = join_all(expansion.queries.iter().map(|eq| async move {
        let sub_plan = QueryPlan::analyze(&eq.text, req.mode, cfg);
        let sub_cutoff = effective_cutoff(&sub_plan, req.similarity_cutoff);
        let triple = retrieve_and_fuse(&sub_plan, sub_cutoff, req, services, cfg).await?;
        Ok::<_, SearchError>((triple, eq.weight))
    }))
    .await;

    let mut book_lists = Vec::with_capacity(units.len());
    let mut ayah_lists = Vec::with_capacity(units.len());
    let mut hadith_lists = Vec::with_capacity(units.len());
    let mut meta = RetrievalMeta::default();
    for unit in units {
        let (triple, weight) = unit?;
        meta.semantic_candidates += triple.meta.semantic_candidates;
        meta.keyword_candidates += triple.meta.keyword_candidates;
        meta.keyword_fallback_used |= triple.meta.keyword_fallback_used;
        book_lists.push(WeightedList {
            results: triple.books,
            weight,
        });
        ayah_lists.push(WeightedList {
            results: triple.ayahs,
            weight,
        });
        hadith_lists.push(WeightedList {
            results: triple.hadiths,
            weight,
        });
    }

    let merged_books = merge_weighted(book_lists, cfg.rrf_k);
    let merged_ayahs = merge_weighted(ayah_lists, cfg.rrf_k);
    let merged_hadiths = merge_weighted(hadith_lists, cfg.rrf_k);
    let retrieval_ms = elapsed_ms(retrieval_started);

    // One unified rerank call replaces the per-type calls of standard
    // mode. The unified variant is inherently listwise; other strategies
    // degrade gracefully.
    let limits = TypeLimits {
        books: req.limit,
        ayahs: req.limit,
        hadiths: req.limit,
    };
    let rerank_started = Instant::now();
    let (books, ayahs, hadiths, rerank_timed_out) = match &req.reranker {
        Reranker::Listwise { model, .. } => {
            let outcome = rerank_unified(
                &plan.normalized,
                UnifiedInput {
                    books: merged_books,
                    ayahs: merged_ayahs,
                    hadiths: merged_hadiths,
                },
                limits,
                model,
                Duration::from_secs(cfg.unified_rerank_timeout_secs),
                services,
                cfg,
            )
            .await;
            (outcome.books, outcome.ayahs, outcome.hadiths, outcome.timed_out)
        }
        Reranker::EmbeddingSimilarity => {
            let (b, a, h) = tokio::join!(
                rerank(&req.reranker, &plan.normalized, merged_books, req.limit, services, cfg),
                rerank(&req.reranker, &plan.normalized, merged_ayahs, req.limit, services, cfg),
                rerank(&req.reranker, &plan.normalized, merged_hadiths, req.limit, services, cfg),
            );
            (b.results, a.results, h.results, false)
        }
        Reranker::None => {
            let mut b = merged_books;
            let mut a = merged_ayahs;
            let mut h = merged_hadiths;
            b.truncate(req.limit);
            a.truncate(req.limit);
            h.truncate(req.limit);
            (b, a, h, false)
        }
    };
    let rerank_ms = elapsed_ms(rerank_started);

    let diagnostics = Diagnostics {
        total_ms: elapsed_ms(started),
        retrieval_ms,
        expansion_ms,
        rerank_ms,
        semantic_candidates: meta.semantic_candidates,
        keyword_candidates: meta.keyword_candidates,
        expanded_queries: expansion.queries.len(),
        expansion_cache_hit: expansion.cache_hit,
        keyword_fallback_used: meta.keyword_fallback_used,
        rrf_k: cfg.rrf_k,
        bonus_multiplier: cfg.bonus_multiplier,
    };

    Ok(assemble(services, books, ayahs, hadiths, rerank_timed_out, diagnostics, started).await)
}

fn expansion_settings(req: &SearchRequest, cfg: &SearchConfig) -> ExpansionSettings {
    let mut settings = ExpansionSettings::from(cfg);
    if let Some(tuning) = &req.refine_tuning {
        if let Some(weight) = tuning.original_weight {
            settings.original_weight = weight;
        }
        if let Some(weight) = tuning.expanded_weight {
            settings.expanded_weight = weight;
        }
        if let Some(max) = tuning.max_expansions {
            settings.max_expansions = max;
        }
    }
    settings
}

// ── Assembly ────────────────────────────────────────────────────────────

async fn assemble(
    services: &SearchServices,
    books: Vec<Fused<PagePayload>>,
    ayahs: Vec<Fused<AyahPayload>>,
    hadiths: Vec<Fused<HadithPayload>>,
    rerank_timed_out: bool,
    mut diagnostics: Diagnostics,
    started: Instant,
) -> SearchResponse {
    let authors = fetch_authors(services, &books).await;
    diagnostics.total_ms = elapsed_ms(started);

    SearchResponse {
        results: books.into_iter().map(SearchItem::from).collect(),
        ayahs: ayahs.into_iter().map(SearchItem::from).collect(),
        hadiths: hadiths.into_iter().map(SearchItem::from).collect(),
        authors,
        rerank_timed_out,
        diagnostics,
    }
}

/// Resolve author records for the ranked books. Enrichment only — a
/// failure costs the authors list, never the results.
async fn fetch_authors(services: &SearchServices, books: &[Fused<PagePayload>]) -> Vec<Author> {
    let mut ids: Vec<i64> = books
        .iter()
        .map(|f| f.candidate.payload.book_id)
        .collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Vec::new();
    }
    match services.metadata.authors_for_books(&ids).await {
        Ok(authors) => authors,
        Err(e) => {
            tracing::warn!(error = %e, "author enrichment failed");
            Vec::new()
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
