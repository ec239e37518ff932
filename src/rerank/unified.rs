//! Unified cross-type reranking: books, Quran verses, and Hadiths ranked
//! together in one listwise call, so relative ordering across types is
//! model-judged instead of score-normalized.

use std::time::Duration;

use super::listwise::{parse_ranking, truncate_chars};
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::services::SearchServices;
use crate::types::{
    AyahPayload, ContentType, Fused, HadithPayload, PagePayload,
};

/// Below this many combined documents the call is not worth the round trip.
const MIN_UNIFIED_DOCS: usize = 3;

/// Per-type fused/merged results entering the unified rerank.
#[derive(Debug, Clone, Default)]
pub struct UnifiedInput {
    pub books: Vec<Fused<PagePayload>>,
    pub ayahs: Vec<Fused<AyahPayload>>,
    pub hadiths: Vec<Fused<HadithPayload>>,
}

/// Per-type output caps.
#[derive(Debug, Clone, Copy)]
pub struct TypeLimits {
    pub books: usize,
    pub ayahs: usize,
    pub hadiths: usize,
}

/// Per-type results after the unified rerank.
#[derive(Debug, Clone)]
pub struct UnifiedOutcome {
    pub books: Vec<Fused<PagePayload>>,
    pub ayahs: Vec<Fused<AyahPayload>>,
    pub hadiths: Vec<Fused<HadithPayload>>,
    pub timed_out: bool,
}

/// Type-erased view of one document inside the unified prompt.
/// Discarded after results are split back by type.
struct UnifiedDoc {
    content_type: ContentType,
    source_index: usize,
    formatted: String,
}

/// Rerank across content types with one listwise call.
///
/// Inputs are capped per type, formatted into type-tagged blocks, ranked
/// by the model, then split back into per-type lists capped to their
/// requested limits. Every placed item is re-scored by its position in
/// the combined ranking (`score = 1 − rank/100`) so downstream consumers
/// can compare across types. An empty or unusable ranking falls back to
/// the merged order.
pub async fn rerank_unified(
    query: &str,
    mut input: UnifiedInput,
    limits: TypeLimits,
    model: &str,
    timeout: Duration,
    services: &SearchServices,
    cfg: &SearchConfig,
) -> UnifiedOutcome {
    input.books.truncate(cfg.unified_per_type_cap);
    input.ayahs.truncate(cfg.unified_per_type_cap);
    input.hadiths.truncate(cfg.unified_per_type_cap);

    let docs = collect_docs(&input, cfg.rerank_doc_chars);
    if docs.len() < MIN_UNIFIED_DOCS {
        return fallback(input, limits, false);
    }

    let prompt = build_unified_prompt(query, &docs);
    let raw = match services.completion.complete(&prompt, model, timeout).await {
        Ok(raw) => raw,
        Err(SearchError::Timeout(..)) => {
            tracing::warn!(model, ?timeout, "unified rerank timed out, keeping merged order");
            return fallback(input, limits, true);
        }
        Err(e) => {
            tracing::warn!(model, error = %e, "unified rerank failed, keeping merged order");
            return fallback(input, limits, false);
        }
    };

    let ranked = parse_ranking(&raw, docs.len());
    if ranked.is_empty() {
        // "Nothing relevant" and "garbage response" are indistinguishable
        // enough that degrading to the merged order is the safer uniform
        // behaviour.
        tracing::warn!(model, "empty unified ranking, keeping merged order");
        return fallback(input, limits, false);
    }

    split_ranked(input, limits, &docs, &ranked)
}

fn collect_docs(input: &UnifiedInput, doc_chars: usize) -> Vec<UnifiedDoc> {
    let mut docs = Vec::with_capacity(input.books.len() + input.ayahs.len() + input.hadiths.len());
    for (i, f) in input.books.iter().enumerate() {
        let p = &f.candidate.payload;
        docs.push(UnifiedDoc {
            content_type: ContentType::Book,
            source_index: i,
            formatted: format!(
                "(book) «{}» p.{}: {}",
                p.book_title,
                p.page,
                truncate_chars(&p.text, doc_chars)
            ),
        });
    }
    for (i, f) in input.ayahs.iter().enumerate() {
        let p = &f.candidate.payload;
        docs.push(UnifiedDoc {
            content_type: ContentType::Ayah,
            source_index: i,
            formatted: format!(
                "(quran) {} {}:{}: {}",
                p.surah_name,
                p.surah,
                p.ayah,
                truncate_chars(&p.text, doc_chars)
            ),
        });
    }
    for (i, f) in input.hadiths.iter().enumerate() {
        let p = &f.candidate.payload;
        docs.push(UnifiedDoc {
            content_type: ContentType::Hadith,
            source_index: i,
            formatted: format!(
                "(hadith) {} #{}: {}",
                p.collection,
                p.number,
                truncate_chars(&p.text, doc_chars)
            ),
        });
    }
    docs
}

fn build_unified_prompt(query: &str, docs: &[UnifiedDoc]) -> String {
    let mut prompt = String::with_capacity(
        320 + docs.iter().map(|d| d.formatted.len() + 8).sum::<usize>(),
    );
    prompt.push_str(
        "Rank the numbered documents below by relevance to the query, best \
         first. Documents are tagged (book), (quran), or (hadith); judge \
         relevance across all three together. Respond with ONLY a JSON \
         array of document numbers, e.g. [4, 1, 7]. Return [] if no \
         document is relevant.\n\n",
    );
    prompt.push_str("Query: ");
    prompt.push_str(query);
    prompt.push_str("\n\n");
    for (i, doc) in docs.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n", i + 1, doc.formatted));
    }
    prompt
}

/// Split the combined ranking back into per-type lists.
///
/// Ranked documents come first in response order; documents the model
/// omitted follow in original order. Each list stops accepting items at
/// its limit, and every placed item is re-scored by its overall position.
fn split_ranked(
    input: UnifiedInput,
    limits: TypeLimits,
    docs: &[UnifiedDoc],
    ranked: &[usize],
) -> UnifiedOutcome {
    let mut book_slots: Vec<Option<Fused<PagePayload>>> =
        input.books.into_iter().map(Some).collect();
    let mut ayah_slots: Vec<Option<Fused<AyahPayload>>> =
        input.ayahs.into_iter().map(Some).collect();
    let mut hadith_slots: Vec<Option<Fused<HadithPayload>>> =
        input.hadiths.into_iter().map(Some).collect();

    let mut out = UnifiedOutcome {
        books: Vec::new(),
        ayahs: Vec::new(),
        hadiths: Vec::new(),
        timed_out: false,
    };

    let mut position = 0usize;
    let omitted = (0..docs.len()).filter(|i| !ranked.contains(i));
    for doc_index in ranked.iter().copied().chain(omitted) {
        let doc = &docs[doc_index];
        let score = 1.0 - position as f32 / 100.0;
        let placed = match doc.content_type {
            ContentType::Book => place(
                &mut book_slots,
                doc.source_index,
                &mut out.books,
                limits.books,
                score,
            ),
            ContentType::Ayah => place(
                &mut ayah_slots,
                doc.source_index,
                &mut out.ayahs,
                limits.ayahs,
                score,
            ),
            ContentType::Hadith => place(
                &mut hadith_slots,
                doc.source_index,
                &mut out.hadiths,
                limits.hadiths,
                score,
            ),
        };
        if placed {
            position += 1;
        }
    }

    out
}

fn place<P>(
    slots: &mut [Option<Fused<P>>],
    source_index: usize,
    out: &mut Vec<Fused<P>>,
    limit: usize,
    score: f32,
) -> bool {
    if out.len() >= limit {
        return false;
    }
    let Some(mut item) = slots.get_mut(source_index).and_then(Option::take) else {
        return false;
    };
    item.fused_score = score;
    out.push(item);
    true
}

fn fallback(input: UnifiedInput, limits: TypeLimits, timed_out: bool) -> UnifiedOutcome {
    let mut books = input.books;
    let mut ayahs = input.ayahs;
    let mut hadiths = input.hadiths;
    books.truncate(limits.books);
    ayahs.truncate(limits.ayahs);
    hadiths.truncate(limits.hadiths);
    UnifiedOutcome {
        books,
        ayahs,
        hadiths,
        timed_out,
    }
}
