//! Listwise LLM reranking: one numbered-document prompt, one JSON-array
//! response, permissive extraction, deterministic fallback.

use std::time::Duration;

use super::RerankOutcome;
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::services::SearchServices;
use crate::types::{Fused, Keyed};

/// Rerank one content type's pool with a listwise LLM call.
pub(crate) async fn rerank_listwise<P>(
    query: &str,
    pool: Vec<Fused<P>>,
    model: &str,
    timeout: Duration,
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

    let docs: Vec<String> = pool
        .iter()
        .map(|f| truncate_chars(f.candidate.payload.text(), cfg.rerank_doc_chars))
        .collect();
    let prompt = build_prompt(query, &docs);

    match services.completion.complete(&prompt, model, timeout).await {
        Ok(raw) => {
            let order = parse_ranking(&raw, pool.len());
            if order.is_empty() {
                tracing::warn!(model, "unusable rerank response, keeping fused order");
                return RerankOutcome {
                    results: pool,
                    timed_out: false,
                };
            }
            RerankOutcome {
                results: apply_order(pool, &order),
                timed_out: false,
            }
        }
        Err(SearchError::Timeout(..)) => {
            tracing::warn!(model, ?timeout, "rerank timed out, keeping fused order");
            RerankOutcome {
                results: pool,
                timed_out: true,
            }
        }
        Err(e) => {
            tracing::warn!(model, error = %e, "rerank failed, keeping fused order");
            RerankOutcome {
                results: pool,
                timed_out: false,
            }
        }
    }
}

/// Build the numbered-document prompt shared by every listwise backend.
pub(crate) fn build_prompt(query: &str, docs: &[String]) -> String {
    let mut prompt = String::with_capacity(256 + docs.iter().map(String::len).sum::<usize>());
    prompt.push_str(
        "Rank the numbered documents below by relevance to the query, best \
         first. Respond with ONLY a JSON array of document numbers, e.g. \
         [2, 5, 1]. Return [] if no document is relevant.\n\n",
    );
    prompt.push_str("Query: ");
    prompt.push_str(query);
    prompt.push_str("\n\n");
    for (i, doc) in docs.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n", i + 1, doc));
    }
    prompt
}

/// Extract a document ordering from the model response.
///
/// Accepts a JSON array anywhere in the response (prose and markdown
/// fences tolerated); falls back to scanning for bare numbers. Document
/// numbers are 1-based in the prompt; the returned indices are 0-based,
/// in-range, and deduplicated in response order.
pub(crate) fn parse_ranking(raw: &str, len: usize) -> Vec<usize> {
    let slice = match (raw.find('['), raw.rfind(']')) {
        (Some(start), Some(end)) if end > start => &raw[start..=end],
        _ => raw,
    };

    let numbers: Vec<u64> =
        if let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(slice) {
            values.iter().filter_map(serde_json::Value::as_u64).collect()
        } else {
            slice
                .split(|c: char| !c.is_ascii_digit())
                .filter(|s| !s.is_empty())
                .filter_map(|s| s.parse().ok())
                .collect()
        };

    let mut seen = vec![false; len];
    let mut order = Vec::with_capacity(numbers.len().min(len));
    for n in numbers {
        let Some(idx) = (n as usize).checked_sub(1) else {
            continue;
        };
        if idx < len && !seen[idx] {
            seen[idx] = true;
            order.push(idx);
        }
    }
    order
}

/// Reorder a pool by the given indices, appending every index the model
/// omitted in original order. The output always holds exactly the pool's
/// items, each once.
pub(crate) fn apply_order<P>(pool: Vec<Fused<P>>, order: &[usize]) -> Vec<Fused<P>> {
    let mut slots: Vec<Option<Fused<P>>> = pool.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(slots.len());
    for &i in order {
        if let Some(item) = slots.get_mut(i).and_then(Option::take) {
            out.push(item);
        }
    }
    for slot in &mut slots {
        if let Some(item) = slot.take() {
            out.push(item);
        }
    }
    out
}

/// Truncate to a character budget without splitting a code point.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AyahPayload, Candidate};

    fn pool(n: usize) -> Vec<Fused<AyahPayload>> {
        (0..n)
            .map(|i| Fused {
                candidate: Candidate::from_semantic(
                    AyahPayload {
                        surah: 1,
                        ayah: i as u16 + 1,
                        surah_name: "الفاتحة".into(),
                        text: format!("آيه {}", i + 1),
                        translation: None,
                    },
                    i + 1,
                    0.9 - i as f32 * 0.05,
                ),
                fused_score: 0.9 - i as f32 * 0.05,
                rrf_score: 0.016,
            })
            .collect()
    }

    #[test]
    fn parse_plain_json_array() {
        assert_eq!(parse_ranking("[2, 3, 1]", 3), vec![1, 2, 0]);
    }

    #[test]
    fn parse_array_inside_prose() {
        let raw = "Sure! Based on relevance the order is: [3, 1, 2]. Hope that helps.";
        assert_eq!(parse_ranking(raw, 3), vec![2, 0, 1]);
    }

    #[test]
    fn parse_array_inside_markdown_fence() {
        let raw = "```json\n[1, 2]\n```";
        assert_eq!(parse_ranking(raw, 2), vec![0, 1]);
    }

    #[test]
    fn parse_bare_numbers_without_brackets() {
        assert_eq!(parse_ranking("2, 1, 3", 3), vec![1, 0, 2]);
    }

    #[test]
    fn parse_drops_out_of_range_and_duplicates() {
        assert_eq!(parse_ranking("[2, 9, 2, 0, 1]", 3), vec![1, 0]);
    }

    #[test]
    fn parse_empty_array_returns_empty() {
        assert!(parse_ranking("[]", 5).is_empty());
    }

    #[test]
    fn parse_garbage_returns_empty() {
        assert!(parse_ranking("no ranking available", 5).is_empty());
    }

    #[test]
    fn apply_order_appends_omitted_in_original_order() {
        let items = pool(4);
        let out = apply_order(items, &[2, 0]);
        let ayahs: Vec<u16> = out.iter().map(|f| f.candidate.payload.ayah).collect();
        assert_eq!(ayahs, vec![3, 1, 2, 4]);
    }

    #[test]
    fn apply_order_full_permutation() {
        let items = pool(3);
        let out = apply_order(items, &[1, 2, 0]);
        let ayahs: Vec<u16> = out.iter().map(|f| f.candidate.payload.ayah).collect();
        assert_eq!(ayahs, vec![2, 3, 1]);
    }

    #[test]
    fn apply_order_never_duplicates() {
        let items = pool(3);
        let out = apply_order(items, &[0, 0, 1]);
        assert_eq!(out.len(), 3);
        let ayahs: Vec<u16> = out.iter().map(|f| f.candidate.payload.ayah).collect();
        assert_eq!(ayahs, vec![1, 2, 3]);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "بسم الله الرحمن الرحيم";
        let truncated = truncate_chars(text, 7);
        assert_eq!(truncated.chars().count(), 8); // 7 + ellipsis
        assert!(truncated.starts_with("بسم الل"));
    }

    #[test]
    fn truncate_leaves_short_text_untouched() {
        assert_eq!(truncate_chars("قصير", 800), "قصير");
    }

    #[test]
    fn prompt_numbers_documents_from_one() {
        let prompt = build_prompt("سؤال", &["أول".into(), "ثاني".into()]);
        assert!(prompt.contains("[1] أول"));
        assert!(prompt.contains("[2] ثاني"));
        assert!(prompt.contains("Query: سؤال"));
    }
}
