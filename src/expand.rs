//! Multi-query expansion for refine mode.
//!
//! One LLM call produces up to four alternative phrasings of the query;
//! the original always leads at full weight. Expansion is best-effort:
//! any failure — no credentials, malformed response, network error —
//! degrades to the original query alone. Successful expansions are cached
//! by normalized query text so repeat refines skip the LLM entirely.

use std::time::Duration;

use crate::config::SearchConfig;
use crate::query::normalize;
use crate::services::SearchServices;
use crate::types::ExpandedQuery;

/// Effective expansion weights and limits for one request.
#[derive(Debug, Clone, Copy)]
pub struct ExpansionSettings {
    pub original_weight: f32,
    pub expanded_weight: f32,
    pub max_expansions: usize,
}

impl From<&SearchConfig> for ExpansionSettings {
    fn from(cfg: &SearchConfig) -> Self {
        Self {
            original_weight: cfg.original_weight,
            expanded_weight: cfg.expanded_weight,
            max_expansions: cfg.max_expansions,
        }
    }
}

/// Outcome of an expansion attempt.
#[derive(Debug, Clone)]
pub struct Expansion {
    pub queries: Vec<ExpandedQuery>,
    /// True when the expansion came from the cache without an LLM call.
    pub cache_hit: bool,
}

const EXPANSION_INSTRUCTIONS: &str = "\
You rewrite Arabic search queries for an Islamic text corpus (classical \
books, Quran, Hadith). Produce up to 4 alternative phrasings of the query \
below that a different author might have used: synonyms, classical \
terminology, or a more explicit form of an implicit question. Keep each \
alternative short and in Arabic. Respond with ONLY a JSON array of \
objects, each {\"query\": \"...\", \"reason\": \"...\"}. Return [] if no \
useful alternative exists.";

/// Expand a normalized query into weighted phrasings.
///
/// Always returns at least the original query at `original_weight`.
pub async fn expand(
    query: &str,
    services: &SearchServices,
    cfg: &SearchConfig,
    settings: ExpansionSettings,
) -> Expansion {
    let key = normalize(query);

    if let Some(cached) = services.expansion_cache.get(&key).await {
        tracing::debug!(count = cached.len(), "expansion cache hit");
        return Expansion {
            queries: cached,
            cache_hit: true,
        };
    }

    let original = ExpandedQuery {
        text: key.clone(),
        weight: settings.original_weight,
        reason: "original query".into(),
    };

    let prompt = format!("{EXPANSION_INSTRUCTIONS}\n\nQuery: {key}");
    let raw = match services
        .completion
        .complete(
            &prompt,
            &cfg.expansion_model,
            Duration::from_secs(cfg.expansion_timeout_secs),
        )
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "query expansion failed, using original only");
            return Expansion {
                queries: vec![original],
                cache_hit: false,
            };
        }
    };

    let alternates = parse_alternates(&raw, &key, settings);
    if alternates.is_empty() {
        tracing::debug!("expansion produced no usable alternates");
        return Expansion {
            queries: vec![original],
            cache_hit: false,
        };
    }

    let mut queries = Vec::with_capacity(1 + alternates.len());
    queries.push(original);
    queries.extend(alternates);

    // Only successful expansions are cached; a transient LLM outage must
    // not pin the single-query fallback for a full TTL window.
    services
        .expansion_cache
        .insert(key, queries.clone())
        .await;

    Expansion {
        queries,
        cache_hit: false,
    }
}

/// Extract alternate phrasings from the model response.
///
/// Tolerates prose or markdown fences around the JSON array; drops empty
/// texts and duplicates of the original; caps at `max_expansions`.
fn parse_alternates(
    raw: &str,
    original: &str,
    settings: ExpansionSettings,
) -> Vec<ExpandedQuery> {
    #[derive(serde::Deserialize)]
    struct RawAlternate {
        query: String,
        #[serde(default)]
        reason: String,
    }

    let Some(start) = raw.find('[') else {
        return Vec::new();
    };
    let Some(end) = raw.rfind(']') else {
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }

    let Ok(parsed) = serde_json::from_str::<Vec<RawAlternate>>(&raw[start..=end]) else {
        return Vec::new();
    };

    let mut seen = vec![normalize(original)];
    let mut out = Vec::new();
    for alt in parsed {
        let normalized = normalize(&alt.query);
        if normalized.is_empty() || seen.contains(&normalized) {
            continue;
        }
        seen.push(normalized.clone());
        out.push(ExpandedQuery {
            text: normalized,
            weight: settings.expanded_weight,
            reason: alt.reason,
        });
        if out.len() >= settings.max_expansions {
            break;
        }
    }
    out
}
