//! Query normalization, script detection, and retrieval strategy selection.
//!
//! Everything here is pure and deterministic: the same raw query, mode,
//! and config always produce the same plan. The corpus is Arabic-script
//! monolingual, which drives the keyword-skip rule — lexical search
//! against a mismatched script wastes a round trip.

use crate::config::SearchConfig;
use crate::types::SearchMode;

/// Detected script of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Arabic,
    Latin,
    /// Both Arabic and Latin letters present.
    Mixed,
    /// No letters in a recognized script (digits, symbols, other scripts).
    Other,
}

/// Ordered rule table raising the similarity cutoff for short queries.
///
/// Short queries carry little semantic content, so the vector search needs
/// a stricter floor to keep noise out. Entries are
/// `(significant-char breakpoint, minimum cutoff)`; the first breakpoint
/// the query falls under wins. Queries past the last breakpoint pass the
/// caller's base cutoff through unchanged.
const SHORT_QUERY_CUTOFFS: &[(usize, f32)] = &[(8, 0.75), (16, 0.68), (24, 0.60)];

/// Analysis of a raw query plus the retrieval strategy it implies.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub raw: String,
    pub normalized: String,
    pub script: Script,
    pub quoted_phrase: bool,
    pub word_count: usize,
    /// Characters in the normalized query, whitespace excluded.
    pub significant_chars: usize,
    /// Skip vector retrieval for this query.
    pub skip_semantic: bool,
    /// Skip lexical retrieval for this query.
    pub skip_keyword: bool,
}

impl QueryPlan {
    /// Analyze a raw query under the given mode and config.
    pub fn analyze(raw: &str, mode: SearchMode, cfg: &SearchConfig) -> Self {
        let quoted_phrase = has_quoted_phrase(raw);
        let normalized = normalize(raw);
        let script = detect_script(&normalized);
        let word_count = normalized.split_whitespace().count();
        let significant_chars = normalized.chars().filter(|c| !c.is_whitespace()).count();

        // Quoted phrases mean the user demands exact matching; short or
        // sparse text produces noisy embeddings.
        let skip_semantic = mode == SearchMode::Keyword
            || quoted_phrase
            || significant_chars < cfg.min_semantic_chars;

        // The corpus is Arabic-script; a query with no Arabic letters
        // cannot match lexically.
        let script_mismatch = matches!(script, Script::Latin | Script::Other);
        let skip_keyword = mode == SearchMode::Semantic || script_mismatch;

        Self {
            raw: raw.to_owned(),
            normalized,
            script,
            quoted_phrase,
            word_count,
            significant_chars,
            skip_semantic,
            skip_keyword,
        }
    }
}

/// Raise the caller-supplied similarity cutoff for short queries.
///
/// Single-word queries are capped to the shortest bucket regardless of
/// character count; longer queries fall through the rule table and pass
/// the base cutoff unchanged once no breakpoint applies.
pub fn effective_cutoff(plan: &QueryPlan, base: f32) -> f32 {
    if plan.word_count <= 1 {
        return base.max(SHORT_QUERY_CUTOFFS[0].1);
    }
    for &(breakpoint, floor) in SHORT_QUERY_CUTOFFS {
        if plan.significant_chars < breakpoint {
            return base.max(floor);
        }
    }
    base
}

/// Normalize a query for retrieval.
///
/// Strips Arabic diacritics, Quranic annotation marks, and tatweel; folds
/// alef variants and alef maqsura; drops quote characters; lowercases
/// Latin; collapses whitespace.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            // Tashkeel, superscript alef, Quranic annotation marks, tatweel.
            '\u{064B}'..='\u{065F}' | '\u{0670}' | '\u{06D6}'..='\u{06ED}' | '\u{0640}' => {}
            // Alef variants fold to bare alef.
            'أ' | 'إ' | 'آ' | 'ٱ' => out.push('ا'),
            // Alef maqsura folds to ya, ta marbuta to ha.
            'ى' => out.push('ي'),
            'ة' => out.push('ه'),
            '"' | '«' | '»' | '\u{201C}' | '\u{201D}' => out.push(' '),
            _ => {
                for lower in c.to_lowercase() {
                    out.push(lower);
                }
            }
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Detect the dominant script of a normalized query.
pub fn detect_script(text: &str) -> Script {
    let mut arabic = 0usize;
    let mut latin = 0usize;
    for c in text.chars() {
        if is_arabic_letter(c) {
            arabic += 1;
        } else if c.is_ascii_alphabetic() {
            latin += 1;
        }
    }
    match (arabic, latin) {
        (0, 0) => Script::Other,
        (_, 0) => Script::Arabic,
        (0, _) => Script::Latin,
        _ => Script::Mixed,
    }
}

/// True when the query contains a quoted phrase the user wants matched
/// exactly. Recognizes ASCII double quotes, guillemets, and curly quotes.
pub fn has_quoted_phrase(text: &str) -> bool {
    has_pair(text, '"', '"')
        || has_pair(text, '«', '»')
        || has_pair(text, '\u{201C}', '\u{201D}')
}

fn has_pair(text: &str, open: char, close: char) -> bool {
    let Some(start) = text.find(open) else {
        return false;
    };
    let rest = &text[start + open.len_utf8()..];
    rest.find(close)
        .is_some_and(|end| !rest[..end].trim().is_empty())
}

fn is_arabic_letter(c: char) -> bool {
    matches!(
        c,
        '\u{0600}'..='\u{06FF}'
            | '\u{0750}'..='\u{077F}'
            | '\u{08A0}'..='\u{08FF}'
            | '\u{FB50}'..='\u{FDFF}'
            | '\u{FE70}'..='\u{FEFF}'
    )
}
