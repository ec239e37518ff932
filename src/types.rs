//! Core types for corpus content, retrieval candidates, and fused results.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// The three content types the corpus holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// A page of a classical book.
    Book,
    /// A Quran verse.
    Ayah,
    /// A Hadith narration.
    Hadith,
}

impl ContentType {
    /// Returns the human-readable name of this content type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Ayah => "ayah",
            Self::Hadith => "hadith",
        }
    }

    /// Prefix for vector collections holding this content type.
    pub fn collection_prefix(&self) -> &'static str {
        match self {
            Self::Book => "book_pages",
            Self::Ayah => "quran_ayahs",
            Self::Hadith => "hadiths",
        }
    }

    /// Name of the lexical index holding this content type.
    pub fn lexical_index(&self) -> &'static str {
        match self {
            Self::Book => "pages",
            Self::Ayah => "ayahs",
            Self::Hadith => "hadiths",
        }
    }

    /// Returns all content type variants.
    pub fn all() -> &'static [ContentType] {
        &[Self::Book, Self::Ayah, Self::Hadith]
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Embedding models the corpus is indexed under.
///
/// Each model has its own vector dimensionality and its own set of vector
/// collections (one per content type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingModel {
    /// BAAI bge-m3 — multilingual, strong on Arabic.
    BgeM3,
    /// OpenAI text-embedding-3-small.
    TextEmbedding3Small,
}

impl EmbeddingModel {
    /// Vector dimensionality produced by this model.
    pub fn dim(&self) -> usize {
        match self {
            Self::BgeM3 => 1024,
            Self::TextEmbedding3Small => 1536,
        }
    }

    /// Stable identifier used in collection names and API payloads.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::BgeM3 => "bge_m3",
            Self::TextEmbedding3Small => "text_embedding_3_small",
        }
    }

    /// Vector collection name for a content type indexed under this model.
    pub fn collection(&self, ty: ContentType) -> String {
        format!("{}_{}", ty.collection_prefix(), self.slug())
    }
}

/// Which retrieval paths a request wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Vector and lexical retrieval, fused.
    Hybrid,
    /// Vector retrieval only.
    Semantic,
    /// Lexical retrieval only.
    Keyword,
}

// ── Natural keys ────────────────────────────────────────────────────────

/// Natural key of a book page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageKey {
    pub book_id: i64,
    pub page: u32,
}

/// Natural key of a Quran verse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AyahKey {
    pub surah: u16,
    pub ayah: u16,
}

/// Natural key of a Hadith narration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HadithKey {
    pub collection: String,
    pub number: u32,
}

/// A content payload identified by a typed composite natural key.
///
/// Candidates from different retrieval paths are merged by this key, so it
/// must be stable across the vector and lexical indexes.
pub trait Keyed {
    type Key: Eq + Hash + Clone;

    fn key(&self) -> Self::Key;

    /// Text used for display and for reranker prompt formatting.
    fn text(&self) -> &str;
}

// ── Payloads ────────────────────────────────────────────────────────────

/// Stored payload of a book page hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagePayload {
    pub book_id: i64,
    pub page: u32,
    pub book_title: String,
    #[serde(default)]
    pub author_id: Option<i64>,
    pub text: String,
}

impl Keyed for PagePayload {
    type Key = PageKey;

    fn key(&self) -> PageKey {
        PageKey {
            book_id: self.book_id,
            page: self.page,
        }
    }

    fn text(&self) -> &str {
        &self.text
    }
}

/// Stored payload of a Quran verse hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AyahPayload {
    pub surah: u16,
    pub ayah: u16,
    pub surah_name: String,
    pub text: String,
    #[serde(default)]
    pub translation: Option<String>,
}

impl Keyed for AyahPayload {
    type Key = AyahKey;

    fn key(&self) -> AyahKey {
        AyahKey {
            surah: self.surah,
            ayah: self.ayah,
        }
    }

    fn text(&self) -> &str {
        &self.text
    }
}

/// Stored payload of a Hadith narration hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HadithPayload {
    pub collection: String,
    pub number: u32,
    #[serde(default)]
    pub narrator: Option<String>,
    pub text: String,
    #[serde(default)]
    pub grade: Option<String>,
}

impl Keyed for HadithPayload {
    type Key = HadithKey;

    fn key(&self) -> HadithKey {
        HadithKey {
            collection: self.collection.clone(),
            number: self.number,
        }
    }

    fn text(&self) -> &str {
        &self.text
    }
}

// ── Candidates and fused results ────────────────────────────────────────

/// A retrieved item from one or both retrieval paths.
///
/// Scores and ranks are present only for the path(s) that produced the
/// candidate; two candidates with the same natural key merge into one.
#[derive(Debug, Clone)]
pub struct Candidate<P> {
    pub payload: P,
    /// Cosine similarity in 0–1, present only for vector hits.
    pub semantic_score: Option<f32>,
    /// 1-based position in the vector result list.
    pub semantic_rank: Option<usize>,
    /// Raw BM25 score (unbounded), present only for lexical hits.
    pub bm25_score: Option<f32>,
    /// 1-based position in the lexical result list.
    pub keyword_rank: Option<usize>,
    /// Highlighted snippet from the lexical path, when available.
    pub snippet: Option<String>,
}

impl<P> Candidate<P> {
    /// Build a candidate from a vector search hit.
    pub fn from_semantic(payload: P, rank: usize, score: f32) -> Self {
        Self {
            payload,
            semantic_score: Some(score),
            semantic_rank: Some(rank),
            bm25_score: None,
            keyword_rank: None,
            snippet: None,
        }
    }

    /// Build a candidate from a lexical search hit.
    pub fn from_keyword(payload: P, rank: usize, score: f32, snippet: Option<String>) -> Self {
        Self {
            payload,
            semantic_score: None,
            semantic_rank: None,
            bm25_score: Some(score),
            keyword_rank: Some(rank),
            snippet,
        }
    }
}

/// A candidate augmented with its fused and RRF scores.
///
/// `fused_score` is the canonical sortable score; `rrf_score` breaks
/// near-ties. Both are computable from whichever retrieval signals the
/// candidate carries.
#[derive(Debug, Clone)]
pub struct Fused<P> {
    pub candidate: Candidate<P>,
    pub fused_score: f32,
    pub rrf_score: f32,
}

/// An alternative phrasing of the user query, produced by query expansion.
///
/// The original query always leads with the configured original weight;
/// machine-generated alternates carry the configured expanded weight.
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandedQuery {
    pub text: String,
    /// Merge weight in (0, 1].
    pub weight: f32,
    /// Why the model proposed this phrasing.
    pub reason: String,
}

/// Author metadata resolved during final enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub death_year: Option<i32>,
}

/// A flattened, caller-facing result row.
#[derive(Debug, Clone, Serialize)]
pub struct SearchItem<P> {
    #[serde(flatten)]
    pub payload: P,
    /// Final relevance score after fusion/merge/rerank.
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bm25_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl<P> From<Fused<P>> for SearchItem<P> {
    fn from(fused: Fused<P>) -> Self {
        Self {
            score: fused.fused_score,
            semantic_score: fused.candidate.semantic_score,
            bm25_score: fused.candidate.bm25_score,
            snippet: fused.candidate.snippet,
            payload: fused.candidate.payload,
        }
    }
}
