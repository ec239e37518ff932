//! Integration tests for the search orchestrator pipeline.
//!
//! These tests exercise the full analyze → retrieve → fuse/merge → rerank
//! → assemble lifecycle against fake services (no network calls),
//! including the degradation paths the engine guarantees.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use maktaba_search::cache::ExpansionCache;
use maktaba_search::services::{
    CompletionService, EmbeddingService, LexicalHit, LexicalIndex, MetadataStore, ScoredPoint,
    SearchFilter, SearchServices, VectorIndex,
};
use maktaba_search::types::{Author, EmbeddingModel, ExpandedQuery};
use maktaba_search::{
    Reranker, Result, SearchConfig, SearchError, SearchMode, SearchRequest,
};

// ── Fakes ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeVector {
    books: Vec<ScoredPoint>,
    ayahs: Vec<ScoredPoint>,
    hadiths: Vec<ScoredPoint>,
    fail: bool,
    not_ready: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl VectorIndex for FakeVector {
    async fn search(
        &self,
        collection: &str,
        _vector: &[f32],
        _limit: usize,
        _filter: Option<&SearchFilter>,
        _score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.not_ready {
            return Err(SearchError::IndexNotReady(collection.to_owned()));
        }
        if self.fail {
            return Err(SearchError::Http("vector service down".into()));
        }
        Ok(if collection.starts_with("book_pages") {
            self.books.clone()
        } else if collection.starts_with("quran_ayahs") {
            self.ayahs.clone()
        } else {
            self.hadiths.clone()
        })
    }
}

#[derive(Default)]
struct FakeLexical {
    pages: Vec<LexicalHit>,
    ayahs: Vec<LexicalHit>,
    hadiths: Vec<LexicalHit>,
    fail: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl LexicalIndex for FakeLexical {
    async fn search(
        &self,
        index: &str,
        _query: &str,
        _limit: usize,
        _filter: Option<&SearchFilter>,
        _fuzzy: bool,
    ) -> Result<Vec<LexicalHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SearchError::Http("lexical service down".into()));
        }
        Ok(match index {
            "pages" => self.pages.clone(),
            "ayahs" => self.ayahs.clone(),
            _ => self.hadiths.clone(),
        })
    }
}

#[derive(Default)]
struct FakeEmbedding {
    fail: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingService for FakeEmbedding {
    async fn embed(&self, _text: &str, model: EmbeddingModel) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SearchError::Http("embedding service down".into()));
        }
        Ok(vec![0.1; model.dim()])
    }
}

enum Step {
    Respond(String),
    Fail,
    Timeout,
}

#[derive(Default)]
struct FakeCompletion {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl FakeCompletion {
    fn scripted(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CompletionService for FakeCompletion {
    async fn complete(&self, _prompt: &str, _model: &str, timeout: Duration) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.steps.lock().expect("lock").pop_front() {
            Some(Step::Respond(s)) => Ok(s),
            Some(Step::Fail) => Err(SearchError::Http("llm unavailable".into())),
            Some(Step::Timeout) => Err(SearchError::Timeout("completion".into(), timeout)),
            None => Err(SearchError::Http("completion script exhausted".into())),
        }
    }
}

struct FakeMetadata {
    authors: Vec<Author>,
}

#[async_trait]
impl MetadataStore for FakeMetadata {
    async fn authors_for_books(&self, book_ids: &[i64]) -> Result<Vec<Author>> {
        Ok(self
            .authors
            .iter()
            .filter(|a| book_ids.contains(&a.id))
            .cloned()
            .collect())
    }
}

struct MapCache {
    map: Mutex<std::collections::HashMap<String, Vec<ExpandedQuery>>>,
}

#[async_trait]
impl ExpansionCache for MapCache {
    async fn get(&self, key: &str) -> Option<Vec<ExpandedQuery>> {
        self.map.lock().expect("lock").get(key).cloned()
    }
    async fn insert(&self, key: String, value: Vec<ExpandedQuery>) {
        self.map.lock().expect("lock").insert(key, value);
    }
}

struct Harness {
    vector: Arc<FakeVector>,
    lexical: Arc<FakeLexical>,
    embedding: Arc<FakeEmbedding>,
    completion: Arc<FakeCompletion>,
    services: SearchServices,
}

fn harness(vector: FakeVector, lexical: FakeLexical, completion: FakeCompletion) -> Harness {
    let vector = Arc::new(vector);
    let lexical = Arc::new(lexical);
    let embedding = Arc::new(FakeEmbedding::default());
    let completion = Arc::new(completion);
    let services = SearchServices {
        vector: Arc::clone(&vector) as Arc<dyn VectorIndex>,
        lexical: Arc::clone(&lexical) as Arc<dyn LexicalIndex>,
        embedding: Arc::clone(&embedding) as Arc<dyn EmbeddingService>,
        completion: Arc::clone(&completion) as Arc<dyn CompletionService>,
        metadata: Arc::new(FakeMetadata {
            authors: vec![Author {
                id: 3,
                name: "النووي".into(),
                death_year: Some(676),
            }],
        }),
        expansion_cache: Arc::new(MapCache {
            map: Mutex::new(std::collections::HashMap::new()),
        }),
    };
    Harness {
        vector,
        lexical,
        embedding,
        completion,
        services,
    }
}

// ── Fixtures ────────────────────────────────────────────────────────────

fn page_point(book_id: i64, page: u32, score: f32) -> ScoredPoint {
    ScoredPoint {
        score,
        payload: json!({
            "book_id": book_id,
            "page": page,
            "book_title": "رياض الصالحين",
            "author_id": 3,
            "text": format!("نص الصفحه {page} من الكتاب {book_id}"),
        }),
    }
}

fn ayah_point(surah: u16, ayah: u16, score: f32) -> ScoredPoint {
    ScoredPoint {
        score,
        payload: json!({
            "surah": surah,
            "ayah": ayah,
            "surah_name": "البقرة",
            "text": format!("نص الآيه {surah}:{ayah}"),
        }),
    }
}

fn hadith_point(number: u32, score: f32) -> ScoredPoint {
    ScoredPoint {
        score,
        payload: json!({
            "collection": "bukhari",
            "number": number,
            "text": format!("نص الحديث {number}"),
        }),
    }
}

fn ayah_hit(surah: u16, ayah: u16, score: f32) -> LexicalHit {
    LexicalHit {
        score,
        highlighted: Some(format!("<em>نص</em> الآيه {surah}:{ayah}")),
        payload: json!({
            "surah": surah,
            "ayah": ayah,
            "surah_name": "البقرة",
            "text": format!("نص الآيه {surah}:{ayah}"),
        }),
    }
}

fn default_request() -> SearchRequest {
    SearchRequest::new("فضل قراءة القرآن والذكر")
}

// ── Standard mode ───────────────────────────────────────────────────────

#[tokio::test]
async fn hybrid_search_returns_all_three_types() {
    let h = harness(
        FakeVector {
            books: vec![page_point(3, 12, 0.9)],
            ayahs: vec![ayah_point(2, 255, 0.88)],
            hadiths: vec![hadith_point(7, 0.8)],
            ..Default::default()
        },
        FakeLexical {
            ayahs: vec![ayah_hit(2, 255, 11.0)],
            ..Default::default()
        },
        FakeCompletion::default(),
    );

    let response = maktaba_search::search(&default_request(), &h.services, &SearchConfig::default())
        .await
        .expect("search should succeed");

    assert_eq!(response.results.len(), 1);
    assert_eq!(response.ayahs.len(), 1);
    assert_eq!(response.hadiths.len(), 1);
    assert!(!response.rerank_timed_out);
    // The dual-source ayah keeps its highlighted snippet.
    assert!(response.ayahs[0].snippet.as_deref().expect("snippet").contains("<em>"));
    // Author enrichment resolved from the ranked book.
    assert_eq!(response.authors.len(), 1);
    assert_eq!(response.authors[0].name, "النووي");
}

#[tokio::test]
async fn disabled_content_types_stay_empty() {
    let h = harness(
        FakeVector {
            books: vec![page_point(3, 12, 0.9)],
            ayahs: vec![ayah_point(2, 255, 0.88)],
            hadiths: vec![hadith_point(7, 0.8)],
            ..Default::default()
        },
        FakeLexical {
            ayahs: vec![ayah_hit(2, 255, 11.0)],
            ..Default::default()
        },
        FakeCompletion::default(),
    );

    let request = SearchRequest {
        include_quran: false,
        include_hadith: false,
        ..default_request()
    };
    let response = maktaba_search::search(&request, &h.services, &SearchConfig::default())
        .await
        .expect("search should succeed");

    assert_eq!(response.results.len(), 1);
    assert!(response.ayahs.is_empty());
    assert!(response.hadiths.is_empty());
}

#[tokio::test]
async fn quoted_phrase_skips_semantic_entirely() {
    let h = harness(
        FakeVector {
            ayahs: vec![ayah_point(2, 255, 0.95)],
            ..Default::default()
        },
        FakeLexical {
            ayahs: vec![ayah_hit(2, 255, 12.0)],
            ..Default::default()
        },
        FakeCompletion::default(),
    );

    let request = SearchRequest::new("\"آية الكرسي\"");
    let response = maktaba_search::search(&request, &h.services, &SearchConfig::default())
        .await
        .expect("search should succeed");

    assert_eq!(h.embedding.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.vector.calls.load(Ordering::SeqCst), 0);
    assert_eq!(response.diagnostics.semantic_candidates, 0);
    // Keyword search still runs and produces the result.
    assert_eq!(response.ayahs.len(), 1);
    assert!(response.diagnostics.keyword_candidates > 0);
}

#[tokio::test]
async fn semantic_mode_never_contacts_lexical_service() {
    let h = harness(
        FakeVector {
            ayahs: vec![ayah_point(2, 255, 0.9)],
            ..Default::default()
        },
        FakeLexical {
            ayahs: vec![ayah_hit(2, 255, 12.0)],
            ..Default::default()
        },
        FakeCompletion::default(),
    );

    let request = SearchRequest {
        mode: SearchMode::Semantic,
        ..default_request()
    };
    let response = maktaba_search::search(&request, &h.services, &SearchConfig::default())
        .await
        .expect("search should succeed");

    assert_eq!(h.lexical.calls.load(Ordering::SeqCst), 0);
    assert_eq!(response.ayahs.len(), 1);
}

#[tokio::test]
async fn all_services_down_degrades_to_empty_lists() {
    let h = harness(
        FakeVector {
            fail: true,
            ..Default::default()
        },
        FakeLexical {
            fail: true,
            ..Default::default()
        },
        FakeCompletion::default(),
    );
    // Embedding failure too: the whole retrieval layer is dark.
    let services = SearchServices {
        embedding: Arc::new(FakeEmbedding {
            fail: true,
            calls: AtomicUsize::new(0),
        }),
        ..h.services
    };

    let response = maktaba_search::search(&default_request(), &services, &SearchConfig::default())
        .await
        .expect("degraded pipeline must not error");

    assert!(response.results.is_empty());
    assert!(response.ayahs.is_empty());
    assert!(response.hadiths.is_empty());
    assert!(response.authors.is_empty());
}

#[tokio::test]
async fn missing_vector_collection_is_fatal() {
    let h = harness(
        FakeVector {
            not_ready: true,
            ..Default::default()
        },
        FakeLexical::default(),
        FakeCompletion::default(),
    );

    let err = maktaba_search::search(&default_request(), &h.services, &SearchConfig::default())
        .await
        .expect_err("missing collection must surface");
    assert!(matches!(err, SearchError::IndexNotReady(_)));
}

#[tokio::test]
async fn empty_query_rejected_before_any_retrieval() {
    let h = harness(FakeVector::default(), FakeLexical::default(), FakeCompletion::default());

    let err = maktaba_search::search(
        &SearchRequest::new("  "),
        &h.services,
        &SearchConfig::default(),
    )
    .await
    .expect_err("empty query is invalid");
    assert!(matches!(err, SearchError::InvalidQuery(_)));
    assert_eq!(h.vector.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.lexical.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.embedding.calls.load(Ordering::SeqCst), 0);
}

// ── Reranking ───────────────────────────────────────────────────────────

fn three_ayah_vector() -> FakeVector {
    FakeVector {
        ayahs: vec![
            ayah_point(2, 255, 0.9),
            ayah_point(1, 1, 0.8),
            ayah_point(36, 1, 0.7),
        ],
        ..Default::default()
    }
}

fn ayah_keys(response: &maktaba_search::SearchResponse) -> Vec<(u16, u16)> {
    response
        .ayahs
        .iter()
        .map(|a| (a.payload.surah, a.payload.ayah))
        .collect()
}

#[tokio::test]
async fn reranker_none_preserves_fusion_order() {
    let h = harness(three_ayah_vector(), FakeLexical::default(), FakeCompletion::default());

    let request = SearchRequest {
        include_books: false,
        include_hadith: false,
        reranker: Reranker::None,
        ..default_request()
    };
    let response = maktaba_search::search(&request, &h.services, &SearchConfig::default())
        .await
        .expect("search should succeed");

    assert_eq!(ayah_keys(&response), vec![(2, 255), (1, 1), (36, 1)]);
    assert_eq!(h.completion.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn listwise_rerank_reorders_results() {
    let h = harness(
        three_ayah_vector(),
        FakeLexical::default(),
        FakeCompletion::scripted(vec![Step::Respond("[3, 1, 2]".into())]),
    );

    let request = SearchRequest {
        include_books: false,
        include_hadith: false,
        reranker: Reranker::Listwise {
            model: "gpt-4o-mini".into(),
            timeout: Duration::from_secs(18),
        },
        ..default_request()
    };
    let response = maktaba_search::search(&request, &h.services, &SearchConfig::default())
        .await
        .expect("search should succeed");

    assert_eq!(ayah_keys(&response), vec![(36, 1), (2, 255), (1, 1)]);
    assert!(!response.rerank_timed_out);
}

#[tokio::test]
async fn listwise_failure_falls_back_to_fusion_order() {
    let h = harness(
        three_ayah_vector(),
        FakeLexical::default(),
        FakeCompletion::scripted(vec![Step::Fail]),
    );

    let request = SearchRequest {
        include_books: false,
        include_hadith: false,
        reranker: Reranker::Listwise {
            model: "gpt-4o-mini".into(),
            timeout: Duration::from_secs(18),
        },
        ..default_request()
    };
    let response = maktaba_search::search(&request, &h.services, &SearchConfig::default())
        .await
        .expect("rerank failure must not fail the request");

    assert_eq!(ayah_keys(&response), vec![(2, 255), (1, 1), (36, 1)]);
    assert!(!response.rerank_timed_out);
}

#[tokio::test]
async fn listwise_timeout_sets_flag_and_keeps_order() {
    let h = harness(
        three_ayah_vector(),
        FakeLexical::default(),
        FakeCompletion::scripted(vec![Step::Timeout]),
    );

    let request = SearchRequest {
        include_books: false,
        include_hadith: false,
        reranker: Reranker::Listwise {
            model: "gpt-4o-mini".into(),
            timeout: Duration::from_secs(18),
        },
        ..default_request()
    };
    let response = maktaba_search::search(&request, &h.services, &SearchConfig::default())
        .await
        .expect("rerank timeout must not fail the request");

    assert_eq!(ayah_keys(&response), vec![(2, 255), (1, 1), (36, 1)]);
    assert!(response.rerank_timed_out);
}

#[tokio::test]
async fn limit_truncates_each_type() {
    let h = harness(three_ayah_vector(), FakeLexical::default(), FakeCompletion::default());

    let request = SearchRequest {
        include_books: false,
        include_hadith: false,
        limit: 2,
        ..default_request()
    };
    let response = maktaba_search::search(&request, &h.services, &SearchConfig::default())
        .await
        .expect("search should succeed");

    assert_eq!(response.ayahs.len(), 2);
    assert_eq!(ayah_keys(&response), vec![(2, 255), (1, 1)]);
}

// ── Refine mode ─────────────────────────────────────────────────────────

const EXPANSION_RESPONSE: &str =
    r#"[{"query": "ثواب تلاوة القرآن", "reason": "synonym"}]"#;

#[tokio::test]
async fn refine_merges_expanded_queries_and_reranks_unified() {
    let h = harness(
        FakeVector {
            books: vec![page_point(3, 12, 0.9), page_point(5, 80, 0.85)],
            ayahs: vec![ayah_point(2, 255, 0.88)],
            hadiths: vec![hadith_point(7, 0.8)],
            ..Default::default()
        },
        FakeLexical::default(),
        // Call 1: expansion. Call 2: unified rerank over 4 docs
        // (2 books, 1 ayah, 1 hadith) — rank ayah, then hadith, then one book.
        FakeCompletion::scripted(vec![
            Step::Respond(EXPANSION_RESPONSE.into()),
            Step::Respond("[3, 4, 1]".into()),
        ]),
    );

    let request = SearchRequest {
        refine: true,
        reranker: Reranker::Listwise {
            model: "gpt-4o-mini".into(),
            timeout: Duration::from_secs(18),
        },
        ..default_request()
    };
    let response = maktaba_search::search(&request, &h.services, &SearchConfig::default())
        .await
        .expect("refine search should succeed");

    assert_eq!(response.diagnostics.expanded_queries, 2);
    assert_eq!(h.completion.calls.load(Ordering::SeqCst), 2);

    // Unified ranking: ayah at position 0, hadith at 1, ranked book at 2,
    // omitted book appended at 3 — every document exactly once.
    assert_eq!(response.ayahs.len(), 1);
    assert!((response.ayahs[0].score - 1.0).abs() < f32::EPSILON);
    assert_eq!(response.hadiths.len(), 1);
    assert!((response.hadiths[0].score - 0.99).abs() < 1e-6);
    assert_eq!(response.results.len(), 2);
    assert!((response.results[0].score - 0.98).abs() < 1e-6);
    assert!((response.results[1].score - 0.97).abs() < 1e-6);
}

#[tokio::test]
async fn refine_with_warm_cache_is_idempotent_and_skips_llm() {
    let h = harness(
        FakeVector {
            ayahs: vec![ayah_point(2, 255, 0.9), ayah_point(1, 1, 0.8)],
            ..Default::default()
        },
        FakeLexical::default(),
        FakeCompletion::scripted(vec![Step::Respond(EXPANSION_RESPONSE.into())]),
    );

    let request = SearchRequest {
        include_books: false,
        include_hadith: false,
        refine: true,
        reranker: Reranker::None,
        ..default_request()
    };
    let cfg = SearchConfig::default();

    let first = maktaba_search::search(&request, &h.services, &cfg)
        .await
        .expect("first refine should succeed");
    let second = maktaba_search::search(&request, &h.services, &cfg)
        .await
        .expect("second refine should succeed");

    assert!(!first.diagnostics.expansion_cache_hit);
    assert!(second.diagnostics.expansion_cache_hit);
    assert_eq!(h.completion.calls.load(Ordering::SeqCst), 1);

    assert_eq!(ayah_keys(&first), ayah_keys(&second));
    let scores = |r: &maktaba_search::SearchResponse| {
        r.ayahs.iter().map(|a| a.score).collect::<Vec<_>>()
    };
    assert_eq!(scores(&first), scores(&second));
}

#[tokio::test]
async fn refine_expansion_failure_degrades_to_original_query() {
    let h = harness(
        FakeVector {
            ayahs: vec![ayah_point(2, 255, 0.9)],
            ..Default::default()
        },
        FakeLexical::default(),
        FakeCompletion::scripted(vec![Step::Fail]),
    );

    let request = SearchRequest {
        include_books: false,
        include_hadith: false,
        refine: true,
        reranker: Reranker::None,
        ..default_request()
    };
    let response = maktaba_search::search(&request, &h.services, &SearchConfig::default())
        .await
        .expect("expansion failure must not fail the request");

    assert_eq!(response.diagnostics.expanded_queries, 1);
    assert_eq!(response.ayahs.len(), 1);
}

#[tokio::test]
async fn unified_empty_ranking_keeps_merged_order() {
    let h = harness(
        FakeVector {
            books: vec![page_point(3, 12, 0.9)],
            ayahs: vec![ayah_point(2, 255, 0.88)],
            hadiths: vec![hadith_point(7, 0.8)],
            ..Default::default()
        },
        FakeLexical::default(),
        FakeCompletion::scripted(vec![
            Step::Respond(EXPANSION_RESPONSE.into()),
            Step::Respond("[]".into()),
        ]),
    );

    let request = SearchRequest {
        refine: true,
        reranker: Reranker::Listwise {
            model: "gpt-4o-mini".into(),
            timeout: Duration::from_secs(18),
        },
        ..default_request()
    };
    let response = maktaba_search::search(&request, &h.services, &SearchConfig::default())
        .await
        .expect("empty ranking must degrade, not drop results");

    // Merged order survives: every type still has its result.
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.ayahs.len(), 1);
    assert_eq!(response.hadiths.len(), 1);
    assert!(!response.rerank_timed_out);
}

#[tokio::test]
async fn unified_timeout_sets_flag_and_keeps_merged_order() {
    let h = harness(
        FakeVector {
            books: vec![page_point(3, 12, 0.9)],
            ayahs: vec![ayah_point(2, 255, 0.88)],
            hadiths: vec![hadith_point(7, 0.8)],
            ..Default::default()
        },
        FakeLexical::default(),
        FakeCompletion::scripted(vec![
            Step::Respond(EXPANSION_RESPONSE.into()),
            Step::Timeout,
        ]),
    );

    let request = SearchRequest {
        refine: true,
        reranker: Reranker::Listwise {
            model: "gpt-4o-mini".into(),
            timeout: Duration::from_secs(18),
        },
        ..default_request()
    };
    let response = maktaba_search::search(&request, &h.services, &SearchConfig::default())
        .await
        .expect("unified timeout must degrade");

    assert!(response.rerank_timed_out);
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.ayahs.len(), 1);
    assert_eq!(response.hadiths.len(), 1);
}
