mod common;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use common::{HashEmbedder, KeywordReranker, TableReranker, chunk, result};
use crag_rag::ensemble::{DEFAULT_RRF_C, weighted_rrf};
use crag_rag::{
    Bm25Index, Bm25Params, Bm25Retriever, CompressorPipeline, EmbeddingProvider, EnsembleRetriever,
    InMemoryVectorStore, MmrRetriever, RagError, RedundancyFilter, RerankStage, Result, Retriever, SearchResult,
    SemanticIndex, VectorStore,
};
use proptest::prelude::*;

struct FixedRetriever(Vec<SearchResult>);

#[async_trait]
impl Retriever for FixedRetriever {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn retrieve(&self, _query: &str) -> Result<Vec<SearchResult>> {
        Ok(self.0.clone())
    }
}

struct FailingRetriever;

#[async_trait]
impl Retriever for FailingRetriever {
    fn name(&self) -> &str {
        "failing"
    }

    async fn retrieve(&self, _query: &str) -> Result<Vec<SearchResult>> {
        Err(RagError::VectorStoreError { backend: "test".into(), message: "connection lost".into() })
    }
}

fn texts(results: &[SearchResult]) -> Vec<&str> {
    results.iter().map(|r| r.chunk.text.as_str()).collect()
}

#[tokio::test]
async fn ensemble_fuses_both_retrievers() {
    let semantic = FixedRetriever(vec![result("a", 0.9), result("b", 0.8)]);
    let lexical = FixedRetriever(vec![result("b", 12.0), result("c", 3.0)]);
    let ensemble =
        EnsembleRetriever::new(vec![(Arc::new(semantic), 0.5), (Arc::new(lexical), 0.5)], DEFAULT_RRF_C).unwrap();

    let fused = ensemble.retrieve("q").await.unwrap();
    assert_eq!(texts(&fused), vec!["b", "a", "c"]);
}

#[tokio::test]
async fn a_failing_sub_retriever_fails_the_query() {
    let ensemble = EnsembleRetriever::new(
        vec![(Arc::new(FixedRetriever(vec![result("a", 1.0)])), 0.5), (Arc::new(FailingRetriever), 0.5)],
        DEFAULT_RRF_C,
    )
    .unwrap();

    let err = ensemble.retrieve("q").await.unwrap_err();
    assert!(matches!(err, RagError::VectorStoreError { .. }), "{err:?}");
}

#[test]
fn ensemble_rejects_bad_weights() {
    let one = || -> Arc<dyn Retriever> { Arc::new(FixedRetriever(Vec::new())) };
    assert!(EnsembleRetriever::new(Vec::new(), DEFAULT_RRF_C).is_err());
    assert!(EnsembleRetriever::new(vec![(one(), -0.5), (one(), 1.0)], DEFAULT_RRF_C).is_err());
    assert!(EnsembleRetriever::new(vec![(one(), 0.0), (one(), 0.0)], DEFAULT_RRF_C).is_err());
    assert!(EnsembleRetriever::new(vec![(one(), f32::NAN)], DEFAULT_RRF_C).is_err());
}

#[test]
fn weights_tilt_the_fusion() {
    let semantic = vec![result("s", 1.0)];
    let lexical = vec![result("l", 1.0)];
    let fused = weighted_rrf(&[(semantic, 0.2), (lexical, 0.8)], DEFAULT_RRF_C);
    assert_eq!(texts(&fused), vec!["l", "s"]);
}

fn arb_lists() -> impl Strategy<Value = Vec<Vec<String>>> {
    let list = proptest::collection::hash_set("[a-f]", 0..6).prop_map(|s| s.into_iter().collect::<Vec<_>>());
    proptest::collection::vec(list, 1..4)
}

proptest! {
    #[test]
    fn fusion_never_duplicates(lists in arb_lists(), weight in 0.1f32..1.0) {
        let input: Vec<(Vec<SearchResult>, f32)> = lists
            .iter()
            .map(|l| (l.iter().map(|t| result(t, 1.0)).collect(), weight))
            .collect();
        let fused = weighted_rrf(&input, DEFAULT_RRF_C);

        let total: usize = lists.iter().map(Vec::len).sum();
        prop_assert!(fused.len() <= total);
        let unique: HashSet<_> = fused.iter().map(|r| r.chunk.identity()).collect();
        prop_assert_eq!(unique.len(), fused.len());
        let expected: HashSet<_> = lists.iter().flatten().cloned().collect();
        let actual: HashSet<_> = fused.iter().map(|r| r.chunk.text.clone()).collect();
        prop_assert_eq!(actual, expected);
        prop_assert!(fused.windows(2).all(|w| w[0].score >= w[1].score));
    }
}

async fn semantic_fixture(dims: usize) -> (SemanticIndex, Arc<HashEmbedder>) {
    let embedder = Arc::new(HashEmbedder::new(dims));
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let index = SemanticIndex::new(store, embedder.clone());
    let chunks = vec![
        chunk("c0", "sistema complejo con muchos elementos"),
        chunk("c1", "sistema complejo con muchos elementos"),
        chunk("c2", "bucles de retroalimentación del sistema"),
        chunk("c3", "recetas de cocina mediterránea"),
    ];
    index.build("design", chunks, 2).await.unwrap();
    (index, embedder)
}

#[tokio::test]
async fn mmr_prefers_diverse_results() {
    let (index, embedder) = semantic_fixture(64).await;
    assert_eq!(embedder.batch_calls(), 2, "four chunks in batches of two");

    let relevance_only = index.query("design", "sistema complejo", 2, 4, 1.0).await.unwrap();
    let ids: Vec<_> = relevance_only.iter().map(|r| r.chunk.id.as_str()).collect();
    assert_eq!(ids, vec!["c0", "c1"]);

    let diverse = index.query("design", "sistema complejo", 2, 4, 0.5).await.unwrap();
    assert_eq!(diverse[0].chunk.id, "c0");
    assert_ne!(diverse[1].chunk.text, diverse[0].chunk.text, "the exact duplicate is not picked second");
    assert!(diverse.iter().all(|r| (-1.0..=1.0001).contains(&r.score)));
}

#[tokio::test]
async fn mmr_retriever_returns_at_most_k() {
    let (index, _) = semantic_fixture(64).await;
    let retriever = MmrRetriever::new(index, "design", 3, 2, 0.6);
    assert_eq!(retriever.retrieve("sistema").await.unwrap().len(), 3);
}

#[tokio::test]
async fn query_with_another_dimensionality_is_rejected() {
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    SemanticIndex::new(store.clone(), Arc::new(HashEmbedder::new(64)))
        .build("design", vec![chunk("c0", "sistema")], 8)
        .await
        .unwrap();

    let mismatched = SemanticIndex::new(store, Arc::new(HashEmbedder::new(32)));
    match mismatched.query("design", "sistema", 2, 4, 0.6).await {
        Err(RagError::EmbeddingMismatch { expected, actual, .. }) => {
            assert_eq!(expected, 64);
            assert_eq!(actual, 32);
        }
        other => panic!("expected EmbeddingMismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn bm25_retriever_respects_k() {
    let index = Bm25Index::build(
        &[chunk("a", "sistema"), chunk("b", "sistema complejo"), chunk("c", "sistema abierto")],
        Bm25Params::default(),
    );
    let retriever = Bm25Retriever::new(Arc::new(index), 2);
    assert_eq!(retriever.retrieve("sistema").await.unwrap().len(), 2);
}

#[tokio::test]
async fn redundancy_filter_keeps_the_earlier_duplicate() {
    let embedder = Arc::new(HashEmbedder::new(64));
    let filter = CompressorPipeline::new().with_stage(RedundancyFilter::new(embedder.clone(), 0.95));

    let mut later = result("sistema complejo emergente", 0.1);
    later.chunk.id = "later".to_string();
    let candidates = vec![
        result("sistema complejo emergente", 0.9),
        result("recetas de cocina", 0.5),
        later,
    ];

    let kept = filter.compress("q", candidates).await.unwrap();
    assert_eq!(texts(&kept), vec!["sistema complejo emergente", "recetas de cocina"]);
    assert_ne!(kept[0].chunk.id, "later");
    assert_eq!(embedder.batch_calls(), 1, "missing embeddings are fetched in one batch");
    assert_eq!(embedder.single_calls(), 0);
}

#[tokio::test]
async fn redundancy_filter_reuses_stored_embeddings() {
    let embedder = Arc::new(HashEmbedder::new(8));
    let mut a = result("a", 1.0);
    a.chunk.embedding = vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    let mut b = result("b", 1.0);
    b.chunk.embedding = vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];

    let kept = CompressorPipeline::new()
        .with_stage(RedundancyFilter::new(embedder.clone(), 0.95))
        .compress("q", vec![a, b])
        .await
        .unwrap();
    assert_eq!(kept.len(), 2);
    assert_eq!(embedder.batch_calls(), 0);
}

#[tokio::test]
async fn rerank_sorts_regardless_of_returned_order() {
    let reranker = TableReranker {
        scores: vec![("a".into(), 0.2), ("b".into(), 0.9), ("c".into(), 0.5), ("d".into(), 0.7)],
    };
    let stage = RerankStage::new(Arc::new(reranker), None, None);
    let pipeline = CompressorPipeline::new().with_stage(stage);

    let out = pipeline
        .compress("q", vec![result("a", 0.0), result("b", 0.0), result("c", 0.0), result("d", 0.0)])
        .await
        .unwrap();
    assert_eq!(texts(&out), vec!["b", "d", "c", "a"]);
}

#[tokio::test]
async fn rerank_applies_floor_then_top_n() {
    let reranker = TableReranker {
        scores: vec![("a".into(), 0.2), ("b".into(), 0.9), ("c".into(), 0.5), ("d".into(), 0.7)],
    };
    let pipeline = CompressorPipeline::new().with_stage(RerankStage::new(Arc::new(reranker), Some(2), Some(0.6)));
    let out = pipeline
        .compress("q", vec![result("a", 0.0), result("b", 0.0), result("c", 0.0), result("d", 0.0)])
        .await
        .unwrap();
    assert_eq!(texts(&out), vec!["b", "d"]);

    let reranker = TableReranker { scores: vec![("a".into(), 0.9), ("b".into(), 0.8)] };
    let pipeline = CompressorPipeline::new().with_stage(RerankStage::new(Arc::new(reranker), Some(3), Some(0.95)));
    let out = pipeline.compress("q", vec![result("a", 0.0), result("b", 0.0)]).await.unwrap();
    assert!(out.is_empty(), "a floor above every score leaves nothing");
}

#[tokio::test]
async fn empty_input_skips_every_stage() {
    let embedder = Arc::new(HashEmbedder::new(16));
    let reranker = Arc::new(KeywordReranker::default());
    let pipeline = CompressorPipeline::new()
        .with_stage(RedundancyFilter::new(embedder.clone(), 0.95))
        .with_stage(RerankStage::new(reranker.clone(), Some(3), None));
    assert_eq!(pipeline.len(), 2);

    let out = pipeline.compress("q", Vec::new()).await.unwrap();
    assert!(out.is_empty());
    assert_eq!(reranker.calls(), 0);
    assert_eq!(embedder.batch_calls(), 0);
}

#[tokio::test]
async fn stages_run_in_order() {
    let embedder = Arc::new(HashEmbedder::new(64));
    let reranker = Arc::new(KeywordReranker::default());
    let pipeline = CompressorPipeline::new()
        .with_stage(RedundancyFilter::new(embedder, 0.95))
        .with_stage(RerankStage::new(reranker.clone(), Some(3), None));

    let candidates = vec![
        result("flujo de materiales", 0.9),
        result("sistema complejo", 0.8),
        result("sistema complejo", 0.7),
        result("un sistema complejo y abierto", 0.6),
    ];
    let out = pipeline.compress("sistema complejo abierto", candidates).await.unwrap();

    assert_eq!(reranker.calls(), 1);
    assert_eq!(texts(&out), vec!["un sistema complejo y abierto", "sistema complejo", "flujo de materiales"]);
}

#[test]
fn embedders_agree_with_their_dimensions() {
    let embedder = HashEmbedder::new(12);
    assert_eq!(embedder.dimensions(), 12);
    assert_eq!(embedder.vector("sistema").len(), 12);
}
