mod common;

use common::chunk;
use crag_rag::bm25::{lexical_index_path, load_lexical_index, save_lexical_index, stage_lexical_index};
use crag_rag::{Bm25Index, Bm25Params, Chunk, RagError};
use proptest::prelude::*;

fn corpus() -> Vec<Chunk> {
    vec![
        chunk("c0", "Un sistema complejo está formado por muchos elementos que interactúan."),
        chunk("c1", "Los bucles de retroalimentación regulan el comportamiento del sistema."),
        chunk("c2", "El diseño de servicios parte de las necesidades de las personas."),
        chunk("c3", "Un sistema complejo muestra comportamiento emergente y no lineal."),
    ]
}

fn without_timestamp(index: &Bm25Index) -> serde_json::Value {
    let mut value = serde_json::to_value(index).unwrap();
    value.as_object_mut().unwrap().remove("built_at");
    value
}

#[test]
fn ranks_matching_chunks_only() {
    let index = Bm25Index::build(&corpus(), Bm25Params::default());
    let results = index.query("¿qué es un sistema complejo?", 10);

    let ids: Vec<_> = results.iter().map(|r| r.chunk.id.as_str()).collect();
    assert_eq!(ids.len(), 3, "c2 shares no term with the query: {ids:?}");
    assert!(!ids.contains(&"c2"));
    assert!(ids[..2].contains(&"c0") && ids[..2].contains(&"c3"));
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn k_bounds_the_result_count() {
    let index = Bm25Index::build(&corpus(), Bm25Params::default());
    assert_eq!(index.query("sistema", 1).len(), 1);
    assert!(index.query("sistema", 0).is_empty());
    assert!(index.query("inexistente", 10).is_empty());
}

#[test]
fn persisted_form_is_explicit_json() {
    let index = Bm25Index::build(&corpus(), Bm25Params::default());
    let value = serde_json::to_value(&index).unwrap();

    assert_eq!(value["version"], 1);
    assert_eq!(value["params"]["k1"], 1.5);
    assert_eq!(value["params"]["b"], 0.75);
    assert!(value["built_at"].is_string());
    assert_eq!(value["postings"]["sistema"]["document_frequency"], 3);
    assert_eq!(value["postings"]["sistema"]["postings"][0]["chunk"], 0);
    assert_eq!(value["chunk_lengths"].as_array().map(Vec::len), Some(4));
    assert_eq!(value["chunks"][2]["id"], "c2");

    let terms: Vec<_> = value["postings"].as_object().unwrap().keys().cloned().collect();
    let mut sorted = terms.clone();
    sorted.sort();
    assert_eq!(terms, sorted);
}

#[tokio::test]
async fn save_then_load_preserves_rankings() {
    let dir = tempfile::tempdir().unwrap();
    let path = lexical_index_path(dir.path(), "design");
    let index = Bm25Index::build(&corpus(), Bm25Params::default());

    save_lexical_index(&index, &path).await.unwrap();
    assert!(path.ends_with("design_bm25"));
    let loaded = load_lexical_index(&path, "design").await.unwrap();

    let query = "comportamiento del sistema";
    let before: Vec<_> = index.query(query, 10).into_iter().map(|r| (r.chunk.id, r.score)).collect();
    let after: Vec<_> = loaded.query(query, 10).into_iter().map(|r| (r.chunk.id, r.score)).collect();
    assert_eq!(before, after);
    assert_eq!(loaded.built_at(), index.built_at());
}

#[tokio::test]
async fn rebuilding_replaces_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = lexical_index_path(dir.path(), "design");

    save_lexical_index(&Bm25Index::build(&corpus(), Bm25Params::default()), &path).await.unwrap();
    save_lexical_index(&Bm25Index::build(&corpus()[..1], Bm25Params::default()), &path).await.unwrap();

    let loaded = load_lexical_index(&path, "design").await.unwrap();
    assert_eq!(loaded.len(), 1);
    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from("design_bm25")]);
}

#[tokio::test]
async fn missing_file_names_the_expected_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = lexical_index_path(&dir.path().join("data"), "nada");

    match load_lexical_index(&path, "nada").await {
        Err(RagError::MissingIndex { collection, path: reported }) => {
            assert_eq!(collection, "nada");
            assert!(reported.ends_with("data/nada_bm25"));
        }
        other => panic!("expected MissingIndex, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_versions_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = lexical_index_path(dir.path(), "design");
    let mut value = serde_json::to_value(Bm25Index::build(&corpus(), Bm25Params::default())).unwrap();
    value["version"] = serde_json::json!(2);
    std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

    let err = load_lexical_index(&path, "design").await.unwrap_err();
    assert!(matches!(err, RagError::IndexFormat(_)), "{err:?}");
}

#[tokio::test]
async fn garbage_is_reported_as_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = lexical_index_path(dir.path(), "design");
    std::fs::write(&path, b"\x80\x04\x95 not json").unwrap();

    let err = load_lexical_index(&path, "design").await.unwrap_err();
    assert!(matches!(err, RagError::IndexFormat(_)), "{err:?}");
}

fn arb_chunks() -> impl Strategy<Value = Vec<Chunk>> {
    proptest::collection::vec("(sistema|complejo|diseño|bucle|flujo|stock)( (sistema|complejo|diseño|bucle|flujo|stock)){0,12}", 1..15)
        .prop_map(|texts| texts.iter().enumerate().map(|(i, t)| chunk(&format!("c{i}"), t)).collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn rebuilds_are_identical(chunks in arb_chunks(), query in "(sistema|diseño|flujo|otro)( (bucle|stock|nada)){0,3}") {
        let first = Bm25Index::build(&chunks, Bm25Params::default());
        let second = Bm25Index::build(&chunks, Bm25Params::default());

        let a: Vec<_> = first.query(&query, 10).into_iter().map(|r| (r.chunk.id, r.score)).collect();
        let b: Vec<_> = second.query(&query, 10).into_iter().map(|r| (r.chunk.id, r.score)).collect();
        prop_assert_eq!(a, b);
        prop_assert_eq!(without_timestamp(&first), without_timestamp(&second));
        prop_assert_eq!(
            serde_json::to_string(&without_timestamp(&first)).unwrap(),
            serde_json::to_string(&without_timestamp(&second)).unwrap()
        );
    }

    #[test]
    fn scores_are_positive_and_sorted(chunks in arb_chunks(), query in "(sistema|complejo|flujo)") {
        let index = Bm25Index::build(&chunks, Bm25Params::default());
        let results = index.query(&query, 20);
        prop_assert!(results.iter().all(|r| r.score > 0.0));
        prop_assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }
}

#[tokio::test]
async fn staged_index_is_invisible_until_committed() {
    let dir = tempfile::tempdir().unwrap();
    let path = lexical_index_path(dir.path(), "design");
    let old = Bm25Index::build(&corpus()[..1], Bm25Params::default());
    save_lexical_index(&old, &path).await.unwrap();

    let staged = stage_lexical_index(&Bm25Index::build(&corpus(), Bm25Params::default()), &path).await.unwrap();
    assert!(staged.staging_path().exists());
    assert_eq!(load_lexical_index(&path, "design").await.unwrap().len(), 1);

    staged.discard().await;
    assert!(!dir.path().join("design_bm25.tmp").exists());
    assert_eq!(load_lexical_index(&path, "design").await.unwrap().len(), 1);

    let staged = stage_lexical_index(&Bm25Index::build(&corpus(), Bm25Params::default()), &path).await.unwrap();
    assert_eq!(staged.commit().await.unwrap(), path);
    assert_eq!(load_lexical_index(&path, "design").await.unwrap().len(), 4);
}

#[tokio::test]
async fn failed_commit_removes_the_staging_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = lexical_index_path(dir.path(), "design");
    // A non-empty directory at the target cannot be renamed over.
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("ocupado"), b"x").unwrap();

    let staged = stage_lexical_index(&Bm25Index::build(&corpus(), Bm25Params::default()), &path).await.unwrap();
    assert!(staged.commit().await.is_err());
    assert!(!dir.path().join("design_bm25.tmp").exists());
    assert!(path.join("ocupado").exists());
}
