use std::time::Duration;

use crag_rag::{RagConfig, RagError, RetryConfig};

#[test]
fn defaults_describe_the_reference_pipeline() {
    let config = RagConfig::default();
    assert_eq!((config.chunk_size, config.chunk_overlap), (800, 100));
    assert_eq!((config.bm25_k, config.semantic_k, config.mmr_fetch_k), (10, 20, 20));
    assert_eq!((config.semantic_weight, config.lexical_weight), (0.5, 0.5));
    assert_eq!(config.rerank_top_n, Some(3));
    assert_eq!(config.memory_window, 4);
    assert_eq!(config.contextualize.target_language, "Spanish");
    config.validate().unwrap();
}

#[test]
fn partial_json_files_take_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crag.json");
    std::fs::write(&path, r#"{ "chunk_size": 400, "retry": { "max_retries": 5 }, "data_dir": "/srv/crag" }"#).unwrap();

    let config = RagConfig::from_json_file(&path).unwrap();
    assert_eq!(config.chunk_size, 400);
    assert_eq!(config.chunk_overlap, 100);
    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(config.retry.timeout_secs, 60);
    assert_eq!(config.data_dir, std::path::PathBuf::from("/srv/crag"));
}

#[test]
fn inconsistent_settings_are_rejected() {
    let overlap = RagConfig::builder().chunk_size(100).chunk_overlap(100).build();
    assert!(matches!(overlap, Err(RagError::ConfigError(_))));
    assert!(RagConfig::builder().lambda_mult(1.5).build().is_err());
    assert!(RagConfig::builder().weights(0.0, 0.0).build().is_err());
    assert!(RagConfig::builder().weights(-1.0, 1.0).build().is_err());
    assert!(RagConfig::builder().rerank_top_n(Some(0)).build().is_err());
    assert!(RagConfig::builder().redundancy_threshold(1.2).build().is_err());
    assert!(RagConfig::builder().memory_window(0).build().is_err());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crag.json");
    std::fs::write(&path, r#"{ "chunk_size": 0 }"#).unwrap();
    assert!(matches!(RagConfig::from_json_file(&path), Err(RagError::ConfigError(_))));
}

#[test]
fn backoff_doubles_up_to_the_cap() {
    let retry = RetryConfig { max_retries: 6, initial_backoff_ms: 500, max_backoff_ms: 3_000, timeout_secs: 10 };
    let delays: Vec<_> = (1..=5).map(|n| retry.backoff(n)).collect();
    assert_eq!(
        delays,
        [500, 1_000, 2_000, 3_000, 3_000].map(Duration::from_millis).to_vec()
    );
    assert_eq!(retry.timeout(), Duration::from_secs(10));
}
