// Offline index build and load through the public API.

use stack_sage::build_index;
use stack_sage::error::SageError;
use stack_sage::retrieval::{HybridRetriever, LocalHashEmbedder};
use std::sync::Arc;

const SOURCE: &str = "\
100.1. These Magic rules apply to any Magic game with two or more players.

405.1. When a spell is cast, it goes on top of the stack.

405.6. The topmost object on the stack resolves first, last in first out.

601.2a. To propose the casting of a spell, a player moves that card to the stack.

704.5g. A creature dealt lethal damage is destroyed as a state-based action.
";

#[tokio::test]
async fn test_build_then_load_and_query() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rules_index.json");

    let metadata = build_index(SOURCE, &path, &LocalHashEmbedder).await.unwrap();
    assert_eq!(metadata.chunk_count, 5);
    assert_eq!(metadata.dimension, 384);
    assert!(!metadata.source_sha256.is_empty());

    let retriever = HybridRetriever::load(&path, Arc::new(LocalHashEmbedder)).unwrap();
    assert_eq!(retriever.chunk_count(), 5);

    let results = retriever
        .retrieve("what resolves first on the stack", 3, 0.0)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results[0].rule_id.starts_with("405"));
}

#[tokio::test]
async fn test_build_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("rules.txt");
    let index_path = dir.path().join("rules_index.json");
    std::fs::write(&source_path, SOURCE).unwrap();

    let metadata =
        stack_sage::retrieval::build_index_from_file(&source_path, &index_path, &LocalHashEmbedder)
            .await
            .unwrap();
    assert_eq!(metadata.chunk_count, 5);

    let missing = dir.path().join("nope.txt");
    let err =
        stack_sage::retrieval::build_index_from_file(&missing, &index_path, &LocalHashEmbedder)
            .await
            .unwrap_err();
    assert!(matches!(err, SageError::NotFound(_)));
}

#[tokio::test]
async fn test_empty_source_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rules_index.json");

    let err = build_index("no numbered rules here", &path, &LocalHashEmbedder)
        .await
        .unwrap_err();
    assert!(matches!(err, SageError::InvalidQuery(_)));
}

#[tokio::test]
async fn test_load_missing_index_fails() {
    let err = HybridRetriever::load(
        std::path::Path::new("/nonexistent/rules_index.json"),
        Arc::new(LocalHashEmbedder),
    )
    .unwrap_err();
    assert!(matches!(err, SageError::IndexUnavailable(_)));
}
