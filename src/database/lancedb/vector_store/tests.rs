use super::*;
use tempfile::TempDir;

fn create_test_config() -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::with_base_dir(temp_dir.path());
    (config, temp_dir)
}

fn record(source: &str, index: u32, vector: Vec<f32>) -> CaseRecord {
    CaseRecord {
        id: format!("{}-{}", source, index),
        vector,
        metadata: CaseChunkMetadata {
            source: source.to_string(),
            chunk_index: index,
            char_offset: index * 1500,
            content: format!("Chunk {} of {}", index, source),
            created_at: "2024-01-01T00:00:00Z".to_string(),
        },
    }
}

#[tokio::test]
async fn new_store_is_empty_and_lazy() {
    let (config, _temp_dir) = create_test_config();
    let store = VectorStore::new(&config)
        .await
        .expect("should create vector store");

    assert_eq!(store.table_name, TABLE_NAME);
    assert_eq!(store.dimension(), None);
    assert!(!store.table_exists().await.expect("can list tables"));
    assert_eq!(store.count_records().await.expect("can count"), 0);
}

#[tokio::test]
async fn searching_an_empty_store_returns_nothing() {
    let (config, _temp_dir) = create_test_config();
    let store = VectorStore::new(&config)
        .await
        .expect("should create vector store");

    let results = store
        .search_similar(&[1.0, 0.0, 0.0], 4)
        .await
        .expect("search succeeds");
    assert!(results.is_empty());
}

#[tokio::test]
async fn store_and_count_records() {
    let (config, _temp_dir) = create_test_config();
    let mut store = VectorStore::new(&config)
        .await
        .expect("should create vector store");

    let written = store
        .store_records(&[
            record("a.pdf", 0, vec![1.0, 0.0, 0.0]),
            record("a.pdf", 1, vec![0.0, 1.0, 0.0]),
            record("b.pdf", 0, vec![0.0, 0.0, 1.0]),
        ])
        .await
        .expect("should store records");

    assert_eq!(written, 3);
    assert_eq!(store.dimension(), Some(3));
    assert_eq!(store.count_records().await.expect("can count"), 3);
}

#[tokio::test]
async fn storing_nothing_is_a_no_op() {
    let (config, _temp_dir) = create_test_config();
    let mut store = VectorStore::new(&config)
        .await
        .expect("should create vector store");

    assert_eq!(store.store_records(&[]).await.expect("no-op"), 0);
    assert!(!store.table_exists().await.expect("can list tables"));
}

#[tokio::test]
async fn search_ranks_best_first_and_respects_limit() {
    let (config, _temp_dir) = create_test_config();
    let mut store = VectorStore::new(&config)
        .await
        .expect("should create vector store");

    store
        .store_records(&[
            record("far.pdf", 0, vec![0.0, 0.0, 1.0]),
            record("near.pdf", 0, vec![0.9, 0.1, 0.0]),
            record("exact.pdf", 0, vec![1.0, 0.0, 0.0]),
            record("mid.pdf", 0, vec![0.5, 0.5, 0.0]),
        ])
        .await
        .expect("should store records");

    let results = store
        .search_similar(&[1.0, 0.0, 0.0], 2)
        .await
        .expect("search succeeds");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].metadata.source, "exact.pdf");
    assert_eq!(results[1].metadata.source, "near.pdf");
    assert!((results[0].similarity_score - 1.0).abs() < 1e-4);

    let all = store
        .search_similar(&[1.0, 0.0, 0.0], 10)
        .await
        .expect("search succeeds");
    assert_eq!(all.len(), 4);
    for pair in all.windows(2) {
        assert!(pair[0].similarity_score >= pair[1].similarity_score);
    }
}

#[tokio::test]
async fn query_dimension_mismatch_is_an_error() {
    let (config, _temp_dir) = create_test_config();
    let mut store = VectorStore::new(&config)
        .await
        .expect("should create vector store");

    store
        .store_records(&[record("a.pdf", 0, vec![1.0, 0.0, 0.0])])
        .await
        .expect("should store records");

    assert!(store.search_similar(&[1.0, 0.0], 4).await.is_err());
}

#[tokio::test]
async fn delete_source_removes_only_that_source() {
    let (config, _temp_dir) = create_test_config();
    let mut store = VectorStore::new(&config)
        .await
        .expect("should create vector store");

    store
        .store_records(&[
            record("o'brien.pdf", 0, vec![1.0, 0.0]),
            record("o'brien.pdf", 1, vec![0.9, 0.1]),
            record("keep.pdf", 0, vec![0.0, 1.0]),
        ])
        .await
        .expect("should store records");

    store
        .delete_source("o'brien.pdf")
        .await
        .expect("delete succeeds");

    assert_eq!(store.count_records().await.expect("can count"), 1);
    let results = store
        .search_similar(&[1.0, 0.0], 10)
        .await
        .expect("search succeeds");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].metadata.source, "keep.pdf");
}

#[tokio::test]
async fn mixed_dimensions_in_one_batch_are_rejected() {
    let (config, _temp_dir) = create_test_config();
    let mut store = VectorStore::new(&config)
        .await
        .expect("should create vector store");

    let result = store
        .store_records(&[record("a.pdf", 0, vec![1.0, 0.0]), record("a.pdf", 1, vec![1.0])])
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn dimension_change_on_populated_store_requires_reset() {
    let (config, _temp_dir) = create_test_config();
    let mut store = VectorStore::new(&config)
        .await
        .expect("should create vector store");

    store
        .store_records(&[record("a.pdf", 0, vec![1.0, 0.0, 0.0])])
        .await
        .expect("should store records");

    let error = store
        .store_records(&[record("b.pdf", 0, vec![1.0, 0.0])])
        .await
        .expect_err("dimension change must fail");
    assert!(error.to_string().contains("--reset"));

    store.reset().await.expect("reset succeeds");
    assert_eq!(store.count_records().await.expect("can count"), 0);

    store
        .store_records(&[record("b.pdf", 0, vec![1.0, 0.0])])
        .await
        .expect("store accepts new dimension after reset");
    assert_eq!(store.dimension(), Some(2));
}

#[tokio::test]
async fn records_survive_reopening() {
    let (config, _temp_dir) = create_test_config();
    {
        let mut store = VectorStore::new(&config)
            .await
            .expect("should create vector store");
        store
            .store_records(&[record("a.pdf", 0, vec![0.6, 0.8])])
            .await
            .expect("should store records");
    }

    let reopened = VectorStore::new(&config)
        .await
        .expect("should reopen vector store");
    assert_eq!(reopened.dimension(), Some(2));

    let results = reopened
        .search(&[0.6, 0.8], 1)
        .await
        .expect("search succeeds");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].metadata.content, "Chunk 0 of a.pdf");
    assert_eq!(results[0].metadata.char_offset, 0);
}
