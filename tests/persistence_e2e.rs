use embedstore::{EMBEDDING_DIM, Error, VectorStore, content_id, find_similar};
use std::time::Instant;
use tempfile::TempDir;

fn random_vector(seed: u64) -> Vec<f32> {
    // Simple LCG pseudo-random generator (no external dep needed)
    let mut state = seed;
    (0..EMBEDDING_DIM)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            // Map to [-1.0, 1.0]
            ((state >> 33) as f32) / (u32::MAX as f32) * 2.0 - 1.0
        })
        .collect()
}

fn round_trip(file_name: &str) {
    let num_records = 300;
    let num_searches = 50;
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(file_name);

    println!("\n=== Persistence E2E Test ({}) ===", file_name);

    // Phase 1: Insert, every insert rewrites the snapshot
    let start = Instant::now();
    let mut store = VectorStore::open(&path).unwrap();
    for i in 0..num_records {
        store.insert(&format!("sentence number {}", i), random_vector(i as u64)).unwrap();
    }
    assert_eq!(store.len(), num_records);
    println!("Phase 1 - Insert {} records: {:.3}s", num_records, start.elapsed().as_secs_f64());

    let file_size = std::fs::metadata(&path).unwrap().len();
    println!("Snapshot size: {:.2} MB", file_size as f64 / 1_048_576.0);

    // Phase 2: Reopen from disk
    let start = Instant::now();
    let reopened = VectorStore::open(&path).unwrap();
    println!("Phase 2 - Reopen: {:.3}s", start.elapsed().as_secs_f64());

    assert_eq!(reopened.len(), num_records);
    for (before, after) in store.records().zip(reopened.records()) {
        assert_eq!(before.id, after.id);
        assert_eq!(before.text, after.text);
        assert_eq!(before.vector, after.vector);
    }

    // Phase 3: Searches on the reopened store
    let start = Instant::now();
    for i in 0..num_searches {
        let target = (i * 7) % num_records;
        let results = find_similar(&random_vector(target as u64), &reopened, 10).unwrap();

        assert_eq!(results.len(), 10);
        assert_eq!(results[0].text, format!("sentence number {}", target));
        for w in results.windows(2) {
            assert!(w[0].score >= w[1].score, "Results not sorted by score");
        }
    }
    println!("Phase 3 - {} searches: {:.3}s\n", num_searches, start.elapsed().as_secs_f64());
}

#[test]
fn test_json_snapshot_round_trip() {
    round_trip("embeddings.json");
}

#[test]
fn test_bincode_snapshot_round_trip() {
    round_trip("embeddings.bin");
}

#[test]
fn test_duplicates_survive_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("embeddings.json");

    let mut store = VectorStore::open(&path).unwrap();
    store.insert("persisted once", random_vector(1)).unwrap();
    drop(store);

    let mut store = VectorStore::open(&path).unwrap();
    match store.insert("persisted once", random_vector(2)) {
        Err(Error::DuplicateEntry { id }) => assert_eq!(id, content_id("persisted once")),
        other => panic!("expected DuplicateEntry, got {:?}", other),
    }
    assert_eq!(store.len(), 1);
}

#[test]
fn test_reads_column_snapshot_written_elsewhere() {
    // Hand-written snapshot in the column layout other writers produce
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("embeddings.json");
    let texts = ["The cat sat on the mat.", "Spam and eggs is a delicious breakfast."];
    let snapshot = serde_json::json!({
        "ID": texts.iter().map(|t| content_id(t)).collect::<Vec<_>>(),
        "Text": texts,
        "Embeddings": [vec![0.5f32; EMBEDDING_DIM], vec![-0.5f32; EMBEDDING_DIM]],
    });
    std::fs::write(&path, snapshot.to_string()).unwrap();

    let store = VectorStore::open(&path).unwrap();

    assert_eq!(store.len(), 2);
    let results = find_similar(&vec![1.0; EMBEDDING_DIM], &store, 2).unwrap();
    assert_eq!(results[0].text, texts[0]);
    assert!((results[0].score - 1.0).abs() < 1e-5);
    assert!((results[1].score + 1.0).abs() < 1e-5);
}
