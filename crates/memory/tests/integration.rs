//! Integration tests for the memory store against an on-disk database.

use std::sync::Arc;

use buddy_common::Namespace;
use buddy_memory::{HashEmbedder, MemoryConfig, MemoryStore};
use serde_json::json;
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> MemoryConfig {
    MemoryConfig {
        db_path: Some(dir.path().join("memory.db")),
        ..Default::default()
    }
}

async fn open(config: &MemoryConfig) -> MemoryStore {
    MemoryStore::open(config, Arc::new(HashEmbedder::new(config.embedding_dim)))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_records_survive_restart() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    {
        let store = open(&config).await;
        store
            .upsert(Namespace::Tasks, "u1", "t1", json!({"text": "finish report"}))
            .await
            .unwrap();
        store
            .upsert(Namespace::Tasks, "u1", "t2", json!({"text": "call mom"}))
            .await
            .unwrap();
        store.remember("u1", "my favorite color is blue").await.unwrap();
    }

    let store = open(&config).await;
    let keys: Vec<String> = store
        .list(Namespace::Tasks, "u1")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.key)
        .collect();
    assert_eq!(keys, vec!["t1", "t2"]);

    let hits = store.semantic_search("u1", "favorite color", 1).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].text.contains("blue"));
}

#[tokio::test]
async fn test_sequence_continues_after_restart() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    {
        let store = open(&config).await;
        store
            .upsert(Namespace::Generic, "u1", "a", json!("first"))
            .await
            .unwrap();
    }

    let store = open(&config).await;
    let b = store
        .upsert(Namespace::Generic, "u1", "b", json!("second"))
        .await
        .unwrap();
    let a = store.get(Namespace::Generic, "u1", "a").await.unwrap();
    assert!(b.seq > a.seq);
}

#[tokio::test]
async fn test_delete_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    {
        let store = open(&config).await;
        store
            .upsert(Namespace::Events, "u1", "e1", json!({"title": "dentist", "date": "fri"}))
            .await
            .unwrap();
        store.delete(Namespace::Events, "u1", "e1").await.unwrap();
    }

    let store = open(&config).await;
    assert!(store.list(Namespace::Events, "u1").await.unwrap().is_empty());
    assert_eq!(store.stats().await.index_entries, 0);
}

#[tokio::test]
async fn test_stats_counts_users() {
    let dir = TempDir::new().unwrap();
    let store = open(&test_config(&dir)).await;
    store.remember("alice", "likes hiking").await.unwrap();
    store
        .upsert(Namespace::Generic, "bob", "pet", json!("cat"))
        .await
        .unwrap();

    let stats = store.stats().await;
    assert_eq!(stats.users, 2);
    assert_eq!(stats.records, 1);
    assert_eq!(stats.index_entries, 2);
}
