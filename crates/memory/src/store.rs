//! The namespaced, per-user memory store.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use buddy_common::{BuddyError, MemoryRecord, Namespace, Result, SearchHit};
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info, warn};

use crate::embedding::{cosine_similarity, Embedder};
use crate::sqlite::SqliteBackend;
use crate::types::{IndexEntry, MemoryConfig, StoreStats};

/// Everything held for one user. Guarded by its own lock, so writes for
/// different users never contend.
#[derive(Default)]
struct UserPartition {
    records: HashMap<(Namespace, String), MemoryRecord>,
    index: HashMap<String, IndexEntry>,
    next_seq: i64,
}

impl UserPartition {
    fn bump_seq(&mut self) -> i64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Write-through store: SQLite is written first, then the in-memory view.
pub struct MemoryStore {
    partitions: DashMap<String, Arc<RwLock<UserPartition>>>,
    backend: Arc<SqliteBackend>,
    embedder: Arc<dyn Embedder>,
    timeout: Duration,
}

impl MemoryStore {
    /// Open the backing database and load every partition into memory.
    pub async fn open(config: &MemoryConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let path = config.db_path.clone();
        let backend = tokio::task::spawn_blocking(move || SqliteBackend::open(path.as_deref()))
            .await
            .map_err(|e| BuddyError::StorageFailure(format!("open task failed: {e}")))??;
        let backend = Arc::new(backend);

        let loader = backend.clone();
        let (records, index) = tokio::task::spawn_blocking(move || {
            Ok::<_, BuddyError>((loader.load_records()?, loader.load_index()?))
        })
        .await
        .map_err(|e| BuddyError::StorageFailure(format!("load task failed: {e}")))??;

        let mut partitions: HashMap<String, UserPartition> = HashMap::new();
        for record in records {
            let p = partitions.entry(record.user_id.clone()).or_default();
            p.next_seq = p.next_seq.max(record.seq);
            p.records
                .insert((record.namespace, record.key.clone()), record);
        }
        for (user_id, entry) in index {
            let p = partitions.entry(user_id).or_default();
            p.next_seq = p.next_seq.max(entry.seq);
            p.index.insert(entry.source_ref.clone(), entry);
        }

        info!(
            users = partitions.len(),
            persistent = config.db_path.is_some(),
            "Memory store ready"
        );

        Ok(Self {
            partitions: partitions
                .into_iter()
                .map(|(k, v)| (k, Arc::new(RwLock::new(v))))
                .collect(),
            backend,
            embedder,
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    /// Fresh in-memory store with the hash embedder. Handy for tests.
    pub async fn in_memory() -> Result<Self> {
        let config = MemoryConfig::default();
        let embedder = Arc::new(crate::embedding::HashEmbedder::new(config.embedding_dim));
        Self::open(&config, embedder).await
    }

    fn partition(&self, user_id: &str) -> Arc<RwLock<UserPartition>> {
        self.partitions
            .entry(user_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    fn existing_partition(&self, user_id: &str) -> Option<Arc<RwLock<UserPartition>>> {
        self.partitions.get(user_id).map(|p| p.value().clone())
    }

    /// Bound an operation by the configured timeout.
    async fn bounded<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, fut).await.map_err(|_| {
            warn!(op, timeout_ms = self.timeout.as_millis() as u64, "Store operation timed out");
            BuddyError::StorageFailure(format!("{op} timed out"))
        })?
    }

    /// Write to SQLite, then apply `apply` to the partition still locked by
    /// `guard`. Not bounded by the timeout: once a write is dispatched the
    /// in-memory view must follow it. Runs on its own task so a caller that
    /// stops waiting cannot leave the two out of step.
    async fn commit<R, T, W, A>(
        &self,
        mut guard: OwnedRwLockWriteGuard<UserPartition>,
        write: W,
        apply: A,
    ) -> Result<T>
    where
        R: Send + 'static,
        T: Send + 'static,
        W: FnOnce(&SqliteBackend) -> Result<R> + Send + 'static,
        A: FnOnce(&mut UserPartition, R) -> T + Send + 'static,
    {
        let backend = self.backend.clone();
        tokio::spawn(async move {
            let written = tokio::task::spawn_blocking(move || write(backend.as_ref()))
                .await
                .map_err(|e| BuddyError::StorageFailure(format!("write task failed: {e}")))??;
            Ok(apply(&mut guard, written))
        })
        .await
        .map_err(|e| BuddyError::StorageFailure(format!("commit task failed: {e}")))?
    }

    /// Embed `text`, logging instead of failing; the index is secondary to
    /// the record itself.
    async fn try_embed(&self, text: &str) -> Option<Vec<f32>> {
        match self.embedder.embed(text).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "Embedding failed; record stored without index entry");
                None
            }
        }
    }

    /// Insert or overwrite `(namespace, user_id, key)`.
    ///
    /// `created_at` and the insertion sequence survive an overwrite;
    /// `updated_at` is refreshed. The record is re-indexed unless the
    /// namespace is bookkeeping-only. A timeout can only fire before anything
    /// is written, so a failed upsert leaves no trace.
    pub async fn upsert(
        &self,
        namespace: Namespace,
        user_id: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<MemoryRecord> {
        if user_id.trim().is_empty() || key.trim().is_empty() {
            return Err(BuddyError::InvalidRequest(
                "user_id and key must not be empty".into(),
            ));
        }

        let (guard, record, entry) = self
            .bounded("upsert", async {
                let guard = self.partition(user_id).write_owned().await;

                let now = Utc::now();
                let (created_at, seq) = match guard.records.get(&(namespace, key.to_string())) {
                    Some(existing) => (existing.created_at, existing.seq),
                    None => (now, guard.next_seq + 1),
                };
                let record = MemoryRecord {
                    namespace,
                    user_id: user_id.to_string(),
                    key: key.to_string(),
                    value,
                    created_at,
                    updated_at: now,
                    seq,
                };

                let entry = if namespace.is_indexed() {
                    let text = record.index_text();
                    self.try_embed(&text).await.map(|embedding| IndexEntry {
                        source_ref: record.source_ref(),
                        text,
                        embedding,
                        seq: seq.max(guard.next_seq + 1),
                        created_at: now,
                    })
                } else {
                    None
                };
                Ok((guard, record, entry))
            })
            .await?;

        let (to_write, entry_to_write) = (record.clone(), entry.clone());
        let stored = record.clone();
        self.commit(
            guard,
            move |db| db.write_record(&to_write, entry_to_write.as_ref()),
            move |p, ()| {
                let source_ref = stored.source_ref();
                p.next_seq = p.next_seq.max(stored.seq);
                match entry {
                    Some(entry) => {
                        p.next_seq = p.next_seq.max(entry.seq);
                        p.index.insert(source_ref, entry);
                    }
                    None => {
                        p.index.remove(&source_ref);
                    }
                }
                p.records
                    .insert((stored.namespace, stored.key.clone()), stored);
            },
        )
        .await?;

        debug!(%namespace, user_id, key, seq = record.seq, "Upserted record");
        Ok(record)
    }

    pub async fn get(&self, namespace: Namespace, user_id: &str, key: &str) -> Result<MemoryRecord> {
        let not_found = || BuddyError::NotFound(format!("{namespace}/{user_id}/{key}"));
        let partition = self.existing_partition(user_id).ok_or_else(not_found)?;
        self.bounded("get", async {
            let guard = partition.read().await;
            guard
                .records
                .get(&(namespace, key.to_string()))
                .cloned()
                .ok_or_else(not_found)
        })
        .await
    }

    /// Records of one namespace in insertion order.
    pub async fn list(&self, namespace: Namespace, user_id: &str) -> Result<Vec<MemoryRecord>> {
        let Some(partition) = self.existing_partition(user_id) else {
            return Ok(Vec::new());
        };
        self.bounded("list", async {
            let guard = partition.read().await;
            let mut records: Vec<MemoryRecord> = guard
                .records
                .values()
                .filter(|r| r.namespace == namespace)
                .cloned()
                .collect();
            records.sort_by_key(|r| r.seq);
            Ok(records)
        })
        .await
    }

    /// Remove a record and its index entry. Deleting a missing key is a no-op.
    pub async fn delete(&self, namespace: Namespace, user_id: &str, key: &str) -> Result<()> {
        let Some(partition) = self.existing_partition(user_id) else {
            return Ok(());
        };
        let guard = self
            .bounded("delete", async { Ok(partition.write_owned().await) })
            .await?;

        let (uid, k) = (user_id.to_string(), key.to_string());
        let map_key = (namespace, key.to_string());
        let source_ref = buddy_common::record_source_ref(namespace, key);
        let existed = self
            .commit(
                guard,
                move |db| db.delete_record(namespace, &uid, &k),
                move |p, existed| {
                    p.records.remove(&map_key);
                    p.index.remove(&source_ref);
                    existed
                },
            )
            .await?;
        debug!(%namespace, user_id, key, existed, "Deleted record");
        Ok(())
    }

    /// Index free text for `user_id`; returns its `snippet/<uuid>` reference.
    pub async fn remember(&self, user_id: &str, text: &str) -> Result<String> {
        let text = text.trim();
        if user_id.trim().is_empty() || text.is_empty() {
            return Err(BuddyError::InvalidRequest(
                "user_id and text must not be empty".into(),
            ));
        }

        let (guard, entry) = self
            .bounded("remember", async {
                let embedding = self.embedder.embed(text).await.map_err(|e| {
                    BuddyError::StorageFailure(format!("could not embed snippet: {e}"))
                })?;
                let guard = self.partition(user_id).write_owned().await;
                let entry = IndexEntry {
                    source_ref: format!("snippet/{}", uuid::Uuid::new_v4()),
                    text: text.to_string(),
                    embedding,
                    seq: guard.next_seq + 1,
                    created_at: Utc::now(),
                };
                Ok((guard, entry))
            })
            .await?;

        let source_ref = entry.source_ref.clone();
        let (uid, to_write) = (user_id.to_string(), entry.clone());
        self.commit(
            guard,
            move |db| db.write_index(&uid, &to_write),
            move |p, ()| {
                p.next_seq = entry.seq;
                p.index.insert(entry.source_ref.clone(), entry);
            },
        )
        .await?;
        debug!(user_id, %source_ref, "Remembered snippet");
        Ok(source_ref)
    }

    /// Top `top_k` index entries for `user_id` by cosine similarity to
    /// `query_text`; ties go to the most recent entry. Never looks at other
    /// users' partitions.
    pub async fn semantic_search(
        &self,
        user_id: &str,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let Some(partition) = self.existing_partition(user_id) else {
            return Ok(Vec::new());
        };
        if top_k == 0 || query_text.trim().is_empty() {
            return Ok(Vec::new());
        }

        self.bounded("semantic_search", async {
            let query = self.embedder.embed(query_text).await?;
            let guard = partition.read().await;

            let mut scored: Vec<(f32, i64, &IndexEntry)> = guard
                .index
                .values()
                .map(|e| (cosine_similarity(&query, &e.embedding), e.seq, e))
                .collect();
            scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(b.1.cmp(&a.1)));
            Ok(scored
                .into_iter()
                .take(top_k)
                .map(|(score, _, e)| SearchHit {
                    source_ref: e.source_ref.clone(),
                    text: e.text.clone(),
                    score,
                })
                .collect())
        })
        .await
    }

    /// Re-embed every indexable record of `user_id`, replacing their index
    /// entries. Snippets are untouched. Returns the number of entries written.
    pub async fn reindex(&self, user_id: &str) -> Result<usize> {
        let Some(partition) = self.existing_partition(user_id) else {
            return Ok(0);
        };

        let (guard, entries, seq) = self
            .bounded("reindex", async {
                let guard = partition.write_owned().await;
                let mut records: Vec<&MemoryRecord> = guard
                    .records
                    .values()
                    .filter(|r| r.namespace.is_indexed())
                    .collect();
                records.sort_by_key(|r| r.seq);

                let mut entries = Vec::with_capacity(records.len());
                let mut seq = guard.next_seq;
                for record in records {
                    let text = record.index_text();
                    let embedding = self.embedder.embed(&text).await?;
                    seq += 1;
                    entries.push(IndexEntry {
                        source_ref: record.source_ref(),
                        text,
                        embedding,
                        seq,
                        created_at: Utc::now(),
                    });
                }
                Ok((guard, entries, seq))
            })
            .await?;

        let count = entries.len();
        let (uid, to_write) = (user_id.to_string(), entries.clone());
        self.commit(
            guard,
            move |db| db.replace_record_index(&uid, &to_write),
            move |p, ()| {
                p.index.retain(|_, e| e.is_snippet());
                for entry in entries {
                    p.index.insert(entry.source_ref.clone(), entry);
                }
                p.next_seq = seq;
            },
        )
        .await?;
        info!(user_id, entries = count, "Reindexed user records");
        Ok(count)
    }

    pub async fn stats(&self) -> StoreStats {
        let partitions: Vec<_> = self
            .partitions
            .iter()
            .map(|p| p.value().clone())
            .collect();
        let mut stats = StoreStats {
            users: partitions.len(),
            ..Default::default()
        };
        for partition in partitions {
            let guard = partition.read().await;
            stats.records += guard.records.len();
            stats.index_entries += guard.index.len();
        }
        stats
    }
}
