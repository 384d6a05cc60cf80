//! SQLite persistence for records and the semantic index.
//!
//! All methods are blocking; the store calls them from `spawn_blocking`.
//! SQLite is a single-writer resource, so every call serialises on the
//! connection mutex regardless of user.

use std::path::Path;

use buddy_common::{BuddyError, MemoryRecord, Namespace, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::info;

use crate::embedding::{bytes_to_f32_vec, f32_vec_to_bytes};
use crate::types::IndexEntry;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS records (
        namespace TEXT NOT NULL,
        user_id TEXT NOT NULL,
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        seq INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (namespace, user_id, key)
    );

    CREATE TABLE IF NOT EXISTS semantic_index (
        user_id TEXT NOT NULL,
        source_ref TEXT NOT NULL,
        text TEXT NOT NULL,
        embedding BLOB NOT NULL,
        seq INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (user_id, source_ref)
    );

    CREATE INDEX IF NOT EXISTS idx_records_user ON records(user_id, seq);
";

fn db_err(e: rusqlite::Error) -> BuddyError {
    BuddyError::StorageFailure(format!("sqlite: {e}"))
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

/// Thread-safe database wrapper.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) the database and ensure the schema exists.
    /// `None` opens a private in-memory database.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let conn = match path {
            Some(p) => {
                if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                info!(path = %p.display(), "Opening memory database");
                let conn = Connection::open(p).map_err(db_err)?;
                // WAL keeps readers from blocking on the single writer.
                conn.execute_batch("PRAGMA journal_mode=WAL;").map_err(db_err)?;
                conn
            }
            None => {
                info!("Opening in-memory memory database");
                Connection::open_in_memory().map_err(db_err)?
            }
        };

        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn load_records(&self) -> Result<Vec<MemoryRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT namespace, user_id, key, value, seq, created_at, updated_at
                 FROM records ORDER BY user_id, seq",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .map_err(db_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (namespace, user_id, key, value, seq, created_at, updated_at) =
                row.map_err(db_err)?;
            let namespace: Namespace = namespace
                .parse()
                .map_err(|_| BuddyError::StorageFailure(format!("bad namespace '{namespace}'")))?;
            records.push(MemoryRecord {
                namespace,
                user_id,
                key,
                value: serde_json::from_str(&value)?,
                created_at: parse_ts(&created_at),
                updated_at: parse_ts(&updated_at),
                seq,
            });
        }
        Ok(records)
    }

    /// All index entries, grouped by nothing; callers partition by user.
    pub fn load_index(&self) -> Result<Vec<(String, IndexEntry)>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT user_id, source_ref, text, embedding, seq, created_at
                 FROM semantic_index ORDER BY user_id, seq",
            )
            .map_err(db_err)?;

        let entries = stmt
            .query_map([], |row| {
                let blob: Vec<u8> = row.get(3)?;
                let created_at: String = row.get(5)?;
                Ok((
                    row.get::<_, String>(0)?,
                    IndexEntry {
                        source_ref: row.get(1)?,
                        text: row.get(2)?,
                        embedding: bytes_to_f32_vec(&blob),
                        seq: row.get(4)?,
                        created_at: parse_ts(&created_at),
                    },
                ))
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(entries)
    }

    /// Upsert a record and, in the same transaction, replace or drop its
    /// index entry.
    pub fn write_record(&self, record: &MemoryRecord, entry: Option<&IndexEntry>) -> Result<()> {
        let value = serde_json::to_string(&record.value)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;

        tx.execute(
            "INSERT INTO records (namespace, user_id, key, value, seq, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(namespace, user_id, key)
             DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![
                record.namespace.as_str(),
                record.user_id,
                record.key,
                value,
                record.seq,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;

        match entry {
            Some(entry) => insert_index(&tx, &record.user_id, entry)?,
            None => {
                tx.execute(
                    "DELETE FROM semantic_index WHERE user_id = ?1 AND source_ref = ?2",
                    params![record.user_id, record.source_ref()],
                )
                .map_err(db_err)?;
            }
        }

        tx.commit().map_err(db_err)
    }

    /// Delete a record and its index entry. Returns whether a row existed.
    pub fn delete_record(&self, namespace: Namespace, user_id: &str, key: &str) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let removed = tx
            .execute(
                "DELETE FROM records WHERE namespace = ?1 AND user_id = ?2 AND key = ?3",
                params![namespace.as_str(), user_id, key],
            )
            .map_err(db_err)?;
        tx.execute(
            "DELETE FROM semantic_index WHERE user_id = ?1 AND source_ref = ?2",
            params![user_id, buddy_common::record_source_ref(namespace, key)],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(removed > 0)
    }

    pub fn write_index(&self, user_id: &str, entry: &IndexEntry) -> Result<()> {
        let conn = self.conn.lock();
        insert_index(&conn, user_id, entry)
    }

    /// Replace every record-derived entry for `user_id`; snippets are kept.
    pub fn replace_record_index(&self, user_id: &str, entries: &[IndexEntry]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute(
            "DELETE FROM semantic_index WHERE user_id = ?1 AND source_ref NOT LIKE 'snippet/%'",
            params![user_id],
        )
        .map_err(db_err)?;
        for entry in entries {
            insert_index(&tx, user_id, entry)?;
        }
        tx.commit().map_err(db_err)
    }
}

fn insert_index(conn: &Connection, user_id: &str, entry: &IndexEntry) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO semantic_index (user_id, source_ref, text, embedding, seq, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user_id,
            entry.source_ref,
            entry.text,
            f32_vec_to_bytes(&entry.embedding),
            entry.seq,
            entry.created_at.to_rfc3339(),
        ],
    )
    .map_err(db_err)?;
    Ok(())
}
