//! Per-user vector memory store on `SQLite` + sqlite-vec.
//!
//! Records live in a plain table; their embeddings live in a `vec0` virtual
//! table partitioned by `user_id` and sharing the record's `seq` as rowid.
//! Every query is scoped by `user_id`, so one user's memories never surface
//! for another.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{OptionalExtension, params};
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::MemoryId;
use crate::memory::core::record::{MemoryMetadata, MemoryRecord, RetrievalCandidate};
use crate::memory::embedding::embedder::Embedder;
use crate::memory::ingest::normalize::normalize_text;
use crate::memory::storage::sqlite_vec_loader::init_sqlite_vec_extension;

/// Boxed future type for memory store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Largest `k` accepted by a vec0 KNN query.
pub const MAX_KNN_K: usize = 4096;

/// Vectors with a smaller L2 norm have no cosine direction; sqlite-vec
/// reports their distance as NULL.
const MIN_EMBEDDING_NORM: f32 = 1e-6;

/// Memory store trait.
pub trait MemoryStore: Send + Sync {
    /// Deployment vector dimensionality.
    fn ndims(&self) -> usize;

    /// Embed `text` and persist it for `user_id`.
    ///
    /// # Errors
    /// Returns a validation error on empty text or user id, a provider error
    /// if embedding fails, or a storage error.
    fn insert<'a>(
        &'a self,
        user_id: &'a str,
        text: &'a str,
        metadata: MemoryMetadata,
    ) -> StoreFuture<'a, MemoryResult<MemoryRecord>>;

    /// Persist `text` with a precomputed embedding.
    ///
    /// # Errors
    /// Returns a validation error on empty input or dimension mismatch, or a
    /// storage error.
    fn insert_embedded<'a>(
        &'a self,
        user_id: &'a str,
        text: &'a str,
        metadata: MemoryMetadata,
        embedding: Vec<f32>,
    ) -> StoreFuture<'a, MemoryResult<MemoryRecord>>;

    /// Insert unless a record with the same normalized text already exists
    /// for the user. The check and the insert share one transaction.
    ///
    /// # Errors
    /// Same as [`MemoryStore::insert`].
    fn insert_if_absent<'a>(
        &'a self,
        user_id: &'a str,
        text: &'a str,
        metadata: MemoryMetadata,
    ) -> StoreFuture<'a, MemoryResult<Option<MemoryRecord>>>;

    /// Whether the user already has a record with this normalized text.
    ///
    /// # Errors
    /// Returns a storage error.
    fn contains_text<'a>(&'a self, user_id: &'a str, text: &'a str) -> StoreFuture<'a, MemoryResult<bool>>;

    /// Nearest neighbours of `query_embedding` among the user's memories,
    /// most similar first.
    ///
    /// # Errors
    /// Returns a validation error if `top_k` is zero or the dimension is
    /// wrong, or a storage error.
    fn search<'a>(
        &'a self,
        user_id: &'a str,
        query_embedding: &'a [f32],
        top_k: usize,
    ) -> StoreFuture<'a, MemoryResult<Vec<RetrievalCandidate>>>;

    /// Delete every memory of a user; returns how many were removed.
    ///
    /// # Errors
    /// Returns a storage error.
    fn delete_user<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, MemoryResult<usize>>;

    /// Number of memories stored for a user.
    ///
    /// # Errors
    /// Returns a storage error.
    fn count<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, MemoryResult<usize>>;
}

/// `SQLite` implementation of [`MemoryStore`].
pub struct SqliteMemoryStore {
    conn: Connection,
    embedder: Arc<dyn Embedder>,
    table: String,
    vec_table: String,
    ndims: usize,
}

struct RawRow {
    seq: i64,
    id: String,
    user_id: String,
    text: String,
    metadata_json: String,
    created_at_ms: i64,
    distance: f64,
    embedding: Vec<u8>,
}

impl SqliteMemoryStore {
    /// Open (or create) the store at the configured path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened, sqlite-vec is
    /// missing, or the database was created with another dimensionality.
    pub async fn open(config: &StorageConfig, embedder: Arc<dyn Embedder>) -> MemoryResult<Self> {
        init_sqlite_vec_extension();
        let conn = Connection::open(&config.sqlite_path).await?;
        Self::init(conn, &config.memory_table, embedder, Some(&config.sqlite_path)).await
    }

    /// Open a private in-memory store.
    ///
    /// # Errors
    /// Same as [`SqliteMemoryStore::open`].
    pub async fn open_in_memory(embedder: Arc<dyn Embedder>) -> MemoryResult<Self> {
        init_sqlite_vec_extension();
        let conn = Connection::open_in_memory().await?;
        Self::init(conn, "memory_records", embedder, None).await
    }

    async fn init(
        conn: Connection,
        table: &str,
        embedder: Arc<dyn Embedder>,
        path: Option<&Path>,
    ) -> MemoryResult<Self> {
        let ndims = embedder.ndims();
        if ndims == 0 {
            return Err(MemoryError::InvalidConfig("embedding ndims must be > 0".to_string()));
        }
        let table = table.to_string();
        let vec_table = format!("{table}_vectors");

        let (vec_version, stored_ndims) = {
            let table = table.clone();
            let vec_table = vec_table.clone();
            conn.call(move |conn| {
                let vec_version: Option<String> = conn
                    .query_row("SELECT vec_version()", [], |row| row.get(0))
                    .optional()
                    .ok()
                    .flatten();
                if vec_version.is_none() {
                    return Ok((None, None));
                }

                conn.execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        seq INTEGER PRIMARY KEY AUTOINCREMENT,
                        id TEXT NOT NULL UNIQUE,
                        user_id TEXT NOT NULL,
                        text TEXT NOT NULL,
                        normalized_text TEXT NOT NULL,
                        metadata_json TEXT NOT NULL,
                        created_at INTEGER NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS {table}_user_text_idx
                        ON {table}(user_id, normalized_text);
                    CREATE TABLE IF NOT EXISTS {table}_meta (
                        key TEXT PRIMARY KEY,
                        value TEXT NOT NULL
                    );
                    CREATE VIRTUAL TABLE IF NOT EXISTS {vec_table} USING vec0(
                        user_id text partition key,
                        embedding float[{ndims}] distance_metric=cosine
                    );"
                ))?;
                conn.execute(
                    &format!("INSERT OR IGNORE INTO {table}_meta (key, value) VALUES ('ndims', ?1)"),
                    params![ndims.to_string()],
                )?;
                let stored: String = conn.query_row(
                    &format!("SELECT value FROM {table}_meta WHERE key = 'ndims'"),
                    [],
                    |row| row.get(0),
                )?;
                Ok((vec_version, Some(stored)))
            })
            .await?
        };

        let Some(vec_version) = vec_version else {
            return Err(MemoryError::InvalidConfig(
                "sqlite-vec extension is not available".to_string(),
            ));
        };

        let stored_ndims = stored_ndims
            .and_then(|raw| raw.parse::<usize>().ok())
            .ok_or_else(|| MemoryError::CorruptRow("unreadable ndims metadata".to_string()))?;
        if stored_ndims != ndims {
            return Err(MemoryError::InvalidConfig(format!(
                "memory table was created with {stored_ndims} dimensions, embedder produces {ndims}"
            )));
        }

        info!(
            table = %table,
            ndims,
            sqlite_vec = %vec_version,
            path = ?path,
            "memory store ready"
        );

        Ok(Self {
            conn,
            embedder,
            table,
            vec_table,
            ndims,
        })
    }

    fn validate_embedding(&self, embedding: &[f32]) -> MemoryResult<()> {
        if embedding.len() != self.ndims {
            return Err(MemoryError::validation(format!(
                "embedding has {} dimensions, expected {}",
                embedding.len(),
                self.ndims
            )));
        }
        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(MemoryError::validation("embedding contains non-finite values"));
        }
        let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < MIN_EMBEDDING_NORM {
            return Err(MemoryError::validation("embedding has zero norm"));
        }
        Ok(())
    }

    async fn persist(
        &self,
        record: MemoryRecord,
        only_if_absent: bool,
    ) -> MemoryResult<Option<MemoryRecord>> {
        self.validate_embedding(&record.embedding)?;
        let table = self.table.clone();
        let vec_table = self.vec_table.clone();
        let id = record.id.to_string();
        let user_id = record.user_id.clone();
        let text = record.text.clone();
        let normalized = normalize_text(&record.text);
        let metadata_json = serde_json::to_string(&record.metadata)?;
        let created_at = record.created_at.timestamp_millis();
        let blob = encode_vector(&record.embedding);

        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                if only_if_absent {
                    let existing: Option<i64> = tx
                        .query_row(
                            &format!(
                                "SELECT seq FROM {table} WHERE user_id = ?1 AND normalized_text = ?2 LIMIT 1"
                            ),
                            params![user_id, normalized],
                            |row| row.get(0),
                        )
                        .optional()?;
                    if existing.is_some() {
                        return Ok(false);
                    }
                }
                tx.execute(
                    &format!(
                        "INSERT INTO {table} (id, user_id, text, normalized_text, metadata_json, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                    ),
                    params![id, user_id, text, normalized, metadata_json, created_at],
                )?;
                let seq = tx.last_insert_rowid();
                tx.execute(
                    &format!("INSERT INTO {vec_table} (rowid, user_id, embedding) VALUES (?1, ?2, ?3)"),
                    params![seq, user_id, blob],
                )?;
                tx.commit()?;
                Ok(true)
            })
            .await?;

        if inserted {
            debug!(user_id = %record.user_id, memory_id = %record.id, "memory stored");
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    async fn embed_record(
        &self,
        user_id: &str,
        text: &str,
        metadata: MemoryMetadata,
    ) -> MemoryResult<MemoryRecord> {
        let (user_id, text) = validate_input(user_id, text)?;
        let embedding = self.embedder.embed_text(&text).await?;
        Ok(new_record(user_id, text, metadata, embedding))
    }
}

fn validate_input(user_id: &str, text: &str) -> MemoryResult<(String, String)> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(MemoryError::validation("user_id must not be empty"));
    }
    let text = text.trim();
    if text.is_empty() {
        return Err(MemoryError::validation("memory text must not be empty"));
    }
    Ok((user_id.to_string(), text.to_string()))
}

fn new_record(
    user_id: String,
    text: String,
    metadata: MemoryMetadata,
    embedding: Vec<f32>,
) -> MemoryRecord {
    MemoryRecord {
        id: MemoryId::new(),
        user_id,
        text,
        embedding,
        created_at: Utc::now(),
        metadata,
    }
}

impl MemoryStore for SqliteMemoryStore {
    fn ndims(&self) -> usize {
        self.ndims
    }

    fn insert<'a>(
        &'a self,
        user_id: &'a str,
        text: &'a str,
        metadata: MemoryMetadata,
    ) -> StoreFuture<'a, MemoryResult<MemoryRecord>> {
        Box::pin(async move {
            let record = self.embed_record(user_id, text, metadata).await?;
            self.persist(record, false)
                .await?
                .ok_or_else(|| MemoryError::CorruptRow("unconditional insert skipped".to_string()))
        })
    }

    fn insert_embedded<'a>(
        &'a self,
        user_id: &'a str,
        text: &'a str,
        metadata: MemoryMetadata,
        embedding: Vec<f32>,
    ) -> StoreFuture<'a, MemoryResult<MemoryRecord>> {
        Box::pin(async move {
            let (user_id, text) = validate_input(user_id, text)?;
            let record = new_record(user_id, text, metadata, embedding);
            self.persist(record, false)
                .await?
                .ok_or_else(|| MemoryError::CorruptRow("unconditional insert skipped".to_string()))
        })
    }

    fn insert_if_absent<'a>(
        &'a self,
        user_id: &'a str,
        text: &'a str,
        metadata: MemoryMetadata,
    ) -> StoreFuture<'a, MemoryResult<Option<MemoryRecord>>> {
        Box::pin(async move {
            if self.contains_text(user_id, text).await? {
                return Ok(None);
            }
            let record = self.embed_record(user_id, text, metadata).await?;
            self.persist(record, true).await
        })
    }

    fn contains_text<'a>(&'a self, user_id: &'a str, text: &'a str) -> StoreFuture<'a, MemoryResult<bool>> {
        Box::pin(async move {
            let table = self.table.clone();
            let user_id = user_id.trim().to_string();
            let normalized = normalize_text(text);
            let found = self
                .conn
                .call(move |conn| {
                    let found: Option<i64> = conn
                        .query_row(
                            &format!(
                                "SELECT seq FROM {table} WHERE user_id = ?1 AND normalized_text = ?2 LIMIT 1"
                            ),
                            params![user_id, normalized],
                            |row| row.get(0),
                        )
                        .optional()?;
                    Ok(found.is_some())
                })
                .await?;
            Ok(found)
        })
    }

    fn search<'a>(
        &'a self,
        user_id: &'a str,
        query_embedding: &'a [f32],
        top_k: usize,
    ) -> StoreFuture<'a, MemoryResult<Vec<RetrievalCandidate>>> {
        Box::pin(async move {
            if top_k == 0 {
                return Err(MemoryError::validation("top_k must be > 0"));
            }
            self.validate_embedding(query_embedding)?;

            let table = self.table.clone();
            let vec_table = self.vec_table.clone();
            let user = user_id.trim().to_string();
            let blob = encode_vector(query_embedding);
            let k = i64::try_from(top_k.min(MAX_KNN_K)).unwrap_or(4096);

            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "WITH knn AS (
                            SELECT rowid, distance
                            FROM {vec_table}
                            WHERE embedding MATCH ?1 AND k = ?2 AND user_id = ?3
                        )
                        SELECT r.seq, r.id, r.user_id, r.text, r.metadata_json, r.created_at, knn.distance
                        FROM knn
                        JOIN {table} r ON r.seq = knn.rowid
                        ORDER BY knn.distance ASC, r.seq DESC"
                    ))?;
                    let hits = stmt
                        .query_map(params![blob, k, user], |row| {
                            Ok(RawRow {
                                seq: row.get(0)?,
                                id: row.get(1)?,
                                user_id: row.get(2)?,
                                text: row.get(3)?,
                                metadata_json: row.get(4)?,
                                created_at_ms: row.get(5)?,
                                distance: row.get(6)?,
                                embedding: Vec::new(),
                            })
                        })?
                        .collect::<Result<Vec<_>, _>>()?;

                    let mut vector_stmt =
                        conn.prepare(&format!("SELECT embedding FROM {vec_table} WHERE rowid = ?1"))?;
                    let mut rows = Vec::with_capacity(hits.len());
                    for mut hit in hits {
                        hit.embedding = vector_stmt.query_row(params![hit.seq], |row| row.get(0))?;
                        rows.push(hit);
                    }
                    Ok(rows)
                })
                .await?;

            let candidates = rows
                .into_iter()
                .map(decode_row)
                .collect::<MemoryResult<Vec<_>>>()?;
            debug!(user_id, top_k, hits = candidates.len(), "memory search");
            Ok(candidates)
        })
    }

    fn delete_user<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, MemoryResult<usize>> {
        Box::pin(async move {
            let table = self.table.clone();
            let vec_table = self.vec_table.clone();
            let user = user_id.trim().to_string();
            let deleted = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let seqs = {
                        let mut stmt =
                            tx.prepare(&format!("SELECT seq FROM {table} WHERE user_id = ?1"))?;
                        stmt.query_map(params![user], |row| row.get::<_, i64>(0))?
                            .collect::<Result<Vec<_>, _>>()?
                    };
                    {
                        let mut stmt =
                            tx.prepare(&format!("DELETE FROM {vec_table} WHERE rowid = ?1"))?;
                        for seq in &seqs {
                            stmt.execute(params![seq])?;
                        }
                    }
                    let deleted =
                        tx.execute(&format!("DELETE FROM {table} WHERE user_id = ?1"), params![user])?;
                    tx.commit()?;
                    Ok(deleted)
                })
                .await?;
            info!(user_id, deleted, "user memories deleted");
            Ok(deleted)
        })
    }

    fn count<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, MemoryResult<usize>> {
        Box::pin(async move {
            let table = self.table.clone();
            let user = user_id.trim().to_string();
            let count: i64 = self
                .conn
                .call(move |conn| {
                    let count = conn.query_row(
                        &format!("SELECT COUNT(*) FROM {table} WHERE user_id = ?1"),
                        params![user],
                        |row| row.get(0),
                    )?;
                    Ok(count)
                })
                .await?;
            usize::try_from(count).map_err(|_| MemoryError::CorruptRow("negative count".to_string()))
        })
    }
}

/// Little-endian `f32` blob, the vec0 wire format.
fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> MemoryResult<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(MemoryError::CorruptRow(format!(
            "vector blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[allow(clippy::cast_possible_truncation)]
fn decode_row(row: RawRow) -> MemoryResult<RetrievalCandidate> {
    let id = row
        .id
        .parse::<MemoryId>()
        .map_err(|err| MemoryError::CorruptRow(format!("bad memory id {}: {err}", row.id)))?;
    let created_at: DateTime<Utc> = Utc
        .timestamp_millis_opt(row.created_at_ms)
        .single()
        .ok_or_else(|| MemoryError::CorruptRow("invalid created_at timestamp".to_string()))?;
    let metadata: MemoryMetadata = serde_json::from_str(&row.metadata_json)?;
    let embedding = decode_vector(&row.embedding)?;
    let similarity = (1.0 - row.distance).clamp(-1.0, 1.0) as f32;

    Ok(RetrievalCandidate {
        record: MemoryRecord {
            id,
            user_id: row.user_id,
            text: row.text,
            embedding,
            created_at,
            metadata,
        },
        similarity,
    })
}
