//! SQLite-backed [`UpsertStore`] implementation.
//!
//! Every upsert is one parameterized statement, so a failed write leaves no
//! partial row. The `WHERE` clause on the conflict branch turns a same-hash
//! re-ingest into a no-op; `RETURNING` tells the three outcomes apart
//! without a read-before-write.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use lex_ingest_core::error::StoreError;
use lex_ingest_core::models::DocumentRecord;
use lex_ingest_core::store::{UpsertOutcome, UpsertResult, UpsertStore};

use crate::config::Config;
use crate::{db, migrate};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Sort a sqlx failure into the store error taxonomy.
fn store_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(db_err) => match db_err.kind() {
            sqlx::error::ErrorKind::UniqueViolation
            | sqlx::error::ErrorKind::NotNullViolation
            | sqlx::error::ErrorKind::CheckViolation
            | sqlx::error::ErrorKind::ForeignKeyViolation => {
                StoreError::Constraint(db_err.message().to_string())
            }
            _ => StoreError::Backend(db_err.message().to_string()),
        },
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Connection(e.to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn row_to_record(row: &SqliteRow) -> DocumentRecord {
    let metadata_json: String = row.get("metadata_json");
    let embedding: Option<Vec<u8>> = row.get("embedding");
    DocumentRecord {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        category: row.get("category"),
        source_url: row.get("source_url"),
        content_hash: row.get("content_hash"),
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::json!({})),
        embedding: embedding.as_deref().map(blob_to_vec),
        created_at: from_millis(row.get("created_at")),
        updated_at: from_millis(row.get("updated_at")),
    }
}

#[async_trait]
impl UpsertStore for SqliteStore {
    async fn upsert(&self, record: &DocumentRecord) -> Result<UpsertResult, StoreError> {
        let metadata_json = serde_json::to_string(&record.metadata)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let returned = sqlx::query(
            r#"
            INSERT INTO documents (id, title, content, category, source_url,
                                   content_hash, metadata_json, embedding,
                                   created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(title) DO UPDATE SET
                content = excluded.content,
                category = excluded.category,
                source_url = excluded.source_url,
                content_hash = excluded.content_hash,
                metadata_json = excluded.metadata_json,
                updated_at = excluded.updated_at
            WHERE documents.content_hash != excluded.content_hash
            RETURNING id, created_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.title)
        .bind(&record.content)
        .bind(&record.category)
        .bind(&record.source_url)
        .bind(&record.content_hash)
        .bind(&metadata_json)
        .bind(record.embedding.as_deref().map(vec_to_blob))
        .bind(record.created_at.timestamp_millis())
        .bind(record.updated_at.timestamp_millis())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        if let Some(row) = returned {
            let id: String = row.get("id");
            let outcome = if id == record.id {
                UpsertOutcome::Inserted
            } else {
                UpsertOutcome::Updated
            };
            return Ok(UpsertResult {
                id,
                outcome,
                created_at: from_millis(row.get("created_at")),
            });
        }

        // Conflict branch filtered out: same title, same hash.
        let existing = sqlx::query("SELECT id, created_at FROM documents WHERE title = ?")
            .bind(&record.title)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .ok_or_else(|| {
                StoreError::Backend(format!("record vanished during upsert: {}", record.title))
            })?;

        Ok(UpsertResult {
            id: existing.get("id"),
            outcome: UpsertOutcome::Unchanged,
            created_at: from_millis(existing.get("created_at")),
        })
    }

    async fn known_fingerprints(&self) -> Result<Vec<(String, String)>, StoreError> {
        let rows = sqlx::query("SELECT content_hash, id FROM documents")
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(rows
            .iter()
            .map(|row| (row.get("content_hash"), row.get("id")))
            .collect())
    }

    async fn get_by_title(&self, title: &str) -> Result<Option<DocumentRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, title, content, category, source_url, content_hash, metadata_json, \
             embedding, created_at, updated_at FROM documents WHERE title = ?",
        )
        .bind(title)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(row.as_ref().map(row_to_record))
    }

    async fn count(&self) -> Result<i64, StoreError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)
    }

    async fn category_counts(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let rows = sqlx::query(
            "SELECT category, COUNT(*) AS n FROM documents GROUP BY category ORDER BY n DESC, category ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(rows
            .iter()
            .map(|row| (row.get("category"), row.get("n")))
            .collect())
    }
}
