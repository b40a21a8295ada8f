// SQLite Embeddings Repository - persisted operation vectors
use super::{rank_by_similarity, IndexedOperation, VectorIndex};
use crate::{errors::SearchError, schema::SearchResult};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Executor, Sqlite};
use std::path::Path;
use std::sync::Arc;

const UPSERT: &str = "\
INSERT INTO operation_embeddings (operation_id, summary, description, embedding, position) \
VALUES (?1, ?2, ?3, ?4, ?5) \
ON CONFLICT(operation_id) DO UPDATE SET \
summary = excluded.summary, description = excluded.description, \
embedding = excluded.embedding, position = excluded.position";

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS operation_embeddings (
    operation_id TEXT PRIMARY KEY NOT NULL,
    summary TEXT NOT NULL,
    description TEXT NOT NULL,
    embedding BLOB NOT NULL,
    position INTEGER NOT NULL
)";

#[derive(Debug, sqlx::FromRow)]
struct EmbeddingRow {
    operation_id: String,
    summary: String,
    description: String,
    embedding: Vec<u8>,
}

/// Operation embeddings stored as little-endian `f32` blobs.
///
/// Searches rank an in-memory snapshot loaded on first use; writes through this
/// handle drop the snapshot so the next search reloads it.
#[derive(Clone)]
pub struct SqliteEmbeddingsRepository {
    pool: SqlitePool,
    snapshot: Arc<Mutex<Option<Arc<Vec<IndexedOperation>>>>>,
}

impl SqliteEmbeddingsRepository {
    /// Opens an existing database without modifying it.
    pub async fn open(path: &Path) -> Result<Self, SearchError> {
        let options = SqliteConnectOptions::new().filename(path).read_only(true);
        Self::connect(options).await
    }

    /// Opens or creates a writable database and ensures the schema exists.
    pub async fn create(path: &Path) -> Result<Self, SearchError> {
        let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
        let repo = Self::connect(options).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, SearchError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| SearchError::Database(format!("failed to open embeddings database: {}", e)))?;
        Ok(Self {
            pool,
            snapshot: Arc::new(Mutex::new(None)),
        })
    }

    async fn migrate(&self) -> Result<(), SearchError> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| SearchError::Database(format!("failed to create schema: {}", e)))?;
        Ok(())
    }

    pub async fn upsert(&self, operation: &IndexedOperation, position: usize) -> Result<(), SearchError> {
        store(&self.pool, operation, position).await?;
        self.invalidate();
        Ok(())
    }

    /// Replaces the whole table with `operations` in one transaction. Position
    /// is the slice index. Readers never observe a partially written set.
    pub async fn replace_all(&self, operations: &[IndexedOperation]) -> Result<(), SearchError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SearchError::Database(format!("failed to begin transaction: {}", e)))?;

        sqlx::query("DELETE FROM operation_embeddings")
            .execute(&mut *tx)
            .await
            .map_err(|e| SearchError::Database(format!("failed to clear embeddings: {}", e)))?;

        for (position, operation) in operations.iter().enumerate() {
            store(&mut *tx, operation, position).await?;
        }

        tx.commit()
            .await
            .map_err(|e| SearchError::Database(format!("failed to commit embeddings: {}", e)))?;
        self.invalidate();
        Ok(())
    }

    pub async fn count(&self) -> Result<usize, SearchError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM operation_embeddings")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SearchError::Database(format!("failed to count embeddings: {}", e)))?;
        Ok(count as usize)
    }

    /// Loads every stored operation in catalog order.
    pub async fn load_all(&self) -> Result<Vec<IndexedOperation>, SearchError> {
        let rows: Vec<EmbeddingRow> = sqlx::query_as(
            "SELECT operation_id, summary, description, embedding \
             FROM operation_embeddings ORDER BY position, operation_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SearchError::Database(format!("failed to query embeddings: {}", e)))?;

        rows.into_iter()
            .map(|row| {
                let embedding = decode_embedding(&row.embedding).ok_or_else(|| {
                    SearchError::Database(format!("corrupted embedding blob for {}", row.operation_id))
                })?;
                Ok(IndexedOperation {
                    operation_id: row.operation_id,
                    summary: row.summary,
                    description: row.description,
                    embedding,
                })
            })
            .collect()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn snapshot(&self) -> Result<Arc<Vec<IndexedOperation>>, SearchError> {
        if let Some(entries) = self.snapshot.lock().as_ref() {
            return Ok(Arc::clone(entries));
        }

        let entries = Arc::new(self.load_all().await?);
        *self.snapshot.lock() = Some(Arc::clone(&entries));
        Ok(entries)
    }

    fn invalidate(&self) {
        *self.snapshot.lock() = None;
    }
}

async fn store<'e, E>(executor: E, operation: &IndexedOperation, position: usize) -> Result<(), SearchError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(UPSERT)
        .bind(&operation.operation_id)
        .bind(&operation.summary)
        .bind(&operation.description)
        .bind(encode_embedding(&operation.embedding))
        .bind(position as i64)
        .execute(executor)
        .await
        .map_err(|e| SearchError::Database(format!("failed to store {}: {}", operation.operation_id, e)))?;
    Ok(())
}

#[async_trait]
impl VectorIndex for SqliteEmbeddingsRepository {
    async fn search(&self, query_vector: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        let entries = self.snapshot().await?;
        Ok(rank_by_similarity(query_vector, entries.iter(), limit)?)
    }
}

fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}
