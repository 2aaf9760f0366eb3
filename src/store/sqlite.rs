//! SQLite-backed [`Store`] implementation.
//!
//! Embeddings are stored as BLOBs next to the chunk text and scored in Rust
//! at query time. The embedding model and width are pinned in `index_meta`
//! on first use.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::embedding::{blob_to_vec, l2_distance, vec_to_blob};
use crate::models::{
    format_ts_iso, sha256_hex, AuditRecord, ChunkResponse, DocumentResponse, ProcessedChunk,
    RetrievedChunk, StoreStats,
};
use crate::{db, migrate};

use super::{rank_by_distance, Store};

const META_MODEL: &str = "embedding_model";
const META_DIMS: &str = "embedding_dims";

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and bring the schema up to date.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The embedding model and width this index is pinned to, if any.
    pub async fn embedding_model(&self) -> Result<Option<(String, usize)>> {
        let model = read_meta(&self.pool, META_MODEL).await?;
        let dims = read_meta(&self.pool, META_DIMS).await?;
        match (model, dims) {
            (Some(m), Some(d)) => Ok(Some((m, d.parse()?))),
            _ => Ok(None),
        }
    }
}

async fn read_meta<'e, E>(executor: E, key: &str) -> Result<Option<String>>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
        .bind(key)
        .fetch_optional(executor)
        .await?;
    Ok(value)
}

#[async_trait]
impl Store for SqliteStore {
    async fn ensure_embedding_model(&self, model: &str, dims: usize) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let stored_model = read_meta(&mut *tx, META_MODEL).await?;
        let stored_dims = read_meta(&mut *tx, META_DIMS).await?;

        match (stored_model, stored_dims) {
            (Some(m), Some(d)) => {
                if m != model || d != dims.to_string() {
                    bail!(
                        "index was built with embedding model '{}' ({} dims), configured model is '{}' ({} dims)",
                        m,
                        d,
                        model,
                        dims
                    );
                }
            }
            _ => {
                for (key, value) in [(META_MODEL, model.to_string()), (META_DIMS, dims.to_string())] {
                    sqlx::query(
                        "INSERT INTO index_meta (key, value) VALUES (?, ?)
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    )
                    .bind(key)
                    .bind(value)
                    .execute(&mut *tx)
                    .await?;
                }
                tracing::info!(model, dims, "pinned embedding model for this index");
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_document(
        &self,
        filename: &str,
        content: &str,
        chunks: &[ProcessedChunk],
    ) -> Result<i64> {
        // Dropping `tx` on any early return rolls everything back.
        let mut tx = self.pool.begin().await?;

        if let Some(dims) = read_meta(&mut *tx, META_DIMS).await? {
            let dims: usize = dims.parse()?;
            if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != dims) {
                bail!(
                    "chunk {} has {} dims, index expects {}",
                    bad.index,
                    bad.embedding.len(),
                    dims
                );
            }
        }

        let now = chrono::Utc::now().timestamp();
        let doc_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO documents (filename, upload_date, content, content_hash)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(filename)
        .bind(now)
        .bind(content)
        .bind(sha256_hex(content))
        .fetch_one(&mut *tx)
        .await?;

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (document_id, chunk_index, content, hash, embedding) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(doc_id)
            .bind(chunk.index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(vec_to_blob(&chunk.embedding))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(doc_id)
    }

    async fn nearest_chunks(&self, query_vec: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query("SELECT id, document_id, content, embedding FROM chunks ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.get("id");
            let blob: Vec<u8> = row.get("embedding");
            let vec = blob_to_vec(&blob);
            let distance = l2_distance(query_vec, &vec).ok_or_else(|| {
                anyhow::anyhow!(
                    "chunk {} has {} dims, query has {}",
                    id,
                    vec.len(),
                    query_vec.len()
                )
            })?;
            candidates.push(RetrievedChunk {
                id,
                document_id: row.get("document_id"),
                content: row.get("content"),
                distance,
            });
        }

        Ok(rank_by_distance(candidates, k))
    }

    async fn insert_audit(&self, query_text: &str, response_text: &str) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO audit_logs (timestamp, query_text, response_text) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(now)
        .bind(query_text)
        .bind(response_text)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get_document(&self, id: i64) -> Result<Option<DocumentResponse>> {
        let doc_row = sqlx::query(
            "SELECT id, filename, upload_date, content, content_hash FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let doc_row = match doc_row {
            Some(row) => row,
            None => return Ok(None),
        };

        let upload_date: i64 = doc_row.get("upload_date");

        let chunk_rows = sqlx::query(
            "SELECT id, chunk_index, content FROM chunks WHERE document_id = ? ORDER BY chunk_index ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let chunks: Vec<ChunkResponse> = chunk_rows
            .iter()
            .map(|row| ChunkResponse {
                id: row.get("id"),
                index: row.get("chunk_index"),
                content: row.get("content"),
            })
            .collect();

        Ok(Some(DocumentResponse {
            id: doc_row.get("id"),
            filename: doc_row.get("filename"),
            upload_date: format_ts_iso(upload_date),
            content_hash: doc_row.get("content_hash"),
            content: doc_row.get("content"),
            chunks,
        }))
    }

    async fn delete_document(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn recent_audit(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query(
            "SELECT id, timestamp, query_text, response_text FROM audit_logs ORDER BY id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let ts: i64 = row.get("timestamp");
                AuditRecord {
                    id: row.get("id"),
                    timestamp: format_ts_iso(ts),
                    query_text: row.get("query_text"),
                    response_text: row.get("response_text"),
                }
            })
            .collect())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let audit_records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            documents,
            chunks,
            audit_records,
        })
    }
}
