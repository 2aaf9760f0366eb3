//! In-memory [`Store`] implementation for tests.
//!
//! Rows live in `Vec`s behind one `std::sync::RwLock`, so each operation sees
//! and produces a consistent snapshot. Ids are assigned from 1 upward in
//! insertion order, like SQLite's `AUTOINCREMENT`.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::l2_distance;
use crate::models::{
    format_ts_iso, sha256_hex, AuditRecord, ChunkResponse, DocumentResponse, ProcessedChunk,
    RetrievedChunk, StoreStats,
};

use super::{rank_by_distance, Store};

struct StoredDoc {
    id: i64,
    filename: String,
    upload_date: i64,
    content_hash: String,
    content: String,
}

struct StoredChunk {
    id: i64,
    document_id: i64,
    index: i64,
    content: String,
    embedding: Vec<f32>,
}

struct StoredAudit {
    id: i64,
    timestamp: i64,
    query_text: String,
    response_text: String,
}

#[derive(Default)]
struct Tables {
    model: Option<(String, usize)>,
    docs: Vec<StoredDoc>,
    chunks: Vec<StoredChunk>,
    audit: Vec<StoredAudit>,
    next_doc_id: i64,
    next_chunk_id: i64,
    next_audit_id: i64,
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn ensure_embedding_model(&self, model: &str, dims: usize) -> Result<()> {
        let mut tables = self.write()?;
        match tables.model.clone() {
            Some((m, d)) if m == model && d == dims => Ok(()),
            Some((m, d)) => bail!(
                "index was built with embedding model '{}' ({} dims), configured model is '{}' ({} dims)",
                m,
                d,
                model,
                dims
            ),
            None => {
                tables.model = Some((model.to_string(), dims));
                Ok(())
            }
        }
    }

    async fn insert_document(
        &self,
        filename: &str,
        content: &str,
        chunks: &[ProcessedChunk],
    ) -> Result<i64> {
        let mut tables = self.write()?;

        // Validate everything before touching any table.
        if let Some((_, dims)) = &tables.model {
            if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != *dims) {
                bail!(
                    "chunk {} has {} dims, index expects {}",
                    bad.index,
                    bad.embedding.len(),
                    dims
                );
            }
        }

        tables.next_doc_id += 1;
        let doc_id = tables.next_doc_id;
        tables.docs.push(StoredDoc {
            id: doc_id,
            filename: filename.to_string(),
            upload_date: chrono::Utc::now().timestamp(),
            content_hash: sha256_hex(content),
            content: content.to_string(),
        });

        for chunk in chunks {
            tables.next_chunk_id += 1;
            let id = tables.next_chunk_id;
            tables.chunks.push(StoredChunk {
                id,
                document_id: doc_id,
                index: chunk.index,
                content: chunk.text.clone(),
                embedding: chunk.embedding.clone(),
            });
        }

        Ok(doc_id)
    }

    async fn nearest_chunks(&self, query_vec: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        let tables = self.read()?;
        let mut candidates = Vec::with_capacity(tables.chunks.len());
        for chunk in &tables.chunks {
            let distance = l2_distance(query_vec, &chunk.embedding).ok_or_else(|| {
                anyhow::anyhow!(
                    "chunk {} has {} dims, query has {}",
                    chunk.id,
                    chunk.embedding.len(),
                    query_vec.len()
                )
            })?;
            candidates.push(RetrievedChunk {
                id: chunk.id,
                document_id: chunk.document_id,
                content: chunk.content.clone(),
                distance,
            });
        }
        Ok(rank_by_distance(candidates, k))
    }

    async fn insert_audit(&self, query_text: &str, response_text: &str) -> Result<i64> {
        let mut tables = self.write()?;
        tables.next_audit_id += 1;
        let id = tables.next_audit_id;
        tables.audit.push(StoredAudit {
            id,
            timestamp: chrono::Utc::now().timestamp(),
            query_text: query_text.to_string(),
            response_text: response_text.to_string(),
        });
        Ok(id)
    }

    async fn get_document(&self, id: i64) -> Result<Option<DocumentResponse>> {
        let tables = self.read()?;
        let doc = match tables.docs.iter().find(|d| d.id == id) {
            Some(d) => d,
            None => return Ok(None),
        };

        let mut chunks: Vec<ChunkResponse> = tables
            .chunks
            .iter()
            .filter(|c| c.document_id == id)
            .map(|c| ChunkResponse {
                id: c.id,
                index: c.index,
                content: c.content.clone(),
            })
            .collect();
        chunks.sort_by_key(|c| c.index);

        Ok(Some(DocumentResponse {
            id: doc.id,
            filename: doc.filename.clone(),
            upload_date: format_ts_iso(doc.upload_date),
            content_hash: doc.content_hash.clone(),
            content: doc.content.clone(),
            chunks,
        }))
    }

    async fn delete_document(&self, id: i64) -> Result<bool> {
        let mut tables = self.write()?;
        let before = tables.docs.len();
        tables.docs.retain(|d| d.id != id);
        if tables.docs.len() == before {
            return Ok(false);
        }
        tables.chunks.retain(|c| c.document_id != id);
        Ok(true)
    }

    async fn recent_audit(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let tables = self.read()?;
        Ok(tables
            .audit
            .iter()
            .rev()
            .take(limit)
            .map(|a| AuditRecord {
                id: a.id,
                timestamp: format_ts_iso(a.timestamp),
                query_text: a.query_text.clone(),
                response_text: a.response_text.clone(),
            })
            .collect())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let tables = self.read()?;
        Ok(StoreStats {
            documents: tables.docs.len() as i64,
            chunks: tables.chunks.len() as i64,
            audit_records: tables.audit.len() as i64,
        })
    }
}
