//! Core data types flowing through ingest and query.

use serde::Serialize;

/// A chunk produced by the pipeline, ready to be persisted.
///
/// The embedding is not optional: a pipeline without a working embedding
/// provider cannot be constructed, so every stored chunk is searchable.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedChunk {
    /// 0-based position within the document.
    pub index: i64,
    pub text: String,
    /// SHA-256 hex digest of `text`.
    pub hash: String,
    pub embedding: Vec<f32>,
}

/// A stored chunk returned by nearest-neighbor retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub id: i64,
    pub document_id: i64,
    pub content: String,
    /// L2 distance to the query embedding; smaller is closer.
    pub distance: f32,
}

/// A document with its chunks in index order.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub id: i64,
    pub filename: String,
    pub upload_date: String, // ISO8601
    pub content_hash: String,
    pub content: String,
    pub chunks: Vec<ChunkResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkResponse {
    pub id: i64,
    pub index: i64,
    pub content: String,
}

/// One row of the query audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: String, // ISO8601
    pub query_text: String,
    pub response_text: String,
}

/// Row counts across the three tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub documents: i64,
    pub chunks: i64,
    pub audit_records: i64,
}

pub(crate) fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

pub(crate) fn sha256_hex(text: &str) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
