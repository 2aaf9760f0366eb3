//! Storage abstraction.
//!
//! The [`Store`] trait covers everything the service persists or reads:
//! documents with their chunks, nearest-neighbor lookup, and the audit trail.
//! Two backends exist: [`SqliteStore`] for real deployments and
//! [`InMemoryStore`] for tests.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`ensure_embedding_model`](Store::ensure_embedding_model) | Pin the index to one model/dimension |
//! | [`insert_document`](Store::insert_document) | Document + chunks, atomically |
//! | [`nearest_chunks`](Store::nearest_chunks) | Top-k chunks by L2 distance |
//! | [`insert_audit`](Store::insert_audit) | Append an audit record |
//! | [`get_document`](Store::get_document) | Document with chunks |
//! | [`delete_document`](Store::delete_document) | Remove a document and its chunks |
//! | [`recent_audit`](Store::recent_audit) | Newest audit records |
//! | [`stats`](Store::stats) | Row counts |

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{AuditRecord, DocumentResponse, ProcessedChunk, RetrievedChunk, StoreStats};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Record the embedding model on first use; fail if the index was built
    /// with a different model or dimension.
    async fn ensure_embedding_model(&self, model: &str, dims: usize) -> Result<()>;

    /// Insert a document and all of its chunks in one transaction.
    ///
    /// Returns the new document id. On error nothing is written.
    async fn insert_document(
        &self,
        filename: &str,
        content: &str,
        chunks: &[ProcessedChunk],
    ) -> Result<i64>;

    /// Return at most `k` chunks ordered by ascending L2 distance to
    /// `query_vec`, ties broken by ascending chunk id.
    async fn nearest_chunks(&self, query_vec: &[f32], k: usize) -> Result<Vec<RetrievedChunk>>;

    /// Append an audit record, returning its id.
    async fn insert_audit(&self, query_text: &str, response_text: &str) -> Result<i64>;

    async fn get_document(&self, id: i64) -> Result<Option<DocumentResponse>>;

    /// Returns `false` when no such document exists.
    async fn delete_document(&self, id: i64) -> Result<bool>;

    /// Most recent audit records first.
    async fn recent_audit(&self, limit: usize) -> Result<Vec<AuditRecord>>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Order retrieval candidates and keep the first `k`.
pub(crate) fn rank_by_distance(mut candidates: Vec<RetrievedChunk>, k: usize) -> Vec<RetrievedChunk> {
    candidates.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.id.cmp(&b.id))
    });
    candidates.truncate(k);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: i64, distance: f32) -> RetrievedChunk {
        RetrievedChunk {
            id,
            document_id: 1,
            content: format!("chunk {}", id),
            distance,
        }
    }

    #[test]
    fn test_rank_orders_by_distance_then_id() {
        let ranked = rank_by_distance(
            vec![
                candidate(5, 0.5),
                candidate(3, 0.1),
                candidate(2, 0.5),
                candidate(9, 2.0),
            ],
            3,
        );
        let ids: Vec<i64> = ranked.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 2, 5]);
    }

    #[test]
    fn test_rank_k_zero() {
        assert!(rank_by_distance(vec![candidate(1, 0.0)], 0).is_empty());
    }

    #[test]
    fn test_rank_nan_distance_sorts_last() {
        let ranked = rank_by_distance(
            vec![candidate(1, f32::NAN), candidate(2, 0.3), candidate(3, 0.1)],
            3,
        );
        let ids: Vec<i64> = ranked.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }
}
