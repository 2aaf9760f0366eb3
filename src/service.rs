//! Retrieval & answer service.
//!
//! [`RagService`] owns the two request flows:
//!
//! - **ingest**: validate → chunk & embed → persist document and chunks in
//!   one transaction.
//! - **query**: validate → embed → top-k by L2 distance → assemble context →
//!   optional LLM answer → one audit record → respond.
//!
//! LLM trouble never fails a query. Without a configured client the answer
//! is [`LLM_DISABLED_ANSWER`]; when the client errors or times out it is
//! [`LLM_FAILED_ANSWER`]. The audit record always stores the answer that was
//! returned.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::{Config, RetrievalConfig};
use crate::embedding::create_provider;
use crate::error::{Error, Result};
use crate::llm::{self, LlmClient};
use crate::models::{AuditRecord, DocumentResponse, RetrievedChunk, StoreStats};
use crate::pipeline::Pipeline;
use crate::store::{SqliteStore, Store};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the question using only the \
provided context. If the answer is not contained in the context, say that you cannot find it in \
the provided documents.";

pub const LLM_DISABLED_ANSWER: &str =
    "LLM generation is not configured. Showing retrieved context only.";

pub const LLM_FAILED_ANSWER: &str =
    "The answer could not be generated because the language model is unavailable. Showing retrieved context only.";

const CONTEXT_SEPARATOR: &str = "\n---\n";

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub document_id: i64,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub query: String,
    pub results: Vec<RetrievedChunk>,
    pub answer: String,
}

pub struct RagService {
    store: Arc<dyn Store>,
    pipeline: Pipeline,
    llm: Option<Arc<dyn LlmClient>>,
    llm_timeout: Duration,
    retrieval: RetrievalConfig,
}

impl RagService {
    pub fn new(
        store: Arc<dyn Store>,
        pipeline: Pipeline,
        llm: Option<Arc<dyn LlmClient>>,
        llm_timeout: Duration,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            pipeline,
            llm,
            llm_timeout,
            retrieval,
        }
    }

    /// Wire up the SQLite store, embedding provider and LLM client.
    ///
    /// Fails when the embedding provider cannot be built or when the index
    /// was created with a different embedding model.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let provider = create_provider(&config.embedding)
            .map_err(|e| Error::Configuration(format!("{:#}", e)))?;

        let store: Arc<dyn Store> =
            Arc::new(SqliteStore::open(config).await.map_err(Error::storage)?);

        store
            .ensure_embedding_model(provider.model_name(), provider.dims())
            .await
            .map_err(|e| Error::Configuration(format!("{:#}", e)))?;

        let pipeline = Pipeline::new(config.chunking.clone(), provider);
        let llm = llm::create_client(&config.llm);

        Ok(Self::new(
            store,
            pipeline,
            llm,
            Duration::from_secs(config.llm.timeout_secs),
            config.retrieval.clone(),
        ))
    }

    pub fn llm_enabled(&self) -> bool {
        self.llm.is_some()
    }

    pub async fn ingest(&self, file_content: &[u8], filename: &str) -> Result<IngestOutcome> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(Error::validation("filename must not be empty"));
        }
        let text = std::str::from_utf8(file_content)
            .map_err(|_| Error::validation("file content must be valid UTF-8 text"))?;

        let chunks = self.pipeline.process_document(text, filename).await?;

        let document_id = self
            .store
            .insert_document(filename, text, &chunks)
            .await
            .map_err(Error::storage)?;

        tracing::info!(
            document_id,
            filename,
            chunks = chunks.len(),
            "document ingested"
        );

        Ok(IngestOutcome {
            document_id,
            chunk_count: chunks.len(),
        })
    }

    pub async fn query(&self, query_text: &str, k: Option<usize>) -> Result<QueryOutcome> {
        if query_text.trim().is_empty() {
            return Err(Error::validation("query must not be empty"));
        }
        let k = k.unwrap_or(self.retrieval.default_k);
        if k < 1 || k > self.retrieval.max_k {
            return Err(Error::validation(format!(
                "k must be between 1 and {}",
                self.retrieval.max_k
            )));
        }

        let query_vec = self.pipeline.embed_query(query_text).await?;
        let results = self
            .store
            .nearest_chunks(&query_vec, k)
            .await
            .map_err(Error::storage)?;

        let answer = self.answer(query_text, &results).await;

        self.store
            .insert_audit(query_text, &answer)
            .await
            .map_err(Error::storage)?;

        tracing::info!(k, results = results.len(), "query answered");

        Ok(QueryOutcome {
            query: query_text.to_string(),
            results,
            answer,
        })
    }

    async fn answer(&self, query_text: &str, results: &[RetrievedChunk]) -> String {
        let client = match &self.llm {
            Some(c) => c,
            None => return LLM_DISABLED_ANSWER.to_string(),
        };

        let message = user_message(query_text, results);
        match tokio::time::timeout(self.llm_timeout, client.generate(SYSTEM_PROMPT, &message)).await
        {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                tracing::warn!(model = client.model_name(), error = %e, "LLM generation failed");
                LLM_FAILED_ANSWER.to_string()
            }
            Err(_) => {
                tracing::warn!(
                    model = client.model_name(),
                    timeout_secs = self.llm_timeout.as_secs(),
                    "LLM generation timed out"
                );
                LLM_FAILED_ANSWER.to_string()
            }
        }
    }

    pub async fn get_document(&self, id: i64) -> Result<Option<DocumentResponse>> {
        self.store.get_document(id).await.map_err(Error::storage)
    }

    pub async fn delete_document(&self, id: i64) -> Result<bool> {
        let deleted = self
            .store
            .delete_document(id)
            .await
            .map_err(Error::storage)?;
        if deleted {
            tracing::info!(document_id = id, "document deleted");
        }
        Ok(deleted)
    }

    pub async fn recent_audit(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        self.store.recent_audit(limit).await.map_err(Error::storage)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.store.stats().await.map_err(Error::storage)
    }
}

fn user_message(query_text: &str, results: &[RetrievedChunk]) -> String {
    let context = results
        .iter()
        .map(|r| r.content.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);
    format!("Context:\n{}\n\nQuestion: {}", context, query_text)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ChunkingConfig;
    use crate::embedding::HashingProvider;
    use crate::llm::LlmError;
    use crate::pipeline::tests::CountingEmbedder;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records the last prompt and answers with a fixed string.
    pub(crate) struct EchoLlm {
        pub last_message: Mutex<Option<String>>,
    }

    #[async_trait]
    impl LlmClient for EchoLlm {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn generate(&self, _system: &str, user: &str) -> Result<String, LlmError> {
            *self.last_message.lock().unwrap() = Some(user.to_string());
            Ok("generated answer".to_string())
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        fn model_name(&self) -> &str {
            "failing"
        }
        async fn generate(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
            Err(LlmError::Unavailable("connection refused".to_string()))
        }
    }

    struct SlowLlm;

    #[async_trait]
    impl LlmClient for SlowLlm {
        fn model_name(&self) -> &str {
            "slow"
        }
        async fn generate(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".to_string())
        }
    }

    pub(crate) fn service_with(llm: Option<Arc<dyn LlmClient>>) -> RagService {
        let pipeline = Pipeline::new(
            ChunkingConfig::default(),
            Arc::new(CountingEmbedder { dims: 4 }),
        );
        RagService::new(
            Arc::new(InMemoryStore::new()),
            pipeline,
            llm,
            Duration::from_millis(50),
            RetrievalConfig::default(),
        )
    }

    pub(crate) fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[tokio::test]
    async fn test_ingest_250_words_gives_two_chunks() {
        let service = service_with(None);
        let outcome = service.ingest(words(250).as_bytes(), "doc.txt").await.unwrap();
        assert_eq!(outcome.chunk_count, 2);

        let doc = service
            .get_document(outcome.document_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.chunks[0].content.split_whitespace().count(), 200);
        assert_eq!(doc.chunks[1].content.split_whitespace().count(), 70);
        assert!(doc.chunks[1].content.starts_with("w180 "));
    }

    #[tokio::test]
    async fn test_reingest_same_bytes_creates_new_document_with_same_chunks() {
        let service = service_with(None);
        let body = words(250);
        let first = service.ingest(body.as_bytes(), "doc.txt").await.unwrap();
        let second = service.ingest(body.as_bytes(), "doc.txt").await.unwrap();
        assert_ne!(first.document_id, second.document_id);
        assert_eq!(first.chunk_count, second.chunk_count);

        let a = service.get_document(first.document_id).await.unwrap().unwrap();
        let b = service.get_document(second.document_id).await.unwrap().unwrap();
        assert_eq!(a.content_hash, b.content_hash);
        let a_chunks: Vec<_> = a.chunks.iter().map(|c| (c.index, c.content.as_str())).collect();
        let b_chunks: Vec<_> = b.chunks.iter().map(|c| (c.index, c.content.as_str())).collect();
        assert_eq!(a_chunks, b_chunks);

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.chunks, 4);
    }

    #[tokio::test]
    async fn test_ingest_rejects_non_utf8() {
        let service = service_with(None);
        let err = service.ingest(&[0xff, 0xfe, 0x00], "bin.dat").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(service.stats().await.unwrap(), StoreStats::default());
    }

    #[tokio::test]
    async fn test_ingest_rejects_empty_filename() {
        let service = service_with(None);
        let err = service.ingest(b"hello", "  ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected_without_audit() {
        let service = service_with(None);
        for q in ["", "   \n\t"] {
            let err = service.query(q, None).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }
        assert_eq!(service.stats().await.unwrap().audit_records, 0);
    }

    #[tokio::test]
    async fn test_k_out_of_range_is_rejected() {
        let service = service_with(None);
        assert!(matches!(
            service.query("q", Some(0)).await.unwrap_err(),
            Error::Validation(_)
        ));
        assert!(matches!(
            service.query("q", Some(51)).await.unwrap_err(),
            Error::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_query_without_llm_returns_placeholder_and_audits() {
        let service = service_with(None);
        service.ingest(words(250).as_bytes(), "doc.txt").await.unwrap();

        let outcome = service.query("w5 w6", None).await.unwrap();
        assert_eq!(outcome.answer, LLM_DISABLED_ANSWER);
        assert_eq!(outcome.results.len(), 2);

        let audit = service.recent_audit(10).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].query_text, "w5 w6");
        assert_eq!(audit[0].response_text, LLM_DISABLED_ANSWER);
    }

    #[tokio::test]
    async fn test_results_bounded_by_k_and_sorted() {
        let pipeline = Pipeline::new(
            ChunkingConfig {
                split_length: 10,
                split_overlap: 2,
            },
            Arc::new(HashingProvider::new(32)),
        );
        let service = RagService::new(
            Arc::new(InMemoryStore::new()),
            pipeline,
            None,
            Duration::from_secs(1),
            RetrievalConfig::default(),
        );
        service.ingest(words(100).as_bytes(), "doc.txt").await.unwrap();

        for k in [1, 3, 5] {
            let outcome = service.query("w42 w43 w44", Some(k)).await.unwrap();
            assert!(outcome.results.len() <= k);
            assert!(outcome
                .results
                .windows(2)
                .all(|w| w[0].distance <= w[1].distance));
        }
        assert_eq!(service.stats().await.unwrap().audit_records, 3);
    }

    #[tokio::test]
    async fn test_query_on_empty_store_still_audits() {
        let service = service_with(None);
        let outcome = service.query("anything", Some(3)).await.unwrap();
        assert!(outcome.results.is_empty());
        assert_eq!(service.stats().await.unwrap().audit_records, 1);
    }

    #[tokio::test]
    async fn test_llm_receives_context_and_question() {
        let llm = Arc::new(EchoLlm {
            last_message: Mutex::new(None),
        });
        let service = service_with(Some(llm.clone() as Arc<dyn LlmClient>));
        service.ingest(b"alpha beta gamma", "a.txt").await.unwrap();
        service.ingest(b"delta epsilon", "b.txt").await.unwrap();

        let outcome = service.query("what is alpha?", Some(2)).await.unwrap();
        assert_eq!(outcome.answer, "generated answer");

        let message = llm.last_message.lock().unwrap().clone().unwrap();
        assert!(message.starts_with("Context:\n"));
        assert!(message.contains("\n---\n"));
        assert!(message.ends_with("\n\nQuestion: what is alpha?"));

        let audit = service.recent_audit(1).await.unwrap();
        assert_eq!(audit[0].response_text, "generated answer");
    }

    #[tokio::test]
    async fn test_llm_failure_substitutes_placeholder() {
        let service = service_with(Some(Arc::new(FailingLlm)));
        let outcome = service.query("question", None).await.unwrap();
        assert_eq!(outcome.answer, LLM_FAILED_ANSWER);
        let audit = service.recent_audit(1).await.unwrap();
        assert_eq!(audit[0].response_text, LLM_FAILED_ANSWER);
    }

    #[tokio::test]
    async fn test_llm_timeout_substitutes_placeholder() {
        let service = service_with(Some(Arc::new(SlowLlm)));
        let outcome = service.query("question", None).await.unwrap();
        assert_eq!(outcome.answer, LLM_FAILED_ANSWER);
        assert_eq!(service.stats().await.unwrap().audit_records, 1);
    }

    #[tokio::test]
    async fn test_delete_document() {
        let service = service_with(None);
        let outcome = service.ingest(words(30).as_bytes(), "doc.txt").await.unwrap();
        assert!(service.delete_document(outcome.document_id).await.unwrap());
        assert!(service
            .get_document(outcome.document_id)
            .await
            .unwrap()
            .is_none());
        assert_eq!(service.stats().await.unwrap().chunks, 0);
    }

    #[test]
    fn test_user_message_layout() {
        let results = vec![
            RetrievedChunk {
                id: 1,
                document_id: 1,
                content: "first".to_string(),
                distance: 0.1,
            },
            RetrievedChunk {
                id: 2,
                document_id: 1,
                content: "second".to_string(),
                distance: 0.2,
            },
        ];
        assert_eq!(
            user_message("why?", &results),
            "Context:\nfirst\n---\nsecond\n\nQuestion: why?"
        );
    }
}
