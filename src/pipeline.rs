//! Chunking & embedding pipeline.
//!
//! Turns raw document text into [`ProcessedChunk`]s and query strings into
//! query vectors, both through the same injected [`EmbeddingProvider`]. Every
//! vector leaving the pipeline has exactly `provider.dims()` components; a
//! provider that returns anything else is reported as an embedding error.

use std::sync::Arc;

use crate::chunk::{clean_text, split_words};
use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::models::{sha256_hex, ProcessedChunk};

pub struct Pipeline {
    chunking: ChunkingConfig,
    provider: Arc<dyn EmbeddingProvider>,
}

impl Pipeline {
    pub fn new(chunking: ChunkingConfig, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { chunking, provider }
    }

    /// Clean, split and embed a document.
    ///
    /// `filename` is only used for log context.
    pub async fn process_document(&self, text: &str, filename: &str) -> Result<Vec<ProcessedChunk>> {
        let cleaned = clean_text(text);
        let windows = split_words(
            &cleaned,
            self.chunking.split_length,
            self.chunking.split_overlap,
        );

        if windows.is_empty() {
            tracing::info!(filename, "document has no words; nothing to embed");
            return Ok(Vec::new());
        }

        let vectors = self.embed_checked(&windows).await?;

        let chunks: Vec<ProcessedChunk> = windows
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (text, embedding))| ProcessedChunk {
                index: i as i64,
                hash: sha256_hex(&text),
                text,
                embedding,
            })
            .collect();

        tracing::debug!(
            filename,
            chunks = chunks.len(),
            model = self.provider.model_name(),
            "document chunked and embedded"
        );
        Ok(chunks)
    }

    /// Embed a query string with the document model.
    pub async fn embed_query(&self, query_text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed_checked(&[query_text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))
    }

    async fn embed_checked(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self
            .provider
            .embed(texts)
            .await
            .map_err(Error::embedding)?;

        if vectors.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }

        let expected = self.provider.dims();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(Error::Embedding(format!(
                "dimension mismatch: expected {}, got {}",
                expected,
                bad.len()
            )));
        }

        if vectors.iter().flatten().any(|x| !x.is_finite()) {
            return Err(Error::Embedding(
                "provider returned non-finite embedding values".to_string(),
            ));
        }

        Ok(vectors)
    }
}
