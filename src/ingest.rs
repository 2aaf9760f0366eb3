//! `lexicon ingest <file>`: index one local text file.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::service::RagService;

pub async fn run_ingest(config: &Config, path: &Path) -> Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let service = RagService::from_config(config).await?;
    let outcome = service.ingest(&bytes, &filename).await?;

    println!(
        "Ingested {} as document {} ({} chunks)",
        filename, outcome.document_id, outcome.chunk_count
    );
    Ok(())
}
