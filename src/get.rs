//! Document retrieval and removal by id.
//!
//! Backs the `lexicon get` and `lexicon delete` commands. Neither needs the
//! embedding model, so they talk to the SQLite store directly.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::store::{SqliteStore, Store};

/// CLI entry point: fetch a document and print it with its chunks.
pub async fn run_get(config: &Config, id: i64) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let doc = store.get_document(id).await?;
    store.pool().close().await;

    let doc = match doc {
        Some(d) => d,
        None => bail!("document not found: {}", id),
    };

    println!("--- Document ---");
    println!("id:           {}", doc.id);
    println!("filename:     {}", doc.filename);
    println!("upload_date:  {}", doc.upload_date);
    println!("content_hash: {}", doc.content_hash);
    println!();

    println!("--- Content ---");
    println!("{}", doc.content);
    println!();

    println!("--- Chunks ({}) ---", doc.chunks.len());
    for chunk in &doc.chunks {
        println!("[chunk {} | id {}]", chunk.index, chunk.id);
        println!("{}", chunk.content);
        println!();
    }

    Ok(())
}

/// CLI entry point: delete a document and its chunks.
pub async fn run_delete(config: &Config, id: i64) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let deleted = store.delete_document(id).await?;
    store.pool().close().await;

    if !deleted {
        bail!("document not found: {}", id);
    }
    tracing::info!(document_id = id, "document deleted");
    println!("Deleted document {}", id);
    Ok(())
}
