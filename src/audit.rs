//! `lexicon audit`: show the most recent queries and the answers given.

use anyhow::Result;

use crate::config::Config;
use crate::store::{SqliteStore, Store};

pub async fn run_audit(config: &Config, limit: usize) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let records = store.recent_audit(limit).await?;
    store.pool().close().await;

    if records.is_empty() {
        println!("No queries recorded.");
        return Ok(());
    }

    for record in &records {
        println!("#{} {}", record.id, record.timestamp);
        println!("    query:  {}", record.query_text);
        println!("    answer: {}", record.response_text.replace('\n', " "));
        println!();
    }
    Ok(())
}
