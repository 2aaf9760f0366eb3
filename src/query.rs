//! `lexicon query "<text>"`: retrieve, answer and audit from the CLI.

use anyhow::Result;

use crate::config::Config;
use crate::service::RagService;

pub async fn run_query(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let outcome = service.query(query, k).await?;

    if outcome.results.is_empty() {
        println!("No results.");
    }
    for (i, result) in outcome.results.iter().enumerate() {
        println!(
            "{}. [{:.4}] document {} / chunk {}",
            i + 1,
            result.distance,
            result.document_id,
            result.id
        );
        println!(
            "    excerpt: \"{}\"",
            excerpt(&result.content, 240).replace('\n', " ").trim()
        );
        println!();
    }

    println!("Answer:");
    println!("{}", outcome.answer);
    Ok(())
}

/// First `max_chars` characters of `text`, with an ellipsis when cut.
fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("short", 10), "short");
        assert_eq!(excerpt("héllo wörld", 5), "héllo...");
    }
}
