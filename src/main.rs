//! # Lexicon CLI (`lexicon`)
//!
//! ## Usage
//!
//! ```bash
//! lexicon --config ./config/lexicon.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lexicon init` | Create the SQLite database and run schema migrations |
//! | `lexicon ingest <file>` | Chunk, embed and store a text file |
//! | `lexicon query "<text>"` | Retrieve top-k chunks and answer |
//! | `lexicon get <id>` | Show a document with its chunks |
//! | `lexicon delete <id>` | Remove a document and its chunks |
//! | `lexicon audit` | Show recent queries and answers |
//! | `lexicon stats` | Database summary |
//! | `lexicon serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use lexicon::{audit, config, get, ingest, logging, migrate, query, server, stats};

#[derive(Parser)]
#[command(
    name = "lexicon",
    about = "Lexicon - ingest text documents and ask questions about them",
    version,
    long_about = "Lexicon chunks and embeds plain-text documents into SQLite, retrieves the \
    closest chunks for a question by L2 distance, optionally asks an LLM to answer from that \
    context, and records every query in an audit log."
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "./config/lexicon.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and schema.
    Init,

    /// Ingest a UTF-8 text file.
    Ingest { file: PathBuf },

    /// Ask a question against the indexed documents.
    Query {
        query: String,

        /// Number of chunks to retrieve.
        #[arg(long)]
        k: Option<usize>,
    },

    /// Show a document and its chunks.
    Get { id: i64 },

    /// Delete a document and its chunks.
    Delete { id: i64 },

    /// Show the most recent audit records.
    Audit {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Print database statistics.
    Stats,

    /// Start the HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_init(&cfg).await?;
        }
        Commands::Ingest { file } => {
            ingest::run_ingest(&cfg, &file).await?;
        }
        Commands::Query { query, k } => {
            query::run_query(&cfg, &query, k).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, id).await?;
        }
        Commands::Delete { id } => {
            get::run_delete(&cfg, id).await?;
        }
        Commands::Audit { limit } => {
            audit::run_audit(&cfg, limit).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
