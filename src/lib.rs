//! # Lexicon
//!
//! A small retrieval-augmented question answering service.
//!
//! Plain-text documents are cleaned, split into overlapping word windows,
//! embedded, and stored in SQLite. Queries are embedded with the same model,
//! matched against stored chunks by L2 distance, and optionally answered by
//! an LLM restricted to the retrieved context. Every query is audited.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────┐
//! │  Upload  │──▶│  Pipeline   │──▶│  SQLite  │
//! │ (text)   │   │ Chunk+Embed │   │ Docs+Vec │
//! └──────────┘   └─────────────┘   └────┬─────┘
//!                                       │
//!                   ┌───────────────────┤
//!                   ▼                   ▼
//!              ┌──────────┐       ┌──────────┐
//!              │   CLI    │       │   HTTP   │
//!              │(lexicon) │       │  (axum)  │
//!              └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lexicon init                       # create database
//! lexicon ingest ./notes.txt         # chunk, embed, store
//! lexicon query "what is in my notes?"
//! lexicon serve                      # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`error`] | Service error taxonomy |
//! | [`models`] | Core data types |
//! | [`chunk`] | Text cleaning and word-window splitting |
//! | [`embedding`] | Embedding providers and vector helpers |
//! | [`pipeline`] | Document → embedded chunks |
//! | [`llm`] | Answer generation clients |
//! | [`store`] | Storage trait with SQLite and in-memory backends |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Schema creation |
//! | [`service`] | Ingest and query flows |
//! | [`server`] | HTTP API |
//! | [`ingest`], [`query`], [`get`], [`audit`], [`stats`] | CLI commands |

pub mod audit;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod get;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod server;
pub mod service;
pub mod stats;
pub mod store;

pub use error::{Error, Result};
