//! # lex-ingest
//!
//! Ingestion pipeline for legal source documents: saved portal pages and
//! pre-extracted PDF text go in, deduplicated and categorized records come
//! out in SQLite.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────────────────┐   ┌──────────┐
//! │   Sources    │──▶│             Pipeline              │──▶│  SQLite  │
//! │ manifest/dir │   │ extract → segment → classify →   │   │ documents│
//! └──────────────┘   │ hash → dedup claim → upsert      │   └──────────┘
//!                    └──────────────────────────────────┘
//! ```
//!
//! The pure stages, the dedup index and the store trait live in
//! [`lex_ingest_core`]. This crate adds configuration, the SQLite backend,
//! input sources, the concurrent orchestrator and the `lex` CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and profile construction |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Schema setup |
//! | [`sqlite_store`] | SQLite `UpsertStore` |
//! | [`sources`] | `DocumentSource` trait and manifest reader |
//! | [`connector_fs`] | Directory scan source |
//! | [`pipeline`] | Orchestrator, worker pool, batch summary |
//! | [`progress`] | Progress reporting on stderr |
//! | [`ingest`] | `lex ingest` |
//! | [`stats`] | `lex stats` |
//! | [`get`] | `lex get` |

pub mod config;
pub mod connector_fs;
pub mod db;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod pipeline;
pub mod progress;
pub mod sources;
pub mod sqlite_store;
pub mod stats;

pub use lex_ingest_core as core;
