//! # lex-ingest core
//!
//! Runtime-free logic for the legal document ingestion pipeline: the data
//! model, text normalization, the extraction / segmentation / classification
//! strategies, content fingerprinting, the dedup index, and the
//! [`store::UpsertStore`] repository abstraction.
//!
//! This crate runs no async runtime and does no sqlx or filesystem I/O.
//! The dedup index uses tokio's `watch` channel so workers can wait on a
//! pending claim. The orchestrator, SQLite backend and CLI live in the
//! `lex-ingest` package.

pub mod classify;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod models;
pub mod normalize;
pub mod profile;
pub mod segment;
pub mod store;
