//! Repository abstraction for persisted documents.
//!
//! The [`UpsertStore`] trait is everything the orchestrator and the read
//! commands need from a backend. Records are keyed by `title`: at most one
//! live record exists per title, and an upsert whose content hash matches
//! the stored one touches nothing.
//!
//! Implementations must be `Send + Sync`; the orchestrator shares one store
//! across its workers.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreError;
use crate::models::DocumentRecord;

/// What an upsert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// No record existed under the key; a new one was created.
    Inserted,
    /// A record existed with different content and was overwritten in place.
    Updated,
    /// A record existed with the same content hash; nothing was written.
    Unchanged,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Inserted => "inserted",
            UpsertOutcome::Updated => "updated",
            UpsertOutcome::Unchanged => "unchanged",
        }
    }
}

/// Result of a successful upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpsertResult {
    /// Identifier of the live record (existing identity on update).
    pub id: String,
    pub outcome: UpsertOutcome,
    /// Creation time of the live record; preserved across updates.
    pub created_at: DateTime<Utc>,
}

/// Abstract storage backend for ingested documents.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](UpsertStore::upsert) | Atomic insert-or-update keyed by title |
/// | [`known_fingerprints`](UpsertStore::known_fingerprints) | Seed the dedup index |
/// | [`get_by_title`](UpsertStore::get_by_title) | Fetch one record |
/// | [`count`](UpsertStore::count) | Number of live records |
/// | [`category_counts`](UpsertStore::category_counts) | Per-category breakdown |
#[async_trait]
pub trait UpsertStore: Send + Sync {
    /// Insert or update `record` under its title.
    ///
    /// On conflict the content, source URL, category, content hash, metadata
    /// and `updated_at` are replaced; `id` and `created_at` of the existing
    /// row are kept. The write is all-or-nothing.
    async fn upsert(&self, record: &DocumentRecord) -> Result<UpsertResult, StoreError>;

    /// All `(content_hash, id)` pairs currently persisted.
    async fn known_fingerprints(&self) -> Result<Vec<(String, String)>, StoreError>;

    async fn get_by_title(&self, title: &str) -> Result<Option<DocumentRecord>, StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;

    /// `(category, count)` pairs, largest first.
    async fn category_counts(&self) -> Result<Vec<(String, i64)>, StoreError>;
}
