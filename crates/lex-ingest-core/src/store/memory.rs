//! In-memory [`UpsertStore`] for tests and library users.
//!
//! Records live in a `HashMap` keyed by title behind a `parking_lot` lock,
//! so every upsert is trivially atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::models::DocumentRecord;

use super::{UpsertOutcome, UpsertResult, UpsertStore};

#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, DocumentRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record, ordered by title.
    pub fn records(&self) -> Vec<DocumentRecord> {
        let mut out: Vec<_> = self.records.read().values().cloned().collect();
        out.sort_by(|a, b| a.title.cmp(&b.title));
        out
    }
}

#[async_trait]
impl UpsertStore for InMemoryStore {
    async fn upsert(&self, record: &DocumentRecord) -> Result<UpsertResult, StoreError> {
        if record.title.trim().is_empty() {
            return Err(StoreError::Constraint("title must not be empty".into()));
        }

        let mut records = self.records.write();
        match records.get_mut(&record.title) {
            Some(existing) if existing.content_hash == record.content_hash => Ok(UpsertResult {
                id: existing.id.clone(),
                outcome: UpsertOutcome::Unchanged,
                created_at: existing.created_at,
            }),
            Some(existing) => {
                existing.content = record.content.clone();
                existing.source_url = record.source_url.clone();
                existing.category = record.category.clone();
                existing.content_hash = record.content_hash.clone();
                existing.metadata = record.metadata.clone();
                existing.updated_at = record.updated_at;
                Ok(UpsertResult {
                    id: existing.id.clone(),
                    outcome: UpsertOutcome::Updated,
                    created_at: existing.created_at,
                })
            }
            None => {
                records.insert(record.title.clone(), record.clone());
                Ok(UpsertResult {
                    id: record.id.clone(),
                    outcome: UpsertOutcome::Inserted,
                    created_at: record.created_at,
                })
            }
        }
    }

    async fn known_fingerprints(&self) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .records
            .read()
            .values()
            .map(|r| (r.content_hash.clone(), r.id.clone()))
            .collect())
    }

    async fn get_by_title(&self, title: &str) -> Result<Option<DocumentRecord>, StoreError> {
        Ok(self.records.read().get(title).cloned())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(self.records.read().len() as i64)
    }

    async fn category_counts(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let mut counts: HashMap<String, i64> = HashMap::new();
        for record in self.records.read().values() {
            *counts.entry(record.category.clone()).or_default() += 1;
        }
        let mut out: Vec<_> = counts.into_iter().collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(title: &str, content: &str, hash: &str) -> DocumentRecord {
        let now = Utc::now();
        DocumentRecord {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            content: content.into(),
            category: "UAE Federal Law".into(),
            source_url: format!("https://example.test/{title}"),
            content_hash: hash.into(),
            metadata: serde_json::json!({}),
            embedding: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_then_unchanged() {
        let store = InMemoryStore::new();
        let first = store.upsert(&record("Law 1", "text", "h1")).await.unwrap();
        assert_eq!(first.outcome, UpsertOutcome::Inserted);

        let again = store.upsert(&record("Law 1", "text", "h1")).await.unwrap();
        assert_eq!(again.outcome, UpsertOutcome::Unchanged);
        assert_eq!(again.id, first.id);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_preserves_identity_and_created_at() {
        let store = InMemoryStore::new();
        let first = store.upsert(&record("Law 1", "old", "h1")).await.unwrap();

        let mut changed = record("Law 1", "new", "h2");
        changed.updated_at = Utc::now() + Duration::seconds(5);
        let second = store.upsert(&changed).await.unwrap();

        assert_eq!(second.outcome, UpsertOutcome::Updated);
        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);

        let stored = store.get_by_title("Law 1").await.unwrap().unwrap();
        assert_eq!(stored.content, "new");
        assert_eq!(stored.content_hash, "h2");
        assert!(stored.updated_at > stored.created_at);
    }

    #[tokio::test]
    async fn empty_title_is_a_constraint_violation() {
        let store = InMemoryStore::new();
        let err = store.upsert(&record("  ", "x", "h")).await.unwrap_err();
        assert_eq!(err.kind(), "constraint");
    }

    #[tokio::test]
    async fn category_counts_are_sorted() {
        let store = InMemoryStore::new();
        store.upsert(&record("a", "x", "1")).await.unwrap();
        store.upsert(&record("b", "y", "2")).await.unwrap();
        let mut traffic = record("c", "z", "3");
        traffic.category = "Traffic and Transportation".into();
        store.upsert(&traffic).await.unwrap();

        let counts = store.category_counts().await.unwrap();
        assert_eq!(counts[0], ("UAE Federal Law".to_string(), 2));
        assert_eq!(counts[1], ("Traffic and Transportation".to_string(), 1));
        assert_eq!(store.known_fingerprints().await.unwrap().len(), 3);
    }
}
