//! Core data models for the ingestion pipeline.
//!
//! [`RawDocument`], [`NormalizedDocument`] and [`Article`] only live for one
//! pipeline pass. [`DocumentRecord`] is what the store persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw item handed over by a fetcher, consumed once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    /// Explicit title supplied by the fetcher, if it knew one.
    #[serde(default)]
    pub title: Option<String>,
    pub url: String,
    pub raw_content: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default = "Utc::now")]
    pub fetched_at: DateTime<Utc>,
}

fn default_content_type() -> String {
    "text/html".to_string()
}

impl RawDocument {
    pub fn new(url: impl Into<String>, raw_content: impl Into<String>, content_type: &str) -> Self {
        Self {
            title: None,
            url: url.into(),
            raw_content: raw_content.into(),
            content_type: content_type.to_string(),
            fetched_at: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Fields pulled out of the page text by the metadata matchers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hijri_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub law_number: Option<String>,
}

/// Extractor output. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDocument {
    pub title: String,
    pub full_text: String,
    pub word_count: usize,
    pub metadata: DocumentMetadata,
}

impl NormalizedDocument {
    pub fn new(title: String, full_text: String, metadata: DocumentMetadata) -> Self {
        let word_count = full_text.split_whitespace().count();
        Self {
            title,
            full_text,
            word_count,
            metadata,
        }
    }

    /// A degraded document with no usable text.
    pub fn empty(title: String) -> Self {
        Self::new(title, String::new(), DocumentMetadata::default())
    }

    pub fn char_len(&self) -> usize {
        self.full_text.chars().count()
    }
}

/// A labeled sub-section ("Article 3") of a document, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub sequence_index: usize,
    pub label: String,
    pub text: String,
}

/// The persisted entity. `title` is the uniqueness key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    pub source_url: String,
    /// SHA-256 hex of the normalized full text.
    pub content_hash: String,
    pub metadata: serde_json::Value,
    /// Populated later by an enrichment job; always `None` from this pipeline.
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
