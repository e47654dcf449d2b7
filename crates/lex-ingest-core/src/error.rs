//! Error taxonomy for the pipeline stages.
//!
//! Extraction errors are local and non-fatal: the orchestrator degrades the
//! document to empty text. Store errors are reported per record and never
//! abort sibling writes. Segmentation and classification have no error type;
//! they degrade to zero articles and the default category.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("content is binary, not text")]
    NotText,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("store connection lost: {0}")]
    Connection(String),
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Short machine-friendly tag used in batch summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Constraint(_) => "constraint",
            StoreError::Connection(_) => "connection",
            StoreError::Timeout(_) => "timeout",
            StoreError::Backend(_) => "backend",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_reports_its_limit() {
        let err = StoreError::Timeout(Duration::from_millis(250));
        assert_eq!(err.kind(), "timeout");
        assert_eq!(err.to_string(), "store operation timed out after 250ms");
    }
}
