//! Input sources: where raw documents come from.
//!
//! A [`DocumentSource`] hands the orchestrator a batch of [`RawDocument`]s.
//! Fetching from the portals happens elsewhere; these sources read what a
//! fetcher left on disk.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use lex_ingest_core::models::RawDocument;

#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Short label used in logs and progress output.
    fn name(&self) -> String;

    async fn load(&self) -> Result<Vec<RawDocument>>;
}

/// A manifest written by a fetcher: either a JSON array of raw documents or
/// one JSON object per line.
///
/// ```json
/// {"title": "Federal Law No. 5 of 1985", "url": "https://…", "raw_content": "<html>…", "content_type": "text/html"}
/// ```
pub struct ManifestSource {
    path: PathBuf,
}

impl ManifestSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DocumentSource for ManifestSource {
    fn name(&self) -> String {
        format!("manifest:{}", self.path.display())
    }

    async fn load(&self) -> Result<Vec<RawDocument>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read manifest: {}", self.path.display()))?;
        parse_manifest(&content, &self.path)
    }
}

fn parse_manifest(content: &str, path: &Path) -> Result<Vec<RawDocument>> {
    let trimmed = content.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .with_context(|| format!("Failed to parse manifest array: {}", path.display()));
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| {
                format!("Failed to parse manifest line {}: {}", i + 1, path.display())
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_array() {
        let docs = parse_manifest(
            r#"[{"url": "https://a.test/1", "raw_content": "<p>x</p>"},
                {"title": "T", "url": "https://a.test/2", "raw_content": "y", "content_type": "text/plain"}]"#,
            Path::new("m.json"),
        )
        .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content_type, "text/html");
        assert_eq!(docs[1].title.as_deref(), Some("T"));
    }

    #[test]
    fn parses_json_lines_skipping_blanks() {
        let src = "{\"url\": \"u1\", \"raw_content\": \"a\"}\n\n{\"url\": \"u2\", \"raw_content\": \"b\"}\n";
        let docs = parse_manifest(src, Path::new("m.jsonl")).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].url, "u2");
    }

    #[test]
    fn reports_bad_line_number() {
        let src = "{\"url\": \"u1\", \"raw_content\": \"a\"}\nnot json\n";
        let err = parse_manifest(src, Path::new("m.jsonl")).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn empty_manifest_is_empty_batch() {
        assert!(parse_manifest("  \n", Path::new("m.json")).unwrap().is_empty());
    }
}
