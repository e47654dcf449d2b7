//! Filesystem source: a directory of saved pages and pre-extracted texts.
//!
//! | Extension | Content type |
//! |-----------|--------------|
//! | `.html`, `.htm` | `text/html` |
//! | `.txt`, `.md` | `text/plain` |
//! | `.pdf` | text pulled out with `pdf-extract`, then `text/plain` |
//!
//! Files that cannot be read are skipped with a warning.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use lex_ingest_core::extract::{MIME_HTML, MIME_TEXT};
use lex_ingest_core::models::RawDocument;

use crate::config::{default_include_globs, FilesystemConnectorConfig};
use crate::sources::DocumentSource;

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

#[derive(Debug, Clone)]
pub struct FilesystemSource {
    config: FilesystemConnectorConfig,
}

impl FilesystemSource {
    pub fn new(config: FilesystemConnectorConfig) -> Self {
        Self { config }
    }

    /// Scan `root` with the configured globs if a filesystem connector is
    /// set up, otherwise with the default globs.
    pub fn for_root(root: &Path, base: Option<&FilesystemConnectorConfig>) -> Self {
        let mut config = base.cloned().unwrap_or_else(|| FilesystemConnectorConfig {
            root: PathBuf::new(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        });
        config.root = root.to_path_buf();
        Self { config }
    }
}

#[async_trait]
impl DocumentSource for FilesystemSource {
    fn name(&self) -> String {
        format!("filesystem:{}", self.config.root.display())
    }

    async fn load(&self) -> Result<Vec<RawDocument>> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || scan_filesystem(&config)).await?
    }
}

pub fn scan_filesystem(fs_config: &FilesystemConnectorConfig) -> Result<Vec<RawDocument>> {
    let root = &fs_config.root;
    if !root.exists() {
        bail!("Filesystem source root does not exist: {}", root.display());
    }

    let include_set = build_globset(&fs_config.include_globs)?;
    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(fs_config.exclude_globs.clone());
    let exclude_set = build_globset(&excludes)?;

    let mut found: Vec<(String, PathBuf)> = Vec::new();
    for entry in WalkDir::new(root).follow_links(fs_config.follow_symlinks) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        found.push((rel_str, path.to_path_buf()));
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));

    let mut docs = Vec::with_capacity(found.len());
    for (rel, path) in found {
        match file_to_raw_document(&path) {
            Ok(Some(doc)) => docs.push(doc),
            Ok(None) => tracing::debug!(file = %rel, "unsupported extension, skipped"),
            Err(e) => tracing::warn!(file = %rel, error = %e, "failed to read file, skipped"),
        }
    }

    Ok(docs)
}

fn file_to_raw_document(path: &Path) -> Result<Option<RawDocument>> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    let (raw_content, content_type) = match ext.as_str() {
        "html" | "htm" => (std::fs::read_to_string(path)?, MIME_HTML),
        "txt" | "md" => (std::fs::read_to_string(path)?, MIME_TEXT),
        "pdf" => {
            let bytes = std::fs::read(path)?;
            let text = pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|e| anyhow::anyhow!("PDF extraction failed: {}", e))?;
            (text, MIME_TEXT)
        }
        _ => return Ok(None),
    };

    let modified: DateTime<Utc> = std::fs::metadata(path)?
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    let mut doc = RawDocument::new(
        format!("file://{}", path.display()),
        raw_content,
        content_type,
    );
    doc.fetched_at = modified;
    Ok(Some(doc))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
