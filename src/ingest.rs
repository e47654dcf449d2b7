//! `lex ingest`: read a batch, run it through the pipeline, print the summary.
//!
//! The batch comes from a manifest file (JSON array or JSON lines) or a
//! directory scan. Ctrl-C cancels the batch: documents already in flight
//! finish, the rest are reported as skipped.

use anyhow::{bail, Result};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use lex_ingest_core::store::UpsertStore;

use crate::config::Config;
use crate::connector_fs::FilesystemSource;
use crate::pipeline::{BatchReport, BatchSummary, CancelHandle, Pipeline, PipelineContext, PipelineOptions};
use crate::progress::{ProgressEvent, ProgressMode};
use crate::sources::{DocumentSource, ManifestSource};
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone)]
pub struct IngestArgs {
    /// Manifest file or directory. `None` scans `[connectors.filesystem].root`.
    pub path: Option<PathBuf>,
    pub profile: Option<String>,
    /// Treat `path` as a directory even if it does not look like one yet.
    pub dir: bool,
    pub limit: Option<usize>,
    pub dry_run: bool,
    pub json: bool,
    pub progress: ProgressMode,
}

fn select_source(config: &Config, args: &IngestArgs) -> Result<Box<dyn DocumentSource>> {
    match &args.path {
        Some(path) if args.dir || path.is_dir() => Ok(Box::new(FilesystemSource::for_root(
            path,
            config.connectors.filesystem.as_ref(),
        ))),
        Some(path) => Ok(Box::new(ManifestSource::new(path.clone()))),
        None => match &config.connectors.filesystem {
            Some(fs_config) => Ok(Box::new(FilesystemSource::new(fs_config.clone()))),
            None => bail!(
                "No input given. Pass a manifest or directory, or configure [connectors.filesystem]."
            ),
        },
    }
}

pub async fn run_ingest(config: &Config, args: &IngestArgs) -> Result<BatchReport> {
    let profile = config.source_profile(args.profile.as_deref())?;
    let source = select_source(config, args)?;
    let reporter = args.progress.reporter();

    reporter.report(ProgressEvent::Loading {
        source: source.name(),
    });
    let mut docs = source.load().await?;
    if let Some(limit) = args.limit {
        docs.truncate(limit);
    }
    tracing::info!(source = %source.name(), documents = docs.len(), "loaded batch");

    let store = Arc::new(SqliteStore::open(config).await?);
    let ctx = PipelineContext::seeded(store.clone() as Arc<dyn UpsertStore>).await;

    let mut options = PipelineOptions::from(&config.pipeline);
    options.dry_run = args.dry_run;
    let pipeline = Pipeline::new(ctx, profile, options);

    let cancel = CancelHandle::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, letting in-flight documents finish");
            on_interrupt.cancel();
        }
    });

    let report = pipeline.run_batch(docs, &cancel, reporter.as_ref()).await;
    interrupt.abort();
    store.pool().close().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_summary(&source.name(), &report.summary, args.dry_run));
    }

    Ok(report)
}

/// Plain-text summary in the `key: value` layout used by every command.
pub fn render_summary(source: &str, s: &BatchSummary, dry_run: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "ingest {}{}",
        source,
        if dry_run { " (dry-run)" } else { "" }
    );
    let _ = writeln!(out, "  attempted: {}", s.attempted);
    let _ = writeln!(out, "  extracted: {}", s.extracted);
    let _ = writeln!(out, "  segmented: {}", s.segmented);
    if dry_run {
        let _ = writeln!(out, "  validated: {}", s.validated);
    } else {
        let _ = writeln!(
            out,
            "  persisted: {} (inserted {}, updated {})",
            s.persisted, s.inserted, s.updated
        );
    }
    let _ = writeln!(out, "  duplicates: {}", s.duplicates);
    let _ = writeln!(out, "  failed: {}", s.failed);
    for (stage, n) in &s.failed_by_stage {
        let _ = writeln!(out, "    {}: {}", stage, n);
    }
    if s.skipped > 0 {
        let _ = writeln!(out, "  skipped: {}", s.skipped);
    }
    let _ = writeln!(out, "  words: {}", s.total_words);
    let _ = writeln!(out, "  articles: {}", s.total_articles);
    if !s.categories.is_empty() {
        let _ = writeln!(out, "  categories:");
        for (category, n) in &s.categories {
            let _ = writeln!(out, "    {}: {}", category, n);
        }
    }
    let _ = writeln!(out, "  duration: {} ms", s.duration_ms);
    out.push_str("ok\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn summary() -> BatchSummary {
        BatchSummary {
            attempted: 10,
            extracted: 10,
            segmented: 10,
            persisted: 8,
            inserted: 7,
            updated: 1,
            duplicates: 1,
            validated: 0,
            failed: 1,
            failed_by_stage: BTreeMap::from([("store".to_string(), 1)]),
            total_words: 1234,
            total_articles: 40,
            categories: BTreeMap::from([("UAE Federal Law".to_string(), 8)]),
            skipped: 0,
            duration_ms: 12,
        }
    }

    #[test]
    fn summary_lists_failures_by_stage() {
        let text = render_summary("manifest:laws.json", &summary(), false);
        assert!(text.starts_with("ingest manifest:laws.json\n"));
        assert!(text.contains("  persisted: 8 (inserted 7, updated 1)"));
        assert!(text.contains("  failed: 1\n    store: 1"));
        assert!(text.contains("    UAE Federal Law: 8"));
        assert!(!text.contains("skipped"));
        assert!(text.ends_with("ok\n"));
    }

    #[test]
    fn dry_run_summary_reports_validated() {
        let text = render_summary("filesystem:raw", &summary(), true);
        assert!(text.contains("(dry-run)"));
        assert!(text.contains("validated: 0"));
        assert!(!text.contains("persisted:"));
    }

    #[test]
    fn missing_input_is_an_error() {
        let config: Config = toml::from_str("[db]\npath = \"x\"\n").unwrap();
        let args = IngestArgs {
            path: None,
            profile: None,
            dir: false,
            limit: None,
            dry_run: false,
            json: false,
            progress: ProgressMode::Off,
        };
        assert!(select_source(&config, &args).is_err());
    }
}
