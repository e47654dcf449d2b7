//! Pipeline orchestrator.
//!
//! Drives each [`RawDocument`] through
//! `FETCHED → EXTRACTED → SEGMENTED → CLASSIFIED → HASHED → {DUPLICATE | PERSISTED}`,
//! or into `FAILED(stage, cause)` at any point. One document failing never
//! stops its siblings.
//!
//! # Concurrency
//!
//! Documents run on a bounded worker pool (a [`Semaphore`] with
//! `concurrency` permits feeding a [`JoinSet`]). The pure stages run on the
//! blocking pool, each behind `catch_unwind` so a panic is attributed to its
//! stage. Store calls run as their own task under `tokio::time::timeout`.
//!
//! The only shared mutable state is the [`DedupIndex`] and the
//! [`BatchStats`] counters, both held in the explicit [`PipelineContext`].
//! A worker may only write after winning [`DedupIndex::claim`], so two
//! workers with identical content never both persist. A worker that finds
//! the claim in flight waits for it: a commit makes it a duplicate, a
//! failed write hands the claim over so the content still gets stored.
//!
//! # Cancellation
//!
//! [`CancelHandle::cancel`] stops dispatch. Documents already running finish
//! (or fail) normally; the rest are reported as [`DocumentStatus::Skipped`].

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use lex_ingest_core::dedup::{Claim, DedupIndex, Settled};
use lex_ingest_core::error::StoreError;
use lex_ingest_core::extract::resolve_title;
use lex_ingest_core::fingerprint::fingerprint;
use lex_ingest_core::models::{DocumentRecord, NormalizedDocument, RawDocument};
use lex_ingest_core::normalize::truncate_chars;
use lex_ingest_core::profile::SourceProfile;
use lex_ingest_core::store::{UpsertOutcome, UpsertStore};

use crate::config::PipelineConfig;
use crate::progress::{ProgressEvent, ProgressReporter};

/// Appended to stored content that hit `max_content_chars`.
pub const TRUNCATION_MARKER: &str = " [truncated]";

// ── Options and context ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub concurrency: usize,
    pub store_timeout: Duration,
    pub min_content_chars: usize,
    pub max_content_chars: usize,
    /// Run every stage and the dedup check, but never call the store.
    pub dry_run: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for PipelineOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            store_timeout: config.store_timeout(),
            min_content_chars: config.min_content_chars,
            max_content_chars: config.max_content_chars,
            dry_run: false,
        }
    }
}

/// Everything a run shares between workers. No process-wide state exists.
#[derive(Clone)]
pub struct PipelineContext {
    pub index: Arc<DedupIndex>,
    pub store: Arc<dyn UpsertStore>,
    pub stats: Arc<BatchStats>,
}

impl PipelineContext {
    pub fn new(store: Arc<dyn UpsertStore>, index: DedupIndex) -> Self {
        Self {
            index: Arc::new(index),
            store,
            stats: Arc::new(BatchStats::default()),
        }
    }

    /// Seed the dedup index from the store's history. An unreachable store
    /// leaves the index empty (see [`DedupIndex::seed`]).
    pub async fn seeded(store: Arc<dyn UpsertStore>) -> Self {
        let index = DedupIndex::seed(store.as_ref()).await;
        Self::new(store, index)
    }
}

/// Batch-level cancellation flag, cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

// ── Per-document outcome ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Fetched,
    Extracted,
    Segmented,
    Classified,
    Hashed,
    Duplicate,
    Persisted,
    Validated,
    Failed,
    Skipped,
}

/// Where a document failed. `InsufficientContent` is the early exit after
/// extraction; the rest name the stage that faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Extract,
    InsufficientContent,
    Segment,
    Classify,
    Hash,
    Store,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Extract => "extract",
            FailureStage::InsufficientContent => "insufficient_content",
            FailureStage::Segment => "segment",
            FailureStage::Classify => "classify",
            FailureStage::Hash => "hash",
            FailureStage::Store => "store",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub stage: FailureStage,
    /// Short tag: `insufficient_content`, `fault`, `timeout`, or a store
    /// error kind such as `constraint`.
    pub cause: String,
    pub detail: String,
}

impl Failure {
    fn new(stage: FailureStage, cause: &str, detail: impl Into<String>) -> Self {
        Self {
            stage,
            cause: cause.to_string(),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Written to the store (`inserted` or `updated`).
    Persisted { outcome: UpsertOutcome },
    /// Content already known. `existing_id` is `None` only in a dry run,
    /// where the matching document in this batch is never written.
    Duplicate { existing_id: Option<String> },
    /// Dry run: every stage passed, nothing written.
    Validated,
    Failed(Failure),
    /// Never dispatched because the batch was cancelled.
    Skipped,
}

impl DocumentStatus {
    pub fn kind(&self) -> &'static str {
        match self {
            DocumentStatus::Persisted { .. } => "persisted",
            DocumentStatus::Duplicate { .. } => "duplicate",
            DocumentStatus::Validated => "validated",
            DocumentStatus::Failed(_) => "failed",
            DocumentStatus::Skipped => "skipped",
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, DocumentStatus::Persisted { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, DocumentStatus::Duplicate { .. })
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            DocumentStatus::Failed(f) => Some(f),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentOutcome {
    /// Position in the input batch.
    pub position: usize,
    pub url: String,
    pub status: DocumentStatus,
    pub trail: Vec<DocumentState>,
    /// The record as built (and, once persisted, as stored). Absent when
    /// the document never reached hashing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<DocumentRecord>,
}

impl DocumentOutcome {
    fn skipped(position: usize, url: String) -> Self {
        Self {
            position,
            url,
            status: DocumentStatus::Skipped,
            trail: vec![DocumentState::Fetched, DocumentState::Skipped],
            record: None,
        }
    }
}

// ── Batch statistics ────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
struct Counters {
    attempted: u64,
    extracted: u64,
    segmented: u64,
    duplicates: u64,
    inserted: u64,
    updated: u64,
    validated: u64,
    failed: u64,
    failed_by_stage: BTreeMap<String, u64>,
    total_words: u64,
    total_articles: u64,
    categories: BTreeMap<String, u64>,
    skipped: u64,
}

/// Counters updated by every worker under one lock.
#[derive(Debug, Default)]
pub struct BatchStats {
    inner: Mutex<Counters>,
}

impl BatchStats {
    fn update(&self, f: impl FnOnce(&mut Counters)) {
        f(&mut self.inner.lock());
    }

    fn reset(&self) {
        *self.inner.lock() = Counters::default();
    }

    fn record_failure(&self, stage: FailureStage) {
        self.update(|c| {
            c.failed += 1;
            *c.failed_by_stage.entry(stage.as_str().to_string()).or_default() += 1;
        });
    }

    /// Words, articles and category of a document that made it through.
    fn record_accepted(&self, words: usize, articles: usize, category: &str) {
        self.update(|c| {
            c.total_words += words as u64;
            c.total_articles += articles as u64;
            *c.categories.entry(category.to_string()).or_default() += 1;
        });
    }

    pub fn summary(&self, duration: Duration) -> BatchSummary {
        let c = self.inner.lock().clone();
        BatchSummary {
            attempted: c.attempted,
            extracted: c.extracted,
            segmented: c.segmented,
            persisted: c.inserted + c.updated,
            inserted: c.inserted,
            updated: c.updated,
            duplicates: c.duplicates,
            validated: c.validated,
            failed: c.failed,
            failed_by_stage: c.failed_by_stage,
            total_words: c.total_words,
            total_articles: c.total_articles,
            categories: c.categories,
            skipped: c.skipped,
            duration_ms: duration.as_millis() as u64,
        }
    }
}

/// Totals for one batch. `attempted` always equals
/// `persisted + duplicates + validated + failed`; word, article and category
/// totals cover persisted (or, on a dry run, validated) documents only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub attempted: u64,
    pub extracted: u64,
    pub segmented: u64,
    pub persisted: u64,
    pub inserted: u64,
    pub updated: u64,
    pub duplicates: u64,
    pub validated: u64,
    pub failed: u64,
    pub failed_by_stage: BTreeMap<String, u64>,
    pub total_words: u64,
    pub total_articles: u64,
    pub categories: BTreeMap<String, u64>,
    pub skipped: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub summary: BatchSummary,
    /// One entry per input document, in input order.
    pub documents: Vec<DocumentOutcome>,
}

// ── Orchestrator ────────────────────────────────────────────────────────

/// Pure-stage output waiting for the dedup check and the store.
struct Prepared {
    record: DocumentRecord,
    fingerprint: String,
    word_count: usize,
    article_count: usize,
}

/// One orchestrator, parameterized by a [`SourceProfile`].
#[derive(Clone)]
pub struct Pipeline {
    ctx: PipelineContext,
    profile: SourceProfile,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(ctx: PipelineContext, profile: SourceProfile, options: PipelineOptions) -> Self {
        Self {
            ctx,
            profile,
            options,
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Process a batch. Never fails as a whole: every document gets an
    /// outcome, in input order. Counters in the context are reset first, so
    /// one context runs one batch at a time.
    pub async fn run_batch(
        &self,
        docs: Vec<RawDocument>,
        cancel: &CancelHandle,
        progress: &dyn ProgressReporter,
    ) -> BatchReport {
        let total = docs.len();
        let started = Instant::now();
        self.ctx.stats.reset();

        tracing::info!(
            profile = %self.profile.name,
            documents = total,
            concurrency = self.options.concurrency,
            dry_run = self.options.dry_run,
            "batch started"
        );

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency));
        let mut tasks: JoinSet<DocumentOutcome> = JoinSet::new();
        let mut slots: Vec<Option<DocumentOutcome>> = (0..total).map(|_| None).collect();
        let mut finished = 0u64;

        let mut pending = docs.into_iter().enumerate();
        while let Some((position, raw)) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                tracing::info!(remaining = total - position, "batch cancelled, dispatch stopped");
                slots[position] = Some(DocumentOutcome::skipped(position, raw.url));
                for (position, raw) in pending.by_ref() {
                    slots[position] = Some(DocumentOutcome::skipped(position, raw.url));
                }
                break;
            };

            self.ctx.stats.update(|c| c.attempted += 1);
            let worker = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                worker.process(position, raw).await
            });

            while let Some(joined) = tasks.try_join_next() {
                finished += 1;
                self.collect(joined, &mut slots, progress, finished, total);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            finished += 1;
            self.collect(joined, &mut slots, progress, finished, total);
        }

        let documents: Vec<DocumentOutcome> = slots
            .into_iter()
            .enumerate()
            .map(|(position, slot)| {
                slot.unwrap_or_else(|| {
                    // Only reachable if a worker task itself died.
                    let failure = Failure::new(FailureStage::Store, "fault", "worker task aborted");
                    self.ctx.stats.record_failure(failure.stage);
                    DocumentOutcome {
                        position,
                        url: String::new(),
                        status: DocumentStatus::Failed(failure),
                        trail: vec![DocumentState::Fetched, DocumentState::Failed],
                        record: None,
                    }
                })
            })
            .collect();

        let skipped = documents
            .iter()
            .filter(|d| d.status == DocumentStatus::Skipped)
            .count() as u64;
        self.ctx.stats.update(|c| c.skipped = skipped);

        let summary = self.ctx.stats.summary(started.elapsed());
        tracing::info!(
            attempted = summary.attempted,
            persisted = summary.persisted,
            duplicates = summary.duplicates,
            failed = summary.failed,
            skipped = summary.skipped,
            duration_ms = summary.duration_ms,
            "batch finished"
        );

        BatchReport { summary, documents }
    }

    /// Run a single document through the pipeline.
    pub async fn process_one(&self, raw: RawDocument) -> DocumentOutcome {
        self.ctx.stats.update(|c| c.attempted += 1);
        self.process(0, raw).await
    }

    fn collect(
        &self,
        joined: Result<DocumentOutcome, tokio::task::JoinError>,
        slots: &mut [Option<DocumentOutcome>],
        progress: &dyn ProgressReporter,
        done: u64,
        total: usize,
    ) {
        match joined {
            Ok(outcome) => {
                progress.report(ProgressEvent::Settled {
                    done,
                    total: total as u64,
                    url: outcome.url.clone(),
                    status: outcome.status.kind(),
                });
                let position = outcome.position;
                slots[position] = Some(outcome);
            }
            Err(e) => tracing::error!(error = %e, "worker task failed"),
        }
    }

    async fn process(&self, position: usize, raw: RawDocument) -> DocumentOutcome {
        let url = raw.url.clone();
        tracing::debug!(position, url = %url, "fetched");

        let profile = self.profile.clone();
        let options = self.options.clone();
        let stats = Arc::clone(&self.ctx.stats);
        let prepared = tokio::task::spawn_blocking(move || {
            let mut trail = vec![DocumentState::Fetched];
            let result = prepare(&profile, &options, &stats, raw, &mut trail);
            (trail, result)
        })
        .await;

        let (trail, result) = match prepared {
            Ok(pair) => pair,
            Err(e) => (
                vec![DocumentState::Fetched],
                Err(Failure::new(FailureStage::Extract, "fault", e.to_string())),
            ),
        };

        match result {
            Ok(prepared) => self.persist(position, url, trail, prepared).await,
            Err(failure) => self.fail(position, url, trail, failure, None),
        }
    }

    async fn persist(
        &self,
        position: usize,
        url: String,
        mut trail: Vec<DocumentState>,
        prepared: Prepared,
    ) -> DocumentOutcome {
        let Prepared {
            mut record,
            fingerprint,
            word_count,
            article_count,
        } = prepared;

        loop {
            let existing_id = match self.ctx.index.claim(&fingerprint) {
                Claim::Claimed => break,
                Claim::Known(id) => Some(id),
                // Nothing is written in a dry run, so there is no write to wait on.
                Claim::InFlight(_) if self.options.dry_run => None,
                Claim::InFlight(pending) => {
                    tracing::debug!(position, url = %url, "identical content in flight, waiting");
                    match pending.settled().await {
                        Settled::Committed(id) => Some(id),
                        Settled::Released => continue,
                    }
                }
            };
            tracing::debug!(position, url = %url, existing_id = ?existing_id, "duplicate content");
            self.ctx.stats.update(|c| c.duplicates += 1);
            trail.push(DocumentState::Duplicate);
            return DocumentOutcome {
                position,
                url,
                status: DocumentStatus::Duplicate { existing_id },
                trail,
                record: Some(record),
            };
        }

        if self.options.dry_run {
            // The claim stays pending so later copies in the batch still
            // count as duplicates.
            self.ctx.stats.update(|c| c.validated += 1);
            self.ctx
                .stats
                .record_accepted(word_count, article_count, &record.category);
            trail.push(DocumentState::Validated);
            return DocumentOutcome {
                position,
                url,
                status: DocumentStatus::Validated,
                trail,
                record: Some(record),
            };
        }

        let store = Arc::clone(&self.ctx.store);
        let to_write = record.clone();
        let write = tokio::spawn(async move { store.upsert(&to_write).await });
        let abort = write.abort_handle();

        let written = match tokio::time::timeout(self.options.store_timeout, write).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(e))) => Err(Failure::new(FailureStage::Store, e.kind(), e.to_string())),
            Ok(Err(join_err)) => Err(Failure::new(FailureStage::Store, "fault", join_err.to_string())),
            Err(_) => {
                abort.abort();
                let e = StoreError::Timeout(self.options.store_timeout);
                Err(Failure::new(FailureStage::Store, e.kind(), e.to_string()))
            }
        };

        let result = match written {
            Ok(result) => result,
            Err(failure) => {
                self.ctx.index.release(&fingerprint);
                return self.fail(position, url, trail, failure, Some(record));
            }
        };

        self.ctx.index.register(&fingerprint, &result.id);
        record.id = result.id.clone();
        record.created_at = result.created_at;

        match result.outcome {
            UpsertOutcome::Unchanged => {
                tracing::debug!(position, url = %url, id = %result.id, "unchanged, already stored");
                self.ctx.stats.update(|c| c.duplicates += 1);
                trail.push(DocumentState::Duplicate);
                DocumentOutcome {
                    position,
                    url,
                    status: DocumentStatus::Duplicate {
                        existing_id: Some(result.id),
                    },
                    trail,
                    record: Some(record),
                }
            }
            outcome => {
                tracing::debug!(position, url = %url, id = %result.id, outcome = outcome.as_str(), "persisted");
                self.ctx.stats.update(|c| match outcome {
                    UpsertOutcome::Updated => c.updated += 1,
                    _ => c.inserted += 1,
                });
                self.ctx
                    .stats
                    .record_accepted(word_count, article_count, &record.category);
                trail.push(DocumentState::Persisted);
                DocumentOutcome {
                    position,
                    url,
                    status: DocumentStatus::Persisted { outcome },
                    trail,
                    record: Some(record),
                }
            }
        }
    }

    fn fail(
        &self,
        position: usize,
        url: String,
        mut trail: Vec<DocumentState>,
        failure: Failure,
        record: Option<DocumentRecord>,
    ) -> DocumentOutcome {
        tracing::warn!(
            position,
            url = %url,
            stage = %failure.stage,
            cause = %failure.cause,
            detail = %failure.detail,
            "document failed"
        );
        self.ctx.stats.record_failure(failure.stage);
        trail.push(DocumentState::Failed);
        DocumentOutcome {
            position,
            url,
            status: DocumentStatus::Failed(failure),
            trail,
            record,
        }
    }
}

/// Run `f`, turning a panic into a failure at `stage`.
fn guard<T>(stage: FailureStage, f: impl FnOnce() -> T) -> Result<T, Failure> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".to_string());
        Failure::new(stage, "fault", message)
    })
}

/// The pure stages: extract, threshold, segment, classify, hash.
fn prepare(
    profile: &SourceProfile,
    options: &PipelineOptions,
    stats: &BatchStats,
    raw: RawDocument,
    trail: &mut Vec<DocumentState>,
) -> Result<Prepared, Failure> {
    let doc = match guard(FailureStage::Extract, || profile.extractor.extract(&raw))? {
        Ok(doc) => {
            stats.update(|c| c.extracted += 1);
            doc
        }
        Err(e) => {
            tracing::warn!(url = %raw.url, error = %e, "extraction degraded to empty text");
            NormalizedDocument::empty(resolve_title(raw.title.as_deref(), &[], &raw.url))
        }
    };
    trail.push(DocumentState::Extracted);
    tracing::debug!(url = %raw.url, title = %doc.title, words = doc.word_count, "extracted");

    let chars = doc.char_len();
    if chars < options.min_content_chars {
        return Err(Failure::new(
            FailureStage::InsufficientContent,
            "insufficient_content",
            format!("{} chars, minimum is {}", chars, options.min_content_chars),
        ));
    }

    let articles = guard(FailureStage::Segment, || profile.segmenter.segment(&doc.full_text))?;
    stats.update(|c| c.segmented += 1);
    trail.push(DocumentState::Segmented);

    let category = guard(FailureStage::Classify, || {
        profile.classifier.classify(&doc.full_text)
    })?;
    trail.push(DocumentState::Classified);

    let content_hash = guard(FailureStage::Hash, || fingerprint(&doc.full_text))?;
    trail.push(DocumentState::Hashed);
    tracing::debug!(
        url = %raw.url,
        articles = articles.len(),
        category = %category,
        hash = %content_hash,
        "hashed"
    );

    let (kept, truncated) = truncate_chars(&doc.full_text, options.max_content_chars);
    let content = if truncated {
        format!("{}{}", kept, TRUNCATION_MARKER)
    } else {
        kept.to_string()
    };

    let mut metadata = serde_json::Map::new();
    if let Some(v) = &doc.metadata.issue_date {
        metadata.insert("issue_date".into(), v.clone().into());
    }
    if let Some(v) = &doc.metadata.hijri_date {
        metadata.insert("hijri_date".into(), v.clone().into());
    }
    if let Some(v) = &doc.metadata.law_number {
        metadata.insert("law_number".into(), v.clone().into());
    }
    metadata.insert("word_count".into(), doc.word_count.into());
    metadata.insert("article_count".into(), articles.len().into());
    metadata.insert(
        "articles".into(),
        serde_json::to_value(&articles).unwrap_or_default(),
    );
    metadata.insert("truncated".into(), truncated.into());
    metadata.insert("profile".into(), profile.name.clone().into());

    let now = Utc::now();
    let article_count = articles.len();
    Ok(Prepared {
        record: DocumentRecord {
            id: uuid::Uuid::new_v4().to_string(),
            title: doc.title,
            content,
            category,
            source_url: raw.url,
            content_hash: content_hash.clone(),
            metadata: serde_json::Value::Object(metadata),
            embedding: None,
            created_at: now,
            updated_at: now,
        },
        fingerprint: content_hash,
        word_count: doc.word_count,
        article_count,
    })
}
