//! Batch-level behaviour of the orchestrator against in-memory and
//! deliberately misbehaving stores.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use lex_ingest::pipeline::{
    CancelHandle, DocumentStatus, FailureStage, Pipeline, PipelineContext, PipelineOptions,
};
use lex_ingest::progress::NoProgress;
use lex_ingest_core::dedup::DedupIndex;
use lex_ingest_core::error::StoreError;
use lex_ingest_core::models::{DocumentRecord, RawDocument};
use lex_ingest_core::profile::SourceProfile;
use lex_ingest_core::store::memory::InMemoryStore;
use lex_ingest_core::store::{UpsertOutcome, UpsertResult, UpsertStore};

fn law_page(n: usize, extra: &str) -> String {
    format!(
        r#"<html><head><title>Ministry portal</title></head><body>
           <nav>Home | Legislation</nav>
           <div class="law-text">
             <h1>Federal Law No. {n} of 2021</h1>
             <p>Issued on 12/3/2021</p>
             <p>Article 1 This law applies to every emirate of the federation. {extra}</p>
             <p>Article 2 The competent authority issues implementing decisions for law {n}.</p>
           </div>
           <footer>All rights reserved</footer>
         </body></html>"#
    )
}

fn raw(n: usize) -> RawDocument {
    RawDocument::new(
        format!("https://laws.example/federal/{n}"),
        law_page(n, ""),
        "text/html",
    )
}

fn options() -> PipelineOptions {
    PipelineOptions {
        concurrency: 4,
        ..PipelineOptions::default()
    }
}

fn pipeline_on(store: Arc<dyn UpsertStore>, options: PipelineOptions) -> Pipeline {
    let ctx = PipelineContext::new(store, DedupIndex::new());
    Pipeline::new(ctx, SourceProfile::default(), options)
}

/// Wraps the in-memory store and injects one kind of misbehaviour.
struct FlakyStore {
    inner: InMemoryStore,
    fail_title: Option<String>,
    fail_first_write: bool,
    delay: Duration,
    calls: AtomicUsize,
    cancel_on_first_write: Option<CancelHandle>,
    history_down: bool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            fail_title: None,
            fail_first_write: false,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            cancel_on_first_write: None,
            history_down: false,
        }
    }
}

#[async_trait]
impl UpsertStore for FlakyStore {
    async fn upsert(&self, record: &DocumentRecord) -> Result<UpsertResult, StoreError> {
        let first = self.calls.fetch_add(1, Ordering::SeqCst) == 0;
        if first {
            if let Some(cancel) = &self.cancel_on_first_write {
                cancel.cancel();
            }
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if first && self.fail_first_write {
            return Err(StoreError::Connection("connection reset by peer".into()));
        }
        if self.fail_title.as_deref() == Some(record.title.as_str()) {
            return Err(StoreError::Connection("connection reset by peer".into()));
        }
        self.inner.upsert(record).await
    }

    async fn known_fingerprints(&self) -> Result<Vec<(String, String)>, StoreError> {
        if self.history_down {
            return Err(StoreError::Connection("history unavailable".into()));
        }
        self.inner.known_fingerprints().await
    }

    async fn get_by_title(&self, title: &str) -> Result<Option<DocumentRecord>, StoreError> {
        self.inner.get_by_title(title).await
    }

    async fn count(&self) -> Result<i64, StoreError> {
        self.inner.count().await
    }

    async fn category_counts(&self) -> Result<Vec<(String, i64)>, StoreError> {
        self.inner.category_counts().await
    }
}

#[tokio::test]
async fn same_content_twice_is_one_persisted_one_duplicate() {
    let store = Arc::new(InMemoryStore::new());
    let p = pipeline_on(store.clone(), options());

    let first = p.run_batch(vec![raw(1)], &CancelHandle::new(), &NoProgress).await;
    let second = p.run_batch(vec![raw(1)], &CancelHandle::new(), &NoProgress).await;

    assert!(first.documents[0].status.is_persisted());
    assert!(second.documents[0].status.is_duplicate());
    assert_eq!(first.summary.persisted, 1);
    assert_eq!(second.summary.duplicates, 1);
    assert_eq!(second.summary.persisted, 0);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn second_run_against_history_is_duplicate() {
    let store = Arc::new(InMemoryStore::new());
    pipeline_on(store.clone(), options())
        .run_batch(vec![raw(1), raw(2)], &CancelHandle::new(), &NoProgress)
        .await;

    // Fresh context, seeded from what the first run stored.
    let ctx = PipelineContext::seeded(store.clone()).await;
    assert_eq!(ctx.index.len(), 2);
    let p = Pipeline::new(ctx, SourceProfile::default(), options());
    let report = p.run_batch(vec![raw(2)], &CancelHandle::new(), &NoProgress).await;

    match &report.documents[0].status {
        DocumentStatus::Duplicate { existing_id } => assert!(existing_id.is_some()),
        other => panic!("expected duplicate, got {:?}", other),
    }
}

#[tokio::test]
async fn changed_content_updates_in_place() {
    let store = Arc::new(InMemoryStore::new());
    let p = pipeline_on(store.clone(), options());

    let first = p.run_batch(vec![raw(7)], &CancelHandle::new(), &NoProgress).await;
    let original = store.get_by_title("Federal Law No. 7 of 2021").await.unwrap().unwrap();
    let first_id = first.documents[0].record.as_ref().unwrap().id.clone();
    assert_eq!(original.id, first_id);

    tokio::time::sleep(Duration::from_millis(5)).await;
    let amended = RawDocument::new(
        "https://laws.example/federal/7",
        law_page(7, "As amended by Decree-Law No. 3 of 2023."),
        "text/html",
    );
    let second = p.run_batch(vec![amended], &CancelHandle::new(), &NoProgress).await;

    assert_eq!(
        second.documents[0].status,
        DocumentStatus::Persisted {
            outcome: UpsertOutcome::Updated
        }
    );
    assert_eq!(second.summary.updated, 1);

    let updated = store.get_by_title("Federal Law No. 7 of 2021").await.unwrap().unwrap();
    assert_eq!(updated.id, original.id);
    assert_eq!(updated.created_at, original.created_at);
    assert!(updated.updated_at > original.updated_at);
    assert_ne!(updated.content_hash, original.content_hash);
    assert!(updated.content.contains("As amended"));
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn store_error_is_isolated_to_one_document() {
    let mut flaky = FlakyStore::new();
    flaky.fail_title = Some("Federal Law No. 5 of 2021".into());
    let store = Arc::new(flaky);
    let p = pipeline_on(store.clone(), options());

    let docs: Vec<_> = (1..=10).map(raw).collect();
    let report = p.run_batch(docs, &CancelHandle::new(), &NoProgress).await;

    assert_eq!(report.summary.attempted, 10);
    assert_eq!(report.summary.persisted + report.summary.duplicates, 9);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.failed_by_stage.get("store"), Some(&1));

    let failure = report.documents[4].status.failure().unwrap();
    assert_eq!(failure.stage, FailureStage::Store);
    assert_eq!(failure.cause, "connection");
    for later in &report.documents[5..] {
        assert!(later.status.is_persisted(), "{:?}", later.status);
    }
    assert_eq!(store.count().await.unwrap(), 9);
}

#[tokio::test]
async fn failed_write_releases_claim_for_retry() {
    let mut flaky = FlakyStore::new();
    flaky.fail_title = Some("Federal Law No. 1 of 2021".into());
    let ctx = PipelineContext::new(Arc::new(flaky), DedupIndex::new());
    let p = Pipeline::new(ctx.clone(), SourceProfile::default(), options());

    let report = p.run_batch(vec![raw(1)], &CancelHandle::new(), &NoProgress).await;
    assert_eq!(report.summary.failed, 1);
    assert!(ctx.index.is_empty());
}

#[tokio::test]
async fn concurrent_identical_content_persists_once() {
    let mut slow = FlakyStore::new();
    slow.delay = Duration::from_millis(50);
    let store = Arc::new(slow);
    let p = pipeline_on(
        store.clone(),
        PipelineOptions {
            concurrency: 2,
            ..PipelineOptions::default()
        },
    );

    // Same page served under two URLs.
    let a = RawDocument::new("https://mirror-a.example/law/9", law_page(9, ""), "text/html");
    let b = RawDocument::new("https://mirror-b.example/law/9", law_page(9, ""), "text/html");
    let report = p.run_batch(vec![a, b], &CancelHandle::new(), &NoProgress).await;

    let persisted = report.documents.iter().filter(|d| d.status.is_persisted()).count();
    let duplicates = report.documents.iter().filter(|d| d.status.is_duplicate()).count();
    assert_eq!((persisted, duplicates), (1, 1));
    let stored_id = report
        .documents
        .iter()
        .find(|d| d.status.is_persisted())
        .and_then(|d| d.record.as_ref())
        .map(|r| r.id.clone());
    for doc in &report.documents {
        if let DocumentStatus::Duplicate { existing_id } = &doc.status {
            assert_eq!(existing_id, &stored_id);
        }
    }
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn identical_copy_is_stored_when_first_write_fails() {
    let mut flaky = FlakyStore::new();
    flaky.fail_first_write = true;
    flaky.delay = Duration::from_millis(50);
    let store = Arc::new(flaky);
    let p = pipeline_on(
        store.clone(),
        PipelineOptions {
            concurrency: 2,
            ..PipelineOptions::default()
        },
    );

    let a = RawDocument::new("https://mirror-a.example/law/4", law_page(4, ""), "text/html");
    let b = RawDocument::new("https://mirror-b.example/law/4", law_page(4, ""), "text/html");
    let report = p.run_batch(vec![a, b], &CancelHandle::new(), &NoProgress).await;

    let persisted = report.documents.iter().filter(|d| d.status.is_persisted()).count();
    let failed: Vec<_> = report
        .documents
        .iter()
        .filter_map(|d| d.status.failure())
        .collect();
    assert_eq!(persisted, 1, "{:?}", report.documents);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].cause, "connection");
    assert_eq!(report.summary.duplicates, 0);
    assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn slow_store_times_out() {
    let mut slow = FlakyStore::new();
    slow.delay = Duration::from_secs(5);
    let p = pipeline_on(
        Arc::new(slow),
        PipelineOptions {
            store_timeout: Duration::from_millis(50),
            ..options()
        },
    );

    let report = p.run_batch(vec![raw(1)], &CancelHandle::new(), &NoProgress).await;
    let failure = report.documents[0].status.failure().unwrap();
    assert_eq!(failure.stage, FailureStage::Store);
    assert_eq!(failure.cause, "timeout");
    assert!(failure.detail.contains("50ms"), "{}", failure.detail);
    assert_eq!(report.summary.failed, 1);
}

#[tokio::test]
async fn unreachable_history_degrades_to_empty_index() {
    let mut flaky = FlakyStore::new();
    flaky.history_down = true;
    let store = Arc::new(flaky);

    let ctx = PipelineContext::seeded(store.clone()).await;
    assert!(ctx.index.is_empty());

    // Within-run dedup still holds.
    let p = Pipeline::new(ctx, SourceProfile::default(), options());
    let report = p
        .run_batch(vec![raw(3), raw(3)], &CancelHandle::new(), &NoProgress)
        .await;
    assert_eq!(report.summary.persisted, 1);
    assert_eq!(report.summary.duplicates, 1);
}

#[tokio::test]
async fn cancelled_before_start_skips_everything() {
    let store = Arc::new(InMemoryStore::new());
    let p = pipeline_on(store.clone(), options());
    let cancel = CancelHandle::new();
    cancel.cancel();

    let report = p.run_batch((1..=3).map(raw).collect(), &cancel, &NoProgress).await;
    assert_eq!(report.summary.attempted, 0);
    assert_eq!(report.summary.skipped, 3);
    assert!(report
        .documents
        .iter()
        .all(|d| d.status == DocumentStatus::Skipped));
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn cancel_mid_batch_lets_in_flight_finish() {
    let cancel = CancelHandle::new();
    let mut flaky = FlakyStore::new();
    flaky.cancel_on_first_write = Some(cancel.clone());
    let store = Arc::new(flaky);
    let p = pipeline_on(
        store.clone(),
        PipelineOptions {
            concurrency: 1,
            ..PipelineOptions::default()
        },
    );

    let report = p.run_batch((1..=5).map(raw).collect(), &cancel, &NoProgress).await;

    assert!(report.documents[0].status.is_persisted());
    assert_eq!(report.summary.attempted, 1);
    assert_eq!(report.summary.skipped, 4);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn summary_totals_and_input_order() {
    let store = Arc::new(InMemoryStore::new());
    let p = pipeline_on(store.clone(), options());

    let traffic = RawDocument::new(
        "https://laws.example/traffic",
        "This Traffic Law regulates vehicle registration and licensing across the emirates. \
         Article 1 Every vehicle must be registered. Article 2 Licences are renewed yearly.",
        "text/plain",
    )
    .with_title("Federal Traffic Law");
    let tiny = RawDocument::new("https://laws.example/stub", "<p>Page moved</p>", "text/html");
    let docs = vec![raw(1), traffic, tiny, raw(2)];

    let report = p.run_batch(docs, &CancelHandle::new(), &NoProgress).await;
    let s = &report.summary;

    assert_eq!(s.attempted, 4);
    assert_eq!(s.persisted, 3);
    assert_eq!(s.failed, 1);
    assert_eq!(s.failed_by_stage.get("insufficient_content"), Some(&1));
    assert_eq!(s.attempted, s.persisted + s.duplicates + s.validated + s.failed);
    assert_eq!(s.total_articles, 6);
    assert_eq!(s.categories.get("Traffic and Transportation"), Some(&1));
    assert_eq!(s.categories.get("UAE Federal Law"), Some(&2));

    let positions: Vec<_> = report.documents.iter().map(|d| d.position).collect();
    assert_eq!(positions, vec![0, 1, 2, 3]);
    let titles: HashSet<_> = store.records().into_iter().map(|r| r.title).collect();
    assert!(titles.contains("Federal Traffic Law"));
    assert!(titles.contains("Federal Law No. 2 of 2021"));
}
