//! Fingerprint index shared by all workers of one run.
//!
//! The index maps content fingerprints to record identifiers. It is seeded
//! from persisted history once per run and grows as documents are stored.
//!
//! [`DedupIndex::claim`] is the only way a worker may decide to persist: the
//! check and the registration of a pending entry happen under one lock, so
//! two workers holding identical content can never both see "absent".

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::store::UpsertStore;

enum Entry {
    /// Claimed by an in-flight worker, not yet written. Waiters subscribe
    /// to the sender and learn how the write settled.
    Pending(watch::Sender<Option<Settled>>),
    Committed(String),
}

/// How a pending claim ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    Committed(String),
    /// The owning write failed; the fingerprint is free again.
    Released,
}

/// Result of [`DedupIndex::claim`].
#[derive(Debug)]
pub enum Claim {
    /// The fingerprint was absent and is now pending for the caller.
    Claimed,
    /// Committed to an existing record.
    Known(String),
    /// Another worker holds the claim and has not finished writing.
    InFlight(PendingWrite),
}

/// Handle on another worker's pending claim.
#[derive(Debug)]
pub struct PendingWrite {
    rx: watch::Receiver<Option<Settled>>,
}

impl PendingWrite {
    /// Wait until the owning write commits or releases.
    pub async fn settled(mut self) -> Settled {
        let settled = match self.rx.wait_for(Option::is_some).await {
            Ok(settled) => settled.clone(),
            Err(_) => None,
        };
        settled.unwrap_or(Settled::Released)
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Committed record id → its current fingerprint.
    by_id: HashMap<String, String>,
}

impl Inner {
    fn commit(&mut self, fingerprint: &str, id: &str) {
        if let Some(old) = self.by_id.insert(id.to_string(), fingerprint.to_string()) {
            if old != fingerprint {
                self.entries.remove(&old);
            }
        }
        let previous = self
            .entries
            .insert(fingerprint.to_string(), Entry::Committed(id.to_string()));
        match previous {
            Some(Entry::Pending(tx)) => {
                tx.send_replace(Some(Settled::Committed(id.to_string())));
            }
            Some(Entry::Committed(prev_id)) if prev_id != id => {
                if self.by_id.get(&prev_id).map(String::as_str) == Some(fingerprint) {
                    self.by_id.remove(&prev_id);
                }
            }
            _ => {}
        }
    }
}

#[derive(Default)]
pub struct DedupIndex {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for DedupIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupIndex").field("len", &self.len()).finish()
    }
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from `(fingerprint, id)` pairs.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut inner = Inner::default();
        for (fp, id) in pairs {
            inner.commit(&fp, &id);
        }
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Seed from the store's persisted fingerprints.
    ///
    /// An unreachable store yields an empty index: dedup against history
    /// becomes best-effort for this run, dedup within the run still holds.
    pub async fn seed(store: &dyn UpsertStore) -> Self {
        match store.known_fingerprints().await {
            Ok(pairs) => {
                let index = Self::from_pairs(pairs);
                tracing::debug!(fingerprints = index.len(), "dedup index seeded");
                index
            }
            Err(e) => {
                tracing::warn!(error = %e, "persisted history unavailable, dedup index starts empty");
                Self::new()
            }
        }
    }

    pub fn lookup(&self, fingerprint: &str) -> Option<String> {
        match self.inner.lock().entries.get(fingerprint) {
            Some(Entry::Committed(id)) => Some(id.clone()),
            _ => None,
        }
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.inner.lock().entries.contains_key(fingerprint)
    }

    /// Atomic check-then-register.
    pub fn claim(&self, fingerprint: &str) -> Claim {
        let mut inner = self.inner.lock();
        match inner.entries.get(fingerprint) {
            Some(Entry::Committed(id)) => Claim::Known(id.clone()),
            Some(Entry::Pending(tx)) => Claim::InFlight(PendingWrite { rx: tx.subscribe() }),
            None => {
                let (tx, _) = watch::channel(None);
                inner
                    .entries
                    .insert(fingerprint.to_string(), Entry::Pending(tx));
                Claim::Claimed
            }
        }
    }

    /// Commit `fingerprint` to `id` and wake anyone waiting on its claim.
    ///
    /// The fingerprint previously committed to the same record is dropped,
    /// since that record's content has been replaced.
    pub fn register(&self, fingerprint: &str, id: &str) {
        self.inner.lock().commit(fingerprint, id);
    }

    /// Drop a pending claim after a failed write. Committed entries are kept.
    pub fn release(&self, fingerprint: &str) {
        let mut inner = self.inner.lock();
        if !matches!(inner.entries.get(fingerprint), Some(Entry::Pending(_))) {
            return;
        }
        if let Some(Entry::Pending(tx)) = inner.entries.remove(fingerprint) {
            tx.send_replace(Some(Settled::Released));
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
