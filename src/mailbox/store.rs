//! Mailbox store: the in-memory record collection and sync metadata.
//!
//! All mutation happens through [`MailboxStore`], which builds a fresh
//! collection per change and publishes it as an `Arc` snapshot over a watch
//! channel. Readers therefore observe whole versions only, never a map that
//! mixes old and new values mid-merge.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::watch;

use super::record::{EmailRecord, RecordStatus};

/// Per-status record counts, used by the change-detection heuristic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub unprocessed: usize,
    pub awaiting_human: usize,
    pub processed: usize,
}

impl Counts {
    /// Recompute counts by scanning a mailbox.
    pub fn scan(mailbox: &Mailbox) -> Self {
        let mut counts = Self::default();
        for record in mailbox.iter() {
            match record.status() {
                RecordStatus::Unprocessed => counts.unprocessed += 1,
                RecordStatus::AwaitingHuman => counts.awaiting_human += 1,
                RecordStatus::Processed | RecordStatus::Sent => counts.processed += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.unprocessed + self.awaiting_human + self.processed
    }

    /// All-zero counts are the cold-start sentinel, not a real baseline.
    pub fn is_baseline(&self) -> bool {
        self.total() > 0
    }
}

/// Synchronization metadata alongside the mailbox.
#[derive(Debug, Clone, Default)]
pub struct SyncMeta {
    /// Opaque modification token from the collaborator. Empty means
    /// "unknown, force the next refresh".
    pub last_modified: String,
    /// Counts snapshot from the last reconciliation.
    pub last_counts: Counts,
}

/// Ordered-by-arrival, keyed-by-id collection of email records.
#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    records: IndexMap<String, EmailRecord>,
}

impl Mailbox {
    pub fn get(&self, id: &str) -> Option<&EmailRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EmailRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One published version of the store.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub mailbox: Arc<Mailbox>,
    pub meta: SyncMeta,
    /// Monotonic version, bumped on every publish.
    pub version: u64,
}

/// Owner of the mailbox. Lives inside the sync actor, so every mutation is
/// serialized by construction.
pub struct MailboxStore {
    current: Arc<Mailbox>,
    meta: SyncMeta,
    version: u64,
    tx: watch::Sender<Snapshot>,
}

impl MailboxStore {
    pub fn new() -> (Self, watch::Receiver<Snapshot>) {
        let (tx, rx) = watch::channel(Snapshot::default());
        let store = Self {
            current: Arc::new(Mailbox::default()),
            meta: SyncMeta::default(),
            version: 0,
            tx,
        };
        (store, rx)
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.current
    }

    pub fn meta(&self) -> &SyncMeta {
        &self.meta
    }

    /// Atomically swap the entire mailbox and recompute `last_counts`.
    ///
    /// In-flight `processing` marks survive the swap: a timer refresh racing
    /// an action must not make the record flicker back to idle.
    pub fn replace_all(&mut self, records: Vec<EmailRecord>, modified_token: String) {
        let mut next = IndexMap::with_capacity(records.len());
        for mut record in records {
            if self.current.get(&record.id).is_some_and(|r| r.processing) {
                record.processing = true;
            }
            // Key uniqueness invariant: a repeated id replaces the earlier
            // entry in place instead of duplicating it.
            next.insert(record.id.clone(), record);
        }
        self.current = Arc::new(Mailbox { records: next });
        self.meta.last_modified = modified_token;
        self.meta.last_counts = Counts::scan(&self.current);
        self.publish();
    }

    /// Update-only delta merge. Records with no existing key are skipped
    /// (the delta path is not an upsert); `last_modified` is untouched.
    /// Returns the number of records applied.
    pub fn patch(&mut self, records: Vec<EmailRecord>) -> usize {
        let mut next = (*self.current).clone();
        let mut applied = 0;
        for record in records {
            match next.records.get_mut(&record.id) {
                Some(slot) => {
                    *slot = record;
                    applied += 1;
                }
                None => {
                    tracing::warn!("delta patch for unknown record {}, skipping", record.id);
                }
            }
        }
        if applied > 0 {
            self.current = Arc::new(next);
            self.meta.last_counts = Counts::scan(&self.current);
            self.publish();
        }
        applied
    }

    /// Mark or clear the in-flight flag on a record. Returns false if the
    /// record is unknown.
    pub fn set_processing(&mut self, id: &str, on: bool) -> bool {
        let mut next = (*self.current).clone();
        let Some(record) = next.records.get_mut(id) else {
            return false;
        };
        if record.processing == on {
            return true;
        }
        record.processing = on;
        self.current = Arc::new(next);
        self.publish();
        true
    }

    /// Reset the modification token to the empty sentinel so the next
    /// change-detection pass cannot skip a refresh on a stale comparison.
    pub fn reset_last_modified(&mut self) {
        self.meta.last_modified.clear();
    }

    fn publish(&mut self) {
        self.version += 1;
        debug_assert_eq!(self.meta.last_counts, Counts::scan(&self.current));
        self.tx.send_replace(Snapshot {
            mailbox: Arc::clone(&self.current),
            meta: self.meta.clone(),
            version: self.version,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::record::StateTag;
    use chrono::Utc;

    fn record(id: &str, processed: bool) -> EmailRecord {
        EmailRecord {
            id: id.to_string(),
            subject: format!("subject {id}"),
            from: "a@example.com".to_string(),
            date: Utc::now(),
            body: String::new(),
            html: None,
            processed,
            state: Vec::new(),
            action: None,
            draft: None,
            llm_prompt: None,
            tags: Vec::new(),
            processing: false,
        }
    }

    #[test]
    fn test_replace_all_recomputes_counts() {
        let (mut store, rx) = MailboxStore::new();
        store.replace_all(vec![record("m1", false), record("m2", true)], "t1".to_string());
        assert_eq!(store.meta().last_counts.unprocessed, 1);
        assert_eq!(store.meta().last_counts.processed, 1);
        assert_eq!(store.meta().last_modified, "t1");
        assert_eq!(rx.borrow().version, 1);
    }

    #[test]
    fn test_replace_all_deduplicates_keys() {
        let (mut store, _rx) = MailboxStore::new();
        let mut dup = record("m1", true);
        dup.subject = "newer".to_string();
        store.replace_all(vec![record("m1", false), dup], String::new());
        assert_eq!(store.mailbox().len(), 1);
        assert_eq!(store.mailbox().get("m1").unwrap().subject, "newer");
    }

    #[test]
    fn test_patch_updates_in_place_without_duplicates() {
        let (mut store, _rx) = MailboxStore::new();
        store.replace_all(
            vec![record("m1", false), record("m2", false)],
            String::new(),
        );

        let mut update = record("m1", true);
        update.state = vec![StateTag::DraftedResponse];
        update.draft = Some("draft text".to_string());
        update.action = Some("drafted".to_string());
        assert_eq!(store.patch(vec![update.clone()]), 1);
        assert_eq!(store.mailbox().len(), 2);
        // Position preserved: m1 is still first.
        assert_eq!(store.mailbox().iter().next().unwrap().id, "m1");
        assert_eq!(store.meta().last_counts.awaiting_human, 1);

        // Idempotence: applying the same batch twice changes nothing more.
        let before: Vec<String> = store.mailbox().iter().map(|r| r.id.clone()).collect();
        store.patch(vec![update]);
        let after: Vec<String> = store.mailbox().iter().map(|r| r.id.clone()).collect();
        assert_eq!(before, after);
        assert_eq!(store.mailbox().len(), 2);
        assert_eq!(store.meta().last_counts.awaiting_human, 1);
    }

    #[test]
    fn test_patch_is_update_only() {
        let (mut store, _rx) = MailboxStore::new();
        store.replace_all(vec![record("m1", false)], String::new());
        assert_eq!(store.patch(vec![record("m9", true)]), 0);
        assert_eq!(store.mailbox().len(), 1);
        assert!(!store.mailbox().contains("m9"));
    }

    #[test]
    fn test_patch_does_not_touch_token() {
        let (mut store, _rx) = MailboxStore::new();
        store.replace_all(vec![record("m1", false)], "t1".to_string());
        store.patch(vec![record("m1", true)]);
        assert_eq!(store.meta().last_modified, "t1");
    }

    #[test]
    fn test_snapshots_are_atomic_versions() {
        let (mut store, rx) = MailboxStore::new();
        store.replace_all(vec![record("m1", false)], String::new());
        let held = rx.borrow().mailbox.clone();
        store.patch(vec![record("m1", true)]);
        // The previously taken snapshot is unchanged by the later patch.
        assert!(!held.get("m1").unwrap().processed);
        assert!(rx.borrow().mailbox.get("m1").unwrap().processed);
    }

    #[test]
    fn test_processing_survives_full_refresh() {
        let (mut store, _rx) = MailboxStore::new();
        store.replace_all(vec![record("m1", false)], String::new());
        assert!(store.set_processing("m1", true));
        store.replace_all(vec![record("m1", false)], "t2".to_string());
        assert!(store.mailbox().get("m1").unwrap().processing);
        assert!(store.set_processing("m1", false));
        assert!(!store.mailbox().get("m1").unwrap().processing);
    }

    #[test]
    fn test_set_processing_unknown_record() {
        let (mut store, _rx) = MailboxStore::new();
        assert!(!store.set_processing("missing", true));
    }
}
