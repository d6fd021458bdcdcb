//! User-triggered actions against the collaborator.
//!
//! Every action follows the same shape: mark the record as in flight, call
//! the collaborator, fold the result back through the sync actor's command
//! queue, clear the mark. Unlike scheduled sync cycles, action errors
//! propagate to the caller so the surface can show them.

use crate::api::{MailApi, ReprocessOutcome};
use crate::error::{EngineError, Result};
use crate::sync::SyncHandle;

/// Outcome of a full pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Batches the collaborator returned before reporting done.
    pub pages: usize,
    /// Records patched into the local mailbox along the way.
    pub records_applied: usize,
}

/// Dispatches mutating actions and reconciles their results.
pub struct ActionDispatcher<A> {
    api: A,
}

impl<A: MailApi> ActionDispatcher<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    /// Deliver a (possibly edited) draft as the reply for `id`, then force
    /// a reconciliation so the sent state lands in one atomic swap.
    pub async fn send_draft(&self, sync: &SyncHandle, id: &str, draft: &str) -> Result<()> {
        if draft.trim().is_empty() {
            return Err(EngineError::precondition(
                "refusing to send an empty draft",
            ));
        }
        sync.set_processing(id, true).await;
        let result = self.api.send_draft(id, draft).await;
        if result.is_ok() {
            sync.force_refresh().await;
        }
        sync.set_processing(id, false).await;
        result
    }

    /// Discard the draft on `id`, marking the record reviewed upstream.
    pub async fn delete_draft(&self, sync: &SyncHandle, id: &str) -> Result<()> {
        sync.set_processing(id, true).await;
        let result = self.api.delete_draft(id).await;
        if result.is_ok() {
            sync.force_refresh().await;
        }
        sync.set_processing(id, false).await;
        result
    }

    /// Re-run the pipeline on a single record. Returns the regenerated
    /// draft and the prompt diagnostics the pipeline used.
    pub async fn reprocess(&self, sync: &SyncHandle, id: &str) -> Result<ReprocessOutcome> {
        sync.set_processing(id, true).await;
        let result = self.api.reprocess_single(id).await;
        if result.is_ok() {
            sync.force_refresh().await;
        }
        sync.set_processing(id, false).await;
        result
    }

    /// Drive a full pipeline run, paging until the collaborator reports
    /// done. Each page is folded into the mailbox as a delta patch, so the
    /// surface updates per batch rather than at the end. `restart` clears
    /// the collaborator's processed state first and re-runs everything.
    pub async fn run_pipeline(&self, sync: &SyncHandle, restart: bool) -> Result<PipelineReport> {
        let cancel = sync.cancellation_token();
        let mut report = PipelineReport::default();
        let mut first = true;
        loop {
            let page = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.api.process_next_batch(restart && first) => result?,
            };
            first = false;
            report.pages += 1;
            let done = page.is_done();

            let mut records = Vec::with_capacity(page.batch.len());
            for payload in page.batch {
                records.push(payload.into_record()?);
            }
            if !records.is_empty() {
                report.records_applied += records.len();
                sync.apply_batch(records).await;
            }
            if done {
                break;
            }
        }
        // Pipeline batches only update records the collaborator chose to
        // return; the closing reconciliation picks up everything else.
        sync.force_refresh().await;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::EmailPayload;
    use crate::api::{BatchPage, StatusSummary};
    use crate::error::Result;
    use crate::mailbox::EmailRecord;
    use crate::sync::spawn_sync_actor;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const INTERVAL: Duration = Duration::from_secs(300);

    fn payload(id: &str, processed: bool) -> EmailPayload {
        serde_json::from_str(&format!(
            r#"{{"id": "{id}", "processed": {processed}}}"#
        ))
        .unwrap()
    }

    #[derive(Default)]
    struct FakeApi {
        mailbox: Mutex<(Vec<EmailRecord>, String)>,
        batches: Mutex<VecDeque<BatchPage>>,
        send_fails: std::sync::atomic::AtomicBool,
        fetch_fails: std::sync::atomic::AtomicBool,
        mailbox_fetches: AtomicUsize,
        sends: AtomicUsize,
        deletes: AtomicUsize,
        restarts: AtomicUsize,
    }

    impl MailApi for Arc<FakeApi> {
        async fn fetch_mailbox(&self) -> Result<(Vec<EmailRecord>, String)> {
            self.mailbox_fetches.fetch_add(1, Ordering::SeqCst);
            if self.fetch_fails.load(Ordering::SeqCst) {
                return Err(EngineError::Transport("timed out".to_string()));
            }
            Ok(self.mailbox.lock().unwrap().clone())
        }

        async fn fetch_status(&self) -> Result<StatusSummary> {
            Ok(StatusSummary::default())
        }

        async fn process_next_batch(&self, restart: bool) -> Result<BatchPage> {
            if restart {
                self.restarts.fetch_add(1, Ordering::SeqCst);
            }
            Ok(self
                .batches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| BatchPage {
                    state: "done".to_string(),
                    batch: Vec::new(),
                }))
        }

        async fn send_draft(&self, _id: &str, _draft: &str) -> Result<()> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.send_fails.load(Ordering::SeqCst) {
                Err(EngineError::Transport("connection reset".to_string()))
            } else {
                Ok(())
            }
        }

        async fn delete_draft(&self, _id: &str) -> Result<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn reprocess_single(&self, _id: &str) -> Result<ReprocessOutcome> {
            Ok(ReprocessOutcome {
                new_draft: Some("regenerated".to_string()),
                llm_prompt: Some("prompt".to_string()),
            })
        }
    }

    fn seeded_api(records: Vec<EmailRecord>) -> Arc<FakeApi> {
        let api = Arc::new(FakeApi::default());
        *api.mailbox.lock().unwrap() = (records, "t1".to_string());
        api
    }

    fn record(id: &str, processed: bool) -> EmailRecord {
        payload(id, processed).into_record().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_draft_forces_reconciliation() {
        let api = seeded_api(vec![record("m1", true)]);
        let sync = spawn_sync_actor(api.clone(), INTERVAL);
        let mut snapshots = sync.snapshots();
        snapshots.changed().await.unwrap();

        let dispatcher = ActionDispatcher::new(api.clone());
        dispatcher.send_draft(&sync, "m1", "hello").await.unwrap();

        // Wait for the forced reconciliation to publish.
        while api.mailbox_fetches.load(Ordering::SeqCst) < 2 {
            snapshots.changed().await.unwrap();
        }
        assert_eq!(api.sends.load(Ordering::SeqCst), 1);
        sync.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_draft_rejected_before_any_request() {
        let api = seeded_api(vec![record("m1", true)]);
        let sync = spawn_sync_actor(api.clone(), INTERVAL);
        let dispatcher = ActionDispatcher::new(api.clone());

        let err = dispatcher.send_draft(&sync, "m1", "  \n").await.unwrap_err();
        assert!(matches!(err, EngineError::Precondition(_)));
        assert_eq!(api.sends.load(Ordering::SeqCst), 0);
        sync.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_propagates_and_clears_in_flight_mark() {
        let api = seeded_api(vec![record("m1", true)]);
        api.send_fails.store(true, Ordering::SeqCst);
        let sync = spawn_sync_actor(api.clone(), INTERVAL);
        let mut snapshots = sync.snapshots();
        snapshots.changed().await.unwrap();

        let dispatcher = ActionDispatcher::new(api.clone());
        let err = dispatcher.send_draft(&sync, "m1", "hello").await.unwrap_err();
        assert!(matches!(err, EngineError::Transport(_)));

        // The mark was set, then cleared; no reconciliation happened.
        snapshots.changed().await.unwrap();
        loop {
            let snap = snapshots.borrow().clone();
            if !snap.mailbox.get("m1").unwrap().processing {
                break;
            }
            snapshots.changed().await.unwrap();
        }
        assert_eq!(api.mailbox_fetches.load(Ordering::SeqCst), 1);
        sync.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_round_trip_moves_record_out_of_awaiting_review() {
        use crate::view::{StatusLabel, status_label};

        let awaiting: EmailPayload = serde_json::from_str(
            r#"{"id": "m1", "processed": true, "state": ["drafted_response"],
                "action": "drafted", "draft": "hello"}"#,
        )
        .unwrap();
        let api = seeded_api(vec![awaiting.into_record().unwrap()]);
        let sync = spawn_sync_actor(api.clone(), INTERVAL);
        let mut snapshots = sync.snapshots();
        snapshots.changed().await.unwrap();
        assert_eq!(
            status_label(snapshots.borrow().mailbox.get("m1").unwrap()),
            StatusLabel::AwaitingReview
        );

        // The collaborator will report the record as sent after delivery.
        let sent: EmailPayload = serde_json::from_str(
            r#"{"id": "m1", "processed": true,
                "state": ["drafted_response", "sent"], "action": "sent"}"#,
        )
        .unwrap();
        *api.mailbox.lock().unwrap() =
            (vec![sent.into_record().unwrap()], "t2".to_string());

        let dispatcher = ActionDispatcher::new(api.clone());
        dispatcher.send_draft(&sync, "m1", "hello").await.unwrap();

        // Wait for both the reconciled snapshot and the cleared mark.
        loop {
            let snap = snapshots.borrow_and_update().clone();
            if snap.meta.last_modified == "t2"
                && !snap.mailbox.get("m1").unwrap().processing
            {
                assert_eq!(
                    status_label(snap.mailbox.get("m1").unwrap()),
                    StatusLabel::Processed("sent".to_string())
                );
                break;
            }
            snapshots.changed().await.unwrap();
        }
        sync.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_draft_keeps_local_fields_when_refresh_times_out() {
        let pre_delete: EmailPayload = serde_json::from_str(
            r#"{"id": "m2", "processed": true, "state": ["drafted_response"],
                "action": "drafted", "draft": "pending reply"}"#,
        )
        .unwrap();
        let api = seeded_api(vec![pre_delete.into_record().unwrap()]);
        let sync = spawn_sync_actor(api.clone(), INTERVAL);
        let mut snapshots = sync.snapshots();
        snapshots.changed().await.unwrap();

        // The delete lands remotely but the forced refresh times out.
        api.fetch_fails.store(true, Ordering::SeqCst);
        let dispatcher = ActionDispatcher::new(api.clone());
        dispatcher.delete_draft(&sync, "m2").await.unwrap();
        assert_eq!(api.deletes.load(Ordering::SeqCst), 1);

        // Wait out the in-flight mark being set (version 2) and cleared
        // (version 3); clearing it proves the forced refresh ran between.
        loop {
            let snap = snapshots.borrow_and_update().clone();
            if snap.version >= 3 {
                // No optimistic removal: the record keeps its pre-delete
                // fields until the next successful reconciliation.
                let record = snap.mailbox.get("m2").unwrap();
                assert!(!record.processing);
                assert_eq!(record.draft.as_deref(), Some("pending reply"));
                assert_eq!(record.action.as_deref(), Some("drafted"));
                break;
            }
            snapshots.changed().await.unwrap();
        }
        assert_eq!(api.mailbox_fetches.load(Ordering::SeqCst), 2);
        sync.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pipeline_pages_until_done() {
        let api = seeded_api(vec![record("m1", false), record("m2", false)]);
        *api.batches.lock().unwrap() = VecDeque::from(vec![
            BatchPage {
                state: "processed".to_string(),
                batch: vec![payload("m1", true)],
            },
            BatchPage {
                state: "done".to_string(),
                batch: vec![payload("m2", true)],
            },
        ]);
        let sync = spawn_sync_actor(api.clone(), INTERVAL);
        let mut snapshots = sync.snapshots();
        snapshots.changed().await.unwrap();

        // By the closing reconciliation the collaborator has both records
        // processed too.
        *api.mailbox.lock().unwrap() = (
            vec![record("m1", true), record("m2", true)],
            "t2".to_string(),
        );

        let dispatcher = ActionDispatcher::new(api.clone());
        let report = dispatcher.run_pipeline(&sync, false).await.unwrap();
        assert_eq!(report.pages, 2);
        assert_eq!(report.records_applied, 2);
        assert_eq!(api.restarts.load(Ordering::SeqCst), 0);

        // Both batch patches land before the closing reconciliation.
        while !snapshots.borrow().mailbox.get("m2").is_some_and(|r| r.processed) {
            snapshots.changed().await.unwrap();
        }
        sync.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pipeline_restart_flag_only_on_first_page() {
        let api = seeded_api(Vec::new());
        *api.batches.lock().unwrap() = VecDeque::from(vec![
            BatchPage {
                state: "processed".to_string(),
                batch: Vec::new(),
            },
            BatchPage {
                state: "done".to_string(),
                batch: Vec::new(),
            },
        ]);
        let sync = spawn_sync_actor(api.clone(), INTERVAL);
        let dispatcher = ActionDispatcher::new(api.clone());
        dispatcher.run_pipeline(&sync, true).await.unwrap();
        assert_eq!(api.restarts.load(Ordering::SeqCst), 1);
        sync.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_pipeline_requests_no_batches() {
        let api = seeded_api(Vec::new());
        *api.batches.lock().unwrap() = VecDeque::from(vec![BatchPage {
            state: "processed".to_string(),
            batch: Vec::new(),
        }]);
        let sync = spawn_sync_actor(api.clone(), INTERVAL);
        sync.cancellation_token().cancel();

        let dispatcher = ActionDispatcher::new(api.clone());
        let report = dispatcher.run_pipeline(&sync, false).await.unwrap();
        assert_eq!(report.pages, 0);
        assert_eq!(api.batches.lock().unwrap().len(), 1);
        sync.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reprocess_returns_diagnostics() {
        let api = seeded_api(vec![record("m1", true)]);
        let sync = spawn_sync_actor(api.clone(), INTERVAL);
        let dispatcher = ActionDispatcher::new(api.clone());
        let outcome = dispatcher.reprocess(&sync, "m1").await.unwrap();
        assert_eq!(outcome.new_draft.as_deref(), Some("regenerated"));
        assert_eq!(outcome.llm_prompt.as_deref(), Some("prompt"));
        sync.shutdown().await;
    }
}
