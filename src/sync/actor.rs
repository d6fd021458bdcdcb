//! The sync actor loop: tick scheduling, change detection, reconciliation.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::SyncCommand;
use crate::api::{MailApi, StatusSummary};
use crate::error::Result;
use crate::mailbox::{Counts, MailboxStore, SyncMeta};

/// Decide whether a status summary warrants a full reconciliation.
///
/// An empty modification token always refreshes (cold start / post-action
/// sentinel). Otherwise counts must differ from the last baseline, and the
/// baseline must be real: comparing against the all-zero cold-start sentinel
/// would cause a refresh storm before any baseline exists.
pub(crate) fn should_refresh(meta: &SyncMeta, status: &StatusSummary) -> bool {
    if meta.last_modified.is_empty() {
        return true;
    }
    let incoming = Counts {
        unprocessed: status.unprocessed_count,
        awaiting_human: status.awaiting_human_count,
        processed: status.processed_count,
    };
    incoming != meta.last_counts && meta.last_counts.is_baseline()
}

pub(crate) async fn run<A: MailApi>(
    api: A,
    mut store: MailboxStore,
    poll_interval: Duration,
    mut cmd_rx: mpsc::Receiver<SyncCommand>,
    cancel: CancellationToken,
) {
    // First activation: one unconditional full reconciliation before the
    // timer starts.
    if let Err(e) = full_refresh(&api, &mut store, &cancel).await {
        tracing::warn!("initial reconciliation failed: {e}");
    }

    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + poll_interval,
        poll_interval,
    );
    // A tick that fires while a cycle is still running is skipped outright,
    // never queued.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = run_tick(&api, &mut store, &cancel).await {
                    // Scheduled-cycle errors never escape the controller;
                    // the next tick proceeds normally.
                    tracing::warn!("sync cycle abandoned: {e}");
                }
            }
            cmd = cmd_rx.recv() => match cmd {
                Some(SyncCommand::ForceRefresh) => {
                    // Clear the token first so a stale-token comparison
                    // upstream cannot skip this fetch.
                    store.reset_last_modified();
                    if let Err(e) = full_refresh(&api, &mut store, &cancel).await {
                        // Local state stays as it was; the next successful
                        // reconciliation catches up.
                        tracing::warn!("forced reconciliation failed: {e}");
                    }
                }
                Some(SyncCommand::ApplyBatch(records)) => {
                    let applied = store.patch(records);
                    tracing::debug!("delta batch applied to {applied} records");
                }
                Some(SyncCommand::SetProcessing { id, on }) => {
                    store.set_processing(&id, on);
                }
                None => break,
            }
        }
    }
    tracing::debug!("sync actor stopped");
}

/// One timer tick: change-detection heuristic, then a full reconciliation
/// if warranted.
async fn run_tick<A: MailApi>(
    api: &A,
    store: &mut MailboxStore,
    cancel: &CancellationToken,
) -> Result<()> {
    let status = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(()),
        result = api.fetch_status() => match result {
            Ok(status) => status,
            Err(e) => {
                // Status endpoint unavailable: skip the cycle silently.
                tracing::debug!("status check unavailable, skipping cycle: {e}");
                return Ok(());
            }
        },
    };

    if should_refresh(store.meta(), &status) {
        full_refresh(api, store, cancel).await?;
    } else {
        tracing::trace!("no change detected, skipping refresh");
    }
    Ok(())
}

/// Full reconciliation: fetch the complete mailbox and swap it in.
/// A fetch that loses the race against cancellation is discarded.
async fn full_refresh<A: MailApi>(
    api: &A,
    store: &mut MailboxStore,
    cancel: &CancellationToken,
) -> Result<()> {
    let (records, last_modified) = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(()),
        result = api.fetch_mailbox() => result?,
    };
    tracing::debug!(
        records = records.len(),
        token = %last_modified,
        "full reconciliation applied"
    );
    store.replace_all(records, last_modified);
    Ok(())
}
