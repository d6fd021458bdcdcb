//! Mailbox synchronization: polling schedule and reconciliation.
//!
//! This module is split into:
//! - `mod.rs` - Commands, the handle, and the spawn entry point
//! - `actor.rs` - The actor loop, change detection, and reconciliation
//!
//! All store mutation lives inside one actor task, so timer-driven ticks,
//! action-forced refreshes, and delta patches are serialized through a
//! single queue.

mod actor;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::MailApi;
use crate::constants::SYNC_COMMAND_BUFFER;
use crate::mailbox::{EmailRecord, MailboxStore, Snapshot};

/// Commands sent TO the sync actor.
#[derive(Debug)]
pub enum SyncCommand {
    /// Reset the modification token and run a full reconciliation now.
    /// Issued after a successful mutating action.
    ForceRefresh,
    /// Apply a batch of already-known-changed records as a delta patch.
    ApplyBatch(Vec<EmailRecord>),
    /// Mark or clear the in-flight flag on a record.
    SetProcessing { id: String, on: bool },
}

/// Handle to a running sync actor.
pub struct SyncHandle {
    cmd_tx: mpsc::Sender<SyncCommand>,
    cancel: CancellationToken,
    snapshots: watch::Receiver<Snapshot>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Subscribe to published store snapshots.
    pub fn snapshots(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Token cancelled when the actor is torn down. Long-running callers
    /// (the pipeline loop) tie their own cancellation to it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn force_refresh(&self) {
        self.send(SyncCommand::ForceRefresh).await;
    }

    pub async fn apply_batch(&self, records: Vec<EmailRecord>) {
        self.send(SyncCommand::ApplyBatch(records)).await;
    }

    pub async fn set_processing(&self, id: &str, on: bool) {
        self.send(SyncCommand::SetProcessing {
            id: id.to_string(),
            on,
        })
        .await;
    }

    async fn send(&self, command: SyncCommand) {
        if self.cmd_tx.send(command).await.is_err() {
            tracing::debug!("sync actor already stopped, command dropped");
        }
    }

    /// Stop the timer and tear the actor down. In-flight request results
    /// are discarded, not awaited.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.task.await.ok();
    }
}

/// Spawn the sync actor for the active user's mailbox.
///
/// Performs one unconditional full reconciliation on startup, then runs the
/// change-detection heuristic every `poll_interval`. Returns the handle and
/// the initial snapshot receiver.
pub fn spawn_sync_actor<A>(api: A, poll_interval: std::time::Duration) -> SyncHandle
where
    A: MailApi + 'static,
{
    let (store, snapshots) = MailboxStore::new();
    let (cmd_tx, cmd_rx) = mpsc::channel(SYNC_COMMAND_BUFFER);
    let cancel = CancellationToken::new();

    let task = tokio::spawn(actor::run(
        api,
        store,
        poll_interval,
        cmd_rx,
        cancel.clone(),
    ));

    SyncHandle {
        cmd_tx,
        cancel,
        snapshots,
        task,
    }
}
