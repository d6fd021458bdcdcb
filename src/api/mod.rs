//! HTTP collaborator client.
//!
//! This module is split into:
//! - `mod.rs` - The `MailApi` seam the engine is written against
//! - `types.rs` - Wire types and normalization
//! - `client.rs` - The reqwest-backed implementation

mod client;
pub(crate) mod types;

use std::future::Future;

pub use client::{HttpClient, PromptKind};
pub use types::{BatchPage, ReprocessOutcome, StatusSummary, WhitelistRule};

use crate::error::Result;
use crate::mailbox::EmailRecord;

/// Operations the sync engine and action dispatcher need from the remote
/// collaborator. The HTTP client implements this; tests substitute a
/// scripted fake.
pub trait MailApi: Send + Sync {
    /// Fetch the complete current mailbox plus its modification token.
    fn fetch_mailbox(&self)
    -> impl Future<Output = Result<(Vec<EmailRecord>, String)>> + Send;

    /// Fetch the lightweight status summary used for change detection.
    fn fetch_status(&self) -> impl Future<Output = Result<StatusSummary>> + Send;

    /// Request the next batch of the pipeline run. `restart` clears the
    /// collaborator's processed state first (the "reprocess all" path).
    fn process_next_batch(&self, restart: bool)
    -> impl Future<Output = Result<BatchPage>> + Send;

    /// Deliver a draft as the reply for the given record.
    fn send_draft(&self, id: &str, draft: &str) -> impl Future<Output = Result<()>> + Send;

    /// Clear a record's draft and mark it reviewed upstream.
    fn delete_draft(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Re-run the pipeline on a single record.
    fn reprocess_single(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<ReprocessOutcome>> + Send;
}
