//! Mailbox data model: records, the keyed collection, and sync metadata.

mod record;
mod store;

pub use record::{EmailRecord, RecordStatus, StateTag};
pub use store::{Counts, Mailbox, MailboxStore, Snapshot, SyncMeta};
