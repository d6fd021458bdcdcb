//! Application-wide constants for tuning and configuration
//!
//! Centralizes magic numbers to make them discoverable and configurable.

/// Default interval between sync ticks in seconds.
/// Observed deployments range from 5s to 120s; configurable via `[sync]`.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Default per-request timeout in seconds.
/// A timed-out request degrades like any other transport failure.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

/// Capacity of the sync actor's command channel.
/// Commands are rare (forced refreshes, patches); a small buffer suffices.
pub const SYNC_COMMAND_BUFFER: usize = 16;

/// Action string the pipeline uses for records awaiting human review.
pub const ACTION_DRAFTED: &str = "drafted";
