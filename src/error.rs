//! Error taxonomy for the sync engine.

use thiserror::Error;

/// All errors produced by the engine.
///
/// Scheduled reconciliation swallows `Transport` and `Protocol` at the sync
/// actor boundary; action paths propagate them to the caller. `Precondition`
/// never reaches the network.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The request failed or the collaborator returned a non-OK status.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body was missing expected fields or carried
    /// inconsistent data.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The action was attempted against invalid local state.
    #[error("precondition failed: {0}")]
    Precondition(String),
}

/// Convenience alias for `Result<T, EngineError>`.
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<reqwest::Error> for EngineError {
    fn from(source: reqwest::Error) -> Self {
        // Decode failures are protocol-level; everything else is transport.
        if source.is_decode() {
            Self::Protocol(source.to_string())
        } else {
            Self::Transport(source.to_string())
        }
    }
}

impl EngineError {
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol(reason.into())
    }

    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::Precondition(reason.into())
    }
}
