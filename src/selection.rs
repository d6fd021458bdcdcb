//! Selection state machine: which single modal/detail view is open.
//!
//! Exactly one state is active at a time; assigning a new state implicitly
//! exits the previous one (no stacking).

/// The open modal/detail view, if any. Holds record keys, not records;
/// the projection resolves them against the current snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    None,
    /// Viewing/editing a pipeline draft before sending.
    ViewingDraft(String),
    /// Reviewing a record the pipeline drafted for human approval.
    ViewingAwaitingHuman(String),
    /// Inspecting an already-processed record.
    ViewingProcessed(String),
    /// The bulk-processing progress dialog.
    ViewingProcessingDialog,
}

impl Selection {
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Return to `None` from any state.
    pub fn close(&mut self) {
        *self = Self::None;
    }

    /// The record key the selection refers to, if it refers to one.
    pub fn record_id(&self) -> Option<&str> {
        match self {
            Self::ViewingDraft(id)
            | Self::ViewingAwaitingHuman(id)
            | Self::ViewingProcessed(id) => Some(id),
            Self::None | Self::ViewingProcessingDialog => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entering_a_state_exits_the_previous_one() {
        let mut selection = Selection::default();
        assert!(!selection.is_open());
        selection = Selection::ViewingDraft("m1".to_string());
        assert_eq!(selection.record_id(), Some("m1"));
        selection = Selection::ViewingProcessingDialog;
        assert!(selection.is_open());
        assert_eq!(selection.record_id(), None);
        selection.close();
        assert_eq!(selection, Selection::None);
    }
}
