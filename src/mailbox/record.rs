//! Email record model.
//!
//! Records are created only by reconciliation, never synthesized locally.
//! The overlapping legacy fields (`action` string, `state` tag list,
//! `processed` flag) are kept for display and dynamic filters, but every
//! predicate in the engine goes through the collapsed [`RecordStatus`].

use chrono::{DateTime, Utc};

use crate::constants::ACTION_DRAFTED;

/// One pipeline state tag on a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateTag {
    DraftedResponse,
    Sent,
    Archived,
    Tagged,
    /// A named label applied by the pipeline (`labeled:<name>` on the wire).
    Labeled(String),
}

impl StateTag {
    /// Parse a wire tag. Unknown tags are preserved as labels rather than
    /// dropped, so a newer collaborator doesn't silently lose information.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "drafted_response" => Self::DraftedResponse,
            "sent" => Self::Sent,
            "archived" => Self::Archived,
            "tagged" => Self::Tagged,
            other => match other.strip_prefix("labeled:") {
                Some(name) => Self::Labeled(name.to_string()),
                None => Self::Labeled(other.to_string()),
            },
        }
    }

    /// True for tags that only the pipeline may set on a processed record.
    pub fn is_pipeline_tag(&self) -> bool {
        matches!(
            self,
            Self::DraftedResponse | Self::Sent | Self::Archived | Self::Tagged
        )
    }
}

impl std::fmt::Display for StateTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DraftedResponse => write!(f, "drafted_response"),
            Self::Sent => write!(f, "sent"),
            Self::Archived => write!(f, "archived"),
            Self::Tagged => write!(f, "tagged"),
            Self::Labeled(name) => write!(f, "labeled:{name}"),
        }
    }
}

/// Collapsed status of a record, derived from the legacy field combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// The pipeline has not finished a decision pass.
    Unprocessed,
    /// The pipeline drafted a response; a person has not approved it yet.
    AwaitingHuman,
    /// Processed with a terminal outcome other than sending.
    Processed,
    /// The drafted response was sent.
    Sent,
}

/// One processed or unprocessed message, as held by the Mailbox.
#[derive(Debug, Clone)]
pub struct EmailRecord {
    /// Stable key, unique within a mailbox (normalized from `id` /
    /// `message_id` at the wire boundary).
    pub id: String,
    pub subject: String,
    pub from: String,
    pub date: DateTime<Utc>,
    pub body: String,
    pub html: Option<String>,
    pub processed: bool,
    pub state: Vec<StateTag>,
    /// Legacy single-valued outcome string, kept for display compatibility
    /// and the dynamically generated filters.
    pub action: Option<String>,
    /// Response proposed by the pipeline, editable until sent.
    pub draft: Option<String>,
    /// Diagnostic: what was sent to the decision pipeline. Read-only here.
    pub llm_prompt: Option<String>,
    pub tags: Vec<String>,
    /// Set while an action on this record is in flight; never comes from
    /// reconciliation alone.
    pub processing: bool,
}

impl EmailRecord {
    pub fn has_tag(&self, tag: &StateTag) -> bool {
        self.state.contains(tag)
    }

    fn action_is(&self, value: &str) -> bool {
        self.action.as_deref() == Some(value)
    }

    /// Non-empty draft text, if any.
    pub fn draft_text(&self) -> Option<&str> {
        self.draft.as_deref().filter(|d| !d.trim().is_empty())
    }

    /// Derive the collapsed status from the legacy fields.
    pub fn status(&self) -> RecordStatus {
        if !self.processed {
            return RecordStatus::Unprocessed;
        }
        if self.has_tag(&StateTag::Sent) || self.action_is("sent") {
            return RecordStatus::Sent;
        }
        // Drafted and not sent is awaiting review even when the draft text
        // is empty; the collaborator counts these the same way, and the
        // change-detection baseline must agree with it.
        if self.has_tag(&StateTag::DraftedResponse) || self.action_is(ACTION_DRAFTED) {
            return RecordStatus::AwaitingHuman;
        }
        RecordStatus::Processed
    }

    /// Human-readable outcome for a processed record, derived from state
    /// tags first and the legacy action string as fallback.
    pub fn outcome_label(&self) -> String {
        for tag in &self.state {
            match tag {
                StateTag::Archived => return "archived".to_string(),
                StateTag::Tagged => return "tagged".to_string(),
                StateTag::Labeled(name) => return format!("labeled: {name}"),
                _ => {}
            }
        }
        self.action.clone().unwrap_or_else(|| "processed".to_string())
    }
}
