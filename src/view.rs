//! Pure view projection: tabs, filters, sort order, and status labels.
//!
//! Everything here is a function of an immutable mailbox snapshot plus the
//! active tab/filter selection, recomputed whenever either changes. No state
//! is kept between calls.

use crate::mailbox::{EmailRecord, Mailbox, RecordStatus, StateTag};

/// Top-level tab partition. `Inbox` and `Meh` are complements within `All`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tab {
    #[default]
    Inbox,
    All,
    Meh,
}

impl Tab {
    /// Whether a record belongs on the inbox tab: not a promotion, not
    /// told to ignore, not archived.
    fn in_inbox(record: &EmailRecord) -> bool {
        let action = record.action.as_deref().unwrap_or("").to_lowercase();
        !action.contains("promotion")
            && !action.contains("ignore")
            && !record.has_tag(&StateTag::Archived)
    }

    pub fn admits(self, record: &EmailRecord) -> bool {
        match self {
            Self::All => true,
            Self::Inbox => Self::in_inbox(record),
            Self::Meh => !Self::in_inbox(record),
        }
    }
}

/// Secondary filter, applied after the tab partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Filter {
    #[default]
    All,
    Unprocessed,
    AwaitingReview,
    Sent,
    Archived,
    Tagged,
    /// Generated per distinct non-empty action value in the mailbox.
    Action(String),
}

impl Filter {
    pub fn matches(&self, record: &EmailRecord) -> bool {
        match self {
            Self::All => true,
            Self::Unprocessed => record.status() == RecordStatus::Unprocessed,
            Self::AwaitingReview => record.status() == RecordStatus::AwaitingHuman,
            Self::Sent => record.status() == RecordStatus::Sent,
            Self::Archived => record.has_tag(&StateTag::Archived),
            Self::Tagged => record.has_tag(&StateTag::Tagged),
            Self::Action(value) => record.action.as_deref() == Some(value),
        }
    }

    const FIXED: [Filter; 6] = [
        Filter::All,
        Filter::Unprocessed,
        Filter::AwaitingReview,
        Filter::Sent,
        Filter::Archived,
        Filter::Tagged,
    ];
}

/// Presentation status of one record, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLabel {
    /// An action on this record is in flight.
    Processing,
    Unprocessed,
    AwaitingReview,
    /// Processed with a tag- or action-derived outcome.
    Processed(String),
}

impl std::fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Unprocessed => write!(f, "unprocessed"),
            Self::AwaitingReview => write!(f, "awaiting review"),
            Self::Processed(outcome) => write!(f, "{outcome}"),
        }
    }
}

/// Derive the status label for one record.
pub fn status_label(record: &EmailRecord) -> StatusLabel {
    if record.processing {
        return StatusLabel::Processing;
    }
    match record.status() {
        RecordStatus::Unprocessed => StatusLabel::Unprocessed,
        RecordStatus::AwaitingHuman => StatusLabel::AwaitingReview,
        RecordStatus::Sent | RecordStatus::Processed => {
            StatusLabel::Processed(record.outcome_label())
        }
    }
}

/// Per-tab record counts for the tab bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TabCounts {
    pub inbox: usize,
    pub all: usize,
    pub meh: usize,
}

/// A selectable filter with its live count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOption {
    pub filter: Filter,
    pub count: usize,
}

/// Presentation-ready grouping derived from one mailbox snapshot.
#[derive(Debug)]
pub struct Projection<'a> {
    /// Visible records under the active tab and filter, sorted
    /// unprocessed-first and date-descending within each group.
    pub records: Vec<(&'a EmailRecord, StatusLabel)>,
    pub tab_counts: TabCounts,
    /// Fixed filters followed by the dynamically generated action filters.
    pub filters: Vec<FilterOption>,
}

/// Project a mailbox snapshot into its presentation-ready form.
pub fn project<'a>(mailbox: &'a Mailbox, tab: Tab, filter: &Filter) -> Projection<'a> {
    let mut tab_counts = TabCounts::default();
    for record in mailbox.iter() {
        tab_counts.all += 1;
        if Tab::Inbox.admits(record) {
            tab_counts.inbox += 1;
        } else {
            tab_counts.meh += 1;
        }
    }

    let mut records: Vec<&EmailRecord> = mailbox
        .iter()
        .filter(|r| tab.admits(r) && filter.matches(r))
        .collect();
    // Unprocessed group first; date descending within each group. The sort
    // is stable, so equal dates keep arrival order.
    records.sort_by(|a, b| {
        let group = |r: &EmailRecord| u8::from(r.status() != RecordStatus::Unprocessed);
        group(a).cmp(&group(b)).then(b.date.cmp(&a.date))
    });

    let mut filters: Vec<FilterOption> = Filter::FIXED
        .iter()
        .map(|f| FilterOption {
            filter: f.clone(),
            count: mailbox.iter().filter(|r| f.matches(r)).count(),
        })
        .collect();
    for record in mailbox.iter() {
        let Some(action) = record.action.as_deref().filter(|a| !a.is_empty()) else {
            continue;
        };
        let dynamic = Filter::Action(action.to_string());
        if !filters.iter().any(|opt| opt.filter == dynamic) {
            let count = mailbox.iter().filter(|r| dynamic.matches(r)).count();
            filters.push(FilterOption {
                filter: dynamic,
                count,
            });
        }
    }

    Projection {
        records: records
            .into_iter()
            .map(|r| (r, status_label(r)))
            .collect(),
        tab_counts,
        filters,
    }
}
