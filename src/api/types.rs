//! Wire types for the HTTP collaborator.
//!
//! The collaborator's shapes drifted across its releases: the mailbox fetch
//! is either an envelope or a bare array, dates are unix seconds or strings,
//! senders are a string or a list of (name, address) pairs, and the record
//! key is `id`, `message_id`, or both. Untagged enums absorb the drift here
//! so the rest of the engine sees one normalized [`EmailRecord`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::error::{EngineError, Result};
use crate::mailbox::{EmailRecord, StateTag};

/// Record key as sent on the wire: provider message id or local ordinal.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Number(i64),
    Text(String),
}

impl WireId {
    fn normalize(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

/// Sender field: plain display string or a list of (name, address) pairs.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SenderField {
    Text(String),
    Pairs(Vec<(String, String)>),
}

impl Default for SenderField {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl SenderField {
    fn display(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Pairs(pairs) => match pairs.first() {
                Some((name, addr)) if !name.is_empty() => format!("{name} <{addr}>"),
                Some((_, addr)) => addr.clone(),
                None => String::new(),
            },
        }
    }
}

/// Date field: unix seconds or a formatted string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireDate {
    Unix(i64),
    Text(String),
}

impl WireDate {
    fn normalize(&self) -> DateTime<Utc> {
        match self {
            Self::Unix(secs) => DateTime::from_timestamp(*secs, 0).unwrap_or_default(),
            Self::Text(s) => parse_date_string(s).unwrap_or_else(|| {
                tracing::warn!("unparseable date '{}', falling back to epoch", s);
                DateTime::default()
            }),
        }
    }
}

fn parse_date_string(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite-style timestamps from the daemon's database.
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// One email record as delivered by the collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailPayload {
    #[serde(default)]
    pub id: Option<WireId>,
    #[serde(default)]
    pub message_id: Option<WireId>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub from: SenderField,
    #[serde(default, alias = "timestamp")]
    pub date: Option<WireDate>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub processed: bool,
    #[serde(default)]
    pub state: Vec<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default, alias = "drafted_response")]
    pub draft: Option<String>,
    #[serde(default)]
    pub llm_prompt: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub processing: bool,
}

impl EmailPayload {
    /// Normalize into an engine record, enforcing the data-quality rules:
    /// exactly one key, and no pipeline tags on an unprocessed record.
    pub fn into_record(self) -> Result<EmailRecord> {
        let key = match (&self.id, &self.message_id) {
            (Some(id), Some(mid)) => {
                let (id, mid) = (id.normalize(), mid.normalize());
                if id != mid {
                    return Err(EngineError::protocol(format!(
                        "record carries diverging keys id={id} message_id={mid}"
                    )));
                }
                id
            }
            (Some(id), None) => id.normalize(),
            (None, Some(mid)) => mid.normalize(),
            (None, None) => {
                return Err(EngineError::protocol("record carries no id or message_id"));
            }
        };

        let state: Vec<StateTag> = self.state.iter().map(|s| StateTag::parse(s)).collect();
        if !self.processed && state.iter().any(StateTag::is_pipeline_tag) {
            return Err(EngineError::protocol(format!(
                "unprocessed record {key} carries pipeline state tags"
            )));
        }

        Ok(EmailRecord {
            id: key,
            subject: self.subject,
            from: self.from.display(),
            date: self.date.map(|d| d.normalize()).unwrap_or_default(),
            body: self.body,
            html: self.html,
            processed: self.processed,
            state,
            action: self.action,
            draft: self.draft.filter(|d| !d.is_empty()),
            llm_prompt: self.llm_prompt,
            tags: self.tags,
            processing: self.processing,
        })
    }
}

/// The mailbox fetch: an envelope in newer collaborators, a bare array in
/// older ones (which carry no modification token).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MailboxResponse {
    Envelope {
        emails: Vec<EmailPayload>,
        #[serde(default)]
        last_modified: String,
    },
    Bare(Vec<EmailPayload>),
}

impl MailboxResponse {
    pub fn into_parts(self) -> (Vec<EmailPayload>, String) {
        match self {
            Self::Envelope {
                emails,
                last_modified,
            } => (emails, last_modified),
            Self::Bare(emails) => (emails, String::new()),
        }
    }
}

/// Lightweight status summary for change detection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusSummary {
    #[serde(default)]
    pub last_modified: String,
    #[serde(default)]
    pub total_count: usize,
    pub unprocessed_count: usize,
    pub awaiting_human_count: usize,
    pub processed_count: usize,
}

/// One page of the paginated pipeline run.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchPage {
    pub state: String,
    #[serde(default)]
    pub batch: Vec<EmailPayload>,
}

impl BatchPage {
    /// The collaborator reports "done" when nothing is left; any other
    /// state string ("continue", "processed") means keep paging.
    pub fn is_done(&self) -> bool {
        self.state == "done"
    }
}

/// Result of re-running the pipeline on a single record.
#[derive(Debug, Clone, Deserialize)]
pub struct ReprocessOutcome {
    #[serde(default)]
    pub new_draft: Option<String>,
    #[serde(default)]
    pub llm_prompt: Option<String>,
}

/// Generic mutation acknowledgement.
#[derive(Debug, Clone, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// A whitelist rule held by the collaborator. Out of the core engine, but
/// exposed through the CLI settings passthrough.
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct WhitelistRule {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, serde::Serialize, Deserialize)]
pub struct WhitelistRules {
    #[serde(default)]
    pub rules: Vec<WhitelistRule>,
}
