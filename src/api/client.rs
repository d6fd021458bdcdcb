//! reqwest-backed implementation of the collaborator contract.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::types::{
    Ack, BatchPage, MailboxResponse, ReprocessOutcome, StatusSummary, WhitelistRules,
};
use super::MailApi;
use crate::error::{EngineError, Result};
use crate::mailbox::EmailRecord;

#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    id: &'a str,
    draft: &'a str,
}

#[derive(Serialize)]
struct DeleteDraftRequest<'a> {
    email_id: &'a str,
}

#[derive(Serialize)]
struct ReprocessRequest<'a> {
    message_id: &'a str,
}

#[derive(Serialize)]
struct PromptRequest<'a> {
    prompt: &'a str,
}

#[derive(serde::Deserialize)]
struct PromptResponse {
    #[serde(default)]
    prompt: String,
}

impl HttpClient {
    /// Build a client with a bounded per-request timeout. A timed-out call
    /// degrades exactly like any other transport failure.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.http.get(self.url(path)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Transport(format!(
                "GET {path} returned {status}"
            )));
        }
        Ok(response.json().await?)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Transport(format!(
                "POST {path} returned {status}"
            )));
        }
        Ok(response.json().await?)
    }

    /// POST a mutation and require a positive acknowledgement.
    async fn post_ack<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let ack: Ack = self.post_json(path, body).await?;
        if !ack.success {
            return Err(EngineError::protocol(format!(
                "{path} rejected: {}",
                ack.error.unwrap_or_else(|| "no reason given".to_string())
            )));
        }
        Ok(())
    }

    // Settings passthrough, outside the core engine.

    pub async fn get_whitelist(&self) -> Result<WhitelistRules> {
        self.get_json("/api/whitelist").await
    }

    pub async fn set_whitelist(&self, rules: &WhitelistRules) -> Result<()> {
        self.post_ack("/api/whitelist", rules).await
    }

    pub async fn get_prompt(&self, which: PromptKind) -> Result<String> {
        let response: PromptResponse = self.get_json(which.path()).await?;
        Ok(response.prompt)
    }

    pub async fn set_prompt(&self, which: PromptKind, prompt: &str) -> Result<()> {
        self.post_ack(which.path(), &PromptRequest { prompt }).await
    }
}

/// Which of the collaborator's two pipeline prompts to read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Reading,
    Drafting,
}

impl PromptKind {
    fn path(self) -> &'static str {
        match self {
            Self::Reading => "/api/prompts/reading",
            Self::Drafting => "/api/prompts/draft",
        }
    }
}

impl MailApi for HttpClient {
    async fn fetch_mailbox(&self) -> Result<(Vec<EmailRecord>, String)> {
        let response: MailboxResponse = self.get_json("/api/emails").await?;
        let (payloads, last_modified) = response.into_parts();
        let records = payloads
            .into_iter()
            .map(|p| p.into_record())
            .collect::<Result<Vec<_>>>()?;
        Ok((records, last_modified))
    }

    async fn fetch_status(&self) -> Result<StatusSummary> {
        self.get_json("/api/emails/status").await
    }

    async fn process_next_batch(&self, restart: bool) -> Result<BatchPage> {
        let path = if restart {
            "/api/process_emails?paging=false"
        } else {
            "/api/process_emails"
        };
        self.get_json(path).await
    }

    async fn send_draft(&self, id: &str, draft: &str) -> Result<()> {
        self.post_ack("/api/send", &SendRequest { id, draft }).await
    }

    async fn delete_draft(&self, id: &str) -> Result<()> {
        self.post_ack("/api/delete_draft", &DeleteDraftRequest { email_id: id })
            .await
    }

    async fn reprocess_single(&self, id: &str) -> Result<ReprocessOutcome> {
        self.post_json("/api/reprocess_single_email", &ReprocessRequest { message_id: id })
            .await
    }
}
