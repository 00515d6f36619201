//! Gmail REST adapter for `MailSource` and `LabelSink`.
//!
//! Uses a bearer access token from `GmailConfig`. Obtaining and refreshing
//! that token is out of scope here.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{LabelSink, MailSource};
use crate::config::GmailConfig;
use crate::document::Document;
use crate::error::SourceError;

const PROVIDER: &str = "gmail";

/// Gmail caps `maxResults` for messages.list at 500.
const MAX_PAGE_SIZE: usize = 500;

/// Default per-request timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<LabelResource>,
}

#[derive(Debug, Deserialize)]
struct LabelResource {
    id: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct MessageResource {
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    payload: Option<MessagePayload>,
}

#[derive(Debug, Default, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<Header>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryList {
    #[serde(default)]
    history: Vec<HistoryRecord>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRecord {
    #[serde(default)]
    messages_added: Vec<MessageAdded>,
}

#[derive(Debug, Deserialize)]
struct MessageAdded {
    message: MessageRef,
}

// ── Client ──────────────────────────────────────────────────────────

/// Gmail API client.
pub struct GmailClient {
    config: GmailConfig,
    client: reqwest::Client,
    timeout: Duration,
    /// Label name → label id, filled on first use and refreshed on a miss.
    label_ids: RwLock<Option<HashMap<String, String>>>,
}

impl GmailClient {
    pub fn new(config: GmailConfig) -> Result<Self, SourceError> {
        Self::with_timeout(config, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Client whose every request gives up after `timeout`.
    pub fn with_timeout(config: GmailConfig, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Request {
                provider: PROVIDER.into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            config,
            client,
            timeout,
            label_ids: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/users/{}/{path}",
            self.config.api_base.trim_end_matches('/'),
            self.config.user_id
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(self.config.access_token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        self.read_json(resp).await
    }

    async fn read_json<T: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T, SourceError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                provider: PROVIDER.into(),
                status: status.as_u16(),
                body,
            });
        }
        resp.json().await.map_err(|e| SourceError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: e.to_string(),
        })
    }

    fn request_error(&self, e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Timeout(self.timeout)
        } else {
            SourceError::Request {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            }
        }
    }

    /// Resolve a label name to its id, refreshing the cache once on a miss.
    async fn label_id(&self, name: &str) -> Result<Option<String>, SourceError> {
        if let Some(map) = self.label_ids.read().await.as_ref() {
            if let Some(id) = map.get(name) {
                return Ok(Some(id.clone()));
            }
        }

        let list: LabelList = self.get_json("labels", &[]).await?;
        let map: HashMap<String, String> = list
            .labels
            .into_iter()
            .map(|label| (label.name, label.id))
            .collect();
        let id = map.get(name).cloned();
        *self.label_ids.write().await = Some(map);
        Ok(id)
    }

    /// Ids of messages carrying `label_id`, following pagination up to `max_count`.
    async fn message_ids_with_label(
        &self,
        label_id: &str,
        max_count: usize,
    ) -> Result<Vec<String>, SourceError> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        while ids.len() < max_count {
            let mut query = vec![
                ("labelIds", label_id.to_string()),
                ("maxResults", (max_count - ids.len()).min(MAX_PAGE_SIZE).to_string()),
            ];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }
            let page: MessageList = self.get_json("messages", &query).await?;
            ids.extend(page.messages.into_iter().map(|m| m.id));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        ids.truncate(max_count);
        Ok(ids)
    }
}

#[async_trait]
impl MailSource for GmailClient {
    async fn list_documents_by_category(
        &self,
        category: &str,
        max_count: usize,
    ) -> Result<Vec<Document>, SourceError> {
        let Some(label_id) = self.label_id(category).await? else {
            warn!(category, "Label not found in mailbox; no documents for it");
            return Ok(Vec::new());
        };

        let ids = self.message_ids_with_label(&label_id, max_count).await?;
        debug!(category, count = ids.len(), "Listed labelled messages");

        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_document_content(&id).await {
                Ok(text) => documents.push(Document::labeled(text, category)),
                Err(e) => warn!(id = %id, category, error = %e, "Skipping unreadable message"),
            }
        }
        Ok(documents)
    }

    async fn get_document_content(&self, id: &str) -> Result<String, SourceError> {
        let query = [
            ("format", "metadata".to_string()),
            ("metadataHeaders", "Subject".to_string()),
        ];
        let message: MessageResource = self
            .get_json(&format!("messages/{id}"), &query)
            .await
            .map_err(|e| match e {
                SourceError::Status { status: 404, .. } => SourceError::NotFound { id: id.into() },
                other => other,
            })?;

        let content = message_content(&message);
        if content.trim().is_empty() {
            return Err(SourceError::EmptyContent { id: id.into() });
        }
        Ok(content)
    }

    async fn list_new_items_since(&self, checkpoint: &str) -> Result<Vec<String>, SourceError> {
        let mut ids: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![
                ("startHistoryId", checkpoint.to_string()),
                ("historyTypes", "messageAdded".to_string()),
            ];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }
            let page: HistoryList = self.get_json("history", &query).await?;
            for id in added_message_ids(&page.history) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl LabelSink for GmailClient {
    async fn apply_label(&self, id: &str, label: &str) -> Result<bool, SourceError> {
        let Some(label_id) = self.label_id(label).await? else {
            warn!(id, label, "Label does not exist in mailbox; skipping");
            return Ok(false);
        };

        let body = serde_json::json!({ "addLabelIds": [label_id] });
        let resp = self
            .client
            .post(self.url(&format!("messages/{id}/modify")))
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        let _: serde_json::Value = self.read_json(resp).await?;

        debug!(id, label, "Label applied");
        Ok(true)
    }
}

/// `Subject: <subject>\n<snippet>`, or just the snippet when there is no subject.
fn message_content(message: &MessageResource) -> String {
    let subject = message
        .payload
        .as_ref()
        .and_then(|p| p.headers.iter().find(|h| h.name.eq_ignore_ascii_case("subject")))
        .map(|h| h.value.trim())
        .filter(|s| !s.is_empty());
    match subject {
        Some(subject) => format!("Subject: {subject}\n{}", message.snippet),
        None => message.snippet.clone(),
    }
}

fn added_message_ids(history: &[HistoryRecord]) -> Vec<String> {
    history
        .iter()
        .flat_map(|record| record.messages_added.iter())
        .map(|added| added.message.id.clone())
        .collect()
}
