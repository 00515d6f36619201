//! Mail-provider capabilities.
//!
//! The classifier core only talks to a mailbox through these traits:
//! - `MailSource`: list labelled mail, fetch one item, list new items
//! - `LabelSink`: attach a label to one item
//!
//! `GmailClient` implements both against the Gmail REST API. Tests use
//! in-memory stubs.

pub mod gmail;

use async_trait::async_trait;

use crate::document::Document;
use crate::error::SourceError;

pub use gmail::GmailClient;

/// Read access to a mailbox.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Up to `max_count` documents currently filed under `category`, each
    /// labelled with `category`. Unreadable items are skipped.
    async fn list_documents_by_category(
        &self,
        category: &str,
        max_count: usize,
    ) -> Result<Vec<Document>, SourceError>;

    /// Text (subject + body) of one item.
    async fn get_document_content(&self, id: &str) -> Result<String, SourceError>;

    /// Ids of items added after `checkpoint`, oldest first.
    async fn list_new_items_since(&self, checkpoint: &str) -> Result<Vec<String>, SourceError>;
}

/// Write access for labelling.
#[async_trait]
pub trait LabelSink: Send + Sync {
    /// Attach `label` to item `id`.
    ///
    /// Returns `Ok(false)` when the label does not exist in the mailbox (a
    /// no-op, not an error). Applying a label twice has no further effect.
    async fn apply_label(&self, id: &str, label: &str) -> Result<bool, SourceError>;
}
