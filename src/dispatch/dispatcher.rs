//! Turns a "something changed since checkpoint X" notification into at most
//! one classify-and-label action.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::state::{DispatchRun, DispatchState};
use crate::error::{DispatchFailure, PredictError, SourceError};
use crate::inference::Classifier;
use crate::mail::{LabelSink, MailSource};

/// Inbound push notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    /// Mailbox the event is about.
    pub account: String,
    /// Opaque cursor; new items are those added after it.
    pub checkpoint: String,
}

/// What a dispatch ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing new since the checkpoint.
    NoOp,
    /// The first new item was classified and the label handed to the sink.
    /// `applied` is false when the sink no-op'd (label absent in the mailbox).
    Labeled {
        item_id: String,
        label: String,
        applied: bool,
    },
    Failed(DispatchFailure),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    /// Short name for acknowledgments: `no_op`, `labeled` or the failure kind.
    pub fn result_name(&self) -> &'static str {
        match self {
            Self::NoOp => "no_op",
            Self::Labeled { .. } => "labeled",
            Self::Failed(failure) => failure.kind(),
        }
    }
}

/// Outcome plus the recorded state history of one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub run: DispatchRun,
    pub outcome: DispatchOutcome,
}

impl DispatchReport {
    pub fn id(&self) -> Uuid {
        self.run.id
    }
}

/// Stateless between events. Each `dispatch` call is independent, so
/// concurrent events only share the read-only classifier.
pub struct Dispatcher {
    source: Arc<dyn MailSource>,
    sink: Arc<dyn LabelSink>,
    classifier: Arc<dyn Classifier>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        source: Arc<dyn MailSource>,
        sink: Arc<dyn LabelSink>,
        classifier: Arc<dyn Classifier>,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            sink,
            classifier,
            timeout,
        }
    }

    /// Handle one notification. Never panics on collaborator failure; every
    /// problem ends in `DispatchOutcome::Failed`.
    pub async fn dispatch(&self, event: &NotificationEvent) -> DispatchReport {
        let mut run = DispatchRun::new();
        info!(
            dispatch_id = %run.id,
            account = %event.account,
            checkpoint = %event.checkpoint,
            "Notification received"
        );

        let outcome = self.drive(&mut run, event).await;
        match &outcome {
            DispatchOutcome::NoOp => {
                info!(dispatch_id = %run.id, "No new items since checkpoint")
            }
            DispatchOutcome::Labeled {
                item_id,
                label,
                applied,
            } => info!(dispatch_id = %run.id, item_id = %item_id, label = %label, applied, "Item labelled"),
            DispatchOutcome::Failed(failure) => warn!(
                dispatch_id = %run.id,
                kind = failure.kind(),
                error = %failure,
                "Dispatch failed"
            ),
        }
        DispatchReport { run, outcome }
    }

    async fn drive(&self, run: &mut DispatchRun, event: &NotificationEvent) -> DispatchOutcome {
        advance(run, DispatchState::Resolving, None);
        let item_ids = match self
            .bounded(self.source.list_new_items_since(&event.checkpoint))
            .await
        {
            Ok(ids) => ids,
            Err(e) => return fail(run, DispatchFailure::SourceUnavailable(e.to_string())),
        };

        let Some(item_id) = item_ids.first().cloned() else {
            advance(run, DispatchState::Done, Some("no new items".into()));
            return DispatchOutcome::NoOp;
        };
        if item_ids.len() > 1 {
            debug!(
                dispatch_id = %run.id,
                ignored = item_ids.len() - 1,
                "Only the first new item is handled per event"
            );
        }

        advance(run, DispatchState::Fetching, Some(item_id.clone()));
        let content = match self.bounded(self.source.get_document_content(&item_id)).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                return fail(run, DispatchFailure::ContentUnavailable {
                    item_id,
                    reason: "empty content".into(),
                });
            }
            Err(e) => {
                return fail(run, DispatchFailure::ContentUnavailable {
                    item_id,
                    reason: e.to_string(),
                });
            }
        };

        advance(run, DispatchState::Classifying, None);
        let label = match self.classify(content).await {
            Ok(label) => label,
            Err(PredictError::EmptyContent) => {
                return fail(run, DispatchFailure::ContentUnavailable {
                    item_id,
                    reason: PredictError::EmptyContent.to_string(),
                });
            }
            Err(e) => {
                return fail(run, DispatchFailure::PredictionUnavailable {
                    item_id,
                    reason: e.to_string(),
                });
            }
        };
        let Some(label) = label else {
            return fail(run, DispatchFailure::PredictionUnavailable {
                item_id,
                reason: "classifier produced no label".into(),
            });
        };

        advance(run, DispatchState::Applying, Some(label.clone()));
        let applied = match self.bounded(self.sink.apply_label(&item_id, &label)).await {
            Ok(applied) => applied,
            Err(e) => {
                return fail(run, DispatchFailure::ApplyFailed {
                    item_id,
                    label,
                    reason: e.to_string(),
                });
            }
        };

        advance(run, DispatchState::Done, None);
        DispatchOutcome::Labeled {
            item_id,
            label,
            applied,
        }
    }

    /// Run the classifier on the blocking pool.
    async fn classify(&self, content: String) -> Result<Option<String>, PredictError> {
        let classifier = Arc::clone(&self.classifier);
        match tokio::task::spawn_blocking(move || classifier.predict(&content)).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Classifier task did not complete");
                Ok(None)
            }
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, SourceError>>,
    ) -> Result<T, SourceError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(SourceError::Timeout(self.timeout)))
    }
}

fn advance(run: &mut DispatchRun, state: DispatchState, reason: Option<String>) {
    if let Err(e) = run.transition_to(state, reason) {
        warn!(dispatch_id = %run.id, error = %e, "Unexpected dispatch transition");
    }
}

fn fail(run: &mut DispatchRun, failure: DispatchFailure) -> DispatchOutcome {
    advance(run, DispatchState::Failed, Some(failure.to_string()));
    DispatchOutcome::Failed(failure)
}
