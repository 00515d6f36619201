//! Dispatch state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a single notification is in its handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    /// Notification accepted, nothing done yet.
    Received,
    /// Asking the mail source what is new since the checkpoint.
    Resolving,
    /// Reading the content of the first new item.
    Fetching,
    /// Running the classifier.
    Classifying,
    /// Applying the predicted label.
    Applying,
    /// Finished, with or without a label applied.
    Done,
    /// Gave up; see the recorded failure.
    Failed,
}

impl DispatchState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: DispatchState) -> bool {
        use DispatchState::*;

        matches!(
            (self, target),
            (Received, Resolving) |
            // No new items is a successful no-op
            (Resolving, Fetching) | (Resolving, Done) | (Resolving, Failed) |
            (Fetching, Classifying) | (Fetching, Failed) |
            (Classifying, Applying) | (Classifying, Failed) |
            (Applying, Done) | (Applying, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for DispatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Resolving => "resolving",
            Self::Fetching => "fetching",
            Self::Classifying => "classifying",
            Self::Applying => "applying",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A state transition event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: DispatchState,
    pub to: DispatchState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Bookkeeping for one dispatch: its id, current state and history.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchRun {
    pub id: Uuid,
    pub state: DispatchState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub transitions: Vec<StateTransition>,
}

impl DispatchRun {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: DispatchState::Received,
            started_at: Utc::now(),
            finished_at: None,
            transitions: Vec::new(),
        }
    }

    /// Transition to a new state.
    pub fn transition_to(
        &mut self,
        new_state: DispatchState,
        reason: Option<String>,
    ) -> Result<(), String> {
        if !self.state.can_transition_to(new_state) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.state, new_state
            ));
        }

        self.transitions.push(StateTransition {
            from: self.state,
            to: new_state,
            timestamp: Utc::now(),
            reason,
        });
        self.state = new_state;

        if new_state.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// The path taken so far, starting at `Received`.
    pub fn path(&self) -> Vec<DispatchState> {
        std::iter::once(DispatchState::Received)
            .chain(self.transitions.iter().map(|t| t.to))
            .collect()
    }
}

impl Default for DispatchRun {
    fn default() -> Self {
        Self::new()
    }
}
