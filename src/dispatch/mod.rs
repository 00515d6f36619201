//! Event-driven dispatch: notification → first new item → label.

pub mod dispatcher;
pub mod state;

pub use dispatcher::{DispatchOutcome, DispatchReport, Dispatcher, NotificationEvent};
pub use state::{DispatchRun, DispatchState, StateTransition};
