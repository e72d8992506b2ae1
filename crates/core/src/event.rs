//! Loop events — what the controller tells the streaming layer.
//!
//! The driver translates these into user-visible stream frames:
//! - `budget_exceeded` — a hard limit stopped the loop
//! - `converged`       — responses stabilized, the loop stopped successfully
//! - `done`            — the loop is over, with a summary

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events emitted when the loop controller stops or finishes a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// A budget limit was hit.
    BudgetExceeded {
        reason: String,
        tool_calls_made: u32,
        elapsed_ms: u64,
    },

    /// The convergence detector judged the responses stable.
    Converged {
        reason: String,
        similarity_threshold: f64,
        responses_analyzed: usize,
    },

    /// The session is complete.
    Done { summary: String },
}

impl LoopEvent {
    /// Stream frame name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::Converged { .. } => "converged",
            Self::Done { .. } => "done",
        }
    }

    /// Whether this event ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

/// A broadcast-based event bus for loop events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<LoopEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: LoopEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<LoopEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
