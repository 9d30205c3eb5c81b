//! Loop events: progress notifications published while a run executes.
//!
//! The loop controller, chains and tool agent publish here; front-ends
//! (the CLI) subscribe and print progress without being coupled to the loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Everything observable about a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LoopEvent {
    /// A loop iteration is about to run its steps
    IterationStarted {
        loop_name: String,
        iteration: u32,
        timestamp: DateTime<Utc>,
    },

    /// A step produced a result (and wrote it to state if it has an output key)
    StepCompleted {
        step: String,
        output_key: Option<String>,
        preview: String,
        timestamp: DateTime<Utc>,
    },

    /// A step produced malformed structured output and will be retried
    StepRetried {
        step: String,
        attempt: u32,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The condition evaluator inspected state after an iteration
    ConditionEvaluated {
        iteration: u32,
        status: String,
        terminate: bool,
        timestamp: DateTime<Utc>,
    },

    /// The loop reached a terminal outcome
    LoopFinished {
        loop_name: String,
        outcome: String,
        iterations: u32,
        timestamp: DateTime<Utc>,
    },

    /// The provider answered a request
    ResponseGenerated {
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
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

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<LoopEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
