//! Event types for reporting model execution progress
//!
//! Events are sent from the executor (and from running algorithms) to any
//! consumer: a progress dialog, a log, or a test collecting them.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Trait for sending execution events
///
/// This abstracts over the transport mechanism (channel, log, UI bridge)
/// so the engine can be used in different hosts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: ExecutionEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted while a model runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExecutionEvent {
    /// Model execution started
    #[serde(rename_all = "camelCase")]
    ModelStarted {
        model: String,
        execution_id: String,
        node_count: usize,
    },

    /// Every active node finished
    #[serde(rename_all = "camelCase")]
    ModelCompleted {
        model: String,
        execution_id: String,
        executed: usize,
        execution_time_ms: u64,
    },

    /// The run was aborted
    #[serde(rename_all = "camelCase")]
    ModelFailed {
        model: String,
        execution_id: String,
        error: String,
    },

    /// A node started running
    #[serde(rename_all = "camelCase")]
    NodeStarted {
        node: String,
        execution_id: String,
        description: String,
        index: usize,
        total: usize,
    },

    /// A node finished successfully
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        node: String,
        execution_id: String,
        elapsed_ms: u64,
        output_count: usize,
    },

    /// A node failed during preparation or execution
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        node: String,
        execution_id: String,
        error: String,
    },

    /// Progress reported by a running algorithm
    #[serde(rename_all = "camelCase")]
    NodeProgress {
        node: String,
        execution_id: String,
        progress: f32,
        message: Option<String>,
    },
}

impl ExecutionEvent {
    /// Create a node progress event
    pub fn node_progress(
        node: &str,
        execution_id: &str,
        progress: f32,
        message: Option<String>,
    ) -> Self {
        Self::NodeProgress {
            node: node.to_string(),
            execution_id: execution_id.to_string(),
            progress,
            message,
        }
    }
}

/// Progress handle given to a running algorithm
///
/// Wraps the run's sink with the identity of the node being executed.
pub struct Progress<'a> {
    sink: &'a dyn EventSink,
    node: &'a str,
    execution_id: &'a str,
}

impl<'a> Progress<'a> {
    pub fn new(sink: &'a dyn EventSink, node: &'a str, execution_id: &'a str) -> Self {
        Self {
            sink,
            node,
            execution_id,
        }
    }

    /// Name of the node being executed
    pub fn node(&self) -> &str {
        self.node
    }

    /// Report completion as a fraction in `0.0..=1.0`
    pub fn set_percentage(&self, progress: f32) {
        self.emit(progress.clamp(0.0, 1.0), None);
    }

    /// Report a status message
    pub fn set_text(&self, message: impl Into<String>) {
        self.emit(-1.0, Some(message.into()));
    }

    fn emit(&self, progress: f32, message: Option<String>) {
        let event = ExecutionEvent::node_progress(self.node, self.execution_id, progress, message);
        if let Err(e) = self.sink.send(event) {
            log::warn!("Dropped progress event for '{}': {}", self.node, e);
        }
    }
}

/// A no-op event sink that discards all events
///
/// Useful for testing or when events aren't needed.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: ExecutionEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: ExecutionEvent) -> Result<(), EventError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}
