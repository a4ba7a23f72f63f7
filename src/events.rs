//! Notification stream published to consumers
//!
//! Push-derived messages and reconciliation-detected changes share one
//! broadcast channel. Each producer publishes in completion order; there is
//! no ordering between producers.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::models::{Call, Message};

/// Buffered events per subscriber before the slowest one starts lagging.
const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub enum SyncEvent {
    Message(Message),
    CallAgentChanged {
        previous: Arc<Call>,
        updated: Arc<Call>,
    },
    CallDepartmentChanged {
        previous: Arc<Call>,
        updated: Arc<Call>,
    },
    CallStatusChanged {
        previous: Arc<Call>,
        updated: Arc<Call>,
    },
    NewCall(Arc<Call>),
    /// The push channel authenticated and subscribed.
    ConnectionOpened,
}

impl SyncEvent {
    /// Stable event class name.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::Message(_) => "message",
            SyncEvent::CallAgentChanged { .. } => "call-agent-changed",
            SyncEvent::CallDepartmentChanged { .. } => "call-department-changed",
            SyncEvent::CallStatusChanged { .. } => "call-status-changed",
            SyncEvent::NewCall(_) => "new-call",
            SyncEvent::ConnectionOpened => "connection-opened",
        }
    }
}

/// Cloneable publishing handle.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: SyncEvent) {
        tracing::debug!("emit {}", event.kind());
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
