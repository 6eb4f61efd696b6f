//! Append-only diagnostic event sink.
//!
//! Shared by the controllers, the level pump and the platform callbacks. Writers
//! never wait on readers: events are stored in memory and fanned out to live
//! subscribers through a broadcast channel that drops for lagging receivers.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{error, info};

const SUBSCRIBER_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticEvent {
    pub message: String,
    pub timestamp_ms: i64,
    pub is_error: bool,
}

impl DiagnosticEvent {
    pub fn new(message: impl Into<String>, is_error: bool) -> Self {
        Self {
            message: message.into(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            is_error,
        }
    }
}

#[derive(Clone)]
pub struct DiagnosticLog {
    events: Arc<Mutex<Vec<DiagnosticEvent>>>,
    live: broadcast::Sender<DiagnosticEvent>,
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticLog {
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            live,
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(DiagnosticEvent::new(message, false));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(DiagnosticEvent::new(message, true));
    }

    pub fn push(&self, event: DiagnosticEvent) {
        if event.is_error {
            error!(target: "voicecheck::diagnostics", "{}", event.message);
        } else {
            info!(target: "voicecheck::diagnostics", "{}", event.message);
        }

        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());

        // No subscribers is fine.
        let _ = self.live.send(event);
    }

    /// All events in insertion order.
    pub fn snapshot(&self) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The newest `limit` events, still in insertion order.
    pub fn tail(&self, limit: usize) -> Vec<DiagnosticEvent> {
        let events = self
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let start = events.len().saturating_sub(limit);
        events[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn error_count(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|event| event.is_error)
            .count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiagnosticEvent> {
        self.live.subscribe()
    }
}
