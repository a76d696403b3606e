#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// Kind of a communications event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Order lifecycle activity: submitted, modified, cancelled, updated.
    Order,
    /// An operation failed in a way the operator should know about.
    Error,
    /// Service started.
    Startup,
    /// Service stopped.
    Shutdown,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Order => write!(f, "order"),
            EventKind::Error => write!(f, "error"),
            EventKind::Startup => write!(f, "startup"),
            EventKind::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Communications event pushed by the order manager.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn order(message: impl Into<String>) -> Self {
        Self::new(EventKind::Order, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventKind::Error, message)
    }

    pub fn startup(message: impl Into<String>) -> Self {
        Self::new(EventKind::Startup, message)
    }

    pub fn shutdown(message: impl Into<String>) -> Self {
        Self::new(EventKind::Shutdown, message)
    }
}

/// Notification delivery error.
#[derive(Debug, Clone)]
pub struct NotificationError {
    pub message: String,
}

impl fmt::Display for NotificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NotificationError: {}", self.message)
    }
}

impl std::error::Error for NotificationError {}

impl NotificationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Sink for communications events.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers the event, waiting for the outcome.
    async fn send(&self, event: &Event) -> Result<(), NotificationError>;

    /// Queues the event without blocking the caller.
    fn send_async(&self, event: Event);

    /// Whether this sink wants events of the given kind.
    fn is_enabled(&self, kind: EventKind) -> bool;

    /// Flushes and shuts the sink down.
    async fn close(&self) -> Result<(), NotificationError>;
}

/// Fans events out to several notifiers.
pub struct MultiNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl MultiNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }
}

#[async_trait::async_trait]
impl Notifier for MultiNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            if notifier.is_enabled(event.kind) {
                if let Err(e) = notifier.send(event).await {
                    errors.push(e.message);
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::new(errors.join("; ")))
        }
    }

    fn send_async(&self, event: Event) {
        for notifier in &self.notifiers {
            if notifier.is_enabled(event.kind) {
                notifier.send_async(event.clone());
            }
        }
    }

    fn is_enabled(&self, kind: EventKind) -> bool {
        self.notifiers.iter().any(|n| n.is_enabled(kind))
    }

    async fn close(&self) -> Result<(), NotificationError> {
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            if let Err(e) = notifier.close().await {
                errors.push(e.message);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::new(errors.join("; ")))
        }
    }
}

/// Notifier that discards everything. Used when communications are
/// disabled and in tests.
pub struct NoopNotifier;

impl NoopNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _event: &Event) -> Result<(), NotificationError> {
        Ok(())
    }

    fn send_async(&self, _event: Event) {}

    fn is_enabled(&self, _kind: EventKind) -> bool {
        false
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

/// Notifier that routes events into the tracing log.
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        match event.kind {
            EventKind::Error => error!(kind = %event.kind, "{}", event.message),
            EventKind::Startup | EventKind::Shutdown => {
                info!(kind = %event.kind, "{}", event.message)
            }
            EventKind::Order => info!(kind = %event.kind, "{}", event.message),
        }
        Ok(())
    }

    fn send_async(&self, event: Event) {
        match event.kind {
            EventKind::Error => error!(kind = %event.kind, "{}", event.message),
            _ => info!(kind = %event.kind, "{}", event.message),
        }
    }

    fn is_enabled(&self, _kind: EventKind) -> bool {
        true
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
