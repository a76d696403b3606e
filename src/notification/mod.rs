mod notifier;
mod webhook;

pub use notifier::{
    Event, EventKind, LogNotifier, MultiNotifier, NoopNotifier, NotificationError, Notifier,
};
pub use webhook::{WebhookConfig, WebhookNotifier};
