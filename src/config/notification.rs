//! Notification configuration.

use serde::Deserialize;

/// Notification settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Webhook delivery of communications events.
    pub webhook: Option<WebhookSettings>,
}

/// Webhook notification settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSettings {
    /// Whether webhook notifications are active.
    #[serde(default)]
    pub enabled: bool,
    /// Endpoint that receives events as JSON POST bodies.
    #[serde(default)]
    pub url: String,
    /// Bearer token (loaded from WEBHOOK_AUTH_TOKEN env var).
    #[serde(skip)]
    pub auth_token: String,
    /// Send order lifecycle events.
    #[serde(default)]
    pub notify_orders: bool,
    /// Send error events.
    #[serde(default)]
    pub notify_errors: bool,
}
