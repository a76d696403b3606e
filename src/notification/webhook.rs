#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tracing::error;

use crate::notification::{Event, EventKind, NotificationError, Notifier};

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const ASYNC_QUEUE_SIZE: usize = 100;

/// Webhook notifier configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Endpoint that receives events as JSON POST bodies.
    pub url: String,
    /// Optional bearer token for the Authorization header.
    pub auth_token: Option<String>,
    /// Forward order activity events.
    pub notify_orders: bool,
    /// Forward error events.
    pub notify_errors: bool,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            notify_orders: true,
            notify_errors: true,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// Delivers communications events to an HTTP endpoint. Asynchronous
/// sends go through a bounded queue; when the queue is full the event is
/// dropped rather than blocking the order path.
pub struct WebhookNotifier {
    config: WebhookConfig,
    http_client: reqwest::Client,
    sender: mpsc::Sender<Event>,
    shutdown: Arc<Mutex<bool>>,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> Result<Self, NotificationError> {
        if config.url.is_empty() {
            return Err(NotificationError::new("webhook url is required"));
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| NotificationError::new(format!("Failed to create HTTP client: {}", e)))?;

        let (sender, receiver) = mpsc::channel(ASYNC_QUEUE_SIZE);
        let shutdown = Arc::new(Mutex::new(false));

        let notifier = Self {
            config: config.clone(),
            http_client: http_client.clone(),
            sender,
            shutdown: shutdown.clone(),
        };

        Self::spawn_worker(receiver, config, http_client, shutdown);

        Ok(notifier)
    }

    fn spawn_worker(
        mut receiver: mpsc::Receiver<Event>,
        config: WebhookConfig,
        http_client: reqwest::Client,
        shutdown: Arc<Mutex<bool>>,
    ) {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Err(e) = Self::post_event(&http_client, &config, &event).await {
                    error!(error = %e, "Failed to deliver webhook event");
                }
            }

            let mut is_shutdown = shutdown.lock().await;
            *is_shutdown = true;
        });
    }

    async fn post_event(
        http_client: &reqwest::Client,
        config: &WebhookConfig,
        event: &Event,
    ) -> Result<(), NotificationError> {
        let mut request = http_client.post(&config.url).json(event);
        if let Some(token) = &config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotificationError::new(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(NotificationError::new(format!(
                "Webhook endpoint error: {} - {}",
                status, body
            )));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        if !self.is_enabled(event.kind) {
            return Ok(());
        }
        Self::post_event(&self.http_client, &self.config, event).await
    }

    fn send_async(&self, event: Event) {
        if !self.is_enabled(event.kind) {
            return;
        }

        if let Err(e) = self.sender.try_send(event) {
            error!(error = %e, "Failed to queue webhook event");
        }
    }

    fn is_enabled(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Startup | EventKind::Shutdown => true,
            EventKind::Order => self.config.notify_orders,
            EventKind::Error => self.config.notify_errors,
        }
    }

    async fn close(&self) -> Result<(), NotificationError> {
        // Give the worker a moment to drain the queue.
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }
}
