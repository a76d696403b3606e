mod config;
mod domain;
mod exchanges;
mod notification;
mod orders;
mod positions;

use config::{Config, WebhookSettings};
use exchanges::ExchangeRegistry;
use notification::{LogNotifier, MultiNotifier, Notifier, WebhookConfig, WebhookNotifier};
use orders::OrderManager;
use positions::PositionController;
use std::env;
use std::sync::Arc;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

fn parse_config_path() -> String {
    for arg in env::args().skip(1) {
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

fn init_tracing(log_level: Option<&str>) {
    let level = match log_level {
        Some("debug") => Level::DEBUG,
        Some("info") => Level::INFO,
        Some("warn") | Some("warning") => Level::WARN,
        Some("error") => Level::ERROR,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn webhook_notifier(settings: &WebhookSettings) -> Option<WebhookNotifier> {
    let mut webhook_config = WebhookConfig::new(&settings.url);
    if !settings.auth_token.is_empty() {
        webhook_config = webhook_config.with_auth_token(&settings.auth_token);
    }
    webhook_config.notify_orders = settings.notify_orders;
    webhook_config.notify_errors = settings.notify_errors;

    match WebhookNotifier::new(webhook_config) {
        Ok(notifier) => Some(notifier),
        Err(e) => {
            error!(error = %e, "Failed to create webhook notifier");
            None
        }
    }
}

fn build_notifier(config: &Config) -> Arc<dyn Notifier> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier::new())];

    if let Some(settings) = config
        .notification
        .as_ref()
        .and_then(|n| n.webhook.as_ref())
        .filter(|w| w.enabled)
    {
        if let Some(notifier) = webhook_notifier(settings) {
            notifiers.push(Arc::new(notifier));
        }
    }

    Arc::new(MultiNotifier::new(notifiers))
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config_path = parse_config_path();
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            return;
        }
    };

    init_tracing(config.app.log_level.as_deref());
    info!(app = %config.app.name, config = %config_path, "Configuration loaded");

    let registry = match ExchangeRegistry::from_config(&config).await {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!(error = %e, "Failed to initialize exchanges");
            return;
        }
    };
    info!(exchanges = ?registry.names().await, "Exchanges ready");

    let notifier = build_notifier(&config);
    let positions = Arc::new(PositionController::new());
    let manager = Arc::new(OrderManager::new(
        Arc::clone(&registry),
        positions,
        Arc::clone(&notifier),
        config.orders.clone(),
    ));

    if let Err(e) = manager.start() {
        error!(error = %e, "Failed to start order manager");
        return;
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");

    if let Err(e) = manager.stop().await {
        error!(error = %e, "Order manager shutdown error");
    }
    if let Err(e) = notifier.close().await {
        error!(error = %e, "Notifier shutdown error");
    }
}
