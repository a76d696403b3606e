//! Configuration loading and validation for the order desk.
//!
//! Uses serde_yaml to load YAML configuration files with support for
//! environment variable overrides for sensitive credentials.

mod app;
mod duration;
mod error;
mod exchange;
mod notification;
mod orders;

pub use app::AppConfig;
pub use error::ConfigError;
pub use exchange::ExchangeConfig;
pub use notification::{NotificationConfig, WebhookSettings};
pub use orders::OrdersConfig;

use serde::Deserialize;
use std::{collections::HashMap, env, fs};

/// Root configuration structure for the order desk.
///
/// Required sections: app, exchanges.
/// Optional sections: orders, notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Application-level settings like name and environment.
    pub app: AppConfig,
    /// Maps exchange names to their configurations.
    pub exchanges: HashMap<String, ExchangeConfig>,
    /// Order manager behavior; defaults apply when omitted.
    #[serde(default)]
    pub orders: OrdersConfig,
    /// Alert channels like webhooks (optional).
    pub notification: Option<NotificationConfig>,
}

impl Config {
    /// Load configuration from a YAML file at the given path.
    ///
    /// First loads environment variables from `.env` file (if exists),
    /// then loads YAML config and credentials from environment variables:
    /// - `{EXCHANGE}_API_KEY`, `{EXCHANGE}_API_SECRET`
    /// - `WEBHOOK_AUTH_TOKEN`
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore error if not found)
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;

        config.load_credentials_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load credentials from environment variables.
    fn load_credentials_from_env(&mut self) {
        for (name, exchange) in self.exchanges.iter_mut() {
            if !exchange.enabled {
                continue;
            }

            let env_prefix = name.to_uppercase();
            exchange.api_key = env::var(format!("{}_API_KEY", env_prefix)).unwrap_or_default();
            exchange.api_secret =
                env::var(format!("{}_API_SECRET", env_prefix)).unwrap_or_default();
        }

        if let Some(ref mut notification) = self.notification {
            if let Some(ref mut webhook) = notification.webhook {
                if webhook.enabled {
                    webhook.auth_token = env::var("WEBHOOK_AUTH_TOKEN").unwrap_or_default();
                }
            }
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Validation("app.name is required".into()));
        }

        let is_production = self.app.env != "development";

        let mut enabled_exchanges = 0;
        for (name, exchange) in &self.exchanges {
            if exchange.enabled {
                enabled_exchanges += 1;

                if exchange.asset_types.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "exchange {}: at least one asset type is required",
                        name
                    )));
                }

                // Only require credentials in production/staging
                if is_production && !exchange.has_credentials() {
                    return Err(ConfigError::Validation(format!(
                        "exchange {}: API credentials not found (set {}_API_KEY and {}_API_SECRET env vars)",
                        name,
                        name.to_uppercase(),
                        name.to_uppercase()
                    )));
                }
            }
        }

        if enabled_exchanges == 0 {
            return Err(ConfigError::Validation(
                "at least one exchange must be enabled".into(),
            ));
        }

        if self.orders.activity_interval.is_zero() {
            return Err(ConfigError::Validation(
                "orders.activity_interval must be positive".into(),
            ));
        }
        if self.orders.stale_order_age.is_zero() {
            return Err(ConfigError::Validation(
                "orders.stale_order_age must be positive".into(),
            ));
        }

        if let Some(ref notification) = self.notification {
            if let Some(ref webhook) = notification.webhook {
                if webhook.enabled && webhook.url.is_empty() {
                    return Err(ConfigError::Validation(
                        "notification.webhook.url is required when enabled".into(),
                    ));
                }
            }
        }

        Ok(())
    }
}
