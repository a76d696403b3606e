//! Registry for resolving exchange adapters by name.

use super::{ExchangeAdapter, ExchangeError, Result};
use crate::config::{Config, ExchangeConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// ExchangeRegistry holds the adapters for every connected exchange.
///
/// The order manager treats the registry as read-only; registration
/// happens during startup wiring.
pub struct ExchangeRegistry {
    /// Map of lower-cased exchange name to adapter instance.
    adapters: RwLock<HashMap<String, Arc<dyn ExchangeAdapter>>>,
}

impl ExchangeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            adapters: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry from configuration. Only enabled exchanges are
    /// instantiated.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let registry = Self::new();

        for (name, exchange_config) in &config.exchanges {
            if !exchange_config.enabled {
                info!(exchange = %name, "Skipping disabled exchange");
                continue;
            }

            info!(exchange = %name, "Loading exchange from config");

            let adapter = Self::create_adapter(name, exchange_config)?;
            registry.register(adapter).await;
        }

        Ok(registry)
    }

    /// Factory method to create an adapter instance based on name and config.
    fn create_adapter(
        name: &str,
        config: &ExchangeConfig,
    ) -> Result<Arc<dyn ExchangeAdapter>> {
        match name.to_lowercase().as_str() {
            "paper" => Ok(Arc::new(super::PaperExchange::new(name, config))),
            "binance" | "bybit" | "okx" => {
                // TODO: wire in the REST adapters once their auth layer
                // lands
                Err(ExchangeError::Internal(format!(
                    "exchange {} is not yet implemented",
                    name
                )))
            }
            _ => Err(ExchangeError::Internal(format!(
                "unknown exchange: {}",
                name
            ))),
        }
    }

    /// Registers an adapter under its lower-cased name.
    pub async fn register(&self, adapter: Arc<dyn ExchangeAdapter>) {
        let name = adapter.name().to_lowercase();
        let mut adapters = self.adapters.write().await;
        info!(exchange = %name, "Registering exchange adapter");
        adapters.insert(name, adapter);
    }

    /// Removes an adapter by name.
    pub async fn unregister(&self, name: &str) -> Result<()> {
        let mut adapters = self.adapters.write().await;
        if adapters.remove(&name.to_lowercase()).is_some() {
            info!(exchange = %name, "Unregistered exchange adapter");
            Ok(())
        } else {
            warn!(exchange = %name, "Attempted to unregister unknown exchange");
            Err(ExchangeError::Internal(format!(
                "exchange {} not found",
                name
            )))
        }
    }

    /// Resolves an adapter by name, case-insensitively.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn ExchangeAdapter>> {
        let adapters = self.adapters.read().await;
        adapters.get(&name.to_lowercase()).cloned()
    }

    /// Returns every registered adapter.
    pub async fn get_all(&self) -> Vec<Arc<dyn ExchangeAdapter>> {
        let adapters = self.adapters.read().await;
        adapters.values().cloned().collect()
    }

    /// Returns all registered exchange names.
    pub async fn names(&self) -> Vec<String> {
        let adapters = self.adapters.read().await;
        adapters.keys().cloned().collect()
    }
}

impl Default for ExchangeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
