//! Exchange configuration.

use serde::Deserialize;
use std::time::Duration;

use crate::domain::{AssetType, Pair};

use super::duration;

/// Settings for a single exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Whether this exchange should be used.
    #[serde(default)]
    pub enabled: bool,
    /// Enable testnet/sandbox mode.
    #[serde(default)]
    pub testnet: bool,
    /// API key (loaded from environment variable).
    #[serde(skip)]
    pub api_key: String,
    /// API secret (loaded from environment variable).
    #[serde(skip)]
    pub api_secret: String,
    /// Asset types enabled for trading on this exchange.
    #[serde(default = "default_asset_types")]
    pub asset_types: Vec<AssetType>,
    /// Pairs enabled for trading (e.g., "BTC/USDT").
    #[serde(default)]
    pub pairs: Vec<Pair>,
    /// Maximum API requests per minute.
    pub rate_limit: Option<i32>,
    /// Per-request timeout for REST calls.
    #[serde(default, with = "duration")]
    pub request_timeout: Duration,
}

fn default_asset_types() -> Vec<AssetType> {
    vec![AssetType::Spot]
}

impl ExchangeConfig {
    /// Whether authenticated REST endpoints can be used.
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}
