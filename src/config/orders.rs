//! Order manager configuration.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use crate::domain::Pair;

use super::duration;

fn default_activity_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_stale_order_age() -> Duration {
    Duration::from_secs(60)
}

fn default_true() -> bool {
    true
}

/// Order manager settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OrdersConfig {
    /// How often the reconciliation loop compares stored orders against
    /// exchange state (default: 10s).
    #[serde(default = "default_activity_interval", with = "duration")]
    pub activity_interval: Duration,
    /// Age after which an order the exchange stopped reporting is
    /// re-fetched individually (default: 60s).
    #[serde(default = "default_stale_order_age", with = "duration")]
    pub stale_order_age: Duration,
    /// Cancel every active order when the manager shuts down.
    #[serde(default)]
    pub cancel_orders_on_shutdown: bool,
    /// Feed futures orders into the position tracker.
    #[serde(default)]
    pub track_futures_positions: bool,
    /// Run exchange execution-limit checks before submitting.
    #[serde(default = "default_true")]
    pub enforce_limits: bool,
    /// Permit market orders.
    #[serde(default = "default_true")]
    pub allow_market_orders: bool,
    /// Per-order amount cap; unset means uncapped.
    pub limit_amount: Option<Decimal>,
    /// Exchanges orders may be submitted to; empty means all registered.
    #[serde(default)]
    pub allowed_exchanges: Vec<String>,
    /// Pairs orders may be submitted for; empty means all.
    #[serde(default)]
    pub allowed_pairs: Vec<Pair>,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            activity_interval: default_activity_interval(),
            stale_order_age: default_stale_order_age(),
            cancel_orders_on_shutdown: false,
            track_futures_positions: false,
            enforce_limits: true,
            allow_market_orders: true,
            limit_amount: None,
            allowed_exchanges: Vec::new(),
            allowed_pairs: Vec::new(),
        }
    }
}
