//! Exchange adapter abstractions and the adapter registry.

mod paper;
mod registry;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{
    AssetType, CancelRequest, ModifyRequest, ModifyResponse, OrderDetail, OrderType,
    OrdersRequest, Pair, SubmitRequest, SubmitResponse,
};

pub use paper::PaperExchange;
pub use registry::ExchangeRegistry;

/// Exchange adapter errors.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Trading pair is not supported or currently not tradable.
    #[error("pair {0} is not tradable")]
    PairNotTradable(String),

    /// Order breaches an exchange execution limit.
    #[error("execution limits: {0}")]
    ExecutionLimits(String),

    /// Order not found on the exchange.
    #[error("order {0} not found")]
    OrderNotFound(String),

    /// Asset type not offered by this exchange.
    #[error("asset type {0} is not supported")]
    AssetNotSupported(AssetType),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// API error from the exchange.
    #[error("API error: {0}")]
    Api(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for exchange adapter operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// ExchangeAdapter is the per-exchange capability set the order manager
/// consumes. Implementations own protocol translation, authentication and
/// rate limiting; the manager only sees this surface.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Unique identifier of this exchange (e.g. "binance").
    fn name(&self) -> &str;

    /// True when authenticated REST endpoints are configured, which the
    /// reconciliation loop requires to enumerate active orders.
    fn supports_rest_auth(&self) -> bool;

    /// Asset types offered; when `enabled_only` is set, restricted to the
    /// ones enabled in configuration.
    fn asset_types(&self, enabled_only: bool) -> Vec<AssetType>;

    /// Pairs enabled for trading on the given asset type.
    fn enabled_pairs(&self, asset: AssetType) -> Result<Vec<Pair>>;

    /// Checks exchange-specific min/max execution limits for an order
    /// before it is placed.
    fn check_order_execution_limits(
        &self,
        asset: AssetType,
        pair: &Pair,
        price: Decimal,
        amount: Decimal,
        order_type: OrderType,
    ) -> Result<()>;

    /// Determines whether trading is currently enabled for the pair.
    fn can_trade_pair(&self, pair: &Pair, asset: AssetType) -> Result<()>;

    /// Places a new order.
    async fn submit_order(&self, req: &SubmitRequest) -> Result<SubmitResponse>;

    /// Amends a working order.
    async fn modify_order(&self, req: &ModifyRequest) -> Result<ModifyResponse>;

    /// Cancels a working order.
    async fn cancel_order(&self, req: &CancelRequest) -> Result<()>;

    /// Fetches the current state of one order.
    async fn get_order_info(
        &self,
        order_id: &str,
        pair: &Pair,
        asset: AssetType,
    ) -> Result<OrderDetail>;

    /// Enumerates the orders the exchange currently reports as active.
    async fn get_active_orders(&self, req: &OrdersRequest) -> Result<Vec<OrderDetail>>;
}
