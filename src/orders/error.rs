use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::ValidationError;
use crate::exchanges::ExchangeError;
use crate::positions::PositionError;

/// Errors produced by the order manager and its store.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Manager must be started before servicing requests.
    #[error("order manager is not started")]
    NotStarted,

    /// Start was called on a manager that is already running.
    #[error("order manager already started")]
    AlreadyStarted,

    /// The store already holds this exchange order.
    #[error("order {order_id} on {exchange} already exists")]
    AlreadyExists { exchange: String, order_id: String },

    /// No stored order matches the given identifiers.
    #[error("order {order_id} on {exchange} does not exist")]
    NotFound { exchange: String, order_id: String },

    /// The named exchange is not registered.
    #[error("exchange {0} not found")]
    ExchangeNotFound(String),

    #[error("exchange name is empty")]
    EmptyExchangeName,

    #[error("order ID is empty")]
    EmptyOrderId,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Modify requests must change the price and/or the amount.
    #[error("modify request must set a new price or amount")]
    NothingToModify,

    /// Futures position tracking is disabled by configuration.
    #[error("futures position tracking is disabled")]
    PositionTrackingDisabled,

    /// Market orders are disabled by configuration.
    #[error("market orders are not allowed")]
    MarketOrdersDisallowed,

    /// Order amount exceeds the configured per-order cap.
    #[error("order amount {amount} exceeds configured limit {limit}")]
    AmountOverLimit { amount: Decimal, limit: Decimal },

    /// Exchange is not on the configured allow-list.
    #[error("exchange is not allowed by configuration")]
    ExchangeNotAllowed,

    /// Pair is not on the configured allow-list.
    #[error("pair is not allowed by configuration")]
    PairNotAllowed,

    /// The adapter does not offer the requested asset type.
    #[error("asset type is not supported by the exchange")]
    AssetNotSupported,

    /// An adapter call failed.
    #[error("exchange {exchange}: {source}")]
    Exchange {
        exchange: String,
        #[source]
        source: ExchangeError,
    },

    #[error(transparent)]
    Position(#[from] PositionError),
}

impl OrderError {
    /// Wraps an adapter error with the exchange it came from.
    pub fn exchange(exchange: impl Into<String>, source: ExchangeError) -> Self {
        Self::Exchange {
            exchange: exchange.into(),
            source,
        }
    }
}
