//! Request and response payloads exchanged with exchange adapters.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{AssetType, OrderDetail, OrderSide, OrderStatus, OrderType, Pair};

/// Errors produced by local request validation, before any network call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("currency pair is not set")]
    PairUnset,
    #[error("order side must be buy or sell")]
    SideInvalid,
    #[error("order type must be limit or market")]
    TypeInvalid,
    #[error("order amount must be positive")]
    AmountInvalid,
    #[error("limit orders require a positive price")]
    PriceRequired,
    #[error("post-only and immediate-or-cancel cannot both be set")]
    TimeInForceConflict,
}

/// SubmitRequest describes a new order to be placed on an exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub exchange: String,
    pub pair: Pair,
    pub asset_type: AssetType,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Decimal,
    pub amount: Decimal,
    pub client_order_id: String,
    pub post_only: bool,
    pub immediate_or_cancel: bool,
}

impl SubmitRequest {
    /// Checks the request for internal consistency. Exchange-specific
    /// limits are enforced separately by the adapter.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.pair.is_empty() {
            return Err(ValidationError::PairUnset);
        }
        if self.side.is_wildcard() {
            return Err(ValidationError::SideInvalid);
        }
        if self.order_type.is_wildcard() {
            return Err(ValidationError::TypeInvalid);
        }
        if self.amount <= Decimal::ZERO {
            return Err(ValidationError::AmountInvalid);
        }
        if self.order_type == OrderType::Limit && self.price <= Decimal::ZERO {
            return Err(ValidationError::PriceRequired);
        }
        if self.post_only && self.immediate_or_cancel {
            return Err(ValidationError::TimeInForceConflict);
        }
        Ok(())
    }
}

/// SubmitResponse is the exchange's acknowledgement of a placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Exchange-assigned order identifier.
    pub order_id: String,
    /// Status the exchange reported at placement time.
    pub status: OrderStatus,
    /// Amount already executed at placement time, if any.
    pub executed_amount: Decimal,
    /// Fee charged at placement time, if any.
    pub fee: Decimal,
    /// When the exchange recorded the order.
    pub placed_at: DateTime<Utc>,
}

impl SubmitResponse {
    /// Derives the canonical order detail from the request that produced
    /// this response, stamping the given internal ID.
    pub fn derive_detail(&self, req: &SubmitRequest, internal_id: Uuid) -> OrderDetail {
        let mut detail = OrderDetail {
            internal_id: Some(internal_id),
            order_id: self.order_id.clone(),
            client_order_id: req.client_order_id.clone(),
            exchange: req.exchange.clone(),
            pair: req.pair.clone(),
            asset_type: req.asset_type,
            side: req.side,
            order_type: req.order_type,
            status: self.status,
            price: req.price,
            amount: req.amount,
            executed_amount: self.executed_amount,
            remaining_amount: Decimal::ZERO,
            fee: self.fee,
            post_only: req.post_only,
            immediate_or_cancel: req.immediate_or_cancel,
            created_at: self.placed_at,
            last_updated: Utc::now(),
        };
        detail.rederive_remaining();
        detail
    }
}

/// ModifyRequest amends the price and/or amount of a working order.
/// Fields the caller leaves unset are back-filled from the stored order
/// before the request reaches the adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifyRequest {
    pub exchange: String,
    pub order_id: String,
    pub pair: Option<Pair>,
    pub asset_type: AssetType,
    pub side: Option<OrderSide>,
    pub price: Decimal,
    pub amount: Decimal,
    pub post_only: Option<bool>,
    pub immediate_or_cancel: Option<bool>,
}

/// ModifyResponse carries the exchange's answer to a modify request. The
/// exchange may assign a replacement order ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifyResponse {
    pub exchange: String,
    pub order_id: String,
    pub price: Decimal,
    pub amount: Decimal,
}

/// CancelRequest addresses one working order for cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub exchange: String,
    pub order_id: String,
    pub client_order_id: String,
    pub pair: Pair,
    pub asset_type: AssetType,
    pub side: OrderSide,
    pub order_type: OrderType,
}

/// OrdersRequest asks an adapter for its currently active orders.
#[derive(Debug, Clone)]
pub struct OrdersRequest {
    pub side: OrderSide,
    pub order_type: OrderType,
    pub pairs: Vec<Pair>,
    pub asset_type: AssetType,
}

/// OrderFilter narrows store queries; `None` fields match everything, and
/// wildcard side/type/status values behave the same as `None`.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub exchange: Option<String>,
    pub pair: Option<Pair>,
    pub asset_type: Option<AssetType>,
    pub side: Option<OrderSide>,
    pub order_type: Option<OrderType>,
    pub status: Option<OrderStatus>,
    pub order_id: Option<String>,
    pub internal_id: Option<Uuid>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl OrderFilter {
    /// Filter matching every order on one exchange.
    pub fn for_exchange(exchange: impl Into<String>) -> Self {
        Self {
            exchange: Some(exchange.into()),
            ..Self::default()
        }
    }
}
