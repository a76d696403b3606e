//! Core business entities for order lifecycle tracking.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Pair;

/// OrderSide represents the direction of an order (buy or sell).
///
/// `AnySide` is a query wildcard and is never persisted on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Buy indicates a buy order.
    Buy,
    /// Sell indicates a sell order.
    Sell,
    /// AnySide matches every side when filtering.
    #[serde(rename = "any")]
    AnySide,
}

impl OrderSide {
    /// True for the filter wildcard.
    pub fn is_wildcard(self) -> bool {
        self == Self::AnySide
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
            Self::AnySide => write!(f, "any"),
        }
    }
}

/// OrderType represents the type of order execution.
///
/// `AnyType` is a query wildcard and is never persisted on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Limit executes at the specified price or better.
    Limit,
    /// Market executes immediately at the best available price.
    Market,
    /// AnyType matches every type when filtering.
    #[serde(rename = "any")]
    AnyType,
}

impl OrderType {
    /// True for the filter wildcard.
    pub fn is_wildcard(self) -> bool {
        self == Self::AnyType
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limit => write!(f, "limit"),
            Self::Market => write!(f, "market"),
            Self::AnyType => write!(f, "any"),
        }
    }
}

/// OrderStatus represents the current lifecycle state of an order.
///
/// Statuses only transition forward: once an order reaches a terminal
/// status it never regresses to a non-terminal one, which protects the
/// store against out-of-order exchange responses. `UnknownStatus` is the
/// sentinel used when the exchange could not be reached to confirm state
/// and counts as active so reconciliation keeps retrying it. `AnyStatus`
/// is a query wildcard and is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// New indicates the order was accepted but not yet working.
    New,
    /// Active indicates the order is open on the exchange.
    Active,
    /// PartiallyFilled indicates some of the amount has executed.
    PartiallyFilled,
    /// Filled indicates the full amount has executed.
    Filled,
    /// Cancelled indicates the order was cancelled before completion.
    Cancelled,
    /// Rejected indicates the exchange refused the order.
    Rejected,
    /// Expired indicates the order's time in force elapsed.
    Expired,
    /// UnknownStatus indicates the exchange could not confirm state.
    UnknownStatus,
    /// AnyStatus matches every status when filtering.
    AnyStatus,
}

impl OrderStatus {
    /// True when no further transition is expected.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired
        )
    }

    /// True for the filter wildcard.
    pub fn is_wildcard(self) -> bool {
        self == Self::AnyStatus
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Active => write!(f, "active"),
            Self::PartiallyFilled => write!(f, "partially_filled"),
            Self::Filled => write!(f, "filled"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Rejected => write!(f, "rejected"),
            Self::Expired => write!(f, "expired"),
            Self::UnknownStatus => write!(f, "unknown"),
            Self::AnyStatus => write!(f, "any"),
        }
    }
}

/// AssetType classifies the market an order trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    /// Spot is the regular spot market.
    Spot,
    /// Margin is spot trading on borrowed funds.
    Margin,
    /// Futures are dated futures contracts.
    Futures,
    /// PerpetualSwap are perpetual futures contracts.
    PerpetualSwap,
}

impl AssetType {
    /// True for derivative assets that feed position tracking.
    pub fn is_futures(self) -> bool {
        matches!(self, Self::Futures | Self::PerpetualSwap)
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spot => write!(f, "spot"),
            Self::Margin => write!(f, "margin"),
            Self::Futures => write!(f, "futures"),
            Self::PerpetualSwap => write!(f, "perpetual_swap"),
        }
    }
}

/// OrderDetail is the canonical record of one order's parameters and
/// lifecycle state.
///
/// The order store owns the canonical copies; every accessor hands out a
/// clone, so holders may mutate their copy freely without affecting the
/// store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetail {
    /// Locally generated identifier, assigned once and stable across
    /// exchange-side order ID changes.
    pub internal_id: Option<Uuid>,
    /// Identifier assigned by the exchange. Empty until the exchange
    /// responds; may change on amendment.
    pub order_id: String,
    /// Client-supplied identifier forwarded to the exchange.
    pub client_order_id: String,
    /// Name of the exchange the order lives on.
    pub exchange: String,
    /// Trading pair.
    pub pair: Pair,
    /// Market classification.
    pub asset_type: AssetType,
    /// Buy or sell.
    pub side: OrderSide,
    /// Limit or market.
    pub order_type: OrderType,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Limit price; zero for market orders.
    pub price: Decimal,
    /// Total amount of base currency.
    pub amount: Decimal,
    /// Amount executed so far.
    pub executed_amount: Decimal,
    /// Amount still open. Always re-derived so that
    /// `executed_amount + remaining_amount == amount`.
    pub remaining_amount: Decimal,
    /// Fees charged so far.
    pub fee: Decimal,
    /// Post-only flag.
    pub post_only: bool,
    /// Immediate-or-cancel flag.
    pub immediate_or_cancel: bool,
    /// When the order was first recorded.
    pub created_at: DateTime<Utc>,
    /// When the order was last touched by an update.
    pub last_updated: DateTime<Utc>,
}

impl OrderDetail {
    /// Assigns a fresh internal ID if none has been set yet. Orders first
    /// seen via websocket or reconciliation arrive without one.
    pub fn ensure_internal_id(&mut self) {
        if self.internal_id.is_none() {
            self.internal_id = Some(Uuid::new_v4());
        }
    }

    /// True while the order can still change on the exchange.
    /// `UnknownStatus` counts as active so reconciliation retries it.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal() && !self.status.is_wildcard()
    }

    /// Merges an incoming detail into this one. The exchange is the source
    /// of truth for status and fill fields; empty or zero incoming fields
    /// leave the existing values untouched. A terminal status is never
    /// overwritten by a non-terminal one arriving late.
    pub fn update_from(&mut self, other: &OrderDetail) {
        let mut updated = false;

        if other.price > Decimal::ZERO && other.price != self.price {
            self.price = other.price;
            updated = true;
        }
        if other.amount > Decimal::ZERO && other.amount != self.amount {
            self.amount = other.amount;
            updated = true;
        }
        if other.executed_amount > Decimal::ZERO
            && other.executed_amount != self.executed_amount
        {
            self.executed_amount = other.executed_amount;
            updated = true;
        }
        if other.fee > Decimal::ZERO && other.fee != self.fee {
            self.fee = other.fee;
            updated = true;
        }
        if !other.pair.is_empty() && other.pair != self.pair {
            self.pair = other.pair.clone();
            updated = true;
        }
        if !other.order_type.is_wildcard() && other.order_type != self.order_type {
            self.order_type = other.order_type;
            updated = true;
        }
        if !other.side.is_wildcard() && other.side != self.side {
            self.side = other.side;
            updated = true;
        }
        if self.post_only != other.post_only {
            self.post_only = other.post_only;
            updated = true;
        }
        if self.immediate_or_cancel != other.immediate_or_cancel {
            self.immediate_or_cancel = other.immediate_or_cancel;
            updated = true;
        }
        if !other.client_order_id.is_empty() && other.client_order_id != self.client_order_id {
            self.client_order_id = other.client_order_id.clone();
            updated = true;
        }
        if other.status != self.status
            && !other.status.is_wildcard()
            && other.status != OrderStatus::UnknownStatus
            && !(self.status.is_terminal() && !other.status.is_terminal())
        {
            self.status = other.status;
            updated = true;
        }

        if updated {
            self.rederive_remaining();
            if other.last_updated > self.last_updated {
                self.last_updated = other.last_updated;
            } else {
                self.last_updated = Utc::now();
            }
        }

        // Back-fill identity fields that only one side may know about.
        if self.exchange.is_empty() {
            self.exchange = other.exchange.clone();
        }
        if self.order_id.is_empty() {
            self.order_id = other.order_id.clone();
        }
        if self.internal_id.is_none() {
            self.internal_id = other.internal_id;
        }
    }

    /// Applies the exchange's response to a modify request: the order may
    /// receive a new exchange ID as well as a new price and amount.
    pub fn apply_modify(&mut self, res: &super::ModifyResponse) {
        if !res.order_id.is_empty() && res.order_id != self.order_id {
            self.order_id = res.order_id.clone();
        }
        if res.price > Decimal::ZERO {
            self.price = res.price;
        }
        if res.amount > Decimal::ZERO {
            self.amount = res.amount;
        }
        self.rederive_remaining();
        self.last_updated = Utc::now();
    }

    /// Re-derives `remaining_amount` from `amount` and `executed_amount`
    /// rather than trusting partial updates.
    pub fn rederive_remaining(&mut self) {
        self.remaining_amount = (self.amount - self.executed_amount).max(Decimal::ZERO);
    }

    /// Constructs a cancel request addressing this order.
    pub fn derive_cancel(&self) -> super::CancelRequest {
        super::CancelRequest {
            exchange: self.exchange.clone(),
            order_id: self.order_id.clone(),
            client_order_id: self.client_order_id.clone(),
            pair: self.pair.clone(),
            asset_type: self.asset_type,
            side: self.side,
            order_type: self.order_type,
        }
    }

    /// Returns true if this detail matches the filter; empty filter
    /// elements are ignored.
    pub fn matches_filter(&self, f: &super::OrderFilter) -> bool {
        if let Some(exchange) = &f.exchange {
            if !self.exchange.eq_ignore_ascii_case(exchange) {
                return false;
            }
        }
        if let Some(pair) = &f.pair {
            if self.pair != *pair {
                return false;
            }
        }
        if let Some(asset) = f.asset_type {
            if self.asset_type != asset {
                return false;
            }
        }
        if let Some(side) = f.side {
            if !side.is_wildcard() && self.side != side {
                return false;
            }
        }
        if let Some(order_type) = f.order_type {
            if !order_type.is_wildcard() && self.order_type != order_type {
                return false;
            }
        }
        if let Some(status) = f.status {
            if !status.is_wildcard() && self.status != status {
                return false;
            }
        }
        if let Some(order_id) = &f.order_id {
            if self.order_id != *order_id {
                return false;
            }
        }
        if let Some(internal_id) = f.internal_id {
            if self.internal_id != Some(internal_id) {
                return false;
            }
        }
        if let Some(start) = f.start_time {
            if self.created_at < start {
                return false;
            }
        }
        if let Some(end) = f.end_time {
            if self.created_at > end {
                return false;
            }
        }
        true
    }
}
