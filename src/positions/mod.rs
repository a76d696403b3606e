//! Futures position tracking derived from order flow.
//!
//! The order manager forwards every futures order it stores to a
//! `PositionTracker`; the in-memory `PositionController` here turns that
//! flow into open-position state per (exchange, asset, pair).

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::Signed;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{AssetType, OrderDetail, OrderSide, Pair};

/// Position tracking errors.
#[derive(Debug, Error)]
pub enum PositionError {
    /// Order asset type does not feed position tracking.
    #[error("asset type {0} is not a futures asset")]
    NotFutures(AssetType),

    /// The tracked position has already closed. Callers must not treat
    /// this as a hard failure; a late fill report on a flat position is
    /// expected during reconciliation.
    #[error("position is closed")]
    PositionClosed,

    /// No position exists for the given exchange, asset and pair.
    #[error("no open position for {exchange} {pair}")]
    NoPosition { exchange: String, pair: Pair },
}

/// Snapshot of one tracked position.
#[derive(Debug, Clone)]
pub struct PositionStats {
    pub exchange: String,
    pub asset_type: AssetType,
    pub pair: Pair,
    /// Net exposure in base units, positive for long.
    pub exposure: Decimal,
    pub average_entry_price: Decimal,
    pub realised_pnl: Decimal,
    pub unrealised_pnl: Decimal,
    pub open: bool,
    pub opened_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// PositionTracker is the capability the order manager consumes for
/// futures-asset orders.
#[async_trait]
pub trait PositionTracker: Send + Sync {
    /// Tracks a new or updated futures order. A `PositionClosed` return
    /// is informational, not a failure.
    async fn track_new_order(&self, order: &OrderDetail) -> Result<(), PositionError>;

    /// Returns positions matching the given exchange, asset and pair.
    async fn positions_for_exchange(
        &self,
        exchange: &str,
        asset: AssetType,
        pair: &Pair,
    ) -> Result<Vec<PositionStats>, PositionError>;

    /// Drops tracked positions for the given exchange, asset and pair.
    async fn clear_positions(
        &self,
        exchange: &str,
        asset: AssetType,
        pair: &Pair,
    ) -> Result<(), PositionError>;

    /// Recomputes the unrealised PNL of an open position from the latest
    /// traded price and returns it.
    async fn update_unrealised_pnl(
        &self,
        exchange: &str,
        asset: AssetType,
        pair: &Pair,
        last_price: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<Decimal, PositionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PositionKey {
    exchange: String,
    asset_type: AssetType,
    pair: Pair,
}

impl PositionKey {
    fn new(exchange: &str, asset: AssetType, pair: &Pair) -> Self {
        Self {
            exchange: exchange.to_lowercase(),
            asset_type: asset,
            pair: pair.clone(),
        }
    }
}

#[derive(Debug)]
struct Position {
    exposure: Decimal,
    average_entry_price: Decimal,
    realised_pnl: Decimal,
    unrealised_pnl: Decimal,
    open: bool,
    opened_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    /// Executed amount already attributed per order ID, so repeated
    /// reports of the same order only contribute their increment.
    recorded_fills: HashMap<String, Decimal>,
}

impl Position {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            exposure: Decimal::ZERO,
            average_entry_price: Decimal::ZERO,
            realised_pnl: Decimal::ZERO,
            unrealised_pnl: Decimal::ZERO,
            open: true,
            opened_at: now,
            last_updated: now,
            recorded_fills: HashMap::new(),
        }
    }

    /// Applies the unattributed executed amount of an order. Returns the
    /// increment that was applied.
    fn apply(&mut self, order: &OrderDetail) -> Decimal {
        let fill_id = if order.order_id.is_empty() {
            order
                .internal_id
                .map(|id| id.to_string())
                .unwrap_or_default()
        } else {
            order.order_id.clone()
        };
        let recorded = self
            .recorded_fills
            .entry(fill_id)
            .or_insert(Decimal::ZERO);
        let increment = order.executed_amount - *recorded;
        if increment <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        *recorded = order.executed_amount;

        let signed = match order.side {
            OrderSide::Sell => -increment,
            _ => increment,
        };

        if self.exposure.is_zero() || self.exposure.signum() == signed.signum() {
            // Increasing exposure moves the average entry price.
            let total = self.exposure.abs() + increment;
            if !total.is_zero() {
                self.average_entry_price = (self.average_entry_price * self.exposure.abs()
                    + order.price * increment)
                    / total;
            }
        } else {
            // Reducing exposure realises PNL on the closed quantity.
            let closed = increment.min(self.exposure.abs());
            let direction = self.exposure.signum();
            self.realised_pnl +=
                (order.price - self.average_entry_price) * closed * direction;
        }

        self.exposure += signed;
        self.last_updated = Utc::now();
        if self.exposure.is_zero() {
            self.open = false;
            self.unrealised_pnl = Decimal::ZERO;
        }
        signed
    }
}

/// In-memory position controller keyed by (exchange, asset, pair).
pub struct PositionController {
    positions: RwLock<HashMap<PositionKey, Position>>,
}

impl PositionController {
    pub fn new() -> Self {
        Self {
            positions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for PositionController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PositionTracker for PositionController {
    async fn track_new_order(&self, order: &OrderDetail) -> Result<(), PositionError> {
        if !order.asset_type.is_futures() {
            return Err(PositionError::NotFutures(order.asset_type));
        }

        let key = PositionKey::new(&order.exchange, order.asset_type, &order.pair);
        let mut positions = self.positions.write().await;
        let position = positions.entry(key).or_insert_with(|| Position::new(Utc::now()));

        if !position.open {
            if position.recorded_fills.contains_key(&order.order_id) {
                return Err(PositionError::PositionClosed);
            }
            // A fresh order on a flat market opens a new position.
            *position = Position::new(Utc::now());
        }

        let applied = position.apply(order);
        if !applied.is_zero() {
            debug!(
                exchange = %order.exchange,
                pair = %order.pair,
                applied = %applied,
                exposure = %position.exposure,
                "Position updated from order flow"
            );
        }
        Ok(())
    }

    async fn positions_for_exchange(
        &self,
        exchange: &str,
        asset: AssetType,
        pair: &Pair,
    ) -> Result<Vec<PositionStats>, PositionError> {
        if !asset.is_futures() {
            return Err(PositionError::NotFutures(asset));
        }
        let key = PositionKey::new(exchange, asset, pair);
        let positions = self.positions.read().await;
        Ok(positions
            .get(&key)
            .map(|p| PositionStats {
                exchange: key.exchange.clone(),
                asset_type: asset,
                pair: pair.clone(),
                exposure: p.exposure,
                average_entry_price: p.average_entry_price,
                realised_pnl: p.realised_pnl,
                unrealised_pnl: p.unrealised_pnl,
                open: p.open,
                opened_at: p.opened_at,
                last_updated: p.last_updated,
            })
            .into_iter()
            .collect())
    }

    async fn clear_positions(
        &self,
        exchange: &str,
        asset: AssetType,
        pair: &Pair,
    ) -> Result<(), PositionError> {
        if !asset.is_futures() {
            return Err(PositionError::NotFutures(asset));
        }
        let key = PositionKey::new(exchange, asset, pair);
        let mut positions = self.positions.write().await;
        positions.remove(&key);
        Ok(())
    }

    async fn update_unrealised_pnl(
        &self,
        exchange: &str,
        asset: AssetType,
        pair: &Pair,
        last_price: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<Decimal, PositionError> {
        if !asset.is_futures() {
            return Err(PositionError::NotFutures(asset));
        }
        let key = PositionKey::new(exchange, asset, pair);
        let mut positions = self.positions.write().await;
        let position = positions
            .get_mut(&key)
            .filter(|p| p.open)
            .ok_or_else(|| PositionError::NoPosition {
                exchange: exchange.to_string(),
                pair: pair.clone(),
            })?;

        position.unrealised_pnl =
            (last_price - position.average_entry_price) * position.exposure;
        position.last_updated = updated_at;
        Ok(position.unrealised_pnl)
    }
}
