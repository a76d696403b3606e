//! In-memory order store keyed by lower-cased exchange name.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{ModifyResponse, OrderDetail, OrderFilter, OrderStatus};
use crate::exchanges::ExchangeRegistry;
use crate::positions::{PositionError, PositionTracker};

use super::error::OrderError;

/// Outcome of an upsert: the stored copy and whether it was newly added.
#[derive(Debug, Clone)]
pub struct UpsertResponse {
    pub order: OrderDetail,
    pub is_new: bool,
}

/// OrderStore owns every order detail the manager knows about. All
/// accessors return copies; the stored entities never leave the lock.
pub struct OrderStore {
    orders: RwLock<HashMap<String, Vec<OrderDetail>>>,
    registry: Arc<ExchangeRegistry>,
    positions: Arc<dyn PositionTracker>,
    track_futures: bool,
}

impl OrderStore {
    pub fn new(
        registry: Arc<ExchangeRegistry>,
        positions: Arc<dyn PositionTracker>,
        track_futures: bool,
    ) -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
            registry,
            positions,
            track_futures,
        }
    }

    fn validate(order: &OrderDetail) -> Result<(), OrderError> {
        if order.exchange.is_empty() {
            return Err(OrderError::EmptyExchangeName);
        }
        if order.order_id.is_empty() {
            return Err(OrderError::EmptyOrderId);
        }
        Ok(())
    }

    /// Ensures the order's exchange is registered. Called before taking
    /// the orders lock so a slow registry never blocks readers.
    async fn check_registered(&self, exchange: &str) -> Result<(), OrderError> {
        if self.registry.get(exchange).await.is_none() {
            return Err(OrderError::ExchangeNotFound(exchange.to_string()));
        }
        Ok(())
    }

    /// Forwards a futures order to the position tracker. A closed
    /// position is expected during reconciliation and only logged.
    async fn track_position(&self, order: &OrderDetail) {
        if !self.track_futures || !order.asset_type.is_futures() {
            return;
        }
        match self.positions.track_new_order(order).await {
            Ok(()) => {}
            Err(PositionError::PositionClosed) => {
                debug!(
                    exchange = %order.exchange,
                    order_id = %order.order_id,
                    "Fill reported against a closed position"
                );
            }
            Err(e) => {
                warn!(
                    exchange = %order.exchange,
                    order_id = %order.order_id,
                    error = %e,
                    "Failed to track futures position"
                );
            }
        }
    }

    /// True when an order with the same exchange and order ID is stored.
    pub async fn exists(&self, order: &OrderDetail) -> bool {
        let orders = self.orders.read().await;
        orders
            .get(&order.exchange.to_lowercase())
            .is_some_and(|bucket| bucket.iter().any(|o| o.order_id == order.order_id))
    }

    /// Adds a new order. Fails when an order with the same exchange and
    /// order ID is already stored.
    pub async fn add(&self, mut order: OrderDetail) -> Result<(), OrderError> {
        Self::validate(&order)?;
        self.check_registered(&order.exchange).await?;
        order.ensure_internal_id();

        let key = order.exchange.to_lowercase();
        {
            // Check-then-insert must happen under one write lock.
            let mut orders = self.orders.write().await;
            let bucket = orders.entry(key).or_default();
            if bucket.iter().any(|o| o.order_id == order.order_id) {
                return Err(OrderError::AlreadyExists {
                    exchange: order.exchange,
                    order_id: order.order_id,
                });
            }
            bucket.push(order.clone());
        }

        self.track_position(&order).await;
        Ok(())
    }

    pub async fn get_by_exchange_and_id(
        &self,
        exchange: &str,
        order_id: &str,
    ) -> Result<OrderDetail, OrderError> {
        if exchange.is_empty() {
            return Err(OrderError::EmptyExchangeName);
        }
        if order_id.is_empty() {
            return Err(OrderError::EmptyOrderId);
        }
        let orders = self.orders.read().await;
        orders
            .get(&exchange.to_lowercase())
            .and_then(|bucket| bucket.iter().find(|o| o.order_id == order_id))
            .cloned()
            .ok_or_else(|| OrderError::NotFound {
                exchange: exchange.to_string(),
                order_id: order_id.to_string(),
            })
    }

    /// Looks an order up by its internal UUID across every exchange.
    pub async fn get_by_internal_order_id(&self, internal_id: Uuid) -> Option<OrderDetail> {
        let orders = self.orders.read().await;
        orders
            .values()
            .flatten()
            .find(|o| o.internal_id == Some(internal_id))
            .cloned()
    }

    /// Merges fresh exchange state into an already-stored order and
    /// returns the merged copy.
    pub async fn update_existing(&self, update: &OrderDetail) -> Result<OrderDetail, OrderError> {
        Self::validate(update)?;

        let merged = {
            let mut orders = self.orders.write().await;
            let bucket = orders
                .get_mut(&update.exchange.to_lowercase())
                .ok_or_else(|| OrderError::NotFound {
                    exchange: update.exchange.clone(),
                    order_id: update.order_id.clone(),
                })?;
            let stored = bucket
                .iter_mut()
                .find(|o| o.order_id == update.order_id)
                .ok_or_else(|| OrderError::NotFound {
                    exchange: update.exchange.clone(),
                    order_id: update.order_id.clone(),
                })?;
            stored.update_from(update);
            stored.clone()
        };

        self.track_position(&merged).await;
        Ok(merged)
    }

    /// Sets the status of a stored order directly, bypassing the merge
    /// rules. Used for transitions the store itself decides on, like
    /// marking an unreachable order `UnknownStatus` or a cancelled one
    /// `Cancelled`.
    pub async fn set_status(
        &self,
        exchange: &str,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<OrderDetail, OrderError> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&exchange.to_lowercase())
            .and_then(|bucket| bucket.iter_mut().find(|o| o.order_id == order_id))
            .ok_or_else(|| OrderError::NotFound {
                exchange: exchange.to_string(),
                order_id: order_id.to_string(),
            })?;
        stored.status = status;
        stored.last_updated = Utc::now();
        Ok(stored.clone())
    }

    /// Applies an accepted modify response to a stored order and returns
    /// the updated copy. The exchange may have assigned a replacement ID.
    pub async fn modify_existing(
        &self,
        order_id: &str,
        res: &ModifyResponse,
    ) -> Result<OrderDetail, OrderError> {
        let mut orders = self.orders.write().await;
        let bucket = orders
            .get_mut(&res.exchange.to_lowercase())
            .ok_or_else(|| OrderError::NotFound {
                exchange: res.exchange.clone(),
                order_id: order_id.to_string(),
            })?;
        let stored = bucket
            .iter_mut()
            .find(|o| o.order_id == order_id)
            .ok_or_else(|| OrderError::NotFound {
                exchange: res.exchange.clone(),
                order_id: order_id.to_string(),
            })?;
        stored.apply_modify(res);
        stored.last_updated = Utc::now();
        Ok(stored.clone())
    }

    /// Idempotent insert-or-merge keyed on (exchange, order ID). The
    /// reconciliation loop and external callers both feed through here.
    pub async fn upsert(&self, order: &OrderDetail) -> Result<UpsertResponse, OrderError> {
        Self::validate(order)?;
        self.check_registered(&order.exchange).await?;

        let response = {
            let mut orders = self.orders.write().await;
            let bucket = orders.entry(order.exchange.to_lowercase()).or_default();
            match bucket.iter_mut().find(|o| o.order_id == order.order_id) {
                Some(stored) => {
                    stored.update_from(order);
                    UpsertResponse {
                        order: stored.clone(),
                        is_new: false,
                    }
                }
                None => {
                    let mut fresh = order.clone();
                    fresh.ensure_internal_id();
                    bucket.push(fresh.clone());
                    UpsertResponse {
                        order: fresh,
                        is_new: true,
                    }
                }
            }
        };

        self.track_position(&response.order).await;
        Ok(response)
    }

    /// Returns copies of every stored order matching the filter.
    pub async fn get_filtered(&self, filter: &OrderFilter) -> Vec<OrderDetail> {
        let orders = self.orders.read().await;
        orders
            .values()
            .flatten()
            .filter(|o| o.matches_filter(filter))
            .cloned()
            .collect()
    }

    /// Returns copies of the stored orders that are still working.
    pub async fn get_active(&self, filter: &OrderFilter) -> Vec<OrderDetail> {
        let orders = self.orders.read().await;
        orders
            .values()
            .flatten()
            .filter(|o| o.is_active() && o.matches_filter(filter))
            .cloned()
            .collect()
    }

    /// Returns a copy of everything, keyed by lower-cased exchange.
    pub async fn get_all(&self) -> HashMap<String, Vec<OrderDetail>> {
        let orders = self.orders.read().await;
        orders.clone()
    }
}
