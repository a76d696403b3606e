//! Paper-trading exchange adapter.
//!
//! Simulates an exchange in process: orders are accepted, rest on a
//! virtual book and can be amended or cancelled, but nothing ever fills
//! unless a test drives it. Lets the desk run end to end without venue
//! credentials.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::config::ExchangeConfig;
use crate::domain::{
    AssetType, CancelRequest, ModifyRequest, ModifyResponse, OrderDetail, OrderStatus, OrderType,
    OrdersRequest, Pair, SubmitRequest, SubmitResponse,
};

use super::{ExchangeAdapter, ExchangeError, Result};

pub struct PaperExchange {
    name: String,
    asset_types: Vec<AssetType>,
    pairs: Vec<Pair>,
    next_id: AtomicU64,
    book: Mutex<HashMap<String, OrderDetail>>,
}

impl PaperExchange {
    pub fn new(name: impl Into<String>, config: &ExchangeConfig) -> Self {
        Self {
            name: name.into(),
            asset_types: config.asset_types.clone(),
            pairs: config.pairs.clone(),
            next_id: AtomicU64::new(1),
            book: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ExchangeAdapter for PaperExchange {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_rest_auth(&self) -> bool {
        // Everything is in process, nothing needs credentials.
        true
    }

    fn asset_types(&self, _enabled_only: bool) -> Vec<AssetType> {
        self.asset_types.clone()
    }

    fn enabled_pairs(&self, _asset: AssetType) -> Result<Vec<Pair>> {
        Ok(self.pairs.clone())
    }

    fn check_order_execution_limits(
        &self,
        _asset: AssetType,
        _pair: &Pair,
        _price: Decimal,
        amount: Decimal,
        _order_type: OrderType,
    ) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(ExchangeError::ExecutionLimits(
                "amount must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn can_trade_pair(&self, pair: &Pair, _asset: AssetType) -> Result<()> {
        if self.pairs.is_empty() || self.pairs.contains(pair) {
            Ok(())
        } else {
            Err(ExchangeError::PairNotTradable(pair.to_string()))
        }
    }

    async fn submit_order(&self, req: &SubmitRequest) -> Result<SubmitResponse> {
        let id = format!("paper-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let placed_at = Utc::now();

        let mut detail = OrderDetail {
            internal_id: None,
            order_id: id.clone(),
            client_order_id: req.client_order_id.clone(),
            exchange: self.name.clone(),
            pair: req.pair.clone(),
            asset_type: req.asset_type,
            side: req.side,
            order_type: req.order_type,
            status: OrderStatus::New,
            price: req.price,
            amount: req.amount,
            executed_amount: Decimal::ZERO,
            remaining_amount: Decimal::ZERO,
            fee: Decimal::ZERO,
            post_only: req.post_only,
            immediate_or_cancel: req.immediate_or_cancel,
            created_at: placed_at,
            last_updated: placed_at,
        };
        detail.rederive_remaining();

        let mut book = self.book.lock().map_err(poisoned)?;
        book.insert(id.clone(), detail);

        Ok(SubmitResponse {
            order_id: id,
            status: OrderStatus::New,
            executed_amount: Decimal::ZERO,
            fee: Decimal::ZERO,
            placed_at,
        })
    }

    async fn modify_order(&self, req: &ModifyRequest) -> Result<ModifyResponse> {
        let mut book = self.book.lock().map_err(poisoned)?;
        let order = book
            .get_mut(&req.order_id)
            .ok_or_else(|| ExchangeError::OrderNotFound(req.order_id.clone()))?;
        if !order.is_active() {
            return Err(ExchangeError::Api("order is no longer working".to_string()));
        }

        if req.price > Decimal::ZERO {
            order.price = req.price;
        }
        if req.amount > Decimal::ZERO {
            order.amount = req.amount;
        }
        order.rederive_remaining();
        order.last_updated = Utc::now();

        Ok(ModifyResponse {
            exchange: self.name.clone(),
            order_id: order.order_id.clone(),
            price: order.price,
            amount: order.amount,
        })
    }

    async fn cancel_order(&self, req: &CancelRequest) -> Result<()> {
        let mut book = self.book.lock().map_err(poisoned)?;
        let order = book
            .get_mut(&req.order_id)
            .ok_or_else(|| ExchangeError::OrderNotFound(req.order_id.clone()))?;
        order.status = OrderStatus::Cancelled;
        order.last_updated = Utc::now();
        Ok(())
    }

    async fn get_order_info(
        &self,
        order_id: &str,
        _pair: &Pair,
        _asset: AssetType,
    ) -> Result<OrderDetail> {
        let book = self.book.lock().map_err(poisoned)?;
        book.get(order_id)
            .cloned()
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.to_string()))
    }

    async fn get_active_orders(&self, req: &OrdersRequest) -> Result<Vec<OrderDetail>> {
        let book = self.book.lock().map_err(poisoned)?;
        Ok(book
            .values()
            .filter(|o| {
                o.is_active()
                    && o.asset_type == req.asset_type
                    && (req.pairs.is_empty() || req.pairs.contains(&o.pair))
                    && (req.side.is_wildcard() || o.side == req.side)
                    && (req.order_type.is_wildcard() || o.order_type == req.order_type)
            })
            .cloned()
            .collect())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> ExchangeError {
    ExchangeError::Internal("paper book lock poisoned".to_string())
}
