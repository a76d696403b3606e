//! Order manager: owns the order store, fronts every order operation and
//! runs the periodic reconciliation loop against exchange state.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::OrdersConfig;
use crate::domain::{
    CancelRequest, ModifyRequest, OrderDetail, OrderFilter, OrderSide, OrderStatus, OrderType,
    OrdersRequest, Pair, SubmitRequest, SubmitResponse,
};
use crate::domain::AssetType;
use crate::exchanges::{ExchangeAdapter, ExchangeRegistry};
use crate::notification::{Event, Notifier};
use crate::positions::{PositionStats, PositionTracker};

use super::{OrderError, OrderStore, UpsertResponse};

const DEFAULT_ACTIVITY_INTERVAL: Duration = Duration::from_secs(10);

/// Lifecycle of the manager. `Starting` exists so concurrent start calls
/// cannot both win the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Stopped,
    Starting,
    Started,
}

enum FetchOutcome {
    Updated(OrderDetail),
    Unreachable { exchange: String, order_id: String },
}

/// Result of a modify call. `applied_locally` is false when the exchange
/// accepted the amendment but the order was no longer in the store.
#[derive(Debug, Clone)]
pub struct ModifyOutcome {
    /// Effective order ID after the amendment; exchanges may assign a
    /// replacement ID.
    pub order_id: String,
    pub applied_locally: bool,
}

pub struct OrderManager {
    store: OrderStore,
    registry: Arc<ExchangeRegistry>,
    positions: Arc<dyn PositionTracker>,
    notifier: Arc<dyn Notifier>,
    config: OrdersConfig,
    state: Mutex<Lifecycle>,
    reconciling: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl OrderManager {
    pub fn new(
        registry: Arc<ExchangeRegistry>,
        positions: Arc<dyn PositionTracker>,
        notifier: Arc<dyn Notifier>,
        config: OrdersConfig,
    ) -> Self {
        let store = OrderStore::new(
            Arc::clone(&registry),
            Arc::clone(&positions),
            config.track_futures_positions,
        );
        Self {
            store,
            registry,
            positions,
            notifier,
            config,
            state: Mutex::new(Lifecycle::Stopped),
            reconciling: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    // ==================== Lifecycle ====================

    /// Starts the manager and its reconciliation loop.
    pub fn start(self: &Arc<Self>) -> Result<(), OrderError> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != Lifecycle::Stopped {
                return Err(OrderError::AlreadyStarted);
            }
            *state = Lifecycle::Starting;
        }

        let (tx, rx) = watch::channel(false);
        *self.shutdown.lock().unwrap() = Some(tx);

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            manager.run(rx).await;
        });
        *self.worker.lock().unwrap() = Some(handle);

        *self.state.lock().unwrap() = Lifecycle::Started;
        info!("Order manager started");
        self.notifier
            .send_async(Event::startup("Order manager started"));
        Ok(())
    }

    /// Stops the manager, optionally cancelling every active order first.
    pub async fn stop(&self) -> Result<(), OrderError> {
        if !self.is_started() {
            return Err(OrderError::NotStarted);
        }

        if self.config.cancel_orders_on_shutdown {
            let cancelled = self.cancel_all_orders().await;
            info!(cancelled, "Cancelled active orders on shutdown");
        }

        *self.state.lock().unwrap() = Lifecycle::Stopped;

        let sender = self.shutdown.lock().unwrap().take();
        if let Some(sender) = sender {
            let _ = sender.send(true);
        }
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        info!("Order manager stopped");
        self.notifier
            .send_async(Event::shutdown("Order manager stopped"));
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        *self.state.lock().unwrap() == Lifecycle::Started
    }

    fn ensure_started(&self) -> Result<(), OrderError> {
        if self.is_started() {
            Ok(())
        } else {
            Err(OrderError::NotStarted)
        }
    }

    async fn adapter(&self, exchange: &str) -> Result<Arc<dyn ExchangeAdapter>, OrderError> {
        if exchange.is_empty() {
            return Err(OrderError::EmptyExchangeName);
        }
        self.registry
            .get(exchange)
            .await
            .ok_or_else(|| OrderError::ExchangeNotFound(exchange.to_string()))
    }

    // ==================== Submit ====================

    /// Validates and submits a new order, then records the result.
    pub async fn submit(&self, req: &SubmitRequest) -> Result<OrderDetail, OrderError> {
        self.ensure_started()?;
        let adapter = self.validate_submit(req).await?;

        let response = match adapter.submit_order(req).await {
            Ok(response) => response,
            Err(e) => {
                let err = OrderError::exchange(&req.exchange, e);
                self.notifier.send_async(Event::error(format!(
                    "Unable to submit order on {}: {}",
                    req.exchange, err
                )));
                return Err(err);
            }
        };

        self.process_submitted(req, response).await
    }

    /// Records an order as if the exchange had accepted it, without
    /// touching the adapter. Used by paper trading.
    pub async fn submit_fake_order(
        &self,
        req: &SubmitRequest,
        response: SubmitResponse,
    ) -> Result<OrderDetail, OrderError> {
        self.ensure_started()?;
        self.validate_submit(req).await?;
        self.process_submitted(req, response).await
    }

    /// Runs request validation and configuration gates, returning the
    /// adapter to submit through.
    async fn validate_submit(
        &self,
        req: &SubmitRequest,
    ) -> Result<Arc<dyn ExchangeAdapter>, OrderError> {
        req.validate()?;

        if !self.config.allowed_exchanges.is_empty()
            && !self
                .config
                .allowed_exchanges
                .iter()
                .any(|e| e.eq_ignore_ascii_case(&req.exchange))
        {
            return Err(OrderError::ExchangeNotAllowed);
        }
        if !self.config.allowed_pairs.is_empty()
            && !self.config.allowed_pairs.contains(&req.pair)
        {
            return Err(OrderError::PairNotAllowed);
        }
        if !self.config.allow_market_orders && req.order_type == OrderType::Market {
            return Err(OrderError::MarketOrdersDisallowed);
        }
        if let Some(limit) = self.config.limit_amount {
            if req.amount > limit {
                return Err(OrderError::AmountOverLimit {
                    amount: req.amount,
                    limit,
                });
            }
        }

        let adapter = self.adapter(&req.exchange).await?;
        if !adapter.asset_types(true).contains(&req.asset_type) {
            return Err(OrderError::AssetNotSupported);
        }
        adapter
            .can_trade_pair(&req.pair, req.asset_type)
            .map_err(|e| OrderError::exchange(&req.exchange, e))?;
        if self.config.enforce_limits {
            adapter
                .check_order_execution_limits(
                    req.asset_type,
                    &req.pair,
                    req.price,
                    req.amount,
                    req.order_type,
                )
                .map_err(|e| OrderError::exchange(&req.exchange, e))?;
        }
        Ok(adapter)
    }

    async fn process_submitted(
        &self,
        req: &SubmitRequest,
        response: SubmitResponse,
    ) -> Result<OrderDetail, OrderError> {
        let internal_id = Uuid::new_v4();
        let detail = response.derive_detail(req, internal_id);
        // A duplicate exchange-assigned ID is rejected, never merged into
        // the stored order.
        self.store.add(detail.clone()).await?;

        self.notifier.send_async(Event::order(format!(
            "Exchange {} {} {}: submitted order ID={} internal ID={} side={} type={} price={} amount={}",
            detail.exchange,
            detail.asset_type,
            detail.pair,
            detail.order_id,
            internal_id,
            detail.side,
            detail.order_type,
            detail.price,
            detail.amount,
        )));
        Ok(detail)
    }

    // ==================== Modify ====================

    /// Amends the price and/or amount of a working order. Identity fields
    /// the caller left unset are back-filled from the stored order before
    /// the exchange is asked.
    pub async fn modify(&self, req: &ModifyRequest) -> Result<ModifyOutcome, OrderError> {
        let result = self.modify_inner(req).await;
        if let Err(ref e) = result {
            self.notifier.send_async(Event::error(format!(
                "Unable to modify order {} on {}: {}",
                req.order_id, req.exchange, e
            )));
        }
        result
    }

    async fn modify_inner(&self, req: &ModifyRequest) -> Result<ModifyOutcome, OrderError> {
        self.ensure_started()?;
        if req.order_id.is_empty() {
            return Err(OrderError::EmptyOrderId);
        }
        if req.price <= Decimal::ZERO && req.amount <= Decimal::ZERO {
            return Err(OrderError::NothingToModify);
        }
        let adapter = self.adapter(&req.exchange).await?;

        let stored = self
            .store
            .get_by_exchange_and_id(&req.exchange, &req.order_id)
            .await?;

        // Exchanges commonly require the full order context, not just the
        // amended fields.
        let mut filled = req.clone();
        if filled.pair.is_none() {
            filled.pair = Some(stored.pair.clone());
        }
        if filled.side.is_none() {
            filled.side = Some(stored.side);
        }
        if filled.post_only.is_none() {
            filled.post_only = Some(stored.post_only);
        }
        if filled.immediate_or_cancel.is_none() {
            filled.immediate_or_cancel = Some(stored.immediate_or_cancel);
        }
        if filled.price <= Decimal::ZERO {
            filled.price = stored.price;
        }
        if filled.amount <= Decimal::ZERO {
            filled.amount = stored.amount;
        }

        let mut response = adapter
            .modify_order(&filled)
            .await
            .map_err(|e| OrderError::exchange(&req.exchange, e))?;
        if response.order_id.is_empty() {
            response.order_id = req.order_id.clone();
        }

        let applied_locally = match self.store.modify_existing(&req.order_id, &response).await {
            Ok(_) => true,
            Err(OrderError::NotFound { .. }) => {
                warn!(
                    exchange = %req.exchange,
                    order_id = %req.order_id,
                    "Exchange accepted amendment but order vanished from the store"
                );
                false
            }
            Err(e) => return Err(e),
        };

        self.notifier.send_async(Event::order(format!(
            "Exchange {}: order ID={} modified to price={} amount={} (now ID={})",
            req.exchange, req.order_id, filled.price, filled.amount, response.order_id,
        )));
        Ok(ModifyOutcome {
            order_id: response.order_id,
            applied_locally,
        })
    }

    // ==================== Cancel ====================

    /// Cancels a working order on its exchange and marks the stored copy
    /// cancelled. Every failure raises an error event.
    pub async fn cancel(&self, req: &CancelRequest) -> Result<(), OrderError> {
        let result = self.cancel_inner(req).await;
        if let Err(ref e) = result {
            self.notifier.send_async(Event::error(format!(
                "Unable to cancel order {} on {}: {}",
                req.order_id, req.exchange, e
            )));
        }
        result
    }

    async fn cancel_inner(&self, req: &CancelRequest) -> Result<(), OrderError> {
        self.ensure_started()?;
        if req.order_id.is_empty() {
            return Err(OrderError::EmptyOrderId);
        }
        let adapter = self.adapter(&req.exchange).await?;
        if !adapter.asset_types(true).contains(&req.asset_type) {
            return Err(OrderError::AssetNotSupported);
        }

        // Only orders we already track may be cancelled; an unknown ID
        // fails before the adapter is asked.
        self.store
            .get_by_exchange_and_id(&req.exchange, &req.order_id)
            .await?;

        adapter
            .cancel_order(req)
            .await
            .map_err(|e| OrderError::exchange(&req.exchange, e))?;

        match self
            .store
            .set_status(&req.exchange, &req.order_id, OrderStatus::Cancelled)
            .await
        {
            Ok(_) => {}
            Err(OrderError::NotFound { .. }) => {
                debug!(
                    exchange = %req.exchange,
                    order_id = %req.order_id,
                    "Cancelled order was not in the store"
                );
            }
            Err(e) => return Err(e),
        }

        self.notifier.send_async(Event::order(format!(
            "Exchange {}: order ID={} cancelled",
            req.exchange, req.order_id,
        )));
        Ok(())
    }

    /// Cancels every active stored order, returning how many cancels the
    /// exchanges accepted.
    pub async fn cancel_all_orders(&self) -> usize {
        let active = self.store.get_active(&OrderFilter::default()).await;
        let mut cancelled = 0;
        for order in active {
            let req = order.derive_cancel();
            match self.cancel(&req).await {
                Ok(()) => cancelled += 1,
                Err(e) => {
                    error!(
                        exchange = %order.exchange,
                        order_id = %order.order_id,
                        error = %e,
                        "Failed to cancel order"
                    );
                }
            }
        }
        cancelled
    }

    // ==================== Queries and store passthroughs ====================

    /// Fetches the live state of one order and folds it into the store.
    pub async fn get_order_info(
        &self,
        exchange: &str,
        order_id: &str,
        pair: &Pair,
        asset: AssetType,
    ) -> Result<OrderDetail, OrderError> {
        self.ensure_started()?;
        if order_id.is_empty() {
            return Err(OrderError::EmptyOrderId);
        }
        let adapter = self.adapter(exchange).await?;

        let mut fetched = adapter
            .get_order_info(order_id, pair, asset)
            .await
            .map_err(|e| OrderError::exchange(exchange, e))?;
        fetched.exchange = adapter.name().to_string();

        let UpsertResponse { order, .. } = self.store.upsert(&fetched).await?;
        Ok(order)
    }

    /// True when the order is already stored. Returns false when the
    /// manager is not started.
    pub async fn exists(&self, order: &OrderDetail) -> bool {
        self.is_started() && self.store.exists(order).await
    }

    /// Adds an externally-observed order to the store.
    pub async fn add_order(&self, order: OrderDetail) -> Result<(), OrderError> {
        self.ensure_started()?;
        self.store.add(order).await
    }

    pub async fn get_by_exchange_and_id(
        &self,
        exchange: &str,
        order_id: &str,
    ) -> Result<OrderDetail, OrderError> {
        self.ensure_started()?;
        self.store.get_by_exchange_and_id(exchange, order_id).await
    }

    pub async fn get_by_internal_order_id(
        &self,
        internal_id: Uuid,
    ) -> Result<Option<OrderDetail>, OrderError> {
        self.ensure_started()?;
        Ok(self.store.get_by_internal_order_id(internal_id).await)
    }

    /// Merges fresh state into an already-stored order.
    pub async fn update_existing_order(
        &self,
        update: &OrderDetail,
    ) -> Result<OrderDetail, OrderError> {
        self.ensure_started()?;
        self.store.update_existing(update).await
    }

    /// Inserts or merges an order and raises an order event describing
    /// which of the two happened.
    pub async fn upsert_order(&self, order: &OrderDetail) -> Result<UpsertResponse, OrderError> {
        self.ensure_started()?;
        let response = self.store.upsert(order).await?;

        let verb = if response.is_new { "added" } else { "updated" };
        self.notifier.send_async(Event::order(format!(
            "Exchange {} {} {}: {} order ID={} side={} type={} status={}",
            response.order.exchange,
            response.order.asset_type,
            response.order.pair,
            verb,
            response.order.order_id,
            response.order.side,
            response.order.order_type,
            response.order.status,
        )));
        Ok(response)
    }

    /// Copies of every stored order whose status matches. `AnyStatus` and
    /// `UnknownStatus` both mean "everything".
    pub async fn orders_snapshot(&self, status: OrderStatus) -> Result<Vec<OrderDetail>, OrderError> {
        self.ensure_started()?;
        let all = self.store.get_filtered(&OrderFilter::default()).await;
        if status.is_wildcard() || status == OrderStatus::UnknownStatus {
            return Ok(all);
        }
        Ok(all.into_iter().filter(|o| o.status == status).collect())
    }

    pub async fn orders_filtered(
        &self,
        filter: &OrderFilter,
    ) -> Result<Vec<OrderDetail>, OrderError> {
        self.ensure_started()?;
        Ok(self.store.get_filtered(filter).await)
    }

    pub async fn orders_active(
        &self,
        filter: &OrderFilter,
    ) -> Result<Vec<OrderDetail>, OrderError> {
        self.ensure_started()?;
        Ok(self.store.get_active(filter).await)
    }

    // ==================== Futures position passthroughs ====================

    fn ensure_tracking(&self) -> Result<(), OrderError> {
        self.ensure_started()?;
        if !self.config.track_futures_positions {
            return Err(OrderError::PositionTrackingDisabled);
        }
        Ok(())
    }

    pub async fn futures_positions(
        &self,
        exchange: &str,
        asset: AssetType,
        pair: &Pair,
    ) -> Result<Vec<PositionStats>, OrderError> {
        self.ensure_tracking()?;
        Ok(self.positions.positions_for_exchange(exchange, asset, pair).await?)
    }

    pub async fn clear_futures_tracking(
        &self,
        exchange: &str,
        asset: AssetType,
        pair: &Pair,
    ) -> Result<(), OrderError> {
        self.ensure_tracking()?;
        Ok(self.positions.clear_positions(exchange, asset, pair).await?)
    }

    pub async fn update_open_position_unrealised_pnl(
        &self,
        exchange: &str,
        asset: AssetType,
        pair: &Pair,
        last_price: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<Decimal, OrderError> {
        self.ensure_tracking()?;
        Ok(self
            .positions
            .update_unrealised_pnl(exchange, asset, pair, last_price, updated_at)
            .await?)
    }

    // ==================== Reconciliation ====================

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = if self.config.activity_interval.is_zero() {
            warn!(
                default = ?DEFAULT_ACTIVITY_INTERVAL,
                "Activity interval unset, falling back to default"
            );
            DEFAULT_ACTIVITY_INTERVAL
        } else {
            self.config.activity_interval
        };
        // First pass happens one full period after start.
        let mut interval =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let manager = Arc::clone(&self);
                    tokio::spawn(async move {
                        manager.try_process_orders().await;
                    });
                }
                _ = shutdown.changed() => {
                    debug!("Reconciliation loop shutting down");
                    return;
                }
            }
        }
    }

    /// Runs one reconciliation pass unless one is already in flight.
    /// Returns whether the pass ran.
    pub async fn try_process_orders(self: &Arc<Self>) -> bool {
        if self.reconciling.swap(true, Ordering::SeqCst) {
            debug!("Previous reconciliation pass still running, skipping");
            return false;
        }
        self.process_orders().await;
        self.reconciling.store(false, Ordering::SeqCst);
        true
    }

    /// Every exchange/asset combination is reconciled concurrently and
    /// the pass completes when the last one finishes.
    async fn process_orders(self: &Arc<Self>) {
        let mut passes = JoinSet::new();
        for adapter in self.registry.get_all().await {
            if !adapter.supports_rest_auth() {
                debug!(
                    exchange = adapter.name(),
                    "Skipping exchange without authenticated REST support"
                );
                continue;
            }
            for asset in adapter.asset_types(true) {
                let manager = Arc::clone(self);
                let adapter = Arc::clone(&adapter);
                passes.spawn(async move {
                    manager.reconcile_exchange_asset(&adapter, asset).await;
                });
            }
        }
        while let Some(result) = passes.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Reconciliation task panicked");
            }
        }
    }

    async fn reconcile_exchange_asset(&self, adapter: &Arc<dyn ExchangeAdapter>, asset: AssetType) {
        let exchange = adapter.name().to_string();
        let pairs = match adapter.enabled_pairs(asset) {
            Ok(pairs) => pairs,
            Err(e) => {
                error!(
                    exchange = %exchange,
                    asset = %asset,
                    error = %e,
                    "Unable to get enabled pairs"
                );
                return;
            }
        };
        if pairs.is_empty() {
            return;
        }

        let request = OrdersRequest {
            side: OrderSide::AnySide,
            order_type: OrderType::AnyType,
            pairs,
            asset_type: asset,
        };
        let reported = match adapter.get_active_orders(&request).await {
            Ok(orders) => orders,
            Err(e) => {
                error!(
                    exchange = %exchange,
                    asset = %asset,
                    error = %e,
                    "Unable to get active orders"
                );
                return;
            }
        };

        // Orders we believe are working on this exchange/asset.
        let expected = self
            .store
            .get_active(&OrderFilter {
                exchange: Some(exchange.clone()),
                asset_type: Some(asset),
                ..OrderFilter::default()
            })
            .await;
        let mut unreported: HashSet<String> =
            expected.iter().map(|o| o.order_id.clone()).collect();

        for mut order in reported {
            order.exchange = exchange.clone();
            unreported.remove(&order.order_id);
            if let Err(e) = self.store.upsert(&order).await {
                error!(
                    exchange = %exchange,
                    order_id = %order.order_id,
                    error = %e,
                    "Unable to upsert reconciled order"
                );
            }
        }

        // Orders the exchange stopped reporting: once they have been
        // quiet long enough, ask about each one individually.
        let stale_age =
            chrono::Duration::from_std(self.config.stale_order_age).unwrap_or_else(|_| {
                chrono::Duration::seconds(60)
            });
        let now = Utc::now();
        let mut fetches = JoinSet::new();
        for order in expected {
            if !unreported.contains(&order.order_id) {
                continue;
            }
            if now - order.last_updated < stale_age {
                continue;
            }
            let adapter = Arc::clone(adapter);
            fetches.spawn(async move { Self::fetch_order_update(adapter, order).await });
        }
        while let Some(result) = fetches.join_next().await {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Order re-fetch task panicked");
                    continue;
                }
            };
            match outcome {
                FetchOutcome::Updated(update) => {
                    if let Err(e) = self.store.update_existing(&update).await {
                        error!(
                            exchange = %update.exchange,
                            order_id = %update.order_id,
                            error = %e,
                            "Unable to apply re-fetched order state"
                        );
                    }
                }
                FetchOutcome::Unreachable { exchange, order_id } => {
                    if let Err(e) = self
                        .store
                        .set_status(&exchange, &order_id, OrderStatus::UnknownStatus)
                        .await
                    {
                        error!(
                            exchange = %exchange,
                            order_id = %order_id,
                            error = %e,
                            "Unable to mark unreachable order"
                        );
                    }
                }
            }
        }
    }

    /// Re-fetches one order. When the exchange cannot answer, the order
    /// is marked `UnknownStatus` so it stays on the active set and gets
    /// retried on the next pass.
    async fn fetch_order_update(
        adapter: Arc<dyn ExchangeAdapter>,
        order: OrderDetail,
    ) -> FetchOutcome {
        match adapter
            .get_order_info(&order.order_id, &order.pair, order.asset_type)
            .await
        {
            Ok(mut fetched) => {
                fetched.exchange = adapter.name().to_string();
                fetched.last_updated = Utc::now();
                FetchOutcome::Updated(fetched)
            }
            Err(e) => {
                warn!(
                    exchange = adapter.name(),
                    order_id = %order.order_id,
                    error = %e,
                    "Unable to re-fetch order, status unknown"
                );
                FetchOutcome::Unreachable {
                    exchange: order.exchange,
                    order_id: order.order_id,
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
