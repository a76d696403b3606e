//! Tests for the order manager.

use super::*;
use crate::exchanges::ExchangeError;
use crate::notification::{EventKind, NotificationError};
use crate::positions::PositionController;
use async_trait::async_trait;
use rust_decimal_macros::dec;
use std::sync::atomic::AtomicUsize;

// ==================== Test doubles ====================

/// Notifier that records every event it is handed.
struct CollectingNotifier {
    events: Mutex<Vec<Event>>,
}

impl CollectingNotifier {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    fn messages_of(&self, kind: EventKind) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.message.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for CollectingNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn send_async(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn is_enabled(&self, _kind: EventKind) -> bool {
        true
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

/// Scriptable exchange adapter. Failure toggles flip individual calls
/// into connection errors; counters record what the manager touched.
struct MockAdapter {
    name: String,
    rest_auth: bool,
    assets: Vec<AssetType>,
    pairs: Vec<Pair>,
    fail_submit: AtomicBool,
    fail_modify: AtomicBool,
    fail_cancel: AtomicBool,
    fail_get_info: AtomicBool,
    limit_breach: AtomicBool,
    pair_untradable: AtomicBool,
    modify_assigns_new_id: AtomicBool,
    submit_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    info_calls: AtomicUsize,
    active_calls: AtomicUsize,
    active_orders: Mutex<Vec<OrderDetail>>,
    info_response: Mutex<Option<OrderDetail>>,
}

impl MockAdapter {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rest_auth: true,
            assets: vec![AssetType::Spot, AssetType::Futures],
            pairs: vec![Pair::new("BTC", "USDT")],
            fail_submit: AtomicBool::new(false),
            fail_modify: AtomicBool::new(false),
            fail_cancel: AtomicBool::new(false),
            fail_get_info: AtomicBool::new(false),
            limit_breach: AtomicBool::new(false),
            pair_untradable: AtomicBool::new(false),
            modify_assigns_new_id: AtomicBool::new(false),
            submit_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            info_calls: AtomicUsize::new(0),
            active_calls: AtomicUsize::new(0),
            active_orders: Mutex::new(Vec::new()),
            info_response: Mutex::new(None),
        }
    }

    fn without_rest_auth(mut self) -> Self {
        self.rest_auth = false;
        self
    }
}

#[async_trait]
impl ExchangeAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_rest_auth(&self) -> bool {
        self.rest_auth
    }

    fn asset_types(&self, _enabled_only: bool) -> Vec<AssetType> {
        self.assets.clone()
    }

    fn enabled_pairs(&self, _asset: AssetType) -> crate::exchanges::Result<Vec<Pair>> {
        Ok(self.pairs.clone())
    }

    fn check_order_execution_limits(
        &self,
        _asset: AssetType,
        _pair: &Pair,
        _price: Decimal,
        _amount: Decimal,
        _order_type: OrderType,
    ) -> crate::exchanges::Result<()> {
        if self.limit_breach.load(Ordering::SeqCst) {
            return Err(ExchangeError::ExecutionLimits(
                "amount below minimum lot size".to_string(),
            ));
        }
        Ok(())
    }

    fn can_trade_pair(&self, pair: &Pair, _asset: AssetType) -> crate::exchanges::Result<()> {
        if self.pair_untradable.load(Ordering::SeqCst) {
            return Err(ExchangeError::PairNotTradable(pair.to_string()));
        }
        Ok(())
    }

    async fn submit_order(
        &self,
        _req: &SubmitRequest,
    ) -> crate::exchanges::Result<SubmitResponse> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(ExchangeError::Connection("submit refused".to_string()));
        }
        Ok(SubmitResponse {
            order_id: format!("mock-{}", n),
            status: OrderStatus::New,
            executed_amount: Decimal::ZERO,
            fee: Decimal::ZERO,
            placed_at: Utc::now(),
        })
    }

    async fn modify_order(
        &self,
        req: &ModifyRequest,
    ) -> crate::exchanges::Result<crate::domain::ModifyResponse> {
        if self.fail_modify.load(Ordering::SeqCst) {
            return Err(ExchangeError::Api("amend rejected".to_string()));
        }
        let order_id = if self.modify_assigns_new_id.load(Ordering::SeqCst) {
            format!("{}-amended", req.order_id)
        } else {
            String::new()
        };
        Ok(crate::domain::ModifyResponse {
            exchange: self.name.clone(),
            order_id,
            price: req.price,
            amount: req.amount,
        })
    }

    async fn cancel_order(&self, _req: &CancelRequest) -> crate::exchanges::Result<()> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(ExchangeError::Api("cancel rejected".to_string()));
        }
        Ok(())
    }

    async fn get_order_info(
        &self,
        order_id: &str,
        pair: &Pair,
        asset: AssetType,
    ) -> crate::exchanges::Result<OrderDetail> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get_info.load(Ordering::SeqCst) {
            return Err(ExchangeError::Connection("info unavailable".to_string()));
        }
        if let Some(order) = self.info_response.lock().unwrap().clone() {
            return Ok(order);
        }
        Ok(detail(&self.name, order_id, pair.clone(), asset))
    }

    async fn get_active_orders(
        &self,
        _req: &OrdersRequest,
    ) -> crate::exchanges::Result<Vec<OrderDetail>> {
        self.active_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.active_orders.lock().unwrap().clone())
    }
}

// ==================== Helpers ====================

fn detail(exchange: &str, order_id: &str, pair: Pair, asset: AssetType) -> OrderDetail {
    OrderDetail {
        internal_id: None,
        order_id: order_id.to_string(),
        client_order_id: String::new(),
        exchange: exchange.to_string(),
        pair,
        asset_type: asset,
        side: OrderSide::Buy,
        order_type: OrderType::Limit,
        status: OrderStatus::Active,
        price: dec!(100),
        amount: dec!(1),
        executed_amount: Decimal::ZERO,
        remaining_amount: dec!(1),
        fee: Decimal::ZERO,
        post_only: false,
        immediate_or_cancel: false,
        created_at: Utc::now(),
        last_updated: Utc::now(),
    }
}

fn limit_buy(exchange: &str) -> SubmitRequest {
    SubmitRequest {
        exchange: exchange.to_string(),
        pair: Pair::new("BTC", "USDT"),
        asset_type: AssetType::Spot,
        side: OrderSide::Buy,
        order_type: OrderType::Limit,
        price: dec!(100),
        amount: dec!(1),
        client_order_id: String::new(),
        post_only: false,
        immediate_or_cancel: false,
    }
}

struct Harness {
    manager: Arc<OrderManager>,
    adapter: Arc<MockAdapter>,
    notifier: Arc<CollectingNotifier>,
}

async fn harness_with(config: OrdersConfig, adapter: MockAdapter) -> Harness {
    let registry = Arc::new(ExchangeRegistry::new());
    let adapter = Arc::new(adapter);
    registry
        .register(Arc::clone(&adapter) as Arc<dyn ExchangeAdapter>)
        .await;

    let notifier = Arc::new(CollectingNotifier::new());
    let manager = Arc::new(OrderManager::new(
        registry,
        Arc::new(PositionController::new()),
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        config,
    ));
    manager.start().unwrap();
    Harness {
        manager,
        adapter,
        notifier,
    }
}

async fn harness() -> Harness {
    harness_with(OrdersConfig::default(), MockAdapter::new("mockex")).await
}

// ==================== Lifecycle ====================

#[tokio::test]
async fn test_start_and_stop() {
    let h = harness().await;
    assert!(h.manager.is_started());
    assert!(matches!(
        h.manager.start(),
        Err(OrderError::AlreadyStarted)
    ));

    h.manager.stop().await.unwrap();
    assert!(!h.manager.is_started());
    assert!(matches!(h.manager.stop().await, Err(OrderError::NotStarted)));
}

#[tokio::test]
async fn test_operations_require_started_manager() {
    let h = harness().await;
    h.manager.stop().await.unwrap();

    let req = limit_buy("mockex");
    assert!(matches!(
        h.manager.submit(&req).await,
        Err(OrderError::NotStarted)
    ));
    assert!(matches!(
        h.manager.orders_snapshot(OrderStatus::AnyStatus).await,
        Err(OrderError::NotStarted)
    ));
    assert!(!h.manager.exists(&detail("mockex", "o1", Pair::new("BTC", "USDT"), AssetType::Spot)).await);
}

#[tokio::test]
async fn test_stop_cancels_active_orders_when_configured() {
    let config = OrdersConfig {
        cancel_orders_on_shutdown: true,
        ..OrdersConfig::default()
    };
    let h = harness_with(config, MockAdapter::new("mockex")).await;

    h.manager.submit(&limit_buy("mockex")).await.unwrap();
    h.manager.stop().await.unwrap();

    assert_eq!(h.adapter.cancel_calls.load(Ordering::SeqCst), 1);
}

// ==================== Submit ====================

#[tokio::test]
async fn test_submit_stores_order_and_raises_event() {
    let h = harness().await;

    let order = h.manager.submit(&limit_buy("mockex")).await.unwrap();
    assert_eq!(order.order_id, "mock-1");
    assert_eq!(order.exchange, "mockex");
    assert!(order.internal_id.is_some());
    assert_eq!(order.status, OrderStatus::New);
    assert_eq!(order.remaining_amount, dec!(1));

    assert!(h.manager.exists(&order).await);
    let messages = h.notifier.messages_of(EventKind::Order);
    assert!(messages.iter().any(|m| m.contains("submitted order ID=mock-1")));
}

#[tokio::test]
async fn test_submit_validation_short_circuits() {
    let h = harness().await;

    let mut req = limit_buy("mockex");
    req.amount = Decimal::ZERO;
    assert!(matches!(
        h.manager.submit(&req).await,
        Err(OrderError::Validation(_))
    ));
    // The adapter was never asked.
    assert_eq!(h.adapter.submit_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_submit_config_gates() {
    let config = OrdersConfig {
        allow_market_orders: false,
        limit_amount: Some(dec!(5)),
        allowed_exchanges: vec!["mockex".to_string()],
        allowed_pairs: vec![Pair::new("BTC", "USDT")],
        ..OrdersConfig::default()
    };
    let h = harness_with(config, MockAdapter::new("mockex")).await;

    let mut market = limit_buy("mockex");
    market.order_type = OrderType::Market;
    assert!(matches!(
        h.manager.submit(&market).await,
        Err(OrderError::MarketOrdersDisallowed)
    ));

    let mut oversized = limit_buy("mockex");
    oversized.amount = dec!(6);
    assert!(matches!(
        h.manager.submit(&oversized).await,
        Err(OrderError::AmountOverLimit { .. })
    ));

    let mut wrong_exchange = limit_buy("otherex");
    wrong_exchange.exchange = "otherex".to_string();
    assert!(matches!(
        h.manager.submit(&wrong_exchange).await,
        Err(OrderError::ExchangeNotAllowed)
    ));

    let mut wrong_pair = limit_buy("mockex");
    wrong_pair.pair = Pair::new("DOGE", "USDT");
    assert!(matches!(
        h.manager.submit(&wrong_pair).await,
        Err(OrderError::PairNotAllowed)
    ));

    assert_eq!(h.adapter.submit_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_submit_respects_exchange_checks() {
    let h = harness().await;

    h.adapter.pair_untradable.store(true, Ordering::SeqCst);
    let err = h.manager.submit(&limit_buy("mockex")).await.unwrap_err();
    assert!(matches!(err, OrderError::Exchange { .. }));
    h.adapter.pair_untradable.store(false, Ordering::SeqCst);

    h.adapter.limit_breach.store(true, Ordering::SeqCst);
    let err = h.manager.submit(&limit_buy("mockex")).await.unwrap_err();
    assert!(err.to_string().contains("execution limits"));
    assert_eq!(h.adapter.submit_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_submit_skips_limit_checks_when_disabled() {
    let config = OrdersConfig {
        enforce_limits: false,
        ..OrdersConfig::default()
    };
    let h = harness_with(config, MockAdapter::new("mockex")).await;
    h.adapter.limit_breach.store(true, Ordering::SeqCst);

    assert!(h.manager.submit(&limit_buy("mockex")).await.is_ok());
}

#[tokio::test]
async fn test_submit_rejects_unsupported_asset() {
    let h = harness().await;
    let mut req = limit_buy("mockex");
    req.asset_type = AssetType::PerpetualSwap;
    assert!(matches!(
        h.manager.submit(&req).await,
        Err(OrderError::AssetNotSupported)
    ));
}

#[tokio::test]
async fn test_submit_adapter_failure_raises_error_event() {
    let h = harness().await;
    h.adapter.fail_submit.store(true, Ordering::SeqCst);

    let err = h.manager.submit(&limit_buy("mockex")).await.unwrap_err();
    assert!(matches!(err, OrderError::Exchange { .. }));

    let errors = h.notifier.messages_of(EventKind::Error);
    assert!(errors.iter().any(|m| m.contains("Unable to submit order")));
}

#[tokio::test]
async fn test_submit_rejects_duplicate_exchange_order_id() {
    let h = harness().await;
    let response = SubmitResponse {
        order_id: "dup-1".to_string(),
        status: OrderStatus::New,
        executed_amount: Decimal::ZERO,
        fee: Decimal::ZERO,
        placed_at: Utc::now(),
    };

    h.manager
        .submit_fake_order(&limit_buy("mockex"), response.clone())
        .await
        .unwrap();
    let err = h
        .manager
        .submit_fake_order(&limit_buy("mockex"), response)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::AlreadyExists { .. }));

    // The first stored order survives untouched.
    let all = h
        .manager
        .orders_snapshot(OrderStatus::AnyStatus)
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_submit_fake_order_skips_adapter() {
    let h = harness().await;
    let response = SubmitResponse {
        order_id: "paper-1".to_string(),
        status: OrderStatus::New,
        executed_amount: Decimal::ZERO,
        fee: Decimal::ZERO,
        placed_at: Utc::now(),
    };

    let order = h
        .manager
        .submit_fake_order(&limit_buy("mockex"), response)
        .await
        .unwrap();

    assert_eq!(order.order_id, "paper-1");
    assert_eq!(h.adapter.submit_calls.load(Ordering::SeqCst), 0);
    assert!(h.manager.exists(&order).await);
}

// ==================== Modify ====================

#[tokio::test]
async fn test_modify_applies_locally() {
    let h = harness().await;
    let order = h.manager.submit(&limit_buy("mockex")).await.unwrap();

    let outcome = h
        .manager
        .modify(&ModifyRequest {
            exchange: "mockex".to_string(),
            order_id: order.order_id.clone(),
            pair: None,
            asset_type: AssetType::Spot,
            side: None,
            price: dec!(105),
            amount: Decimal::ZERO,
            post_only: None,
            immediate_or_cancel: None,
        })
        .await
        .unwrap();

    assert!(outcome.applied_locally);
    assert_eq!(outcome.order_id, order.order_id);

    let stored = h
        .manager
        .get_by_exchange_and_id("mockex", &order.order_id)
        .await
        .unwrap();
    assert_eq!(stored.price, dec!(105));
    // Amount was back-filled from the stored order, not zeroed.
    assert_eq!(stored.amount, dec!(1));
}

#[tokio::test]
async fn test_modify_unknown_order_fails() {
    let h = harness().await;

    let err = h
        .manager
        .modify(&ModifyRequest {
            exchange: "mockex".to_string(),
            order_id: "ghost".to_string(),
            pair: None,
            asset_type: AssetType::Spot,
            side: None,
            price: dec!(105),
            amount: Decimal::ZERO,
            post_only: None,
            immediate_or_cancel: None,
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("does not exist"));
    let errors = h.notifier.messages_of(EventKind::Error);
    assert!(errors.iter().any(|m| m.contains("Unable to modify order")));
}

#[tokio::test]
async fn test_modify_requires_a_change() {
    let h = harness().await;
    let order = h.manager.submit(&limit_buy("mockex")).await.unwrap();

    let err = h
        .manager
        .modify(&ModifyRequest {
            exchange: "mockex".to_string(),
            order_id: order.order_id,
            pair: None,
            asset_type: AssetType::Spot,
            side: None,
            price: Decimal::ZERO,
            amount: Decimal::ZERO,
            post_only: None,
            immediate_or_cancel: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::NothingToModify));
}

#[tokio::test]
async fn test_modify_tracks_replacement_order_id() {
    let h = harness().await;
    h.adapter.modify_assigns_new_id.store(true, Ordering::SeqCst);
    let order = h.manager.submit(&limit_buy("mockex")).await.unwrap();

    let outcome = h
        .manager
        .modify(&ModifyRequest {
            exchange: "mockex".to_string(),
            order_id: order.order_id.clone(),
            pair: None,
            asset_type: AssetType::Spot,
            side: None,
            price: dec!(101),
            amount: Decimal::ZERO,
            post_only: None,
            immediate_or_cancel: None,
        })
        .await
        .unwrap();

    let new_id = format!("{}-amended", order.order_id);
    assert_eq!(outcome.order_id, new_id);
    assert!(h
        .manager
        .get_by_exchange_and_id("mockex", &new_id)
        .await
        .is_ok());
    assert!(h
        .manager
        .get_by_exchange_and_id("mockex", &order.order_id)
        .await
        .is_err());
}

#[tokio::test]
async fn test_modify_adapter_failure_raises_error_event() {
    let h = harness().await;
    h.adapter.fail_modify.store(true, Ordering::SeqCst);
    let order = h.manager.submit(&limit_buy("mockex")).await.unwrap();

    let err = h
        .manager
        .modify(&ModifyRequest {
            exchange: "mockex".to_string(),
            order_id: order.order_id.clone(),
            pair: None,
            asset_type: AssetType::Spot,
            side: None,
            price: dec!(105),
            amount: Decimal::ZERO,
            post_only: None,
            immediate_or_cancel: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Exchange { .. }));

    // The stored order is untouched.
    let stored = h
        .manager
        .get_by_exchange_and_id("mockex", &order.order_id)
        .await
        .unwrap();
    assert_eq!(stored.price, dec!(100));
}

// ==================== Cancel ====================

#[tokio::test]
async fn test_cancel_marks_order_cancelled() {
    let h = harness().await;
    let order = h.manager.submit(&limit_buy("mockex")).await.unwrap();

    h.manager.cancel(&order.derive_cancel()).await.unwrap();

    let stored = h
        .manager
        .get_by_exchange_and_id("mockex", &order.order_id)
        .await
        .unwrap();
    assert_eq!(stored.status, OrderStatus::Cancelled);
    assert!(!stored.is_active());

    let messages = h.notifier.messages_of(EventKind::Order);
    assert!(messages.iter().any(|m| m.contains("cancelled")));
}

#[tokio::test]
async fn test_cancel_validation_raises_error_event() {
    let h = harness().await;

    let mut req = detail("mockex", "o1", Pair::new("BTC", "USDT"), AssetType::Spot).derive_cancel();
    req.order_id = String::new();
    assert!(matches!(
        h.manager.cancel(&req).await,
        Err(OrderError::EmptyOrderId)
    ));

    let mut req = detail("mockex", "o1", Pair::new("BTC", "USDT"), AssetType::Spot).derive_cancel();
    req.asset_type = AssetType::PerpetualSwap;
    assert!(matches!(
        h.manager.cancel(&req).await,
        Err(OrderError::AssetNotSupported)
    ));

    // Every failed cancel raises an error event.
    assert_eq!(h.notifier.messages_of(EventKind::Error).len(), 2);
    assert_eq!(h.adapter.cancel_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_unknown_order_makes_no_exchange_call() {
    let h = harness().await;

    let req =
        detail("mockex", "ghost", Pair::new("BTC", "USDT"), AssetType::Spot).derive_cancel();
    let err = h.manager.cancel(&req).await.unwrap_err();
    assert!(err.to_string().contains("does not exist"));
    // The adapter was never asked to cancel an order we do not track.
    assert_eq!(h.adapter.cancel_calls.load(Ordering::SeqCst), 0);

    let errors = h.notifier.messages_of(EventKind::Error);
    assert!(errors
        .iter()
        .any(|m| m.contains("Unable to cancel order ghost")));
}

#[tokio::test]
async fn test_cancel_adapter_failure_keeps_order_active() {
    let h = harness().await;
    h.adapter.fail_cancel.store(true, Ordering::SeqCst);
    let order = h.manager.submit(&limit_buy("mockex")).await.unwrap();

    assert!(h.manager.cancel(&order.derive_cancel()).await.is_err());

    let stored = h
        .manager
        .get_by_exchange_and_id("mockex", &order.order_id)
        .await
        .unwrap();
    assert!(stored.is_active());
}

#[tokio::test]
async fn test_cancel_all_orders() {
    let h = harness().await;
    h.manager.submit(&limit_buy("mockex")).await.unwrap();
    h.manager.submit(&limit_buy("mockex")).await.unwrap();

    let cancelled = h.manager.cancel_all_orders().await;
    assert_eq!(cancelled, 2);

    let active = h
        .manager
        .orders_active(&OrderFilter::default())
        .await
        .unwrap();
    assert!(active.is_empty());
}

// ==================== Queries ====================

#[tokio::test]
async fn test_get_order_info_upserts() {
    let h = harness().await;
    let pair = Pair::new("BTC", "USDT");

    let order = h
        .manager
        .get_order_info("mockex", "ext-1", &pair, AssetType::Spot)
        .await
        .unwrap();

    assert_eq!(order.order_id, "ext-1");
    assert!(order.internal_id.is_some());
    assert!(h
        .manager
        .get_by_exchange_and_id("mockex", "ext-1")
        .await
        .is_ok());
}

#[tokio::test]
async fn test_snapshot_wildcard_statuses_return_everything() {
    let h = harness().await;
    let order = h.manager.submit(&limit_buy("mockex")).await.unwrap();
    h.manager.cancel(&order.derive_cancel()).await.unwrap();
    h.manager.submit(&limit_buy("mockex")).await.unwrap();

    let all = h.manager.orders_snapshot(OrderStatus::AnyStatus).await.unwrap();
    assert_eq!(all.len(), 2);
    let all = h
        .manager
        .orders_snapshot(OrderStatus::UnknownStatus)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let cancelled = h
        .manager
        .orders_snapshot(OrderStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(cancelled.len(), 1);
}

#[tokio::test]
async fn test_upsert_order_reports_added_then_updated() {
    let h = harness().await;
    let order = detail("mockex", "ext-9", Pair::new("BTC", "USDT"), AssetType::Spot);

    let first = h.manager.upsert_order(&order).await.unwrap();
    assert!(first.is_new);
    let second = h.manager.upsert_order(&order).await.unwrap();
    assert!(!second.is_new);

    let messages = h.notifier.messages_of(EventKind::Order);
    assert!(messages.iter().any(|m| m.contains("added order ID=ext-9")));
    assert!(messages.iter().any(|m| m.contains("updated order ID=ext-9")));
}

#[tokio::test]
async fn test_internal_id_lookup_via_manager() {
    let h = harness().await;
    let order = h.manager.submit(&limit_buy("mockex")).await.unwrap();
    let internal = order.internal_id.unwrap();

    let found = h
        .manager
        .get_by_internal_order_id(internal)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.order_id, order.order_id);
}

// ==================== Futures passthroughs ====================

#[tokio::test]
async fn test_futures_passthroughs_require_tracking_enabled() {
    let h = harness().await;
    let pair = Pair::new("BTC", "USDT");

    assert!(matches!(
        h.manager
            .futures_positions("mockex", AssetType::Futures, &pair)
            .await,
        Err(OrderError::PositionTrackingDisabled)
    ));
}

#[tokio::test]
async fn test_futures_positions_flow_through_tracker() {
    let config = OrdersConfig {
        track_futures_positions: true,
        ..OrdersConfig::default()
    };
    let h = harness_with(config, MockAdapter::new("mockex")).await;
    let pair = Pair::new("BTC", "USDT");

    let mut order = detail("mockex", "f-1", pair.clone(), AssetType::Futures);
    order.executed_amount = dec!(1);
    order.status = OrderStatus::PartiallyFilled;
    h.manager.upsert_order(&order).await.unwrap();

    let positions = h
        .manager
        .futures_positions("mockex", AssetType::Futures, &pair)
        .await
        .unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].exposure, dec!(1));

    let pnl = h
        .manager
        .update_open_position_unrealised_pnl(
            "mockex",
            AssetType::Futures,
            &pair,
            dec!(110),
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(pnl, dec!(10));

    h.manager
        .clear_futures_tracking("mockex", AssetType::Futures, &pair)
        .await
        .unwrap();
    let positions = h
        .manager
        .futures_positions("mockex", AssetType::Futures, &pair)
        .await
        .unwrap();
    assert!(positions.is_empty());
}

// ==================== Reconciliation ====================

#[tokio::test]
async fn test_reconciliation_upserts_reported_orders() {
    let h = harness().await;
    let pair = Pair::new("BTC", "USDT");
    h.adapter
        .active_orders
        .lock()
        .unwrap()
        .push(detail("", "ext-7", pair, AssetType::Spot));

    assert!(h.manager.try_process_orders().await);

    // Exchange name was stamped onto the reported order before storing.
    let stored = h
        .manager
        .get_by_exchange_and_id("mockex", "ext-7")
        .await
        .unwrap();
    assert_eq!(stored.exchange, "mockex");
    assert!(stored.internal_id.is_some());
}

#[tokio::test]
async fn test_reconciliation_refetches_stale_unreported_orders() {
    let config = OrdersConfig {
        stale_order_age: Duration::from_secs(60),
        ..OrdersConfig::default()
    };
    let h = harness_with(config, MockAdapter::new("mockex")).await;
    let pair = Pair::new("BTC", "USDT");

    // Stored order the exchange no longer reports, last touched long ago.
    let mut stale = detail("mockex", "old-1", pair.clone(), AssetType::Spot);
    stale.last_updated = Utc::now() - chrono::Duration::minutes(5);
    h.manager.add_order(stale).await.unwrap();

    let mut filled = detail("mockex", "old-1", pair, AssetType::Spot);
    filled.status = OrderStatus::Filled;
    filled.executed_amount = dec!(1);
    *h.adapter.info_response.lock().unwrap() = Some(filled);

    assert!(h.manager.try_process_orders().await);

    assert_eq!(h.adapter.info_calls.load(Ordering::SeqCst), 1);
    let stored = h
        .manager
        .get_by_exchange_and_id("mockex", "old-1")
        .await
        .unwrap();
    assert_eq!(stored.status, OrderStatus::Filled);
    assert_eq!(stored.remaining_amount, Decimal::ZERO);
}

#[tokio::test]
async fn test_reconciliation_leaves_fresh_unreported_orders_alone() {
    let h = harness().await;
    let pair = Pair::new("BTC", "USDT");

    // Recently-touched order; not yet considered stale.
    h.manager
        .add_order(detail("mockex", "new-1", pair, AssetType::Spot))
        .await
        .unwrap();

    assert!(h.manager.try_process_orders().await);
    assert_eq!(h.adapter.info_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_reconciliation_marks_unreachable_orders_unknown() {
    let h = harness().await;
    let pair = Pair::new("BTC", "USDT");

    let mut stale = detail("mockex", "old-2", pair, AssetType::Spot);
    stale.last_updated = Utc::now() - chrono::Duration::minutes(5);
    h.manager.add_order(stale).await.unwrap();
    h.adapter.fail_get_info.store(true, Ordering::SeqCst);

    assert!(h.manager.try_process_orders().await);

    let stored = h
        .manager
        .get_by_exchange_and_id("mockex", "old-2")
        .await
        .unwrap();
    assert_eq!(stored.status, OrderStatus::UnknownStatus);
    // Unknown orders stay on the active set for the next pass.
    assert!(stored.is_active());
}

#[tokio::test]
async fn test_reconciliation_skips_exchanges_without_rest_auth() {
    let h = harness_with(
        OrdersConfig::default(),
        MockAdapter::new("mockex").without_rest_auth(),
    )
    .await;

    assert!(h.manager.try_process_orders().await);
    assert_eq!(h.adapter.active_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_reconciliation_covers_every_asset_in_one_pass() {
    let h = harness().await;

    assert!(h.manager.try_process_orders().await);
    // Spot and futures fetches both ran within the joined pass.
    assert_eq!(h.adapter.active_calls.load(Ordering::SeqCst), 2);
    // The guard is released once the last fetch finishes.
    assert!(!h.manager.reconciling.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_reconciliation_guard_rejects_overlap() {
    let h = harness().await;

    h.manager.reconciling.store(true, Ordering::SeqCst);
    assert!(!h.manager.try_process_orders().await);
    h.manager.reconciling.store(false, Ordering::SeqCst);
    assert!(h.manager.try_process_orders().await);
}
