#![allow(dead_code)]

use async_trait::async_trait;
use iap_reconciler::config::{AppStoreConfig, GatewayConfig, PlayStoreConfig, PublisherApis};
use iap_reconciler::error::{ReconcileError, ReconcileResult};
use iap_reconciler::payments::appstore::{AppStoreInApp, IapResponse, Receipt};
use iap_reconciler::payments::playstore::{
    ProductPurchase, PublisherService, SubscriptionPurchase,
};
use iap_reconciler::payments::types::{AppStoreIapRequest, PayWay, PaymentContext};
use iap_reconciler::payments::{Order, OrderInfo, OrderService, OrderServiceError, ReceiptAuthority};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BUNDLE_ID: &str = "com.example.app";
pub const PACKAGE_NAME: &str = "com.example.app";
pub const SHARED_SECRET: &str = "shared-secret";

/// Call log shared between mocks so tests can assert cross-collaborator ordering
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn gateway_config(max_attempts: u32) -> GatewayConfig {
    GatewayConfig {
        verify_max_attempts: max_attempts,
        ..GatewayConfig::default()
    }
}

pub fn app_store_config() -> AppStoreConfig {
    AppStoreConfig {
        bundle_id: BUNDLE_ID.to_string(),
        shared_secret: SHARED_SECRET.to_string(),
        production_url: "https://buy.itunes.apple.com/verifyReceipt".to_string(),
        sandbox_url: "https://sandbox.itunes.apple.com/verifyReceipt".to_string(),
    }
}

pub fn play_store_config() -> PlayStoreConfig {
    PlayStoreConfig {
        package_name: PACKAGE_NAME.to_string(),
        publisher_endpoint: "http://localhost:9000".to_string(),
        publisher_token: None,
        publisher_apis: PublisherApis::default(),
    }
}

// ---------------------------------------------------------------------------
// Order ledger
// ---------------------------------------------------------------------------

pub struct MockOrderService {
    orders: Mutex<HashMap<String, Order>>,
    log: EventLog,
    subscriber_matches: AtomicBool,
    lookup_failure: AtomicBool,
    invoke_delay: Option<Duration>,
    next_id: AtomicU32,
}

impl MockOrderService {
    pub fn new(log: EventLog) -> Self {
        Self {
            orders: Mutex::new(HashMap::new()),
            log,
            subscriber_matches: AtomicBool::new(true),
            lookup_failure: AtomicBool::new(false),
            invoke_delay: None,
            next_id: AtomicU32::new(1),
        }
    }

    pub fn with_invoke_delay(mut self, delay: Duration) -> Self {
        self.invoke_delay = Some(delay);
        self
    }

    pub fn set_subscriber_matches(&self, matches: bool) {
        self.subscriber_matches.store(matches, Ordering::SeqCst);
    }

    pub fn fail_lookups(&self) {
        self.lookup_failure.store(true, Ordering::SeqCst);
    }

    /// Seed an order, as if an earlier call had created it
    pub fn insert_order(&self, trade_no: &str, paid: bool) -> Order {
        let order = Order {
            order_id: format!("seed-{}", trade_no),
            info: OrderInfo {
                trade_no: trade_no.to_string(),
                ..Default::default()
            },
            paid,
        };
        self.orders
            .lock()
            .unwrap()
            .insert(trade_no.to_string(), order.clone());
        order
    }

    pub fn order(&self, trade_no: &str) -> Option<Order> {
        self.orders.lock().unwrap().get(trade_no).cloned()
    }

    pub fn count(&self, call: &str) -> usize {
        let prefix = format!("{}:", call);
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.starts_with(&prefix))
            .count()
    }

    fn record(&self, event: String) {
        self.log.lock().unwrap().push(event);
    }
}

#[async_trait]
impl OrderService for MockOrderService {
    async fn post_order(&self, ctx: &PaymentContext) -> Result<Order, OrderServiceError> {
        let purchase = ctx.purchase.as_ref().ok_or(OrderServiceError::Backend {
            message: "purchase missing from context".to_string(),
            retryable: false,
        })?;
        let trade_no = purchase.trade_no().to_string();
        self.record(format!("post_order:{}", trade_no));

        let order = Order {
            order_id: format!("order-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            info: OrderInfo {
                subject: purchase.product_id().to_string(),
                trade_no: trade_no.clone(),
                attach: ctx.attach().to_string(),
                ..Default::default()
            },
            paid: false,
        };
        self.orders
            .lock()
            .unwrap()
            .insert(trade_no, order.clone());
        Ok(order)
    }

    async fn get_order_by_trade_no(
        &self,
        trade_no: &str,
        _pay_way: PayWay,
    ) -> Result<Order, OrderServiceError> {
        self.record(format!("get_order:{}", trade_no));
        if self.lookup_failure.load(Ordering::SeqCst) {
            return Err(OrderServiceError::Backend {
                message: "ledger unavailable".to_string(),
                retryable: true,
            });
        }
        self.orders
            .lock()
            .unwrap()
            .get(trade_no)
            .cloned()
            .ok_or(OrderServiceError::NotFound)
    }

    async fn invoke(&self, order: &Order) -> Result<(), OrderServiceError> {
        if let Some(delay) = self.invoke_delay {
            tokio::time::sleep(delay).await;
        }
        self.record(format!("invoke:{}", order.info.trade_no));
        if let Some(stored) = self.orders.lock().unwrap().get_mut(&order.info.trade_no) {
            stored.paid = true;
        }
        Ok(())
    }

    async fn revoke(&self, order: &Order) -> Result<(), OrderServiceError> {
        self.record(format!("revoke:{}", order.info.trade_no));
        if let Some(stored) = self.orders.lock().unwrap().get_mut(&order.info.trade_no) {
            stored.paid = false;
        }
        Ok(())
    }

    async fn check_sub_user(
        &self,
        _ctx: &PaymentContext,
        original_trade_no: &str,
        trade_no: &str,
    ) -> Result<bool, OrderServiceError> {
        self.record(format!("check_sub_user:{}:{}", original_trade_no, trade_no));
        Ok(self.subscriber_matches.load(Ordering::SeqCst))
    }
}

// ---------------------------------------------------------------------------
// App Store receipt authority
// ---------------------------------------------------------------------------

/// Replays queued responses, then repeats `fallback`
pub struct MockReceiptAuthority {
    queued: Mutex<VecDeque<ReconcileResult<IapResponse>>>,
    fallback: IapResponse,
    calls: AtomicU32,
}

impl MockReceiptAuthority {
    pub fn new(fallback: IapResponse) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicU32::new(0),
        }
    }

    /// Answer the first `times` calls with `status`
    pub fn failing_first(self, times: usize, status: i64) -> Self {
        {
            let mut queued = self.queued.lock().unwrap();
            for _ in 0..times {
                queued.push_back(Ok(IapResponse {
                    status,
                    ..Default::default()
                }));
            }
        }
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReceiptAuthority for MockReceiptAuthority {
    async fn verify_receipt(&self, _request: &AppStoreIapRequest) -> ReconcileResult<IapResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.queued.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(self.fallback.clone()),
        }
    }
}

pub fn inapp(transaction_id: &str, original_transaction_id: &str, purchase_ms: i64) -> AppStoreInApp {
    AppStoreInApp {
        quantity: "1".to_string(),
        product_id: "vip.month".to_string(),
        transaction_id: transaction_id.to_string(),
        original_transaction_id: original_transaction_id.to_string(),
        purchase_date_ms: purchase_ms.to_string(),
        is_trial_period: "false".to_string(),
        ..Default::default()
    }
}

pub fn receipt_response(bundle_id: &str, transactions: Vec<AppStoreInApp>) -> IapResponse {
    IapResponse {
        status: 0,
        environment: "Production".to_string(),
        receipt: Receipt {
            receipt_type: "Production".to_string(),
            bundle_id: bundle_id.to_string(),
            application_version: "1".to_string(),
            in_app: transactions.clone(),
        },
        latest_receipt_info: transactions,
        latest_receipt: "bGF0ZXN0".to_string(),
        is_retryable: false,
    }
}

// ---------------------------------------------------------------------------
// Play publisher API
// ---------------------------------------------------------------------------

pub struct MockPublisherService {
    subscription: Mutex<SubscriptionPurchase>,
    product: Mutex<ProductPurchase>,
    transient_failures: AtomicU32,
    log: EventLog,
}

impl MockPublisherService {
    pub fn new(log: EventLog) -> Self {
        Self {
            subscription: Mutex::new(SubscriptionPurchase::default()),
            product: Mutex::new(ProductPurchase::default()),
            transient_failures: AtomicU32::new(0),
            log,
        }
    }

    pub fn with_subscription(self, state: SubscriptionPurchase) -> Self {
        *self.subscription.lock().unwrap() = state;
        self
    }

    pub fn with_product(self, state: ProductPurchase) -> Self {
        *self.product.lock().unwrap() = state;
        self
    }

    /// Fail the next `times` queries with a retryable publisher error
    pub fn with_transient_failures(self, times: u32) -> Self {
        self.transient_failures.store(times, Ordering::SeqCst);
        self
    }

    fn record(&self, event: String) {
        self.log.lock().unwrap().push(event);
    }

    fn maybe_fail(&self) -> ReconcileResult<()> {
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ReconcileError::Publisher {
                message: "503 from publisher relay".to_string(),
                retryable: true,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PublisherService for MockPublisherService {
    async fn verify_subscription(
        &self,
        _package_name: &str,
        subscription_id: &str,
        _token: &str,
    ) -> ReconcileResult<SubscriptionPurchase> {
        self.record(format!("verify_subscription:{}", subscription_id));
        self.maybe_fail()?;
        Ok(self.subscription.lock().unwrap().clone())
    }

    async fn verify_product(
        &self,
        _package_name: &str,
        product_id: &str,
        _token: &str,
    ) -> ReconcileResult<ProductPurchase> {
        self.record(format!("verify_product:{}", product_id));
        self.maybe_fail()?;
        Ok(self.product.lock().unwrap().clone())
    }

    async fn acknowledge_subscription(
        &self,
        _package_name: &str,
        subscription_id: &str,
        _token: &str,
        _developer_payload: &str,
    ) -> ReconcileResult<()> {
        self.record(format!("ack_subscription:{}", subscription_id));
        Ok(())
    }

    async fn acknowledge_product(
        &self,
        _package_name: &str,
        product_id: &str,
        _token: &str,
        _developer_payload: &str,
    ) -> ReconcileResult<()> {
        self.record(format!("ack_product:{}", product_id));
        Ok(())
    }
}

pub fn subscription_state(order_id: &str, payment_state: i32, acknowledged: bool) -> SubscriptionPurchase {
    SubscriptionPurchase {
        kind: "androidpublisher#subscriptionPurchase".to_string(),
        start_time_millis: "1600000000000".to_string(),
        expiry_time_millis: "1602592000000".to_string(),
        auto_renewing: true,
        payment_state: Some(payment_state),
        order_id: order_id.to_string(),
        acknowledgement_state: if acknowledged { 1 } else { 0 },
        ..Default::default()
    }
}

pub fn purchase_data(order_id: &str, package_name: &str, product_id: &str) -> String {
    serde_json::json!({
        "orderId": order_id,
        "packageName": package_name,
        "productId": product_id,
        "purchaseTime": 1600000000000i64,
        "purchaseState": 0,
        "purchaseToken": "opaque-purchase-token-0123456789",
        "autoRenewing": true,
        "acknowledged": false
    })
    .to_string()
}
