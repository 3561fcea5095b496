mod common;

use common::*;
use futures::future::join;
use iap_reconciler::error::ErrorKind;
use iap_reconciler::payments::playstore::PlayStorePurchase;
use iap_reconciler::payments::types::{PayWay, PaymentContext, PurchaseRecord};
use iap_reconciler::payments::{InMemoryLocker, Locker};
use iap_reconciler::services::{ReconcileOutcome, ReconciliationEngine};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    orders: Arc<MockOrderService>,
    locker: Arc<InMemoryLocker>,
    engine: ReconciliationEngine,
    log: EventLog,
}

fn harness_with(orders: MockOrderService, log: EventLog) -> Harness {
    let orders = Arc::new(orders);
    let locker = Arc::new(InMemoryLocker::new());
    let engine = ReconciliationEngine::new(orders.clone(), locker.clone());
    Harness {
        orders,
        locker,
        engine,
        log,
    }
}

fn harness() -> Harness {
    let log = event_log();
    harness_with(MockOrderService::new(log.clone()), log)
}

fn app_store_record(transaction_id: &str, original: &str) -> PurchaseRecord {
    PurchaseRecord::AppStore(inapp(transaction_id, original, 1_600_000_000_000))
}

fn play_record(order_id: &str) -> PurchaseRecord {
    PurchaseRecord::PlayStore(PlayStorePurchase {
        order_id: order_id.to_string(),
        package_name: PACKAGE_NAME.to_string(),
        product_id: "vip.month".to_string(),
        purchase_token: "opaque-purchase-token-0123456789".to_string(),
        ..Default::default()
    })
}

fn ctx() -> PaymentContext {
    PaymentContext::for_pay_way(PayWay::AppStore).with_uid("42")
}

#[tokio::test]
async fn test_first_purchase_creates_and_invokes_order() {
    let h = harness();
    let outcome = h
        .engine
        .invoke(&mut ctx(), &app_store_record("1000", "1000"))
        .await
        .unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Invoked { .. }));
    assert_eq!(
        events(&h.log),
        vec!["get_order:1000", "post_order:1000", "invoke:1000"]
    );
    assert!(h.orders.order("1000").unwrap().paid);
}

#[tokio::test]
async fn test_repeated_delivery_invokes_once() {
    let h = harness();
    let record = app_store_record("1000", "1000");

    let first = h.engine.invoke(&mut ctx(), &record).await.unwrap();
    let second = h.engine.invoke(&mut ctx(), &record).await.unwrap();
    let third = h.engine.invoke(&mut ctx(), &record).await.unwrap();

    assert!(matches!(first, ReconcileOutcome::Invoked { .. }));
    assert!(matches!(second, ReconcileOutcome::AlreadyPaid { .. }));
    assert_eq!(second.order_id(), first.order_id());
    assert_eq!(third, second);
    assert_eq!(h.orders.count("invoke"), 1);
    assert_eq!(h.orders.count("post_order"), 1);
}

#[tokio::test]
async fn test_unpaid_existing_order_is_invoked_without_recreation() {
    let h = harness();
    h.orders.insert_order("1000", false);

    let outcome = h
        .engine
        .invoke(&mut ctx(), &app_store_record("1000", "1000"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReconcileOutcome::Invoked {
            order_id: "seed-1000".to_string()
        }
    );
    assert_eq!(h.orders.count("post_order"), 0);
}

#[tokio::test]
async fn test_concurrent_deliveries_apply_once() {
    let log = event_log();
    let h = harness_with(
        MockOrderService::new(log.clone()).with_invoke_delay(Duration::from_millis(50)),
        log,
    );
    let record = app_store_record("1000", "1000");
    let mut ctx_a = ctx();
    let mut ctx_b = ctx();

    let (a, b) = join(
        h.engine.invoke(&mut ctx_a, &record),
        h.engine.invoke(&mut ctx_b, &record),
    )
    .await;

    let results = [a, b];
    let invoked = results
        .iter()
        .filter(|r| matches!(r, Ok(ReconcileOutcome::Invoked { .. })))
        .count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::ConcurrentConflict))
        .count();

    assert_eq!(invoked, 1);
    assert_eq!(conflicts, 1);
    assert_eq!(h.orders.count("invoke"), 1);
    assert!(!h.locker.is_locked("1000").await);
}

#[tokio::test]
async fn test_held_lock_rejects_without_touching_ledger() {
    let h = harness();
    assert!(h.locker.lock("1000").await.unwrap().is_some());

    let err = h
        .engine
        .invoke(&mut ctx(), &app_store_record("1000", "1000"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConcurrentConflict);
    assert!(err.is_retryable());
    assert!(events(&h.log).is_empty());
    // The rejected call must not release somebody else's lock.
    assert!(h.locker.is_locked("1000").await);
}

#[tokio::test]
async fn test_lock_is_released_after_failure() {
    let h = harness();
    h.orders.fail_lookups();

    let err = h
        .engine
        .invoke(&mut ctx(), &app_store_record("1000", "1000"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Ledger);
    assert!(err.is_retryable());
    assert!(!h.locker.is_locked("1000").await);
    // An unknown lookup failure never creates an order.
    assert_eq!(h.orders.count("post_order"), 0);
}

#[tokio::test]
async fn test_renewal_from_other_subscriber_is_rejected() {
    let h = harness();
    h.orders.set_subscriber_matches(false);

    let err = h
        .engine
        .invoke(&mut ctx(), &app_store_record("1001", "1000"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SubscriberMismatch);
    assert!(!err.is_retryable());
    assert_eq!(
        events(&h.log),
        vec!["get_order:1001", "check_sub_user:1000:1001"]
    );
    assert!(h.orders.order("1001").is_none());
}

#[tokio::test]
async fn test_renewal_from_same_subscriber_is_applied() {
    let h = harness();

    let outcome = h
        .engine
        .invoke(&mut ctx(), &app_store_record("1001", "1000"))
        .await
        .unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Invoked { .. }));
    assert_eq!(h.orders.count("check_sub_user"), 1);
}

#[tokio::test]
async fn test_first_purchase_skips_continuity_check() {
    let h = harness();
    h.orders.set_subscriber_matches(false);

    h.engine
        .invoke(&mut ctx(), &play_record("GPA.3301-1111-2222-33333"))
        .await
        .unwrap();

    assert_eq!(h.orders.count("check_sub_user"), 0);
}

#[tokio::test]
async fn test_play_renewal_checks_parsed_original_order() {
    let h = harness();

    h.engine
        .invoke(&mut ctx(), &play_record("GPA.3301-1111-2222-33333..2"))
        .await
        .unwrap();

    assert!(events(&h.log)
        .contains(&"check_sub_user:GPA.3301-1111-2222-33333:GPA.3301-1111-2222-33333..2".to_string()));
}

#[tokio::test]
async fn test_malformed_play_order_id_is_rejected_before_locking() {
    let h = harness();

    let err = h
        .engine
        .invoke(&mut ctx(), &play_record("GPA.1..2..3"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidTradeNo);
    assert!(events(&h.log).is_empty());
}

#[tokio::test]
async fn test_created_order_sees_verified_purchase() {
    let h = harness();
    let mut context = ctx();
    context.request.attach = "{\"campaign\":\"spring\"}".to_string();
    let record = app_store_record("1000", "1000");

    h.engine.invoke(&mut context, &record).await.unwrap();

    assert_eq!(context.purchase, Some(record));
    assert_eq!(
        h.orders.order("1000").unwrap().info.attach,
        "{\"campaign\":\"spring\"}"
    );
}

#[tokio::test]
async fn test_revoke_requires_existing_order() {
    let h = harness();

    let err = h
        .engine
        .revoke(&mut ctx(), &app_store_record("1000", "1000"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OrderNotFound);
    assert_eq!(h.orders.count("revoke"), 0);
    assert!(!h.locker.is_locked("1000").await);
}

#[tokio::test]
async fn test_revoke_undoes_paid_order() {
    let h = harness();
    h.orders.insert_order("1000", true);

    let outcome = h
        .engine
        .revoke(&mut ctx(), &app_store_record("1000", "1000"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ReconcileOutcome::Revoked {
            order_id: "seed-1000".to_string()
        }
    );
    assert!(!h.orders.order("1000").unwrap().paid);
}
