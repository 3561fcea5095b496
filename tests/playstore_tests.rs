mod common;

use common::*;
use iap_reconciler::error::ErrorKind;
use iap_reconciler::payments::classifier::LifecycleEvent;
use iap_reconciler::payments::playstore::{
    DeveloperNotification, OneTimeProductNotification, ProductPurchase, RtdnEnvelope,
    SubscriptionNotification,
};
use iap_reconciler::payments::playstore::types::TestNotification;
use iap_reconciler::payments::types::{PayWay, PaymentContext, PaymentRequest};
use iap_reconciler::payments::{InMemoryLocker, NoopAttachService};
use iap_reconciler::services::{
    AttachRecovery, NotificationOutcome, PlayStoreService, ReconcileOutcome, ReconciliationEngine,
};
use std::sync::Arc;

const ORDER_ID: &str = "GPA.3301-1111-2222-33333";

struct Harness {
    orders: Arc<MockOrderService>,
    service: PlayStoreService,
    log: EventLog,
}

fn harness(publisher: impl FnOnce(EventLog) -> MockPublisherService) -> Harness {
    let log = event_log();
    let orders = Arc::new(MockOrderService::new(log.clone()));
    let engine = Arc::new(ReconciliationEngine::new(
        orders.clone(),
        Arc::new(InMemoryLocker::new()),
    ));
    let service = PlayStoreService::new(
        engine,
        Arc::new(publisher(log.clone())),
        AttachRecovery::new(Arc::new(NoopAttachService)),
        &play_store_config(),
        &gateway_config(3),
    );
    Harness {
        orders,
        service,
        log,
    }
}

fn confirm_ctx(order_id: &str, package_name: &str, subscription: bool) -> PaymentContext {
    let mut request = PaymentRequest::new(PayWay::PlayStore);
    request.play_store.purchase_data = purchase_data(order_id, package_name, "vip.month");
    request.play_store.subscription = subscription;
    PaymentContext::new(request).with_uid("42")
}

fn subscription_envelope(notification_type: i32) -> RtdnEnvelope {
    envelope(DeveloperNotification {
        version: "1.0".to_string(),
        package_name: PACKAGE_NAME.to_string(),
        event_time_millis: "1600000000000".to_string(),
        subscription_notification: Some(SubscriptionNotification {
            version: "1.0".to_string(),
            notification_type,
            purchase_token: "opaque-purchase-token-0123456789".to_string(),
            subscription_id: "vip.month".to_string(),
        }),
        ..Default::default()
    })
}

fn envelope(notification: DeveloperNotification) -> RtdnEnvelope {
    RtdnEnvelope::from_notification("projects/example/subscriptions/play-rtdn", &notification)
        .unwrap()
}

fn play_ctx() -> PaymentContext {
    PaymentContext::for_pay_way(PayWay::PlayStore)
}

#[tokio::test]
async fn test_confirm_subscription_acknowledges_after_invoke() {
    let h = harness(|log| {
        MockPublisherService::new(log).with_subscription(subscription_state(ORDER_ID, 1, false))
    });

    let outcome = h
        .service
        .confirm_payment(&mut confirm_ctx(ORDER_ID, PACKAGE_NAME, true))
        .await
        .unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Invoked { .. }));
    assert_eq!(
        events(&h.log),
        vec![
            "verify_subscription:vip.month".to_string(),
            format!("get_order:{}", ORDER_ID),
            format!("post_order:{}", ORDER_ID),
            format!("invoke:{}", ORDER_ID),
            "ack_subscription:vip.month".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_confirm_accepts_free_trial() {
    let h = harness(|log| {
        MockPublisherService::new(log).with_subscription(subscription_state(ORDER_ID, 2, true))
    });

    let outcome = h
        .service
        .confirm_payment(&mut confirm_ctx(ORDER_ID, PACKAGE_NAME, true))
        .await
        .unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Invoked { .. }));
    // Already acknowledged on the Play side.
    assert!(!events(&h.log).iter().any(|e| e.starts_with("ack_")));
}

#[tokio::test]
async fn test_confirm_rejects_pending_payment() {
    let h = harness(|log| {
        MockPublisherService::new(log).with_subscription(subscription_state(ORDER_ID, 0, false))
    });

    let err = h
        .service
        .confirm_payment(&mut confirm_ctx(ORDER_ID, PACKAGE_NAME, true))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TrustVerificationFailed);
    assert_eq!(h.orders.count("get_order"), 0);
}

#[tokio::test]
async fn test_confirm_rejects_foreign_package() {
    let h = harness(MockPublisherService::new);

    let err = h
        .service
        .confirm_payment(&mut confirm_ctx(ORDER_ID, "com.attacker.app", true))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::IdentityMismatch);
    assert!(events(&h.log).is_empty());
}

#[tokio::test]
async fn test_confirm_renewal_runs_continuity_check() {
    let renewal = format!("{}..0", ORDER_ID);
    let h = harness(|log| {
        MockPublisherService::new(log).with_subscription(subscription_state(&renewal, 1, true))
    });
    h.orders.set_subscriber_matches(false);

    let err = h
        .service
        .confirm_payment(&mut confirm_ctx(&renewal, PACKAGE_NAME, true))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SubscriberMismatch);
    assert!(events(&h.log).contains(&format!("check_sub_user:{}:{}", ORDER_ID, renewal)));
    assert_eq!(h.orders.count("invoke"), 0);
}

#[tokio::test]
async fn test_publisher_outage_is_retried() {
    let h = harness(|log| {
        MockPublisherService::new(log)
            .with_subscription(subscription_state(ORDER_ID, 1, true))
            .with_transient_failures(2)
    });

    h.service
        .confirm_payment(&mut confirm_ctx(ORDER_ID, PACKAGE_NAME, true))
        .await
        .unwrap();

    let verifications = events(&h.log)
        .iter()
        .filter(|e| e.starts_with("verify_subscription"))
        .count();
    assert_eq!(verifications, 3);
}

#[tokio::test]
async fn test_publisher_outage_exhausts_budget() {
    let h = harness(|log| {
        MockPublisherService::new(log)
            .with_subscription(subscription_state(ORDER_ID, 1, true))
            .with_transient_failures(5)
    });

    let err = h
        .service
        .confirm_payment(&mut confirm_ctx(ORDER_ID, PACKAGE_NAME, true))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Publisher);
    assert!(err.is_retryable());
    assert_eq!(events(&h.log).len(), 3);
}

#[tokio::test]
async fn test_confirm_product_acknowledges_product() {
    let h = harness(|log| {
        MockPublisherService::new(log).with_product(ProductPurchase {
            order_id: ORDER_ID.to_string(),
            purchase_state: 0,
            acknowledgement_state: 0,
            ..Default::default()
        })
    });

    h.service
        .confirm_payment(&mut confirm_ctx(ORDER_ID, PACKAGE_NAME, false))
        .await
        .unwrap();

    let log = events(&h.log);
    assert_eq!(log.first().map(String::as_str), Some("verify_product:vip.month"));
    assert_eq!(log.last().map(String::as_str), Some("ack_product:vip.month"));
}

#[tokio::test]
async fn test_confirm_rejects_order_id_not_issued_for_token() {
    // The token is genuine and its purchase has already been applied.
    let h = harness(|log| {
        MockPublisherService::new(log).with_subscription(subscription_state(ORDER_ID, 1, true))
    });
    h.orders.insert_order(ORDER_ID, true);

    for claimed in ["GPA.9999-0000-0000-00001", "GPA.9999-0000-0000-00002"] {
        let err = h
            .service
            .confirm_payment(&mut confirm_ctx(claimed, PACKAGE_NAME, true))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::IdentityMismatch);
        assert!(!err.is_retryable());
    }

    assert_eq!(h.orders.count("get_order"), 0);
    assert_eq!(h.orders.count("post_order"), 0);
    assert_eq!(h.orders.count("invoke"), 0);
}

#[tokio::test]
async fn test_confirm_product_rejects_order_id_not_issued_for_token() {
    let h = harness(|log| {
        MockPublisherService::new(log).with_product(ProductPurchase {
            order_id: ORDER_ID.to_string(),
            purchase_state: 0,
            acknowledgement_state: 1,
            ..Default::default()
        })
    });

    let err = h
        .service
        .confirm_payment(&mut confirm_ctx("GPA.9999-0000-0000-00001", PACKAGE_NAME, false))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::IdentityMismatch);
    assert_eq!(h.orders.count("post_order"), 0);
    assert_eq!(h.orders.count("invoke"), 0);
    assert!(!events(&h.log).iter().any(|e| e.starts_with("ack_")));
}

#[tokio::test]
async fn test_renewal_notification_invokes_then_acknowledges() {
    let renewal = format!("{}..1", ORDER_ID);
    let h = harness(|log| {
        MockPublisherService::new(log).with_subscription(subscription_state(&renewal, 1, false))
    });

    let outcome = h
        .service
        .handle_notification(&mut play_ctx(), &subscription_envelope(2), &[])
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        NotificationOutcome::Applied(ReconcileOutcome::Invoked { .. })
    ));
    let log = events(&h.log);
    let invoke_at = log
        .iter()
        .position(|e| e == &format!("invoke:{}", renewal))
        .unwrap();
    let ack_at = log
        .iter()
        .position(|e| e == "ack_subscription:vip.month")
        .unwrap();
    assert!(invoke_at < ack_at);
}

#[tokio::test]
async fn test_renewal_with_pending_payment_is_ignored() {
    let h = harness(|log| {
        MockPublisherService::new(log).with_subscription(subscription_state(ORDER_ID, 0, false))
    });

    let outcome = h
        .service
        .handle_notification(&mut play_ctx(), &subscription_envelope(2), &[])
        .await
        .unwrap();

    assert_eq!(
        outcome,
        NotificationOutcome::Ignored {
            event: LifecycleEvent::Renewed
        }
    );
    assert_eq!(
        events(&h.log),
        vec!["verify_subscription:vip.month".to_string()]
    );
}

#[tokio::test]
async fn test_cancellation_is_ignored_without_query() {
    let h = harness(MockPublisherService::new);

    let outcome = h
        .service
        .handle_notification(&mut play_ctx(), &subscription_envelope(3), &[])
        .await
        .unwrap();

    assert_eq!(
        outcome,
        NotificationOutcome::Ignored {
            event: LifecycleEvent::Canceled
        }
    );
    assert!(events(&h.log).is_empty());
}

#[tokio::test]
async fn test_revocation_of_trial_revokes_order() {
    let h = harness(|log| {
        MockPublisherService::new(log).with_subscription(subscription_state(ORDER_ID, 2, true))
    });
    h.orders.insert_order(ORDER_ID, true);

    let outcome = h
        .service
        .handle_notification(&mut play_ctx(), &subscription_envelope(12), &[])
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        NotificationOutcome::Applied(ReconcileOutcome::Revoked { .. })
    ));
    assert!(!h.orders.order(ORDER_ID).unwrap().paid);
}

#[tokio::test]
async fn test_foreign_package_notification_is_ignored() {
    let h = harness(MockPublisherService::new);
    let foreign = envelope(DeveloperNotification {
        package_name: "com.other.app".to_string(),
        subscription_notification: Some(SubscriptionNotification {
            notification_type: 2,
            subscription_id: "vip.month".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    });

    let outcome = h
        .service
        .handle_notification(&mut play_ctx(), &foreign, &[])
        .await
        .unwrap();

    assert!(matches!(outcome, NotificationOutcome::Ignored { .. }));
    assert!(events(&h.log).is_empty());
}

#[tokio::test]
async fn test_test_notification_is_ignored() {
    let h = harness(MockPublisherService::new);
    let ping = envelope(DeveloperNotification {
        package_name: PACKAGE_NAME.to_string(),
        test_notification: Some(TestNotification {
            version: "1.0".to_string(),
        }),
        ..Default::default()
    });

    let outcome = h
        .service
        .handle_notification(&mut play_ctx(), &ping, &[])
        .await
        .unwrap();

    assert_eq!(
        outcome,
        NotificationOutcome::Ignored {
            event: LifecycleEvent::Test
        }
    );
}

#[tokio::test]
async fn test_filter_drops_notification() {
    let h = harness(MockPublisherService::new);
    let deny_all = |_: &DeveloperNotification| false;

    let outcome = h
        .service
        .handle_notification(&mut play_ctx(), &subscription_envelope(2), &[&deny_all])
        .await
        .unwrap();

    assert_eq!(outcome, NotificationOutcome::Filtered);
    assert!(events(&h.log).is_empty());
}

#[tokio::test]
async fn test_product_notification_applies_unacknowledged_purchase() {
    let h = harness(|log| {
        MockPublisherService::new(log).with_product(ProductPurchase {
            order_id: ORDER_ID.to_string(),
            purchase_state: 0,
            acknowledgement_state: 0,
            ..Default::default()
        })
    });
    let notification = envelope(DeveloperNotification {
        package_name: PACKAGE_NAME.to_string(),
        one_time_product_notification: Some(OneTimeProductNotification {
            version: "1.0".to_string(),
            notification_type: 1,
            purchase_token: "opaque-purchase-token-0123456789".to_string(),
            sku: "coins.100".to_string(),
        }),
        ..Default::default()
    });

    let outcome = h
        .service
        .handle_notification(&mut play_ctx(), &notification, &[])
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        NotificationOutcome::Applied(ReconcileOutcome::Invoked { .. })
    ));
    assert_eq!(
        events(&h.log).last().map(String::as_str),
        Some("ack_product:coins.100")
    );
}

#[tokio::test]
async fn test_acknowledged_product_notification_is_ignored() {
    let h = harness(|log| {
        MockPublisherService::new(log).with_product(ProductPurchase {
            order_id: ORDER_ID.to_string(),
            purchase_state: 0,
            acknowledgement_state: 1,
            ..Default::default()
        })
    });
    let notification = envelope(DeveloperNotification {
        package_name: PACKAGE_NAME.to_string(),
        one_time_product_notification: Some(OneTimeProductNotification {
            notification_type: 1,
            sku: "coins.100".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    });

    let outcome = h
        .service
        .handle_notification(&mut play_ctx(), &notification, &[])
        .await
        .unwrap();

    assert!(matches!(outcome, NotificationOutcome::Ignored { .. }));
    assert_eq!(h.orders.count("invoke"), 0);
}
