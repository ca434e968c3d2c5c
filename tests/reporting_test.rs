mod common;

use chrono::Duration;
use common::{Harness, day, payment_account, product_line, remittance_type};
use fulfillment::error::ErrorKind;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_order_summary_counts_and_revenue() {
    let h = Harness::new();
    let product = h.stock(20).await;
    let orders = h.engine.orders();

    let paid = orders
        .create_order(&h.customer, h.order_request(vec![product_line(product, 3, dec!(10))]))
        .await
        .unwrap();
    orders
        .upload_payment_proof(paid.id, &h.customer, "proofs/paid.png")
        .await
        .unwrap();
    orders.validate_payment(paid.id, &h.admin).await.unwrap();

    orders
        .create_order(&h.customer, h.order_request(vec![product_line(product, 1, dec!(10))]))
        .await
        .unwrap();

    let dropped = orders
        .create_order(&h.customer, h.order_request(vec![product_line(product, 2, dec!(10))]))
        .await
        .unwrap();
    orders
        .cancel_order(dropped.id, &h.customer, Some("changed my mind"))
        .await
        .unwrap();

    let summary = h.engine.reporting().order_summary(&h.admin).await.unwrap();
    assert_eq!(summary.by_status["PENDING"], 2);
    assert_eq!(summary.by_status["CANCELLED"], 1);
    assert_eq!(summary.by_status["SHIPPED"], 0);
    assert_eq!(summary.by_payment_status["VALIDATED"], 1);
    assert_eq!(summary.by_payment_status["PENDING"], 2);
    assert_eq!(summary.validated_revenue.get("USD"), Some(&dec!(30)));
}

#[tokio::test]
async fn test_remittance_summary_counts_validated_money() {
    let h = Harness::new();
    h.add_account(payment_account(1, dec!(5000))).await;
    let kind = h.add_type(remittance_type()).await;
    let remittances = h.engine.remittances();

    let sent = remittances
        .create_remittance(&h.customer, h.remittance_request(kind.id, dec!(100)))
        .await
        .unwrap();
    remittances
        .upload_payment_proof(sent.id, &h.customer, "proofs/transfer.jpg")
        .await
        .unwrap();
    remittances.validate_payment(sent.id, &h.admin).await.unwrap();
    remittances
        .start_processing(sent.id, &h.admin, None)
        .await
        .unwrap();

    remittances
        .create_remittance(&h.customer, h.remittance_request(kind.id, dec!(200)))
        .await
        .unwrap();

    let summary = h.engine.reporting().remittance_summary(&h.admin).await.unwrap();
    assert_eq!(summary.by_status["PROCESSING"], 1);
    assert_eq!(summary.by_status["CREATED"], 1);
    assert_eq!(summary.by_status["COMPLETED"], 0);
    assert_eq!(summary.validated_amount.get("USD"), Some(&dec!(100)));
    assert_eq!(summary.validated_commission.get("USD"), Some(&dec!(7)));
}

#[tokio::test]
async fn test_account_utilization_reads_due_resets_as_zero() {
    let h = Harness::new();
    let mut stale = payment_account(2, dec!(100));
    stale.current_daily_total = dec!(80);
    stale.current_monthly_total = dec!(80);
    let stale = h.add_account(stale).await;
    h.clock.advance(Duration::days(1));

    let mut fresh = payment_account(1, dec!(100));
    fresh.current_daily_total = dec!(40);
    fresh.current_monthly_total = dec!(120);
    fresh.last_reset_date = day(2026, 3, 11);
    let fresh = h.add_account(fresh).await;

    let report = h.engine.reporting().account_utilization(&h.admin).await.unwrap();
    assert_eq!(report.len(), 2);
    assert_eq!(report[0].account_id, fresh.id);
    assert_eq!(report[0].daily_used, dec!(40));
    assert_eq!(report[0].monthly_used, dec!(120));
    assert_eq!(report[1].account_id, stale.id);
    assert_eq!(report[1].daily_used, dec!(0));
    assert_eq!(report[1].monthly_used, dec!(80));

    let stored = h.account(stale.id).await;
    assert_eq!(stored.current_daily_total, dec!(80));
}

#[tokio::test]
async fn test_reports_require_admin() {
    let h = Harness::new();
    let reporting = h.engine.reporting();

    let err = reporting.order_summary(&h.customer).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthorizationFailed);
    assert!(reporting.remittance_summary(&h.customer).await.is_err());
    assert!(reporting.account_utilization(&h.customer).await.is_err());
}
