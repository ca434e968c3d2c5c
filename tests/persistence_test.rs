#![cfg(feature = "storage-rocksdb")]

mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use chrono::Duration;
use common::{payment_account, product_line, remittance_type, start};
use fulfillment::application::engine::FulfillmentEngine;
use fulfillment::config::EngineConfig;
use fulfillment::domain::actor::{Actor, UserId};
use fulfillment::domain::inventory::InventoryRecord;
use fulfillment::domain::order::{NewOrder, PaymentStatus, Recipient};
use fulfillment::domain::payment_account::AccountTransactionStatus;
use fulfillment::domain::ports::{
    InventoryStore, OrderStore, PaymentAccountStore, RemittanceStore,
};
use fulfillment::domain::remittance::{NewRemittance, RemittanceRecipient, RemittanceStatus};
use fulfillment::infrastructure::clock::ManualClock;
use fulfillment::infrastructure::rocksdb::RocksDBStore;
use predicates::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::process::Command;
use std::sync::Arc;
use tempfile::tempdir;
use uuid::Uuid;

fn engine_over(store: &RocksDBStore, clock: &ManualClock) -> FulfillmentEngine {
    let store = Arc::new(store.clone());
    let collaborators = fulfillment::domain::ports::Collaborators {
        orders: store.clone(),
        inventory: store.clone(),
        catalog: store.clone(),
        remittances: store.clone(),
        accounts: store.clone(),
        history: store,
        notifier: Arc::new(fulfillment::infrastructure::notifier::TracingNotifier),
        authorizer: Arc::new(fulfillment::application::authorization::RoleAuthorizer),
        recipients: Arc::new(fulfillment::application::authorization::TokenRecipientVerifier),
        clock: Arc::new(clock.clone()),
    };
    FulfillmentEngine::new(collaborators, EngineConfig::default())
}

#[tokio::test]
async fn test_order_lifecycle_survives_reopen() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("fulfillment_db");
    let clock = ManualClock::new(start());
    let customer = Actor::customer(UserId::new());
    let admin = Actor::admin(UserId::new());
    let product = Uuid::new_v4();

    let (order_id, transaction_id) = {
        let store = RocksDBStore::open(&db_path).unwrap();
        store
            .upsert_record(InventoryRecord::new(product, 6, start()))
            .await
            .unwrap();
        store.put_account(payment_account(1, dec!(1000))).await.unwrap();
        let engine = engine_over(&store, &clock);

        let order = engine
            .orders()
            .create_order(
                &customer,
                NewOrder {
                    owner: customer.id,
                    currency: "USD".to_string(),
                    items: vec![product_line(product, 4, dec!(12.50))],
                    discount: Decimal::ZERO,
                    shipping: Decimal::ZERO,
                    tax: Decimal::ZERO,
                    recipient: Recipient {
                        name: "Maria Lopez".to_string(),
                        phone: "+5351234567".to_string(),
                        ..Default::default()
                    },
                },
            )
            .await
            .unwrap();
        clock.advance(Duration::minutes(5));
        engine
            .orders()
            .upload_payment_proof(order.id, &customer, "proofs/order.png")
            .await
            .unwrap();
        (order.id, order.account_transaction_id.unwrap())
    };

    let store = RocksDBStore::open(&db_path).unwrap();
    let stored = store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::ProofUploaded);
    assert_eq!(stored.total, dec!(50));
    let record = store.find_by_products(&[product]).await.unwrap().pop().unwrap();
    assert_eq!(record.reserved_quantity, 4);
    let items = store.order_items(order_id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].inventory_id, Some(record.id));

    clock.advance(Duration::minutes(5));
    let engine = engine_over(&store, &clock);
    engine.orders().validate_payment(order_id, &admin).await.unwrap();

    let record = store.find_by_products(&[product]).await.unwrap().pop().unwrap();
    assert_eq!(record.quantity, 2);
    assert_eq!(record.reserved_quantity, 0);
    let transaction = store.get_transaction(transaction_id).await.unwrap().unwrap();
    assert_eq!(transaction.status, AccountTransactionStatus::Validated);

    let history = engine.orders().history(order_id, &customer).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history.last().unwrap().to, "VALIDATED");
}

#[tokio::test]
async fn test_remittance_reference_is_unique_across_reopen() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("fulfillment_db");
    let clock = ManualClock::new(start());
    let customer = Actor::customer(UserId::new());
    let kind = remittance_type();

    let request = |amount| NewRemittance {
        owner: customer.id,
        remittance_type_id: kind.id,
        amount,
        recipient: RemittanceRecipient {
            name: "Jorge Perez".to_string(),
            phone: "+5357654321".to_string(),
            ..Default::default()
        },
    };

    let first = {
        let store = RocksDBStore::open(&db_path).unwrap();
        store.put_type(kind.clone()).await.unwrap();
        engine_over(&store, &clock)
            .remittances()
            .create_remittance(&customer, request(dec!(100)))
            .await
            .unwrap()
    };

    let store = RocksDBStore::open(&db_path).unwrap();
    let second = engine_over(&store, &clock)
        .remittances()
        .create_remittance(&customer, request(dec!(40)))
        .await
        .unwrap();

    assert_ne!(first.reference, second.reference);
    let mine = store.remittances_for_owner(customer.id).await.unwrap();
    assert_eq!(mine.len(), 2);
    let created = store.remittances_by_status(RemittanceStatus::Created).await.unwrap();
    assert_eq!(created.len(), 2);
    assert_eq!(first.commission.total_charged, dec!(107));
}

#[tokio::test]
async fn test_cli_reads_accounts_from_database() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("fulfillment_db");
    let preferred = payment_account(1, dec!(300));
    {
        let store = RocksDBStore::open(&db_path).unwrap();
        store.put_account(preferred.clone()).await.unwrap();
        store.put_account(payment_account(4, dec!(300))).await.unwrap();
    }

    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("select-account")
        .arg("--db-path")
        .arg(&db_path)
        .args(["--class", "product", "--amount", "120", "--date", "2026-03-10"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "{},Holder 1,BANDEC,1,300,9000",
            preferred.id
        )));
}
