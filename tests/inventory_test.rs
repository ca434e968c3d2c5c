mod common;

use common::Harness;
use fulfillment::domain::inventory::{MovementReference, MovementType};
use fulfillment::domain::order::{ItemRef, OrderItem};
use fulfillment::domain::ports::InventoryStore;
use fulfillment::error::{ErrorKind, FulfillmentError};
use rust_decimal_macros::dec;
use uuid::Uuid;

fn item(item: ItemRef, quantity: u32) -> OrderItem {
    OrderItem {
        id: Uuid::new_v4(),
        order_id: Uuid::new_v4(),
        item,
        name: "line".to_string(),
        quantity,
        unit_price: dec!(1),
        total_price: rust_decimal::Decimal::from(quantity),
        inventory_id: None,
    }
}

#[tokio::test]
async fn test_reserve_shortage_leaves_record_unchanged() {
    let h = Harness::new();
    let product = h.stock(2).await;
    let before = h.inventory(product).await;
    let order = MovementReference::Order(Uuid::new_v4());

    let err = h
        .engine
        .inventory()
        .reserve(product, 3, order, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FulfillmentError::InsufficientStock {
            requested: 3,
            available: 2,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::InsufficientStock);

    let after = h.inventory(product).await;
    assert_eq!(after.levels(), before.levels());
    assert!(h.store.movements_for(order).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reserve_release_is_net_zero_with_movements() {
    let h = Harness::new();
    let product = h.stock(5).await;
    let order = MovementReference::Order(Uuid::new_v4());
    let ledger = h.engine.inventory();

    let held = ledger.reserve(product, 3, order, Some(h.customer.id)).await.unwrap();
    assert_eq!(held.reserved_quantity, 3);
    assert_eq!(held.available(), 2);

    let released = ledger.release(product, 3, order, None).await.unwrap();
    assert_eq!(released.quantity, 5);
    assert_eq!(released.reserved_quantity, 0);

    let movements = h.store.movements_for(order).await.unwrap();
    let deltas: Vec<(MovementType, i64)> = movements.iter().map(|m| (m.movement_type, m.delta)).collect();
    assert_eq!(deltas, vec![(MovementType::Reserve, 3), (MovementType::Release, -3)]);
    assert_eq!(movements[0].actor, Some(h.customer.id));
    assert!(movements.iter().all(|m| m.product_id == product));
}

#[tokio::test]
async fn test_reduce_consumes_reserved_stock() {
    let h = Harness::new();
    let product = h.stock(5).await;
    let order = MovementReference::Order(Uuid::new_v4());
    let ledger = h.engine.inventory();

    ledger.reserve(product, 4, order, None).await.unwrap();
    let reduced = ledger.reduce(product, 4, order, None).await.unwrap();
    assert_eq!(reduced.quantity, 1);
    assert_eq!(reduced.reserved_quantity, 0);

    let last = h.store.movements_for(order).await.unwrap().pop().unwrap();
    assert_eq!(last.movement_type, MovementType::Reduce);
    assert_eq!(last.delta, -4);

    let err = ledger.reduce(product, 1, order, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientStock);
    assert_eq!(h.inventory(product).await.quantity, 1);
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let h = Harness::new();
    let err = h
        .engine
        .inventory()
        .reserve(Uuid::new_v4(), 1, MovementReference::Order(Uuid::new_v4()), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_expand_aggregates_products_across_bundles() {
    let h = Harness::new();
    let rice = h.stock(100).await;
    let beans = h.stock(100).await;
    let oil = h.stock(100).await;
    let family_pack = h.bundle(&[(rice, 2), (beans, 1)]).await;
    let kitchen_pack = h.bundle(&[(beans, 3), (oil, 1)]).await;

    let items = vec![
        item(ItemRef::Bundle(family_pack), 2),
        item(ItemRef::Bundle(kitchen_pack), 1),
        item(ItemRef::Product(rice), 1),
        item(ItemRef::Bundle(family_pack), 1),
    ];
    h.store.stats().reset();
    let expanded = h.engine.inventory().expand(&items).await.unwrap();

    let quantity_of = |product: Uuid| {
        expanded
            .lines
            .iter()
            .find(|line| line.product_id == product)
            .map(|line| line.quantity)
    };
    assert_eq!(expanded.lines.len(), 3);
    assert_eq!(quantity_of(rice), Some(7));
    assert_eq!(quantity_of(beans), Some(6));
    assert_eq!(quantity_of(oil), Some(1));
    assert_eq!(expanded.records.len(), 3);

    let counts = h.store.stats().snapshot();
    assert_eq!(counts.bundle_components, 1);
    assert_eq!(counts.find_by_products, 1);
    assert_eq!(counts.get_record, 0);
}

#[tokio::test]
async fn test_expand_products_only_skips_bundle_lookup() {
    let h = Harness::new();
    let product = h.stock(10).await;
    h.store.stats().reset();

    let expanded = h
        .engine
        .inventory()
        .expand(&[item(ItemRef::Product(product), 2)])
        .await
        .unwrap();
    assert_eq!(expanded.lines.len(), 1);
    assert_eq!(h.store.stats().snapshot().bundle_components, 0);
}

#[tokio::test]
async fn test_empty_bundle_fails_validation() {
    let h = Harness::new();
    let empty = h.bundle(&[]).await;
    let err = h
        .engine
        .inventory()
        .expand(&[item(ItemRef::Bundle(empty), 1)])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);

    let unknown = h
        .engine
        .inventory()
        .expand(&[item(ItemRef::Bundle(Uuid::new_v4()), 1)])
        .await
        .unwrap_err();
    assert_eq!(unknown.kind(), ErrorKind::ValidationFailed);
}

#[tokio::test]
async fn test_apply_all_compensates_applied_lines() {
    let h = Harness::new();
    let plenty = h.stock(5).await;
    let scarce = h.stock(1).await;
    let order = MovementReference::Order(Uuid::new_v4());
    let ledger = h.engine.inventory();

    let expanded = ledger
        .expand(&[item(ItemRef::Product(plenty), 3), item(ItemRef::Product(scarce), 2)])
        .await
        .unwrap();
    let err = ledger
        .apply_all(&expanded, MovementType::Reserve, order, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientStock);

    for product in [plenty, scarce] {
        assert_eq!(h.inventory(product).await.reserved_quantity, 0);
    }
    let net: i64 = h
        .store
        .movements_for(order)
        .await
        .unwrap()
        .iter()
        .map(|m| m.delta)
        .sum();
    assert_eq!(net, 0);
}

#[tokio::test]
async fn test_apply_all_retries_stale_snapshot() {
    let h = Harness::new();
    let product = h.stock(10).await;
    let ledger = h.engine.inventory();

    let expanded = ledger
        .expand(&[item(ItemRef::Product(product), 4)])
        .await
        .unwrap();
    ledger
        .reserve(product, 5, MovementReference::Order(Uuid::new_v4()), None)
        .await
        .unwrap();

    h.store.stats().reset();
    ledger
        .apply_all(&expanded, MovementType::Reserve, MovementReference::Order(Uuid::new_v4()), None)
        .await
        .unwrap();

    let record = h.inventory(product).await;
    assert_eq!(record.reserved_quantity, 9);
    assert_eq!(record.available(), 1);
    let counts = h.store.stats().snapshot();
    assert_eq!(counts.update_record_if, 2);
    assert_eq!(counts.get_record, 1);
}

#[tokio::test]
async fn test_concurrent_reservations_never_oversell() {
    let h = Harness::new();
    let product = h.stock(5).await;
    let ledger = h.engine.inventory();
    let reserve = || ledger.reserve(product, 2, MovementReference::Order(Uuid::new_v4()), None);

    let (a, b, c) = tokio::join!(reserve(), reserve(), reserve());
    let accepted = [a.is_ok(), b.is_ok(), c.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(accepted, 2);

    let record = h.inventory(product).await;
    assert_eq!(record.reserved_quantity, 4);
    assert!(record.reserved_quantity <= record.quantity);
}
