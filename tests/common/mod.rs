#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use fulfillment::application::engine::FulfillmentEngine;
use fulfillment::config::EngineConfig;
use fulfillment::domain::actor::{Actor, UserId};
use fulfillment::domain::commission::RemittanceType;
use fulfillment::domain::inventory::{BundleComponent, InventoryRecord};
use fulfillment::domain::order::{ItemRef, NewOrder, NewOrderItem, Recipient};
use fulfillment::domain::payment_account::PaymentAccount;
use fulfillment::domain::ports::{CatalogStore, InventoryStore, PaymentAccountStore, RemittanceStore};
use fulfillment::domain::remittance::{NewRemittance, RemittanceRecipient};
use fulfillment::infrastructure::clock::ManualClock;
use fulfillment::infrastructure::in_memory::InMemoryStore;
use fulfillment::infrastructure::notifier::RecordingNotifier;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// An engine over a fresh in-memory store, a manual clock and a customer
/// plus an admin.
pub struct Harness {
    pub engine: FulfillmentEngine,
    pub store: InMemoryStore,
    pub clock: ManualClock,
    pub notifier: RecordingNotifier,
    pub customer: Actor,
    pub admin: Actor,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = InMemoryStore::new();
        let clock = ManualClock::new(start());
        let notifier = RecordingNotifier::new();
        let collaborators = store.collaborators_with(Arc::new(clock.clone()), Arc::new(notifier.clone()));
        Self {
            engine: FulfillmentEngine::new(collaborators, config),
            store,
            clock,
            notifier,
            customer: Actor::customer(UserId::new()),
            admin: Actor::admin(UserId::new()),
        }
    }

    /// A product with `quantity` units on hand.
    pub async fn stock(&self, quantity: u32) -> Uuid {
        let product = Uuid::new_v4();
        self.store
            .upsert_record(InventoryRecord::new(product, quantity, start()))
            .await
            .unwrap();
        product
    }

    pub async fn inventory(&self, product: Uuid) -> InventoryRecord {
        self.store
            .find_by_products(&[product])
            .await
            .unwrap()
            .into_iter()
            .next()
            .unwrap()
    }

    pub async fn bundle(&self, components: &[(Uuid, u32)]) -> Uuid {
        let bundle_id = Uuid::new_v4();
        let components = components
            .iter()
            .map(|(product_id, quantity)| BundleComponent {
                bundle_id,
                product_id: *product_id,
                quantity: *quantity,
            })
            .collect();
        self.store.put_bundle(bundle_id, components).await.unwrap();
        bundle_id
    }

    pub async fn add_account(&self, account: PaymentAccount) -> PaymentAccount {
        self.store.put_account(account.clone()).await.unwrap();
        account
    }

    pub async fn account(&self, id: Uuid) -> PaymentAccount {
        self.store.get_account(id).await.unwrap().unwrap()
    }

    pub async fn add_type(&self, kind: RemittanceType) -> RemittanceType {
        self.store.put_type(kind.clone()).await.unwrap();
        kind
    }

    pub fn order_request(&self, items: Vec<NewOrderItem>) -> NewOrder {
        NewOrder {
            owner: self.customer.id,
            currency: "USD".to_string(),
            items,
            discount: Decimal::ZERO,
            shipping: Decimal::ZERO,
            tax: Decimal::ZERO,
            recipient: Recipient {
                name: "Maria Lopez".to_string(),
                phone: "+5351234567".to_string(),
                ..Default::default()
            },
        }
    }

    pub fn remittance_request(&self, type_id: Uuid, amount: Decimal) -> NewRemittance {
        NewRemittance {
            owner: self.customer.id,
            remittance_type_id: type_id,
            amount,
            recipient: RemittanceRecipient {
                name: "Jorge Perez".to_string(),
                phone: "+5357654321".to_string(),
                ..Default::default()
            },
        }
    }
}

pub fn product_line(product: Uuid, quantity: u32, unit_price: Decimal) -> NewOrderItem {
    NewOrderItem {
        item: ItemRef::Product(product),
        name: format!("product {}", &product.to_string()[..8]),
        quantity,
        unit_price,
    }
}

pub fn bundle_line(bundle: Uuid, quantity: u32, unit_price: Decimal) -> NewOrderItem {
    NewOrderItem {
        item: ItemRef::Bundle(bundle),
        name: format!("bundle {}", &bundle.to_string()[..8]),
        quantity,
        unit_price,
    }
}

/// An active account that takes both classes, with nothing registered yet.
pub fn payment_account(priority: i32, daily_limit: Decimal) -> PaymentAccount {
    PaymentAccount {
        id: Uuid::new_v4(),
        holder_name: format!("Holder {}", priority),
        bank_name: "BANDEC".to_string(),
        account_number: format!("9205-1299-{:04}", priority),
        phone: None,
        is_active: true,
        accepts_remittances: true,
        accepts_products: true,
        daily_limit,
        monthly_limit: daily_limit * dec!(30),
        security_limit: daily_limit,
        current_daily_total: Decimal::ZERO,
        current_monthly_total: Decimal::ZERO,
        priority,
        last_reset_date: start().date_naive(),
        last_used_at: None,
    }
}

pub fn remittance_type() -> RemittanceType {
    RemittanceType {
        id: Uuid::new_v4(),
        name: "Cash pickup".to_string(),
        currency: "USD".to_string(),
        commission_fixed: dec!(2),
        commission_percentage: dec!(5),
        min_amount: dec!(10),
        max_amount: dec!(1000),
        is_active: true,
    }
}
