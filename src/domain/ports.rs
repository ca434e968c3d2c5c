//! Collaborator traits the engine is written against.
//!
//! Every store method is a suspension point. Methods named `*_if` are
//! compare-and-set writes: they apply only when the stored row still matches
//! the expected snapshot and return `false` otherwise. They are the only
//! concurrency control the engine relies on.

use super::actor::{ADMIN_ROLES, Actor, Role};
use super::commission::RemittanceType;
use super::history::{StatusChange, TransitionEvent};
use super::inventory::{
    BundleComponent, InventoryMovement, InventoryRecord, MovementReference, StockLevels,
};
use super::order::{Order, OrderItem, OrderState};
use super::payment_account::{
    AccountCounters, AccountTransaction, AccountTransactionStatus, PaymentAccount, TypeClass,
};
use super::remittance::{Remittance, RemittanceStatus};
use crate::domain::actor::UserId;
use crate::error::{NotifyError, Result, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts an order with its lines. A duplicate order number fails with
    /// `StoreError::UniqueViolation`.
    async fn insert_order(&self, order: Order, items: Vec<OrderItem>) -> StoreResult<()>;
    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>>;
    async fn order_items(&self, order_id: Uuid) -> StoreResult<Vec<OrderItem>>;
    async fn update_order_if(&self, order: &Order, expected: OrderState) -> StoreResult<bool>;
    async fn link_item_inventory(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        inventory_id: Uuid,
    ) -> StoreResult<()>;
    /// Removes an order and its lines; used to compensate a failed checkout.
    async fn delete_order(&self, id: Uuid) -> StoreResult<()>;
    async fn orders_for_owner(&self, owner: UserId) -> StoreResult<Vec<Order>>;
    async fn all_orders(&self) -> StoreResult<Vec<Order>>;
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn upsert_record(&self, record: InventoryRecord) -> StoreResult<()>;
    /// Batched lookup: one query for every product in the slice.
    async fn find_by_products(&self, product_ids: &[Uuid]) -> StoreResult<Vec<InventoryRecord>>;
    async fn get_record(&self, inventory_id: Uuid) -> StoreResult<Option<InventoryRecord>>;
    async fn update_record_if(
        &self,
        record: &InventoryRecord,
        expected: StockLevels,
    ) -> StoreResult<bool>;
    async fn append_movement(&self, movement: InventoryMovement) -> StoreResult<()>;
    async fn movements_for(
        &self,
        reference: MovementReference,
    ) -> StoreResult<Vec<InventoryMovement>>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn put_bundle(&self, bundle_id: Uuid, components: Vec<BundleComponent>)
    -> StoreResult<()>;
    /// Batched lookup: the components of every bundle in the slice.
    async fn bundle_components(&self, bundle_ids: &[Uuid]) -> StoreResult<Vec<BundleComponent>>;
}

#[async_trait]
pub trait RemittanceStore: Send + Sync {
    /// A duplicate reference fails with `StoreError::UniqueViolation`.
    async fn insert_remittance(&self, remittance: Remittance) -> StoreResult<()>;
    async fn get_remittance(&self, id: Uuid) -> StoreResult<Option<Remittance>>;
    async fn update_remittance_if(
        &self,
        remittance: &Remittance,
        expected: RemittanceStatus,
    ) -> StoreResult<bool>;
    async fn remittances_by_status(&self, status: RemittanceStatus)
    -> StoreResult<Vec<Remittance>>;
    async fn remittances_for_owner(&self, owner: UserId) -> StoreResult<Vec<Remittance>>;
    async fn all_remittances(&self) -> StoreResult<Vec<Remittance>>;
    async fn put_type(&self, kind: RemittanceType) -> StoreResult<()>;
    async fn get_type(&self, id: Uuid) -> StoreResult<Option<RemittanceType>>;
    async fn list_types(&self) -> StoreResult<Vec<RemittanceType>>;
}

#[async_trait]
pub trait PaymentAccountStore: Send + Sync {
    async fn put_account(&self, account: PaymentAccount) -> StoreResult<()>;
    async fn get_account(&self, id: Uuid) -> StoreResult<Option<PaymentAccount>>;
    /// Active accounts flagged for `class`.
    async fn accounts_for_class(&self, class: TypeClass) -> StoreResult<Vec<PaymentAccount>>;
    async fn all_accounts(&self) -> StoreResult<Vec<PaymentAccount>>;
    async fn update_counters_if(
        &self,
        account_id: Uuid,
        expected: AccountCounters,
        new: AccountCounters,
    ) -> StoreResult<bool>;
    async fn insert_transaction(&self, transaction: AccountTransaction) -> StoreResult<()>;
    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<AccountTransaction>>;
    async fn update_transaction_status_if(
        &self,
        id: Uuid,
        expected: AccountTransactionStatus,
        new: AccountTransactionStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;
    async fn transactions_for_account(
        &self,
        account_id: Uuid,
    ) -> StoreResult<Vec<AccountTransaction>>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append_change(&self, change: StatusChange) -> StoreResult<()>;
    async fn changes_for(&self, aggregate_id: Uuid) -> StoreResult<Vec<StatusChange>>;
}

/// Outbound messages about transitions. Best-effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &TransitionEvent) -> std::result::Result<(), NotifyError>;
}

/// Role checks for every back-office operation.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Fails with `AuthorizationFailed` unless `actor` holds one of `allowed`.
    async fn require_role(&self, actor: &Actor, allowed: &[Role]) -> Result<()>;

    async fn require_admin(&self, actor: &Actor) -> Result<()> {
        self.require_role(actor, ADMIN_ROLES).await
    }
}

/// Recipient-side check for delivery confirmation.
#[async_trait]
pub trait RecipientVerifier: Send + Sync {
    async fn verify(&self, remittance: &Remittance, token: &str) -> Result<bool>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type InventoryStoreRef = Arc<dyn InventoryStore>;
pub type CatalogStoreRef = Arc<dyn CatalogStore>;
pub type RemittanceStoreRef = Arc<dyn RemittanceStore>;
pub type PaymentAccountStoreRef = Arc<dyn PaymentAccountStore>;
pub type HistoryStoreRef = Arc<dyn HistoryStore>;

/// Every collaborator the services need, shared by `Arc`.
#[derive(Clone)]
pub struct Collaborators {
    pub orders: OrderStoreRef,
    pub inventory: InventoryStoreRef,
    pub catalog: CatalogStoreRef,
    pub remittances: RemittanceStoreRef,
    pub accounts: PaymentAccountStoreRef,
    pub history: HistoryStoreRef,
    pub notifier: Arc<dyn Notifier>,
    pub authorizer: Arc<dyn Authorizer>,
    pub recipients: Arc<dyn RecipientVerifier>,
    pub clock: Arc<dyn Clock>,
}
