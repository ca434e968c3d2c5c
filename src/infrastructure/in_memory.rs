use crate::application::authorization::{RoleAuthorizer, TokenRecipientVerifier};
use crate::domain::actor::UserId;
use crate::domain::commission::RemittanceType;
use crate::domain::history::StatusChange;
use crate::domain::inventory::{
    BundleComponent, InventoryMovement, InventoryRecord, MovementReference, StockLevels,
};
use crate::domain::order::{Order, OrderItem, OrderState};
use crate::domain::payment_account::{
    AccountCounters, AccountTransaction, AccountTransactionStatus, PaymentAccount, TypeClass,
};
use crate::domain::ports::{
    CatalogStore, Clock, Collaborators, HistoryStore, InventoryStore, Notifier, OrderStore,
    PaymentAccountStore, RemittanceStore,
};
use crate::domain::remittance::{Remittance, RemittanceStatus};
use crate::error::{StoreError, StoreResult};
use crate::infrastructure::notifier::TracingNotifier;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Number of store calls made, by method. Lets tests assert that bundle
/// expansion stays batched.
#[derive(Debug, Default)]
pub struct QueryStats {
    bundle_components: AtomicUsize,
    find_by_products: AtomicUsize,
    get_record: AtomicUsize,
    update_record_if: AtomicUsize,
}

/// Point-in-time copy of [`QueryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryCounts {
    pub bundle_components: usize,
    pub find_by_products: usize,
    pub get_record: usize,
    pub update_record_if: usize,
}

impl QueryStats {
    pub fn snapshot(&self) -> QueryCounts {
        QueryCounts {
            bundle_components: self.bundle_components.load(Ordering::SeqCst),
            find_by_products: self.find_by_products.load(Ordering::SeqCst),
            get_record: self.get_record.load(Ordering::SeqCst),
            update_record_if: self.update_record_if.load(Ordering::SeqCst),
        }
    }

    pub fn reset(&self) {
        self.bundle_components.store(0, Ordering::SeqCst);
        self.find_by_products.store(0, Ordering::SeqCst);
        self.get_record.store(0, Ordering::SeqCst);
        self.update_record_if.store(0, Ordering::SeqCst);
    }

    fn hit(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// A thread-safe in-memory implementation of every store port.
///
/// Each table is an `Arc<RwLock<HashMap<..>>>`; compare-and-set methods hold
/// the table's write lock across the compare and the write, which makes them
/// atomic. `Clone` shares the tables.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    orders: Arc<RwLock<HashMap<Uuid, Order>>>,
    order_items: Arc<RwLock<HashMap<Uuid, Vec<OrderItem>>>>,
    inventory: Arc<RwLock<HashMap<Uuid, InventoryRecord>>>,
    movements: Arc<RwLock<Vec<InventoryMovement>>>,
    bundles: Arc<RwLock<HashMap<Uuid, Vec<BundleComponent>>>>,
    remittances: Arc<RwLock<HashMap<Uuid, Remittance>>>,
    remittance_types: Arc<RwLock<HashMap<Uuid, RemittanceType>>>,
    accounts: Arc<RwLock<HashMap<Uuid, PaymentAccount>>>,
    transactions: Arc<RwLock<HashMap<Uuid, AccountTransaction>>>,
    history: Arc<RwLock<Vec<StatusChange>>>,
    stats: Arc<QueryStats>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &QueryStats {
        &self.stats
    }

    /// Every collaborator backed by this store, with role-based
    /// authorization, token recipient checks and log-only notifications.
    pub fn collaborators(&self, clock: Arc<dyn Clock>) -> Collaborators {
        self.collaborators_with(clock, Arc::new(TracingNotifier))
    }

    pub fn collaborators_with(&self, clock: Arc<dyn Clock>, notifier: Arc<dyn Notifier>) -> Collaborators {
        let store = Arc::new(self.clone());
        Collaborators {
            orders: store.clone(),
            inventory: store.clone(),
            catalog: store.clone(),
            remittances: store.clone(),
            accounts: store.clone(),
            history: store,
            notifier,
            authorizer: Arc::new(RoleAuthorizer),
            recipients: Arc::new(TokenRecipientVerifier),
            clock,
        }
    }

    pub async fn movements(&self) -> Vec<InventoryMovement> {
        self.movements.read().await.clone()
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_order(&self, order: Order, items: Vec<OrderItem>) -> StoreResult<()> {
        let mut orders = self.orders.write().await;
        if orders.values().any(|o| o.order_number == order.order_number) {
            return Err(StoreError::UniqueViolation(format!(
                "order_number {}",
                order.order_number
            )));
        }
        if orders.contains_key(&order.id) {
            return Err(StoreError::UniqueViolation(format!("order id {}", order.id)));
        }
        self.order_items.write().await.insert(order.id, items);
        orders.insert(order.id, order);
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn order_items(&self, order_id: Uuid) -> StoreResult<Vec<OrderItem>> {
        Ok(self
            .order_items
            .read()
            .await
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_order_if(&self, order: &Order, expected: OrderState) -> StoreResult<bool> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order.id) {
            Some(current) if current.state() == expected => {
                *current = order.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn link_item_inventory(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        inventory_id: Uuid,
    ) -> StoreResult<()> {
        let mut order_items = self.order_items.write().await;
        let item = order_items
            .get_mut(&order_id)
            .and_then(|items| items.iter_mut().find(|item| item.id == item_id))
            .ok_or_else(|| StoreError::ForeignKeyViolation(format!("order item {}", item_id)))?;
        item.inventory_id = Some(inventory_id);
        Ok(())
    }

    async fn delete_order(&self, id: Uuid) -> StoreResult<()> {
        let mut orders = self.orders.write().await;
        self.order_items.write().await.remove(&id);
        orders.remove(&id);
        Ok(())
    }

    async fn orders_for_owner(&self, owner: UserId) -> StoreResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.owner == owner)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(orders)
    }

    async fn all_orders(&self) -> StoreResult<Vec<Order>> {
        let mut orders: Vec<Order> = self.orders.read().await.values().cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(orders)
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn upsert_record(&self, record: InventoryRecord) -> StoreResult<()> {
        let mut inventory = self.inventory.write().await;
        if inventory
            .values()
            .any(|r| r.product_id == record.product_id && r.id != record.id)
        {
            return Err(StoreError::UniqueViolation(format!(
                "inventory product_id {}",
                record.product_id
            )));
        }
        inventory.insert(record.id, record);
        Ok(())
    }

    async fn find_by_products(&self, product_ids: &[Uuid]) -> StoreResult<Vec<InventoryRecord>> {
        QueryStats::hit(&self.stats.find_by_products);
        let inventory = self.inventory.read().await;
        Ok(inventory
            .values()
            .filter(|r| product_ids.contains(&r.product_id))
            .cloned()
            .collect())
    }

    async fn get_record(&self, inventory_id: Uuid) -> StoreResult<Option<InventoryRecord>> {
        QueryStats::hit(&self.stats.get_record);
        Ok(self.inventory.read().await.get(&inventory_id).cloned())
    }

    async fn update_record_if(
        &self,
        record: &InventoryRecord,
        expected: StockLevels,
    ) -> StoreResult<bool> {
        QueryStats::hit(&self.stats.update_record_if);
        let mut inventory = self.inventory.write().await;
        match inventory.get_mut(&record.id) {
            Some(current) if current.levels() == expected => {
                *current = record.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_movement(&self, movement: InventoryMovement) -> StoreResult<()> {
        self.movements.write().await.push(movement);
        Ok(())
    }

    async fn movements_for(
        &self,
        reference: MovementReference,
    ) -> StoreResult<Vec<InventoryMovement>> {
        Ok(self
            .movements
            .read()
            .await
            .iter()
            .filter(|m| m.reference == reference)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn put_bundle(
        &self,
        bundle_id: Uuid,
        components: Vec<BundleComponent>,
    ) -> StoreResult<()> {
        self.bundles.write().await.insert(bundle_id, components);
        Ok(())
    }

    async fn bundle_components(&self, bundle_ids: &[Uuid]) -> StoreResult<Vec<BundleComponent>> {
        QueryStats::hit(&self.stats.bundle_components);
        let bundles = self.bundles.read().await;
        Ok(bundle_ids
            .iter()
            .filter_map(|id| bundles.get(id))
            .flatten()
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RemittanceStore for InMemoryStore {
    async fn insert_remittance(&self, remittance: Remittance) -> StoreResult<()> {
        let mut remittances = self.remittances.write().await;
        if remittances
            .values()
            .any(|r| r.reference == remittance.reference)
        {
            return Err(StoreError::UniqueViolation(format!(
                "remittance reference {}",
                remittance.reference
            )));
        }
        if !self
            .remittance_types
            .read()
            .await
            .contains_key(&remittance.remittance_type_id)
        {
            return Err(StoreError::ForeignKeyViolation(format!(
                "remittance type {}",
                remittance.remittance_type_id
            )));
        }
        remittances.insert(remittance.id, remittance);
        Ok(())
    }

    async fn get_remittance(&self, id: Uuid) -> StoreResult<Option<Remittance>> {
        Ok(self.remittances.read().await.get(&id).cloned())
    }

    async fn update_remittance_if(
        &self,
        remittance: &Remittance,
        expected: RemittanceStatus,
    ) -> StoreResult<bool> {
        let mut remittances = self.remittances.write().await;
        match remittances.get_mut(&remittance.id) {
            Some(current) if current.status == expected => {
                *current = remittance.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remittances_by_status(
        &self,
        status: RemittanceStatus,
    ) -> StoreResult<Vec<Remittance>> {
        Ok(self
            .remittances
            .read()
            .await
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn remittances_for_owner(&self, owner: UserId) -> StoreResult<Vec<Remittance>> {
        let mut remittances: Vec<Remittance> = self
            .remittances
            .read()
            .await
            .values()
            .filter(|r| r.owner == owner)
            .cloned()
            .collect();
        remittances.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(remittances)
    }

    async fn all_remittances(&self) -> StoreResult<Vec<Remittance>> {
        Ok(self.remittances.read().await.values().cloned().collect())
    }

    async fn put_type(&self, kind: RemittanceType) -> StoreResult<()> {
        self.remittance_types.write().await.insert(kind.id, kind);
        Ok(())
    }

    async fn get_type(&self, id: Uuid) -> StoreResult<Option<RemittanceType>> {
        Ok(self.remittance_types.read().await.get(&id).cloned())
    }

    async fn list_types(&self) -> StoreResult<Vec<RemittanceType>> {
        Ok(self.remittance_types.read().await.values().cloned().collect())
    }
}

#[async_trait]
impl PaymentAccountStore for InMemoryStore {
    async fn put_account(&self, account: PaymentAccount) -> StoreResult<()> {
        self.accounts.write().await.insert(account.id, account);
        Ok(())
    }

    async fn get_account(&self, id: Uuid) -> StoreResult<Option<PaymentAccount>> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn accounts_for_class(&self, class: TypeClass) -> StoreResult<Vec<PaymentAccount>> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .filter(|a| a.is_active && a.accepts(class))
            .cloned()
            .collect())
    }

    async fn all_accounts(&self) -> StoreResult<Vec<PaymentAccount>> {
        Ok(self.accounts.read().await.values().cloned().collect())
    }

    async fn update_counters_if(
        &self,
        account_id: Uuid,
        expected: AccountCounters,
        new: AccountCounters,
    ) -> StoreResult<bool> {
        let mut accounts = self.accounts.write().await;
        match accounts.get_mut(&account_id) {
            Some(current) if current.counters() == expected => {
                current.set_counters(new);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_transaction(&self, transaction: AccountTransaction) -> StoreResult<()> {
        if !self.accounts.read().await.contains_key(&transaction.account_id) {
            return Err(StoreError::ForeignKeyViolation(format!(
                "payment account {}",
                transaction.account_id
            )));
        }
        let mut transactions = self.transactions.write().await;
        if transactions.contains_key(&transaction.id) {
            return Err(StoreError::UniqueViolation(format!(
                "account transaction {}",
                transaction.id
            )));
        }
        transactions.insert(transaction.id, transaction);
        Ok(())
    }

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<AccountTransaction>> {
        Ok(self.transactions.read().await.get(&id).cloned())
    }

    async fn update_transaction_status_if(
        &self,
        id: Uuid,
        expected: AccountTransactionStatus,
        new: AccountTransactionStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut transactions = self.transactions.write().await;
        match transactions.get_mut(&id) {
            Some(current) if current.status == expected => {
                current.status = new;
                current.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transactions_for_account(
        &self,
        account_id: Uuid,
    ) -> StoreResult<Vec<AccountTransaction>> {
        let mut transactions: Vec<AccountTransaction> = self
            .transactions
            .read()
            .await
            .values()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(transactions)
    }
}

#[async_trait]
impl HistoryStore for InMemoryStore {
    async fn append_change(&self, change: StatusChange) -> StoreResult<()> {
        self.history.write().await.push(change);
        Ok(())
    }

    async fn changes_for(&self, aggregate_id: Uuid) -> StoreResult<Vec<StatusChange>> {
        Ok(self
            .history
            .read()
            .await
            .iter()
            .filter(|c| c.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_inventory_compare_and_set() {
        let store = InMemoryStore::new();
        let record = InventoryRecord::new(Uuid::new_v4(), 10, now());
        store.upsert_record(record.clone()).await.unwrap();

        let mut reserved = record.clone();
        reserved.reserve(4).unwrap();
        assert!(store.update_record_if(&reserved, record.levels()).await.unwrap());

        // The stale snapshot no longer matches.
        let mut again = record.clone();
        again.reserve(8).unwrap();
        assert!(!store.update_record_if(&again, record.levels()).await.unwrap());

        let stored = store.get_record(record.id).await.unwrap().unwrap();
        assert_eq!(stored.reserved_quantity, 4);
    }

    #[tokio::test]
    async fn test_one_inventory_row_per_product() {
        let store = InMemoryStore::new();
        let product = Uuid::new_v4();
        store
            .upsert_record(InventoryRecord::new(product, 1, now()))
            .await
            .unwrap();

        let err = store
            .upsert_record(InventoryRecord::new(product, 2, now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn test_batched_lookups_are_counted_once() {
        let store = InMemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.upsert_record(InventoryRecord::new(a, 1, now())).await.unwrap();
        store.upsert_record(InventoryRecord::new(b, 1, now())).await.unwrap();

        let found = store.find_by_products(&[a, b, Uuid::new_v4()]).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(store.stats().snapshot().find_by_products, 1);

        store.stats().reset();
        assert_eq!(store.stats().snapshot(), QueryCounts::default());
    }

    #[tokio::test]
    async fn test_transaction_requires_account() {
        let store = InMemoryStore::new();
        let transaction = AccountTransaction {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            reference: crate::domain::payment_account::AccountReference::Order(Uuid::new_v4()),
            amount: rust_decimal::Decimal::ONE,
            type_class: TypeClass::Product,
            status: AccountTransactionStatus::Pending,
            created_at: now(),
            updated_at: now(),
        };
        let err = store.insert_transaction(transaction).await.unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation(_)));
    }
}
