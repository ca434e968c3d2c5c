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
    CatalogStore, HistoryStore, InventoryStore, OrderStore, PaymentAccountStore, RemittanceStore,
};
use crate::domain::remittance::{Remittance, RemittanceStatus};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const CF_ORDERS: &str = "orders";
/// Order number -> order id; enforces unique order numbers.
pub const CF_ORDER_NUMBERS: &str = "order_numbers";
/// Order id -> every line of the order.
pub const CF_ORDER_ITEMS: &str = "order_items";
pub const CF_INVENTORY: &str = "inventory";
/// Product id -> inventory id.
pub const CF_INVENTORY_BY_PRODUCT: &str = "inventory_by_product";
pub const CF_MOVEMENTS: &str = "inventory_movements";
/// Bundle id -> its components.
pub const CF_BUNDLES: &str = "bundles";
pub const CF_REMITTANCES: &str = "remittances";
/// Remittance reference -> remittance id.
pub const CF_REMITTANCE_REFERENCES: &str = "remittance_references";
pub const CF_REMITTANCE_TYPES: &str = "remittance_types";
pub const CF_ACCOUNTS: &str = "payment_accounts";
pub const CF_TRANSACTIONS: &str = "account_transactions";
/// Keyed by aggregate id followed by change id, so one aggregate's history
/// is a contiguous range.
pub const CF_HISTORY: &str = "status_history";

const COLUMN_FAMILIES: [&str; 13] = [
    CF_ORDERS,
    CF_ORDER_NUMBERS,
    CF_ORDER_ITEMS,
    CF_INVENTORY,
    CF_INVENTORY_BY_PRODUCT,
    CF_MOVEMENTS,
    CF_BUNDLES,
    CF_REMITTANCES,
    CF_REMITTANCE_REFERENCES,
    CF_REMITTANCE_TYPES,
    CF_ACCOUNTS,
    CF_TRANSACTIONS,
    CF_HISTORY,
];

/// A persistent store implementation using RocksDB.
///
/// Every table lives in its own Column Family with `serde_json` values.
/// Writes that check a precondition (unique indexes, compare-and-set) are
/// serialised through one async mutex so the check and the write cannot
/// interleave with another writer.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    writes: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column family.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            writes: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> StoreResult<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Backend(format!("column family {} not found", name)))
    }

    fn put<T: Serialize>(&self, table: &str, key: &[u8], value: &T) -> StoreResult<()> {
        let cf = self.cf(table)?;
        self.db.put_cf(cf, key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, table: &str, key: &[u8]) -> StoreResult<Option<T>> {
        let cf = self.cf(table)?;
        match self.db.get_pinned_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn exists(&self, table: &str, key: &[u8]) -> StoreResult<bool> {
        let cf = self.cf(table)?;
        Ok(self.db.get_pinned_cf(cf, key)?.is_some())
    }

    fn multi_get<T: DeserializeOwned>(&self, table: &str, keys: &[Vec<u8>]) -> StoreResult<Vec<T>> {
        let cf = self.cf(table)?;
        let mut values = Vec::with_capacity(keys.len());
        for result in self.db.multi_get_cf(keys.iter().map(|key| (cf, key))) {
            if let Some(bytes) = result? {
                values.push(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(values)
    }

    /// All values of a table, optionally only keys starting with `prefix`.
    fn scan<T: DeserializeOwned>(&self, table: &str, prefix: Option<&[u8]>) -> StoreResult<Vec<T>> {
        let cf = self.cf(table)?;
        let mode = match prefix {
            Some(prefix) => IteratorMode::From(prefix, Direction::Forward),
            None => IteratorMode::Start,
        };
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, mode) {
            let (key, value) = item?;
            if let Some(prefix) = prefix
                && !key.starts_with(prefix)
            {
                break;
            }
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn delete(&self, table: &str, key: &[u8]) -> StoreResult<()> {
        let cf = self.cf(table)?;
        self.db.delete_cf(cf, key)?;
        Ok(())
    }
}

fn key(id: Uuid) -> [u8; 16] {
    *id.as_bytes()
}

fn history_key(aggregate_id: Uuid, change_id: Uuid) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(aggregate_id.as_bytes());
    key.extend_from_slice(change_id.as_bytes());
    key
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn insert_order(&self, order: Order, items: Vec<OrderItem>) -> StoreResult<()> {
        let _guard = self.writes.lock().await;
        if self.exists(CF_ORDER_NUMBERS, order.order_number.as_bytes())? {
            return Err(StoreError::UniqueViolation(format!(
                "order_number {}",
                order.order_number
            )));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_ORDERS)?, key(order.id), serde_json::to_vec(&order)?);
        batch.put_cf(
            self.cf(CF_ORDER_NUMBERS)?,
            order.order_number.as_bytes(),
            order.id.as_bytes(),
        );
        batch.put_cf(self.cf(CF_ORDER_ITEMS)?, key(order.id), serde_json::to_vec(&items)?);
        self.db.write(batch)?;
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        self.get(CF_ORDERS, &key(id))
    }

    async fn order_items(&self, order_id: Uuid) -> StoreResult<Vec<OrderItem>> {
        Ok(self
            .get::<Vec<OrderItem>>(CF_ORDER_ITEMS, &key(order_id))?
            .unwrap_or_default())
    }

    async fn update_order_if(&self, order: &Order, expected: OrderState) -> StoreResult<bool> {
        let _guard = self.writes.lock().await;
        match self.get::<Order>(CF_ORDERS, &key(order.id))? {
            Some(current) if current.state() == expected => {
                self.put(CF_ORDERS, &key(order.id), order)?;
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
        let _guard = self.writes.lock().await;
        let mut items: Vec<OrderItem> = self
            .get(CF_ORDER_ITEMS, &key(order_id))?
            .ok_or_else(|| StoreError::ForeignKeyViolation(format!("order {}", order_id)))?;
        let item = items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| StoreError::ForeignKeyViolation(format!("order item {}", item_id)))?;
        item.inventory_id = Some(inventory_id);
        self.put(CF_ORDER_ITEMS, &key(order_id), &items)
    }

    async fn delete_order(&self, id: Uuid) -> StoreResult<()> {
        let _guard = self.writes.lock().await;
        if let Some(order) = self.get::<Order>(CF_ORDERS, &key(id))? {
            self.delete(CF_ORDER_NUMBERS, order.order_number.as_bytes())?;
        }
        self.delete(CF_ORDER_ITEMS, &key(id))?;
        self.delete(CF_ORDERS, &key(id))
    }

    async fn orders_for_owner(&self, owner: UserId) -> StoreResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .scan::<Order>(CF_ORDERS, None)?
            .into_iter()
            .filter(|o| o.owner == owner)
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(orders)
    }

    async fn all_orders(&self) -> StoreResult<Vec<Order>> {
        self.scan(CF_ORDERS, None)
    }
}

#[async_trait]
impl InventoryStore for RocksDBStore {
    async fn upsert_record(&self, record: InventoryRecord) -> StoreResult<()> {
        let _guard = self.writes.lock().await;
        if let Some(existing) = self.get::<Uuid>(CF_INVENTORY_BY_PRODUCT, &key(record.product_id))?
            && existing != record.id
        {
            return Err(StoreError::UniqueViolation(format!(
                "inventory product_id {}",
                record.product_id
            )));
        }
        self.put(CF_INVENTORY_BY_PRODUCT, &key(record.product_id), &record.id)?;
        self.put(CF_INVENTORY, &key(record.id), &record)
    }

    async fn find_by_products(&self, product_ids: &[Uuid]) -> StoreResult<Vec<InventoryRecord>> {
        let index_keys: Vec<Vec<u8>> = product_ids.iter().map(|id| key(*id).to_vec()).collect();
        let inventory_ids: Vec<Uuid> = self.multi_get(CF_INVENTORY_BY_PRODUCT, &index_keys)?;
        let record_keys: Vec<Vec<u8>> = inventory_ids.iter().map(|id| key(*id).to_vec()).collect();
        self.multi_get(CF_INVENTORY, &record_keys)
    }

    async fn get_record(&self, inventory_id: Uuid) -> StoreResult<Option<InventoryRecord>> {
        self.get(CF_INVENTORY, &key(inventory_id))
    }

    async fn update_record_if(
        &self,
        record: &InventoryRecord,
        expected: StockLevels,
    ) -> StoreResult<bool> {
        let _guard = self.writes.lock().await;
        match self.get::<InventoryRecord>(CF_INVENTORY, &key(record.id))? {
            Some(current) if current.levels() == expected => {
                self.put(CF_INVENTORY, &key(record.id), record)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_movement(&self, movement: InventoryMovement) -> StoreResult<()> {
        self.put(CF_MOVEMENTS, &key(movement.id), &movement)
    }

    async fn movements_for(
        &self,
        reference: MovementReference,
    ) -> StoreResult<Vec<InventoryMovement>> {
        let mut movements: Vec<InventoryMovement> = self
            .scan::<InventoryMovement>(CF_MOVEMENTS, None)?
            .into_iter()
            .filter(|m| m.reference == reference)
            .collect();
        movements.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(movements)
    }
}

#[async_trait]
impl CatalogStore for RocksDBStore {
    async fn put_bundle(
        &self,
        bundle_id: Uuid,
        components: Vec<BundleComponent>,
    ) -> StoreResult<()> {
        self.put(CF_BUNDLES, &key(bundle_id), &components)
    }

    async fn bundle_components(&self, bundle_ids: &[Uuid]) -> StoreResult<Vec<BundleComponent>> {
        let keys: Vec<Vec<u8>> = bundle_ids.iter().map(|id| key(*id).to_vec()).collect();
        Ok(self
            .multi_get::<Vec<BundleComponent>>(CF_BUNDLES, &keys)?
            .into_iter()
            .flatten()
            .collect())
    }
}

#[async_trait]
impl RemittanceStore for RocksDBStore {
    async fn insert_remittance(&self, remittance: Remittance) -> StoreResult<()> {
        let _guard = self.writes.lock().await;
        if self.exists(CF_REMITTANCE_REFERENCES, remittance.reference.as_bytes())? {
            return Err(StoreError::UniqueViolation(format!(
                "remittance reference {}",
                remittance.reference
            )));
        }
        if !self.exists(CF_REMITTANCE_TYPES, &key(remittance.remittance_type_id))? {
            return Err(StoreError::ForeignKeyViolation(format!(
                "remittance type {}",
                remittance.remittance_type_id
            )));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(CF_REMITTANCES)?,
            key(remittance.id),
            serde_json::to_vec(&remittance)?,
        );
        batch.put_cf(
            self.cf(CF_REMITTANCE_REFERENCES)?,
            remittance.reference.as_bytes(),
            remittance.id.as_bytes(),
        );
        self.db.write(batch)?;
        Ok(())
    }

    async fn get_remittance(&self, id: Uuid) -> StoreResult<Option<Remittance>> {
        self.get(CF_REMITTANCES, &key(id))
    }

    async fn update_remittance_if(
        &self,
        remittance: &Remittance,
        expected: RemittanceStatus,
    ) -> StoreResult<bool> {
        let _guard = self.writes.lock().await;
        match self.get::<Remittance>(CF_REMITTANCES, &key(remittance.id))? {
            Some(current) if current.status == expected => {
                self.put(CF_REMITTANCES, &key(remittance.id), remittance)?;
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
            .scan::<Remittance>(CF_REMITTANCES, None)?
            .into_iter()
            .filter(|r| r.status == status)
            .collect())
    }

    async fn remittances_for_owner(&self, owner: UserId) -> StoreResult<Vec<Remittance>> {
        let mut remittances: Vec<Remittance> = self
            .scan::<Remittance>(CF_REMITTANCES, None)?
            .into_iter()
            .filter(|r| r.owner == owner)
            .collect();
        remittances.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(remittances)
    }

    async fn all_remittances(&self) -> StoreResult<Vec<Remittance>> {
        self.scan(CF_REMITTANCES, None)
    }

    async fn put_type(&self, kind: RemittanceType) -> StoreResult<()> {
        self.put(CF_REMITTANCE_TYPES, &key(kind.id), &kind)
    }

    async fn get_type(&self, id: Uuid) -> StoreResult<Option<RemittanceType>> {
        self.get(CF_REMITTANCE_TYPES, &key(id))
    }

    async fn list_types(&self) -> StoreResult<Vec<RemittanceType>> {
        self.scan(CF_REMITTANCE_TYPES, None)
    }
}

#[async_trait]
impl PaymentAccountStore for RocksDBStore {
    async fn put_account(&self, account: PaymentAccount) -> StoreResult<()> {
        let _guard = self.writes.lock().await;
        self.put(CF_ACCOUNTS, &key(account.id), &account)
    }

    async fn get_account(&self, id: Uuid) -> StoreResult<Option<PaymentAccount>> {
        self.get(CF_ACCOUNTS, &key(id))
    }

    async fn accounts_for_class(&self, class: TypeClass) -> StoreResult<Vec<PaymentAccount>> {
        Ok(self
            .scan::<PaymentAccount>(CF_ACCOUNTS, None)?
            .into_iter()
            .filter(|a| a.is_active && a.accepts(class))
            .collect())
    }

    async fn all_accounts(&self) -> StoreResult<Vec<PaymentAccount>> {
        self.scan(CF_ACCOUNTS, None)
    }

    async fn update_counters_if(
        &self,
        account_id: Uuid,
        expected: AccountCounters,
        new: AccountCounters,
    ) -> StoreResult<bool> {
        let _guard = self.writes.lock().await;
        match self.get::<PaymentAccount>(CF_ACCOUNTS, &key(account_id))? {
            Some(mut current) if current.counters() == expected => {
                current.set_counters(new);
                self.put(CF_ACCOUNTS, &key(account_id), &current)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_transaction(&self, transaction: AccountTransaction) -> StoreResult<()> {
        let _guard = self.writes.lock().await;
        if !self.exists(CF_ACCOUNTS, &key(transaction.account_id))? {
            return Err(StoreError::ForeignKeyViolation(format!(
                "payment account {}",
                transaction.account_id
            )));
        }
        if self.exists(CF_TRANSACTIONS, &key(transaction.id))? {
            return Err(StoreError::UniqueViolation(format!(
                "account transaction {}",
                transaction.id
            )));
        }
        self.put(CF_TRANSACTIONS, &key(transaction.id), &transaction)
    }

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<AccountTransaction>> {
        self.get(CF_TRANSACTIONS, &key(id))
    }

    async fn update_transaction_status_if(
        &self,
        id: Uuid,
        expected: AccountTransactionStatus,
        new: AccountTransactionStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let _guard = self.writes.lock().await;
        match self.get::<AccountTransaction>(CF_TRANSACTIONS, &key(id))? {
            Some(mut current) if current.status == expected => {
                current.status = new;
                current.updated_at = at;
                self.put(CF_TRANSACTIONS, &key(id), &current)?;
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
            .scan::<AccountTransaction>(CF_TRANSACTIONS, None)?
            .into_iter()
            .filter(|t| t.account_id == account_id)
            .collect();
        transactions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(transactions)
    }
}

#[async_trait]
impl HistoryStore for RocksDBStore {
    async fn append_change(&self, change: StatusChange) -> StoreResult<()> {
        self.put(CF_HISTORY, &history_key(change.aggregate_id, change.id), &change)
    }

    async fn changes_for(&self, aggregate_id: Uuid) -> StoreResult<Vec<StatusChange>> {
        let mut changes: Vec<StatusChange> = self.scan(CF_HISTORY, Some(aggregate_id.as_bytes().as_slice()))?;
        changes.sort_by(|a, b| a.changed_at.cmp(&b.changed_at));
        Ok(changes)
    }
}
