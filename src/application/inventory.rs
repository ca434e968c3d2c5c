use crate::config::EngineConfig;
use crate::domain::actor::UserId;
use crate::domain::inventory::{
    BundleComponent, InventoryMovement, InventoryRecord, MovementReference, MovementType,
    PhysicalLine,
};
use crate::domain::order::{ItemRef, OrderItem};
use crate::domain::ports::{CatalogStoreRef, Clock, InventoryStoreRef};
use crate::error::{FulfillmentError, Result, StoreError};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

/// Order lines resolved to physical products and their stock rows.
#[derive(Debug, Clone, Default)]
pub struct ExpandedOrder {
    /// One line per product, quantities summed across products and bundles.
    pub lines: Vec<PhysicalLine>,
    /// Stock rows as read during expansion, keyed by product id.
    pub records: HashMap<Uuid, InventoryRecord>,
}

/// Reserve, release and reduce stock, one movement row per change.
///
/// Bundles are expanded with two batched lookups regardless of how many
/// lines or bundle members an order has: every bundle's components in one
/// query, then every resulting product's stock row in one query.
pub struct InventoryLedger {
    inventory: InventoryStoreRef,
    catalog: CatalogStoreRef,
    clock: Arc<dyn Clock>,
    cas_retries: u32,
}

impl InventoryLedger {
    pub fn new(
        inventory: InventoryStoreRef,
        catalog: CatalogStoreRef,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            inventory,
            catalog,
            clock,
            cas_retries: config.cas_retries,
        }
    }

    /// Holds `qty` units of a product.
    pub async fn reserve(
        &self,
        product_id: Uuid,
        qty: u32,
        reference: MovementReference,
        actor: Option<UserId>,
    ) -> Result<InventoryRecord> {
        let record = self.record_for(product_id).await?;
        self.apply_line(record, MovementType::Reserve, qty, reference, actor)
            .await
    }

    /// Returns a hold; on-hand stock is untouched.
    pub async fn release(
        &self,
        product_id: Uuid,
        qty: u32,
        reference: MovementReference,
        actor: Option<UserId>,
    ) -> Result<InventoryRecord> {
        let record = self.record_for(product_id).await?;
        self.apply_line(record, MovementType::Release, qty, reference, actor)
            .await
    }

    /// Consumes reserved stock.
    pub async fn reduce(
        &self,
        product_id: Uuid,
        qty: u32,
        reference: MovementReference,
        actor: Option<UserId>,
    ) -> Result<InventoryRecord> {
        let record = self.record_for(product_id).await?;
        self.apply_line(record, MovementType::Reduce, qty, reference, actor)
            .await
    }

    /// Resolves order lines to physical products.
    pub async fn expand(&self, items: &[OrderItem]) -> Result<ExpandedOrder> {
        let mut bundle_ids: Vec<Uuid> = items
            .iter()
            .filter_map(|item| match item.item {
                ItemRef::Bundle(id) => Some(id),
                ItemRef::Product(_) => None,
            })
            .collect();
        bundle_ids.sort_unstable();
        bundle_ids.dedup();

        let mut components: HashMap<Uuid, Vec<BundleComponent>> = HashMap::new();
        if !bundle_ids.is_empty() {
            let rows = self
                .catalog
                .bundle_components(&bundle_ids)
                .await
                .map_err(FulfillmentError::db("expand_bundles", bundle_ids.len()))?;
            for component in rows {
                components
                    .entry(component.bundle_id)
                    .or_default()
                    .push(component);
            }
        }

        let mut quantities: BTreeMap<Uuid, u32> = BTreeMap::new();
        for item in items {
            match item.item {
                ItemRef::Product(product_id) => add_quantity(&mut quantities, product_id, item.quantity)?,
                ItemRef::Bundle(bundle_id) => {
                    let members = components
                        .get(&bundle_id)
                        .filter(|members| !members.is_empty())
                        .ok_or_else(|| {
                            FulfillmentError::validation(format!(
                                "Bundle {} has no components",
                                bundle_id
                            ))
                        })?;
                    for member in members {
                        let qty = member.quantity.checked_mul(item.quantity).ok_or_else(|| {
                            FulfillmentError::validation("Bundle quantity overflow")
                        })?;
                        add_quantity(&mut quantities, member.product_id, qty)?;
                    }
                }
            }
        }

        if quantities.is_empty() {
            return Ok(ExpandedOrder::default());
        }

        let product_ids: Vec<Uuid> = quantities.keys().copied().collect();
        let records: HashMap<Uuid, InventoryRecord> = self
            .inventory
            .find_by_products(&product_ids)
            .await
            .map_err(FulfillmentError::db("expand_products", product_ids.len()))?
            .into_iter()
            .map(|record| (record.product_id, record))
            .collect();

        let mut lines = Vec::with_capacity(quantities.len());
        for (product_id, quantity) in quantities {
            let record = records
                .get(&product_id)
                .ok_or_else(|| FulfillmentError::not_found("inventory for product", product_id))?;
            lines.push(PhysicalLine {
                product_id,
                inventory_id: record.id,
                quantity,
            });
        }

        Ok(ExpandedOrder { lines, records })
    }

    /// Applies `movement` to every line of an expanded order as one unit.
    ///
    /// When a line fails, the lines already applied are compensated with the
    /// inverse movement before the error is returned.
    pub async fn apply_all(
        &self,
        expanded: &ExpandedOrder,
        movement: MovementType,
        reference: MovementReference,
        actor: Option<UserId>,
    ) -> Result<()> {
        let mut applied: Vec<&PhysicalLine> = Vec::with_capacity(expanded.lines.len());

        for line in &expanded.lines {
            let snapshot = match expanded.records.get(&line.product_id) {
                Some(record) => record.clone(),
                None => self.record_for(line.product_id).await?,
            };
            if let Err(error) = self
                .apply_line(snapshot, movement, line.quantity, reference, actor)
                .await
            {
                self.compensate(&applied, movement, reference, actor).await;
                return Err(error);
            }
            applied.push(line);
        }
        Ok(())
    }

    async fn compensate(
        &self,
        applied: &[&PhysicalLine],
        movement: MovementType,
        reference: MovementReference,
        actor: Option<UserId>,
    ) {
        let inverse = inverse_of(movement);
        for line in applied.iter().rev() {
            let outcome = match self.record_for(line.product_id).await {
                Ok(record) => {
                    self.apply_line(record, inverse, line.quantity, reference, actor)
                        .await
                }
                Err(error) => Err(error),
            };
            if let Err(error) = outcome {
                tracing::error!(
                    product_id = %line.product_id,
                    quantity = line.quantity,
                    ?movement,
                    %error,
                    "inventory compensation failed"
                );
            }
        }
    }

    async fn record_for(&self, product_id: Uuid) -> Result<InventoryRecord> {
        self.inventory
            .find_by_products(&[product_id])
            .await
            .map_err(FulfillmentError::db("load_inventory", product_id))?
            .into_iter()
            .next()
            .ok_or_else(|| FulfillmentError::not_found("inventory for product", product_id))
    }

    /// Read-modify-compare-and-set on one stock row, retried on conflict.
    /// The first attempt uses `snapshot`; retries re-read the row.
    async fn apply_line(
        &self,
        snapshot: InventoryRecord,
        movement: MovementType,
        qty: u32,
        reference: MovementReference,
        actor: Option<UserId>,
    ) -> Result<InventoryRecord> {
        let inventory_id = snapshot.id;
        let mut record = snapshot;

        for attempt in 0..=self.cas_retries {
            if attempt > 0 {
                record = self
                    .inventory
                    .get_record(inventory_id)
                    .await
                    .map_err(FulfillmentError::db("update_inventory", inventory_id))?
                    .ok_or_else(|| FulfillmentError::not_found("inventory record", inventory_id))?;
            }
            let expected = record.levels();
            let now = self.clock.now();
            if let Err(error) = record.apply(movement, qty) {
                // A shortage seen on the snapshot is confirmed on a fresh read.
                if attempt == 0 && self.cas_retries > 0 {
                    continue;
                }
                return Err(error);
            }
            record.updated_at = now;

            let applied = self
                .inventory
                .update_record_if(&record, expected)
                .await
                .map_err(FulfillmentError::db("update_inventory", inventory_id))?;
            if !applied {
                continue;
            }

            let entry = InventoryMovement::new(&record, movement, qty, reference, actor, now);
            if let Err(error) = self.inventory.append_movement(entry).await {
                self.revert_line(record, movement, qty).await;
                return Err(FulfillmentError::db("record_inventory_movement", inventory_id)(error));
            }
            tracing::debug!(
                product_id = %record.product_id,
                ?movement,
                qty,
                available = record.available(),
                "inventory updated"
            );
            return Ok(record);
        }

        Err(FulfillmentError::db("update_inventory", inventory_id)(
            StoreError::Conflict("stock row kept changing".to_string()),
        ))
    }

    /// Undoes a stock change whose movement row could not be written. No
    /// movement is recorded for the undo, so the ledger shows neither.
    async fn revert_line(&self, changed: InventoryRecord, movement: MovementType, qty: u32) {
        let inverse = inverse_of(movement);
        let mut record = changed;

        for attempt in 0..=self.cas_retries {
            if attempt > 0 {
                match self.inventory.get_record(record.id).await {
                    Ok(Some(fresh)) => record = fresh,
                    Ok(None) => break,
                    Err(error) => {
                        tracing::warn!(inventory_id = %record.id, %error, "reloading stock row to revert");
                        continue;
                    }
                }
            }
            let expected = record.levels();
            let mut reverted = record.clone();
            if reverted.apply(inverse, qty).is_err() {
                break;
            }
            reverted.updated_at = self.clock.now();
            match self.inventory.update_record_if(&reverted, expected).await {
                Ok(true) => return,
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(inventory_id = %record.id, %error, "reverting stock row");
                }
            }
        }

        tracing::error!(
            product_id = %record.product_id,
            ?movement,
            qty,
            "stock changed without a movement row and could not be reverted"
        );
    }
}

fn add_quantity(quantities: &mut BTreeMap<Uuid, u32>, product_id: Uuid, qty: u32) -> Result<()> {
    let entry = quantities.entry(product_id).or_insert(0);
    *entry = entry
        .checked_add(qty)
        .ok_or_else(|| FulfillmentError::validation("Order quantity overflow"))?;
    Ok(())
}

fn inverse_of(movement: MovementType) -> MovementType {
    match movement {
        MovementType::Reserve => MovementType::Release,
        MovementType::Release => MovementType::Reserve,
        MovementType::Reduce => MovementType::Restore,
        MovementType::Restore => MovementType::Reduce,
    }
}
