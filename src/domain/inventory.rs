use crate::domain::actor::UserId;
use crate::error::{FulfillmentError, insufficient};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stock position of one product.
///
/// `reserved_quantity` is the part of `quantity` held by open orders.
/// `quantity - reserved_quantity` is never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: u32,
    pub reserved_quantity: u32,
    pub updated_at: DateTime<Utc>,
}

/// Snapshot of the stock counters used as a compare-and-set guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLevels {
    pub quantity: u32,
    pub reserved_quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Reserve,
    Release,
    Reduce,
    /// Undoes a reduce inside a failed payment validation.
    Restore,
}

impl InventoryRecord {
    pub fn new(product_id: Uuid, quantity: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            quantity,
            reserved_quantity: 0,
            updated_at: now,
        }
    }

    pub fn available(&self) -> u32 {
        self.quantity.saturating_sub(self.reserved_quantity)
    }

    pub fn levels(&self) -> StockLevels {
        StockLevels {
            quantity: self.quantity,
            reserved_quantity: self.reserved_quantity,
        }
    }

    /// Holds `qty` units for an order.
    pub fn reserve(&mut self, qty: u32) -> Result<(), FulfillmentError> {
        if self.reserved_quantity > self.quantity || self.available() < qty {
            return Err(insufficient(self.product_id, qty, self.available()));
        }
        self.reserved_quantity += qty;
        Ok(())
    }

    /// Returns a hold without touching on-hand stock.
    pub fn release(&mut self, qty: u32) -> Result<(), FulfillmentError> {
        self.reserved_quantity = self
            .reserved_quantity
            .checked_sub(qty)
            .ok_or_else(|| insufficient(self.product_id, qty, self.reserved_quantity))?;
        Ok(())
    }

    /// Consumes reserved stock.
    pub fn reduce(&mut self, qty: u32) -> Result<(), FulfillmentError> {
        if self.reserved_quantity < qty || self.quantity < qty {
            return Err(insufficient(self.product_id, qty, self.reserved_quantity));
        }
        self.quantity -= qty;
        self.reserved_quantity -= qty;
        Ok(())
    }

    /// Puts back stock consumed by [`InventoryRecord::reduce`], still reserved.
    pub fn restore(&mut self, qty: u32) -> Result<(), FulfillmentError> {
        let quantity = self.quantity.checked_add(qty);
        let reserved = self.reserved_quantity.checked_add(qty);
        match (quantity, reserved) {
            (Some(quantity), Some(reserved)) => {
                self.quantity = quantity;
                self.reserved_quantity = reserved;
                Ok(())
            }
            _ => Err(FulfillmentError::validation("Stock counter overflow")),
        }
    }

    pub fn apply(&mut self, movement: MovementType, qty: u32) -> Result<(), FulfillmentError> {
        match movement {
            MovementType::Reserve => self.reserve(qty),
            MovementType::Release => self.release(qty),
            MovementType::Reduce => self.reduce(qty),
            MovementType::Restore => self.restore(qty),
        }
    }
}

/// What a movement was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum MovementReference {
    Order(Uuid),
}

/// Append-only audit row for every ledger operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub id: Uuid,
    pub inventory_id: Uuid,
    pub product_id: Uuid,
    pub movement_type: MovementType,
    /// Signed change of the counter the movement touches: reserved
    /// quantity for reserve/release, on-hand quantity for reduce/restore.
    pub delta: i64,
    pub reference: MovementReference,
    pub actor: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl InventoryMovement {
    pub fn new(
        record: &InventoryRecord,
        movement_type: MovementType,
        qty: u32,
        reference: MovementReference,
        actor: Option<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let qty = i64::from(qty);
        let delta = match movement_type {
            MovementType::Reserve | MovementType::Restore => qty,
            MovementType::Release | MovementType::Reduce => -qty,
        };
        Self {
            id: Uuid::new_v4(),
            inventory_id: record.id,
            product_id: record.product_id,
            movement_type,
            delta,
            reference,
            actor,
            created_at,
        }
    }
}

/// Fixed constituent of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleComponent {
    pub bundle_id: Uuid,
    pub product_id: Uuid,
    /// Units of the product per unit of bundle.
    pub quantity: u32,
}

/// A product quantity after bundle expansion, bound to its stock record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalLine {
    pub product_id: Uuid,
    pub inventory_id: Uuid,
    pub quantity: u32,
}
