use crate::domain::actor::UserId;
use crate::domain::money::ensure_non_negative;
use crate::error::FulfillmentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    /// Legal transition table. Single forward steps plus the cancel escape.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Processing)
                | (OrderStatus::Processing, OrderStatus::Shipped)
                | (OrderStatus::Shipped, OrderStatus::Delivered)
                | (OrderStatus::Delivered, OrderStatus::Completed)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Processing, OrderStatus::Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    ProofUploaded,
    Validated,
    Rejected,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 4] = [
        PaymentStatus::Pending,
        PaymentStatus::ProofUploaded,
        PaymentStatus::Validated,
        PaymentStatus::Rejected,
    ];

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::ProofUploaded)
                | (PaymentStatus::ProofUploaded, PaymentStatus::Validated)
                | (PaymentStatus::ProofUploaded, PaymentStatus::Rejected)
                | (PaymentStatus::Rejected, PaymentStatus::Pending)
        )
    }

    /// Whether the order's stock is currently held by reservations.
    pub fn holds_reservation(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::ProofUploaded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::ProofUploaded => "PROOF_UPLOADED",
            PaymentStatus::Validated => "VALIDATED",
            PaymentStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The pair of statuses used as the compare-and-set guard for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderState {
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
}

/// Delivery details captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub phone: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub notes: Option<String>,
}

impl Recipient {
    pub fn validate(&self) -> Result<(), FulfillmentError> {
        if self.name.trim().is_empty() {
            return Err(FulfillmentError::validation("Recipient name is required"));
        }
        if self.phone.trim().is_empty() {
            return Err(FulfillmentError::validation("Recipient phone is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub owner: UserId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub recipient: Recipient,
    pub payment_proof_url: Option<String>,
    pub payment_account_id: Option<Uuid>,
    pub account_transaction_id: Option<Uuid>,
    pub validated_by: Option<UserId>,
    pub validated_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub proof_uploaded_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub processing_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn state(&self) -> OrderState {
        OrderState {
            status: self.status,
            payment_status: self.payment_status,
        }
    }

    /// Stamps the timestamp belonging to `status`.
    pub fn stamp_status(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        self.status = status;
        self.updated_at = at;
        match status {
            OrderStatus::Processing => self.processing_at = Some(at),
            OrderStatus::Shipped => self.shipped_at = Some(at),
            OrderStatus::Delivered => self.delivered_at = Some(at),
            OrderStatus::Completed => self.completed_at = Some(at),
            OrderStatus::Cancelled => self.cancelled_at = Some(at),
            OrderStatus::Pending => {}
        }
    }
}

/// What an order line points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "item_type", content = "item_id", rename_all = "lowercase")]
pub enum ItemRef {
    Product(Uuid),
    Bundle(Uuid),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub item: ItemRef,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    /// Stock record backing a product line; `None` for bundles.
    pub inventory_id: Option<Uuid>,
}

/// Checkout line as submitted by the customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub item: ItemRef,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

/// Checkout request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub owner: UserId,
    pub currency: String,
    pub items: Vec<NewOrderItem>,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub recipient: Recipient,
}

/// Order amounts computed from the checkout lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl NewOrder {
    /// `total = subtotal - discount + shipping + tax`, every part and the
    /// result non-negative.
    pub fn totals(&self) -> Result<OrderTotals, FulfillmentError> {
        let mut subtotal = Decimal::ZERO;
        for item in &self.items {
            if item.quantity == 0 {
                return Err(FulfillmentError::validation(format!(
                    "Quantity for {} must be greater than zero",
                    item.name
                )));
            }
            ensure_non_negative("unit_price", item.unit_price)?;
            subtotal += item.unit_price * Decimal::from(item.quantity);
        }
        let discount = ensure_non_negative("discount", self.discount)?;
        let shipping = ensure_non_negative("shipping", self.shipping)?;
        let tax = ensure_non_negative("tax", self.tax)?;
        let total = ensure_non_negative("total", subtotal - discount + shipping + tax)?;

        Ok(OrderTotals {
            subtotal,
            discount,
            shipping,
            tax,
            total,
        })
    }
}
