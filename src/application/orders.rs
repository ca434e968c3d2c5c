use crate::application::authorization::{ensure_owner, ensure_owner_or_admin};
use crate::application::inventory::InventoryLedger;
use crate::application::non_critical::run_non_critical;
use crate::application::numbering::generate_number;
use crate::application::rotation::AccountRotation;
use crate::config::EngineConfig;
use crate::domain::actor::{Actor, UserId};
use crate::domain::history::{AggregateKind, StatusChange, TransitionEvent};
use crate::domain::inventory::{MovementReference, MovementType};
use crate::domain::money::{Amount, is_currency_code};
use crate::domain::order::{
    ItemRef, NewOrder, Order, OrderItem, OrderState, OrderStatus, PaymentStatus,
};
use crate::domain::payment_account::{AccountReference, TypeClass};
use crate::domain::ports::{
    Authorizer, Clock, Collaborators, HistoryStoreRef, Notifier, OrderStoreRef,
};
use crate::error::{FulfillmentError, Result, StoreError};
use rust_decimal::Decimal;
use std::fmt::Display;
use std::sync::Arc;
use uuid::Uuid;

/// Order lifecycle: checkout, payment review, fulfilment, cancellation.
///
/// Every mutation re-checks the legal transition table and is written with
/// a compare-and-set on the `(status, payment_status)` pair read at the
/// start, so two concurrent calls on one order cannot both succeed.
pub struct OrderService {
    orders: OrderStoreRef,
    history: HistoryStoreRef,
    notifier: Arc<dyn Notifier>,
    authorizer: Arc<dyn Authorizer>,
    clock: Arc<dyn Clock>,
    ledger: Arc<InventoryLedger>,
    rotation: Arc<AccountRotation>,
    config: Arc<EngineConfig>,
}

impl OrderService {
    pub fn new(
        collaborators: &Collaborators,
        ledger: Arc<InventoryLedger>,
        rotation: Arc<AccountRotation>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            orders: collaborators.orders.clone(),
            history: collaborators.history.clone(),
            notifier: collaborators.notifier.clone(),
            authorizer: collaborators.authorizer.clone(),
            clock: collaborators.clock.clone(),
            ledger,
            rotation,
            config,
        }
    }

    /// Checkout.
    ///
    /// Inserts the order and its lines, then reserves the bundle-expanded
    /// stock as one unit. If reservation fails, reserved lines are released
    /// and the order rows deleted before the error is returned.
    pub async fn create_order(&self, actor: &Actor, request: NewOrder) -> Result<Order> {
        ensure_owner(actor, request.owner, "this checkout")?;
        if request.items.is_empty() {
            return Err(FulfillmentError::validation("An order needs at least one item"));
        }
        let currency = request.currency.trim().to_ascii_uppercase();
        if !is_currency_code(&currency) || !self.config.supports_currency(&currency) {
            return Err(FulfillmentError::validation(format!(
                "Unsupported currency: {}",
                request.currency
            )));
        }
        request.recipient.validate()?;
        let totals = request.totals()?;

        let now = self.clock.now();
        let order_id = Uuid::new_v4();
        let items: Vec<OrderItem> = request
            .items
            .iter()
            .map(|line| OrderItem {
                id: Uuid::new_v4(),
                order_id,
                item: line.item,
                name: line.name.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                total_price: line.unit_price * Decimal::from(line.quantity),
                inventory_id: None,
            })
            .collect();

        let mut order = Order {
            id: order_id,
            order_number: String::new(),
            owner: request.owner,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            subtotal: totals.subtotal,
            discount: totals.discount,
            shipping: totals.shipping,
            tax: totals.tax,
            total: totals.total,
            currency,
            recipient: request.recipient,
            payment_proof_url: None,
            payment_account_id: None,
            account_transaction_id: None,
            validated_by: None,
            validated_at: None,
            rejection_reason: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            proof_uploaded_at: None,
            rejected_at: None,
            processing_at: None,
            shipped_at: None,
            delivered_at: None,
            completed_at: None,
            cancelled_at: None,
        };
        self.insert_with_unique_number(&mut order, &items).await?;

        let reference = MovementReference::Order(order.id);
        let reserved = match self.ledger.expand(&items).await {
            Ok(expanded) => self
                .ledger
                .apply_all(&expanded, MovementType::Reserve, reference, Some(actor.id))
                .await
                .map(|_| expanded),
            Err(error) => Err(error),
        };
        let expanded = match reserved {
            Ok(expanded) => expanded,
            Err(error) => {
                if let Err(cleanup) = self.orders.delete_order(order.id).await {
                    tracing::error!(
                        order_id = %order.id,
                        error = %cleanup,
                        "failed to delete order after reservation failure"
                    );
                }
                return Err(error);
            }
        };

        for item in &items {
            if let ItemRef::Product(product_id) = item.item
                && let Some(record) = expanded.records.get(&product_id)
            {
                let context = format!("link item {} to inventory", item.id);
                run_non_critical(
                    &context,
                    self.orders.link_item_inventory(order.id, item.id, record.id),
                )
                .await;
            }
        }

        if self.config.assign_order_accounts {
            self.assign_account(&mut order).await;
        }

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total,
            "order created"
        );
        self.record(&order, "status", "", OrderStatus::Pending, Some(actor.id), None)
            .await;
        Ok(order)
    }

    /// Attaches the customer's payment evidence.
    pub async fn upload_payment_proof(
        &self,
        order_id: Uuid,
        actor: &Actor,
        proof_url: &str,
    ) -> Result<Order> {
        let mut order = self.load(order_id).await?;
        ensure_owner(actor, order.owner, "this order")?;
        if proof_url.trim().is_empty() {
            return Err(FulfillmentError::validation("A payment proof reference is required"));
        }
        ensure_open(&order)?;
        ensure_payment_step(&order, PaymentStatus::ProofUploaded)?;

        let expected = order.state();
        let now = self.clock.now();
        order.payment_status = PaymentStatus::ProofUploaded;
        order.payment_proof_url = Some(proof_url.trim().to_string());
        order.proof_uploaded_at = Some(now);
        order.updated_at = now;
        self.commit(&order, expected).await?;

        self.record(
            &order,
            "payment_status",
            expected.payment_status,
            order.payment_status,
            Some(actor.id),
            None,
        )
        .await;
        Ok(order)
    }

    /// Admin approval of the payment proof: consumes the reserved stock.
    ///
    /// The status is claimed first; a second validation racing this one
    /// fails the compare-and-set and never reduces stock. If reduction
    /// fails, reduced lines are restored and the claim is reverted.
    pub async fn validate_payment(&self, order_id: Uuid, admin: &Actor) -> Result<Order> {
        self.authorizer.require_admin(admin).await?;
        let original = self.load(order_id).await?;
        ensure_open(&original)?;
        ensure_payment_step(&original, PaymentStatus::Validated)?;

        let expected = original.state();
        let now = self.clock.now();
        let mut order = original.clone();
        order.payment_status = PaymentStatus::Validated;
        order.validated_by = Some(admin.id);
        order.validated_at = Some(now);
        order.updated_at = now;
        self.commit(&order, expected).await?;

        if let Err(error) = self
            .move_stock(&order, MovementType::Reduce, admin.id)
            .await
        {
            self.revert(&original, order.state()).await;
            return Err(error);
        }

        if let Some(transaction_id) = order.account_transaction_id {
            let context = format!("validate account transaction {}", transaction_id);
            run_non_critical(&context, self.rotation.validate(transaction_id)).await;
        }

        tracing::info!(order_id = %order.id, admin = %admin.id, "order payment validated");
        self.record(
            &order,
            "payment_status",
            expected.payment_status,
            order.payment_status,
            Some(admin.id),
            None,
        )
        .await;
        Ok(order)
    }

    /// Admin refusal of the payment proof: releases the reservation and
    /// reverses the account registration.
    pub async fn reject_payment(&self, order_id: Uuid, admin: &Actor, reason: &str) -> Result<Order> {
        self.authorizer.require_admin(admin).await?;
        if reason.trim().is_empty() {
            return Err(FulfillmentError::validation("A rejection reason is required"));
        }
        let original = self.load(order_id).await?;
        ensure_open(&original)?;
        ensure_payment_step(&original, PaymentStatus::Rejected)?;

        let expected = original.state();
        let now = self.clock.now();
        let mut order = original.clone();
        order.payment_status = PaymentStatus::Rejected;
        order.rejection_reason = Some(reason.trim().to_string());
        order.rejected_at = Some(now);
        order.updated_at = now;
        order.payment_account_id = None;
        order.account_transaction_id = None;
        self.commit(&order, expected).await?;

        if let Err(error) = self
            .move_stock(&order, MovementType::Release, admin.id)
            .await
        {
            self.revert(&original, order.state()).await;
            return Err(error);
        }

        if let Some(transaction_id) = original.account_transaction_id {
            let context = format!("reject account transaction {}", transaction_id);
            run_non_critical(&context, self.rotation.reject(transaction_id)).await;
        }

        tracing::info!(order_id = %order.id, admin = %admin.id, "order payment rejected");
        self.record(
            &order,
            "payment_status",
            expected.payment_status,
            order.payment_status,
            Some(admin.id),
            order.rejection_reason.clone(),
        )
        .await;
        Ok(order)
    }

    /// Retry after a rejection: back to pending payment with stock held again.
    pub async fn reopen_payment(&self, order_id: Uuid, actor: &Actor) -> Result<Order> {
        let original = self.load(order_id).await?;
        ensure_owner(actor, original.owner, "this order")?;
        ensure_open(&original)?;
        ensure_payment_step(&original, PaymentStatus::Pending)?;

        let expected = original.state();
        let mut order = original.clone();
        order.payment_status = PaymentStatus::Pending;
        order.payment_proof_url = None;
        order.updated_at = self.clock.now();
        self.commit(&order, expected).await?;

        if let Err(error) = self
            .move_stock(&order, MovementType::Reserve, actor.id)
            .await
        {
            self.revert(&original, order.state()).await;
            return Err(error);
        }

        if self.config.assign_order_accounts {
            self.assign_account(&mut order).await;
        }

        self.record(
            &order,
            "payment_status",
            expected.payment_status,
            order.payment_status,
            Some(actor.id),
            None,
        )
        .await;
        Ok(order)
    }

    pub async fn start_processing(&self, order_id: Uuid, admin: &Actor) -> Result<Order> {
        self.advance(order_id, admin, OrderStatus::Processing).await
    }

    pub async fn mark_shipped(&self, order_id: Uuid, admin: &Actor) -> Result<Order> {
        self.advance(order_id, admin, OrderStatus::Shipped).await
    }

    pub async fn mark_delivered(&self, order_id: Uuid, admin: &Actor) -> Result<Order> {
        self.advance(order_id, admin, OrderStatus::Delivered).await
    }

    pub async fn complete_order(&self, order_id: Uuid, admin: &Actor) -> Result<Order> {
        self.advance(order_id, admin, OrderStatus::Completed).await
    }

    /// Cancels a pending or processing order.
    ///
    /// Customers may cancel their own pending orders; processing orders need
    /// an admin. Stock still held by a reservation is released; stock
    /// already consumed by a validated payment is not put back.
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<Order> {
        let original = self.load(order_id).await?;
        ensure_owner_or_admin(actor, original.owner, "this order")?;
        ensure_status_step(&original, OrderStatus::Cancelled)?;
        if original.status != OrderStatus::Pending {
            self.authorizer.require_admin(actor).await?;
        }

        let expected = original.state();
        let mut order = original.clone();
        order.stamp_status(OrderStatus::Cancelled, self.clock.now());
        order.cancellation_reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        let held = original.payment_status.holds_reservation();
        if held {
            order.payment_account_id = None;
            order.account_transaction_id = None;
        }
        self.commit(&order, expected).await?;

        if held
            && let Err(error) = self
                .move_stock(&order, MovementType::Release, actor.id)
                .await
        {
            self.revert(&original, order.state()).await;
            return Err(error);
        }

        if held && let Some(transaction_id) = original.account_transaction_id {
            let context = format!("reject account transaction {}", transaction_id);
            run_non_critical(&context, self.rotation.reject(transaction_id)).await;
        }

        tracing::info!(order_id = %order.id, actor = %actor.id, "order cancelled");
        self.record(
            &order,
            "status",
            expected.status,
            order.status,
            Some(actor.id),
            order.cancellation_reason.clone(),
        )
        .await;
        Ok(order)
    }

    pub async fn get_order(&self, order_id: Uuid, actor: &Actor) -> Result<Order> {
        let order = self.load(order_id).await?;
        ensure_owner_or_admin(actor, order.owner, "this order")?;
        Ok(order)
    }

    pub async fn order_items(&self, order_id: Uuid, actor: &Actor) -> Result<Vec<OrderItem>> {
        let order = self.get_order(order_id, actor).await?;
        self.orders
            .order_items(order.id)
            .await
            .map_err(FulfillmentError::db("order_items", order.id))
    }

    pub async fn orders_for_owner(&self, actor: &Actor, owner: UserId) -> Result<Vec<Order>> {
        ensure_owner_or_admin(actor, owner, "these orders")?;
        self.orders
            .orders_for_owner(owner)
            .await
            .map_err(FulfillmentError::db("orders_for_owner", owner))
    }

    pub async fn history(&self, order_id: Uuid, actor: &Actor) -> Result<Vec<StatusChange>> {
        let order = self.get_order(order_id, actor).await?;
        self.history
            .changes_for(order.id)
            .await
            .map_err(FulfillmentError::db("order_history", order.id))
    }

    async fn advance(&self, order_id: Uuid, admin: &Actor, target: OrderStatus) -> Result<Order> {
        self.authorizer.require_admin(admin).await?;
        let mut order = self.load(order_id).await?;
        ensure_status_step(&order, target)?;
        if target == OrderStatus::Processing && order.payment_status != PaymentStatus::Validated {
            return Err(FulfillmentError::invalid_operation(format!(
                "Order {} cannot be processed with payment {}",
                order.order_number, order.payment_status
            )));
        }

        let expected = order.state();
        order.stamp_status(target, self.clock.now());
        self.commit(&order, expected).await?;

        tracing::info!(order_id = %order.id, status = %target, "order status advanced");
        self.record(&order, "status", expected.status, target, Some(admin.id), None)
            .await;
        Ok(order)
    }

    async fn insert_with_unique_number(&self, order: &mut Order, items: &[OrderItem]) -> Result<()> {
        for _ in 0..self.config.number_attempts {
            order.order_number = generate_number(&self.config.order_number_prefix, order.created_at);
            match self.orders.insert_order(order.clone(), items.to_vec()).await {
                Ok(()) => return Ok(()),
                Err(StoreError::UniqueViolation(detail)) => {
                    tracing::warn!(order_number = %order.order_number, %detail, "order number collision");
                }
                Err(error) => {
                    return Err(FulfillmentError::db("create_order", &order.order_number)(error));
                }
            }
        }
        Err(FulfillmentError::db("create_order", order.id)(
            StoreError::UniqueViolation("no free order number".to_string()),
        ))
    }

    /// Registers a product-class account for the order total. Failure
    /// leaves the order without an account.
    async fn assign_account(&self, order: &mut Order) {
        let Ok(amount) = Amount::new(order.total) else {
            return;
        };
        let context = format!("assign payment account to order {}", order.id);
        let Some(assignment) = run_non_critical(
            &context,
            self.rotation
                .register(TypeClass::Product, amount, AccountReference::Order(order.id)),
        )
        .await
        else {
            return;
        };

        let expected = order.state();
        let mut updated = order.clone();
        updated.payment_account_id = Some(assignment.account.id);
        updated.account_transaction_id = Some(assignment.transaction.id);
        let linked = run_non_critical(&context, self.orders.update_order_if(&updated, expected)).await;
        if linked == Some(true) {
            *order = updated;
        } else {
            run_non_critical(&context, self.rotation.reject(assignment.transaction.id)).await;
        }
    }

    async fn move_stock(&self, order: &Order, movement: MovementType, actor: UserId) -> Result<()> {
        let items = self
            .orders
            .order_items(order.id)
            .await
            .map_err(FulfillmentError::db("order_items", order.id))?;
        let expanded = self.ledger.expand(&items).await?;
        self.ledger
            .apply_all(&expanded, movement, MovementReference::Order(order.id), Some(actor))
            .await
    }

    async fn load(&self, order_id: Uuid) -> Result<Order> {
        self.orders
            .get_order(order_id)
            .await
            .map_err(FulfillmentError::db("load_order", order_id))?
            .ok_or_else(|| FulfillmentError::not_found("order", order_id))
    }

    async fn commit(&self, order: &Order, expected: OrderState) -> Result<()> {
        let applied = self
            .orders
            .update_order_if(order, expected)
            .await
            .map_err(FulfillmentError::db("update_order", order.id))?;
        if applied {
            Ok(())
        } else {
            Err(FulfillmentError::invalid_operation(format!(
                "Order {} changed concurrently",
                order.order_number
            )))
        }
    }

    /// Writes `original` back after a failed multi-step operation.
    async fn revert(&self, original: &Order, claimed: OrderState) {
        match self.orders.update_order_if(original, claimed).await {
            Ok(true) => {}
            Ok(false) => tracing::error!(order_id = %original.id, "order changed before revert"),
            Err(error) => tracing::error!(order_id = %original.id, %error, "failed to revert order"),
        }
    }

    async fn record(
        &self,
        order: &Order,
        field: &str,
        from: impl Display,
        to: impl Display,
        actor: Option<UserId>,
        note: Option<String>,
    ) {
        let now = self.clock.now();
        let change = StatusChange::new(
            AggregateKind::Order,
            order.id,
            field,
            &from,
            &to,
            actor,
            note,
            now,
        );
        let context = format!("record history for order {}", order.id);
        run_non_critical(&context, self.history.append_change(change)).await;

        let event = TransitionEvent {
            aggregate: AggregateKind::Order,
            aggregate_id: order.id,
            owner: order.owner,
            reference: order.order_number.clone(),
            from: from.to_string(),
            to: to.to_string(),
            occurred_at: now,
        };
        let context = format!("notify transition of order {}", order.id);
        run_non_critical(&context, self.notifier.notify(&event)).await;
    }
}

fn ensure_status_step(order: &Order, target: OrderStatus) -> Result<()> {
    if order.status.can_transition_to(target) {
        Ok(())
    } else {
        Err(FulfillmentError::invalid_operation(format!(
            "Order {} cannot move from {} to {}",
            order.order_number, order.status, target
        )))
    }
}

fn ensure_payment_step(order: &Order, target: PaymentStatus) -> Result<()> {
    if order.payment_status.can_transition_to(target) {
        Ok(())
    } else {
        Err(FulfillmentError::invalid_operation(format!(
            "Order {} payment cannot move from {} to {}",
            order.order_number, order.payment_status, target
        )))
    }
}

/// Payment changes are only accepted while the order itself is pending.
fn ensure_open(order: &Order) -> Result<()> {
    if order.status == OrderStatus::Pending {
        Ok(())
    } else {
        Err(FulfillmentError::invalid_operation(format!(
            "Order {} is {}",
            order.order_number, order.status
        )))
    }
}
