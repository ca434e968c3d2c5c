use crate::application::authorization::{ensure_owner, ensure_owner_or_admin};
use crate::application::non_critical::run_non_critical;
use crate::application::numbering::generate_number;
use crate::application::rotation::AccountRotation;
use crate::config::EngineConfig;
use crate::domain::actor::{Actor, UserId};
use crate::domain::commission::{CommissionBreakdown, RemittanceType, calculate_commission};
use crate::domain::history::{AggregateKind, StatusChange, TransitionEvent};
use crate::domain::money::Amount;
use crate::domain::payment_account::{AccountReference, TypeClass};
use crate::domain::ports::{
    Authorizer, Clock, Collaborators, HistoryStoreRef, Notifier, RecipientVerifier,
    RemittanceStoreRef,
};
use crate::domain::remittance::{
    DeliveryConfirmation, NewRemittance, Remittance, RemittanceAlert, RemittanceStatus,
};
use crate::error::{FulfillmentError, Result, StoreError};
use std::sync::Arc;
use uuid::Uuid;

/// Who is confirming a delivery.
#[derive(Debug, Clone)]
pub enum DeliveryConfirmer {
    Admin(Actor),
    /// The recipient, proving identity with the token shared at creation.
    Recipient { token: String },
}

/// Remittance lifecycle. Mirrors [`crate::application::orders::OrderService`]
/// with commission calculation in place of inventory.
pub struct RemittanceService {
    remittances: RemittanceStoreRef,
    history: HistoryStoreRef,
    notifier: Arc<dyn Notifier>,
    authorizer: Arc<dyn Authorizer>,
    recipients: Arc<dyn RecipientVerifier>,
    clock: Arc<dyn Clock>,
    rotation: Arc<AccountRotation>,
    config: Arc<EngineConfig>,
}

impl RemittanceService {
    pub fn new(
        collaborators: &Collaborators,
        rotation: Arc<AccountRotation>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            remittances: collaborators.remittances.clone(),
            history: collaborators.history.clone(),
            notifier: collaborators.notifier.clone(),
            authorizer: collaborators.authorizer.clone(),
            recipients: collaborators.recipients.clone(),
            clock: collaborators.clock.clone(),
            rotation,
            config,
        }
    }

    /// Quote for sending `amount` with the given remittance type.
    pub async fn calculate_remittance(
        &self,
        remittance_type_id: Uuid,
        amount: rust_decimal::Decimal,
    ) -> Result<CommissionBreakdown> {
        let kind = self.load_type(remittance_type_id).await?;
        calculate_commission(&kind, amount)
    }

    pub async fn list_types(&self) -> Result<Vec<RemittanceType>> {
        let mut types: Vec<RemittanceType> = self
            .remittances
            .list_types()
            .await
            .map_err(FulfillmentError::db("list_remittance_types", "active"))?
            .into_iter()
            .filter(|kind| kind.is_active)
            .collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(types)
    }

    /// Creates a remittance in `CREATED` with its commission fixed at
    /// creation time. An account is pre-registered when possible; when the
    /// pool is exhausted the remittance is still created and registration is
    /// retried at validation.
    pub async fn create_remittance(&self, actor: &Actor, request: NewRemittance) -> Result<Remittance> {
        ensure_owner(actor, request.owner, "this remittance")?;
        request.recipient.validate()?;
        let kind = self.load_type(request.remittance_type_id).await?;
        if !self.config.supports_currency(&kind.currency) {
            return Err(FulfillmentError::validation(format!(
                "Unsupported currency: {}",
                kind.currency
            )));
        }
        let commission = calculate_commission(&kind, request.amount)?;

        let now = self.clock.now();
        let mut remittance = Remittance {
            id: Uuid::new_v4(),
            reference: String::new(),
            owner: request.owner,
            remittance_type_id: kind.id,
            amount: request.amount,
            commission,
            total_amount: commission.total_charged,
            currency: kind.currency.clone(),
            recipient: request.recipient,
            status: RemittanceStatus::Created,
            payment_proof_url: None,
            payment_account_id: None,
            account_transaction_id: None,
            validated_by: None,
            rejection_reason: None,
            cancellation_reason: None,
            bank_transfer_ref: None,
            delivered_by: None,
            delivery_proof_url: None,
            confirmation_token: Uuid::new_v4().simple().to_string(),
            created_at: now,
            updated_at: now,
            proof_uploaded_at: None,
            validated_at: None,
            rejected_at: None,
            processing_started_at: None,
            delivered_at: None,
            completed_at: None,
            cancelled_at: None,
        };
        self.insert_with_unique_reference(&mut remittance).await?;

        if self.config.register_remittance_accounts
            && let Some(linked) = self.assign_account(&remittance).await
        {
            remittance = linked;
        }

        tracing::info!(
            remittance_id = %remittance.id,
            reference = %remittance.reference,
            amount = %remittance.amount,
            commission = %remittance.commission.total,
            "remittance created"
        );
        self.record(&remittance, "", RemittanceStatus::Created, Some(actor.id), None)
            .await;
        Ok(remittance)
    }

    /// First upload, or a new upload after rejection.
    pub async fn upload_payment_proof(
        &self,
        remittance_id: Uuid,
        actor: &Actor,
        proof_url: &str,
    ) -> Result<Remittance> {
        let mut remittance = self.load(remittance_id).await?;
        ensure_owner(actor, remittance.owner, "this remittance")?;
        if proof_url.trim().is_empty() {
            return Err(FulfillmentError::validation("A payment proof reference is required"));
        }
        let from = self.transition(&mut remittance, RemittanceStatus::ProofUploaded, |r| {
            r.payment_proof_url = Some(proof_url.trim().to_string());
        })
        .await?;
        self.record(&remittance, from, RemittanceStatus::ProofUploaded, Some(actor.id), None)
            .await;
        Ok(remittance)
    }

    /// Admin approval of the payment. Settles the account transaction,
    /// registering one first if none is pending.
    pub async fn validate_payment(&self, remittance_id: Uuid, admin: &Actor) -> Result<Remittance> {
        self.authorizer.require_admin(admin).await?;
        let mut remittance = self.load(remittance_id).await?;
        let now = self.clock.now();
        let from = self.transition(&mut remittance, RemittanceStatus::Validated, |r| {
            r.validated_by = Some(admin.id);
            r.validated_at = Some(now);
        })
        .await?;

        if remittance.account_transaction_id.is_none()
            && let Some(linked) = self.assign_account(&remittance).await
        {
            remittance = linked;
        }
        if let Some(transaction_id) = remittance.account_transaction_id {
            let context = format!("validate account transaction {}", transaction_id);
            run_non_critical(&context, self.rotation.validate(transaction_id)).await;
        }

        tracing::info!(remittance_id = %remittance.id, admin = %admin.id, "remittance payment validated");
        self.record(&remittance, from, RemittanceStatus::Validated, Some(admin.id), None)
            .await;
        Ok(remittance)
    }

    /// Admin refusal of the payment proof. The account registration is
    /// reversed; the sender may upload a new proof afterwards.
    pub async fn reject_payment(
        &self,
        remittance_id: Uuid,
        admin: &Actor,
        reason: &str,
    ) -> Result<Remittance> {
        self.authorizer.require_admin(admin).await?;
        if reason.trim().is_empty() {
            return Err(FulfillmentError::validation("A rejection reason is required"));
        }
        let mut remittance = self.load(remittance_id).await?;
        let transaction_id = remittance.account_transaction_id;
        let from = self.transition(&mut remittance, RemittanceStatus::Rejected, |r| {
            r.rejection_reason = Some(reason.trim().to_string());
            r.payment_account_id = None;
            r.account_transaction_id = None;
        })
        .await?;

        if let Some(transaction_id) = transaction_id {
            let context = format!("reject account transaction {}", transaction_id);
            run_non_critical(&context, self.rotation.reject(transaction_id)).await;
        }

        tracing::info!(remittance_id = %remittance.id, admin = %admin.id, "remittance payment rejected");
        let note = remittance.rejection_reason.clone();
        self.record(&remittance, from, RemittanceStatus::Rejected, Some(admin.id), note)
            .await;
        Ok(remittance)
    }

    pub async fn start_processing(
        &self,
        remittance_id: Uuid,
        admin: &Actor,
        bank_transfer_ref: Option<&str>,
    ) -> Result<Remittance> {
        self.authorizer.require_admin(admin).await?;
        let mut remittance = self.load(remittance_id).await?;
        let bank_transfer_ref = bank_transfer_ref
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        let from = self.transition(&mut remittance, RemittanceStatus::Processing, |r| {
            if bank_transfer_ref.is_some() {
                r.bank_transfer_ref = bank_transfer_ref.clone();
            }
        })
        .await?;
        self.record(&remittance, from, RemittanceStatus::Processing, Some(admin.id), None)
            .await;
        Ok(remittance)
    }

    /// Confirms the money reached the recipient, either by an admin or by
    /// the recipient presenting their token.
    pub async fn confirm_delivery(
        &self,
        remittance_id: Uuid,
        confirmer: DeliveryConfirmer,
        delivery_proof_url: Option<&str>,
    ) -> Result<Remittance> {
        let mut remittance = self.load(remittance_id).await?;
        let (delivered_by, actor) = match &confirmer {
            DeliveryConfirmer::Admin(admin) => {
                self.authorizer.require_admin(admin).await?;
                (DeliveryConfirmation::Admin { user: admin.id }, Some(admin.id))
            }
            DeliveryConfirmer::Recipient { token } => {
                if !self.recipients.verify(&remittance, token).await? {
                    return Err(FulfillmentError::Authorization(format!(
                        "Invalid recipient token for remittance {}",
                        remittance.reference
                    )));
                }
                (DeliveryConfirmation::Recipient, None)
            }
        };

        let proof = delivery_proof_url
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        let from = self.transition(&mut remittance, RemittanceStatus::Delivered, |r| {
            r.delivered_by = Some(delivered_by.clone());
            if proof.is_some() {
                r.delivery_proof_url = proof.clone();
            }
        })
        .await?;

        tracing::info!(remittance_id = %remittance.id, by = ?remittance.delivered_by, "remittance delivered");
        self.record(
            &remittance,
            from,
            RemittanceStatus::Delivered,
            actor,
            None,
        )
        .await;
        Ok(remittance)
    }

    pub async fn complete_remittance(&self, remittance_id: Uuid, admin: &Actor) -> Result<Remittance> {
        self.authorizer.require_admin(admin).await?;
        let mut remittance = self.load(remittance_id).await?;
        let from = self.transition(&mut remittance, RemittanceStatus::Completed, |_| {})
            .await?;
        self.record(&remittance, from, RemittanceStatus::Completed, Some(admin.id), None)
            .await;
        Ok(remittance)
    }

    /// Cancels before validation; reverses a pending account registration.
    pub async fn cancel_remittance(
        &self,
        remittance_id: Uuid,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<Remittance> {
        let mut remittance = self.load(remittance_id).await?;
        ensure_owner_or_admin(actor, remittance.owner, "this remittance")?;
        let transaction_id = remittance.account_transaction_id;
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        let from = self.transition(&mut remittance, RemittanceStatus::Cancelled, |r| {
            r.cancellation_reason = reason.clone();
        })
        .await?;

        if let Some(transaction_id) = transaction_id {
            let context = format!("reject account transaction {}", transaction_id);
            run_non_critical(&context, self.rotation.reject(transaction_id)).await;
        }

        tracing::info!(remittance_id = %remittance.id, actor = %actor.id, "remittance cancelled");
        let note = remittance.cancellation_reason.clone();
        self.record(&remittance, from, RemittanceStatus::Cancelled, Some(actor.id), note)
            .await;
        Ok(remittance)
    }

    /// Remittances processing for longer than the configured threshold,
    /// longest first.
    pub async fn remittances_needing_alert(&self) -> Result<Vec<RemittanceAlert>> {
        let now = self.clock.now();
        let threshold = chrono::Duration::hours(self.config.processing_alert_hours);
        let mut alerts: Vec<RemittanceAlert> = self
            .remittances
            .remittances_by_status(RemittanceStatus::Processing)
            .await
            .map_err(FulfillmentError::db("remittances_needing_alert", RemittanceStatus::Processing))?
            .into_iter()
            .filter_map(|remittance| {
                let elapsed = remittance.time_in_processing(now)?;
                (elapsed > threshold).then_some(RemittanceAlert {
                    hours_in_processing: elapsed.num_hours(),
                    remittance,
                })
            })
            .collect();
        alerts.sort_by_key(|alert| alert.remittance.processing_started_at);
        Ok(alerts)
    }

    pub async fn get_remittance(&self, remittance_id: Uuid, actor: &Actor) -> Result<Remittance> {
        let remittance = self.load(remittance_id).await?;
        ensure_owner_or_admin(actor, remittance.owner, "this remittance")?;
        Ok(remittance)
    }

    pub async fn remittances_for_owner(&self, actor: &Actor, owner: UserId) -> Result<Vec<Remittance>> {
        ensure_owner_or_admin(actor, owner, "these remittances")?;
        self.remittances
            .remittances_for_owner(owner)
            .await
            .map_err(FulfillmentError::db("remittances_for_owner", owner))
    }

    pub async fn history(&self, remittance_id: Uuid, actor: &Actor) -> Result<Vec<StatusChange>> {
        let remittance = self.get_remittance(remittance_id, actor).await?;
        self.history
            .changes_for(remittance.id)
            .await
            .map_err(FulfillmentError::db("remittance_history", remittance.id))
    }

    /// Checks the table, applies `update`, stamps the timestamp and writes
    /// with a compare-and-set on the status read by the caller. Returns the
    /// status moved from; on failure `remittance` is left as loaded.
    async fn transition<F>(
        &self,
        remittance: &mut Remittance,
        target: RemittanceStatus,
        update: F,
    ) -> Result<RemittanceStatus>
    where
        F: FnOnce(&mut Remittance),
    {
        let current = remittance.status;
        if !current.can_transition_to(target) {
            return Err(FulfillmentError::invalid_operation(format!(
                "Remittance {} cannot move from {} to {}",
                remittance.reference, current, target
            )));
        }

        let mut next = remittance.clone();
        update(&mut next);
        next.stamp_status(target, self.clock.now());

        let applied = self
            .remittances
            .update_remittance_if(&next, current)
            .await
            .map_err(FulfillmentError::db("update_remittance", remittance.id))?;
        if !applied {
            return Err(FulfillmentError::invalid_operation(format!(
                "Remittance {} changed concurrently",
                remittance.reference
            )));
        }
        *remittance = next;
        Ok(current)
    }

    /// Registers a remittance-class account for the charged total and links
    /// it to the stored remittance. Returns the linked remittance.
    async fn assign_account(&self, remittance: &Remittance) -> Option<Remittance> {
        let amount = Amount::new(remittance.total_amount).ok()?;
        let context = format!("assign payment account to remittance {}", remittance.id);
        let assignment = run_non_critical(
            &context,
            self.rotation.register(
                TypeClass::Remittance,
                amount,
                AccountReference::Remittance(remittance.id),
            ),
        )
        .await?;

        let mut linked = remittance.clone();
        linked.payment_account_id = Some(assignment.account.id);
        linked.account_transaction_id = Some(assignment.transaction.id);
        let written = run_non_critical(
            &context,
            self.remittances.update_remittance_if(&linked, remittance.status),
        )
        .await;
        if written == Some(true) {
            Some(linked)
        } else {
            run_non_critical(&context, self.rotation.reject(assignment.transaction.id)).await;
            None
        }
    }

    async fn insert_with_unique_reference(&self, remittance: &mut Remittance) -> Result<()> {
        for _ in 0..self.config.number_attempts {
            remittance.reference =
                generate_number(&self.config.remittance_number_prefix, remittance.created_at);
            match self.remittances.insert_remittance(remittance.clone()).await {
                Ok(()) => return Ok(()),
                Err(StoreError::UniqueViolation(detail)) => {
                    tracing::warn!(reference = %remittance.reference, %detail, "remittance reference collision");
                }
                Err(error) => {
                    return Err(FulfillmentError::db("create_remittance", &remittance.reference)(error));
                }
            }
        }
        Err(FulfillmentError::db("create_remittance", remittance.id)(
            StoreError::UniqueViolation("no free remittance reference".to_string()),
        ))
    }

    async fn load(&self, remittance_id: Uuid) -> Result<Remittance> {
        self.remittances
            .get_remittance(remittance_id)
            .await
            .map_err(FulfillmentError::db("load_remittance", remittance_id))?
            .ok_or_else(|| FulfillmentError::not_found("remittance", remittance_id))
    }

    async fn load_type(&self, remittance_type_id: Uuid) -> Result<RemittanceType> {
        self.remittances
            .get_type(remittance_type_id)
            .await
            .map_err(FulfillmentError::db("load_remittance_type", remittance_type_id))?
            .ok_or_else(|| FulfillmentError::not_found("remittance type", remittance_type_id))
    }

    async fn record(
        &self,
        remittance: &Remittance,
        from: impl std::fmt::Display,
        to: RemittanceStatus,
        actor: Option<UserId>,
        note: Option<String>,
    ) {
        let now = self.clock.now();
        let from = from.to_string();
        let change = StatusChange::new(
            AggregateKind::Remittance,
            remittance.id,
            "status",
            &from,
            to,
            actor,
            note,
            now,
        );
        let context = format!("record history for remittance {}", remittance.id);
        run_non_critical(&context, self.history.append_change(change)).await;

        let event = TransitionEvent {
            aggregate: AggregateKind::Remittance,
            aggregate_id: remittance.id,
            owner: remittance.owner,
            reference: remittance.reference.clone(),
            from,
            to: to.to_string(),
            occurred_at: now,
        };
        let context = format!("notify transition of remittance {}", remittance.id);
        run_non_critical(&context, self.notifier.notify(&event)).await;
    }
}
