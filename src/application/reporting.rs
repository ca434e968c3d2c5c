use crate::domain::actor::Actor;
use crate::domain::order::{OrderStatus, PaymentStatus};
use crate::domain::payment_account::PaymentAccount;
use crate::domain::ports::{
    Authorizer, Clock, Collaborators, OrderStoreRef, PaymentAccountStoreRef, RemittanceStoreRef,
};
use crate::domain::remittance::RemittanceStatus;
use crate::error::{FulfillmentError, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderSummary {
    pub by_status: BTreeMap<String, usize>,
    pub by_payment_status: BTreeMap<String, usize>,
    /// Sum of totals of orders whose payment was validated, per currency.
    pub validated_revenue: BTreeMap<String, Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemittanceSummary {
    pub by_status: BTreeMap<String, usize>,
    /// Amount sent by remittances past validation, per currency.
    pub validated_amount: BTreeMap<String, Decimal>,
    /// Commission earned on those remittances, per currency.
    pub validated_commission: BTreeMap<String, Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountUtilization {
    pub account_id: Uuid,
    pub holder_name: String,
    pub is_active: bool,
    pub daily_used: Decimal,
    pub daily_limit: Decimal,
    pub monthly_used: Decimal,
    pub monthly_limit: Decimal,
}

impl AccountUtilization {
    fn from_account(account: &PaymentAccount) -> Self {
        Self {
            account_id: account.id,
            holder_name: account.holder_name.clone(),
            is_active: account.is_active,
            daily_used: account.current_daily_total,
            daily_limit: account.daily_limit,
            monthly_used: account.current_monthly_total,
            monthly_limit: account.monthly_limit,
        }
    }
}

/// Read-only admin aggregates.
pub struct ReportingService {
    orders: OrderStoreRef,
    remittances: RemittanceStoreRef,
    accounts: PaymentAccountStoreRef,
    authorizer: Arc<dyn Authorizer>,
    clock: Arc<dyn Clock>,
}

impl ReportingService {
    pub fn new(collaborators: &Collaborators) -> Self {
        Self {
            orders: collaborators.orders.clone(),
            remittances: collaborators.remittances.clone(),
            accounts: collaborators.accounts.clone(),
            authorizer: collaborators.authorizer.clone(),
            clock: collaborators.clock.clone(),
        }
    }

    pub async fn order_summary(&self, admin: &Actor) -> Result<OrderSummary> {
        self.authorizer.require_admin(admin).await?;
        let orders = self
            .orders
            .all_orders()
            .await
            .map_err(FulfillmentError::db("order_summary", "all"))?;

        let mut summary = OrderSummary::default();
        for status in OrderStatus::ALL {
            summary.by_status.insert(status.to_string(), 0);
        }
        for status in PaymentStatus::ALL {
            summary.by_payment_status.insert(status.to_string(), 0);
        }
        for order in &orders {
            *summary.by_status.entry(order.status.to_string()).or_default() += 1;
            *summary
                .by_payment_status
                .entry(order.payment_status.to_string())
                .or_default() += 1;
            if order.payment_status == PaymentStatus::Validated
                && order.status != OrderStatus::Cancelled
            {
                *summary
                    .validated_revenue
                    .entry(order.currency.clone())
                    .or_default() += order.total;
            }
        }
        Ok(summary)
    }

    pub async fn remittance_summary(&self, admin: &Actor) -> Result<RemittanceSummary> {
        self.authorizer.require_admin(admin).await?;
        let remittances = self
            .remittances
            .all_remittances()
            .await
            .map_err(FulfillmentError::db("remittance_summary", "all"))?;

        let mut summary = RemittanceSummary::default();
        for status in RemittanceStatus::ALL {
            summary.by_status.insert(status.to_string(), 0);
        }
        for remittance in &remittances {
            *summary
                .by_status
                .entry(remittance.status.to_string())
                .or_default() += 1;
            if is_past_validation(remittance.status) {
                *summary
                    .validated_amount
                    .entry(remittance.currency.clone())
                    .or_default() += remittance.amount;
                *summary
                    .validated_commission
                    .entry(remittance.currency.clone())
                    .or_default() += remittance.commission.total;
            }
        }
        Ok(summary)
    }

    /// Usage per account as of today; counters with a due reset read as zero.
    pub async fn account_utilization(&self, admin: &Actor) -> Result<Vec<AccountUtilization>> {
        self.authorizer.require_admin(admin).await?;
        let today = self.clock.now().date_naive();
        let mut accounts = self
            .accounts
            .all_accounts()
            .await
            .map_err(FulfillmentError::db("account_utilization", "all"))?;
        accounts.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id)));

        Ok(accounts
            .iter_mut()
            .map(|account| {
                account.reset_if_due(today);
                AccountUtilization::from_account(account)
            })
            .collect())
    }
}

fn is_past_validation(status: RemittanceStatus) -> bool {
    matches!(
        status,
        RemittanceStatus::Validated
            | RemittanceStatus::Processing
            | RemittanceStatus::Delivered
            | RemittanceStatus::Completed
    )
}
