use crate::application::non_critical::run_non_critical;
use crate::config::EngineConfig;
use crate::domain::money::Amount;
use crate::domain::payment_account::{
    AccountReference, AccountTransaction, AccountTransactionStatus, PaymentAccount, TypeClass,
    select_best,
};
use crate::domain::ports::{Clock, PaymentAccountStoreRef};
use crate::error::{FulfillmentError, Result, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Account chosen for a payment together with its pending ledger row.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountAssignment {
    pub account: PaymentAccount,
    pub transaction: AccountTransaction,
}

enum Increment {
    Applied(PaymentAccount),
    /// The account can no longer take the amount (limit reached by a
    /// concurrent registration, deactivated, or removed).
    Refused,
}

/// Rotation pool of payment-receiving accounts.
///
/// The transaction rows are the ledger of record; the running totals on the
/// account are a guard rail kept in step by compare-and-set updates.
pub struct AccountRotation {
    accounts: PaymentAccountStoreRef,
    clock: Arc<dyn Clock>,
    cas_retries: u32,
}

impl AccountRotation {
    pub fn new(accounts: PaymentAccountStoreRef, clock: Arc<dyn Clock>, config: &EngineConfig) -> Self {
        Self {
            accounts,
            clock,
            cas_retries: config.cas_retries,
        }
    }

    /// Chooses the best eligible account without registering anything.
    pub async fn select(&self, class: TypeClass, amount: Amount) -> Result<PaymentAccount> {
        let today = self.clock.now().date_naive();
        let pool = self
            .accounts
            .accounts_for_class(class)
            .await
            .map_err(FulfillmentError::db("select_account", class))?;

        select_best(&pool, class, amount, today).ok_or_else(|| exhausted(class, amount))
    }

    /// Selects an account, records a pending transaction for `reference`
    /// and adds `amount` to the account's running totals.
    pub async fn register(
        &self,
        class: TypeClass,
        amount: Amount,
        reference: AccountReference,
    ) -> Result<AccountAssignment> {
        let mut refused: HashSet<Uuid> = HashSet::new();

        for _ in 0..=self.cas_retries {
            let now = self.clock.now();
            let pool: Vec<PaymentAccount> = self
                .accounts
                .accounts_for_class(class)
                .await
                .map_err(FulfillmentError::db("register_account", class))?
                .into_iter()
                .filter(|account| !refused.contains(&account.id))
                .collect();
            let account = select_best(&pool, class, amount, now.date_naive())
                .ok_or_else(|| exhausted(class, amount))?;

            let transaction = AccountTransaction {
                id: Uuid::new_v4(),
                account_id: account.id,
                reference,
                amount: amount.value(),
                type_class: class,
                status: AccountTransactionStatus::Pending,
                created_at: now,
                updated_at: now,
            };
            self.accounts
                .insert_transaction(transaction.clone())
                .await
                .map_err(FulfillmentError::db("register_account", account.id))?;

            let context = format!("increment counters of account {}", account.id);
            match run_non_critical(&context, self.increment(account.id, class, amount, now)).await {
                Some(Increment::Applied(updated)) => {
                    tracing::info!(
                        account_id = %updated.id,
                        transaction_id = %transaction.id,
                        %class,
                        %amount,
                        "payment account registered"
                    );
                    return Ok(AccountAssignment {
                        account: updated,
                        transaction,
                    });
                }
                Some(Increment::Refused) => {
                    tracing::info!(account_id = %account.id, "account refused registration after race");
                    let context = format!("reject refused transaction {}", transaction.id);
                    run_non_critical(
                        &context,
                        self.accounts.update_transaction_status_if(
                            transaction.id,
                            AccountTransactionStatus::Pending,
                            AccountTransactionStatus::Rejected,
                            now,
                        ),
                    )
                    .await;
                    refused.insert(account.id);
                }
                None => {
                    return Ok(AccountAssignment {
                        account,
                        transaction,
                    });
                }
            }
        }

        Err(exhausted(class, amount))
    }

    /// Marks a pending transaction validated. Counters stay as registered.
    pub async fn validate(&self, transaction_id: Uuid) -> Result<AccountTransaction> {
        self.settle(transaction_id, AccountTransactionStatus::Validated)
            .await
    }

    /// Marks a pending transaction rejected and reverses its increment.
    pub async fn reject(&self, transaction_id: Uuid) -> Result<AccountTransaction> {
        let transaction = self
            .settle(transaction_id, AccountTransactionStatus::Rejected)
            .await?;

        let context = format!("roll back counters of account {}", transaction.account_id);
        run_non_critical(&context, self.rollback(&transaction)).await;
        Ok(transaction)
    }

    /// Persists due daily/monthly resets for every account. Returns how many
    /// accounts were reset; a second run on the same day returns zero.
    pub async fn reset_expired_counters(&self) -> Result<usize> {
        let today = self.clock.now().date_naive();
        let accounts = self
            .accounts
            .all_accounts()
            .await
            .map_err(FulfillmentError::db("reset_counters", today))?;

        let mut reset = 0;
        for mut account in accounts {
            let expected = account.counters();
            if !account.reset_if_due(today) {
                continue;
            }
            let applied = self
                .accounts
                .update_counters_if(account.id, expected, account.counters())
                .await
                .map_err(FulfillmentError::db("reset_counters", account.id))?;
            if applied {
                reset += 1;
            }
        }
        tracing::info!(reset, %today, "payment account counters reset");
        Ok(reset)
    }

    async fn settle(
        &self,
        transaction_id: Uuid,
        target: AccountTransactionStatus,
    ) -> Result<AccountTransaction> {
        let mut transaction = self
            .accounts
            .get_transaction(transaction_id)
            .await
            .map_err(FulfillmentError::db("settle_account_transaction", transaction_id))?
            .ok_or_else(|| FulfillmentError::not_found("account transaction", transaction_id))?;

        if transaction.status != AccountTransactionStatus::Pending {
            return Err(FulfillmentError::invalid_operation(format!(
                "Account transaction {} is {:?}, expected pending",
                transaction_id, transaction.status
            )));
        }

        let now = self.clock.now();
        let applied = self
            .accounts
            .update_transaction_status_if(
                transaction_id,
                AccountTransactionStatus::Pending,
                target,
                now,
            )
            .await
            .map_err(FulfillmentError::db("settle_account_transaction", transaction_id))?;
        if !applied {
            return Err(FulfillmentError::invalid_operation(format!(
                "Account transaction {} was settled concurrently",
                transaction_id
            )));
        }

        transaction.status = target;
        transaction.updated_at = now;
        Ok(transaction)
    }

    async fn increment(
        &self,
        account_id: Uuid,
        class: TypeClass,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> StoreResult<Increment> {
        for _ in 0..=self.cas_retries {
            let Some(mut account) = self.accounts.get_account(account_id).await? else {
                return Ok(Increment::Refused);
            };
            let expected = account.counters();
            account.reset_if_due(now.date_naive());
            if account.register(class, amount, now).is_err() {
                return Ok(Increment::Refused);
            }
            if self
                .accounts
                .update_counters_if(account_id, expected, account.counters())
                .await?
            {
                return Ok(Increment::Applied(account));
            }
        }
        Err(StoreError::Conflict(format!(
            "counters of account {} kept changing",
            account_id
        )))
    }

    async fn rollback(&self, transaction: &AccountTransaction) -> Result<()> {
        let today = self.clock.now().date_naive();
        let registered_on = transaction.created_at.date_naive();

        for _ in 0..=self.cas_retries {
            let mut account = self
                .accounts
                .get_account(transaction.account_id)
                .await
                .map_err(FulfillmentError::db("rollback_account", transaction.account_id))?
                .ok_or_else(|| FulfillmentError::not_found("payment account", transaction.account_id))?;
            let expected = account.counters();
            account.reset_if_due(today);
            account.rollback(transaction.amount, registered_on)?;
            if self
                .accounts
                .update_counters_if(account.id, expected, account.counters())
                .await
                .map_err(FulfillmentError::db("rollback_account", account.id))?
            {
                tracing::info!(
                    account_id = %account.id,
                    transaction_id = %transaction.id,
                    "payment account counters rolled back"
                );
                return Ok(());
            }
        }
        Err(FulfillmentError::db("rollback_account", transaction.account_id)(
            StoreError::Conflict("counters kept changing".to_string()),
        ))
    }
}

fn exhausted(class: TypeClass, amount: Amount) -> FulfillmentError {
    FulfillmentError::ServiceUnavailable(format!(
        "No {} payment account can receive {} right now",
        class, amount
    ))
}
