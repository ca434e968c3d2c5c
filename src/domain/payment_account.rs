use crate::domain::money::Amount;
use crate::error::{FulfillmentError, fmt_amount};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which flow an account receives payments for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeClass {
    Remittance,
    Product,
}

impl fmt::Display for TypeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeClass::Remittance => f.write_str("remittance"),
            TypeClass::Product => f.write_str("product"),
        }
    }
}

impl std::str::FromStr for TypeClass {
    type Err = FulfillmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remittance" => Ok(TypeClass::Remittance),
            "product" => Ok(TypeClass::Product),
            other => Err(FulfillmentError::validation(format!(
                "Unknown account type class: {}",
                other
            ))),
        }
    }
}

/// Running totals of an account, also the compare-and-set guard for
/// counter updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCounters {
    pub current_daily_total: Decimal,
    pub current_monthly_total: Decimal,
    pub last_reset_date: NaiveDate,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Why an account was skipped by the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligibility {
    Inactive,
    ClassNotAccepted,
    SecurityLimit,
    DailyLimit,
    MonthlyLimit,
}

/// Payment-receiving account in the rotation pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAccount {
    pub id: Uuid,
    pub holder_name: String,
    pub bank_name: String,
    pub account_number: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub accepts_remittances: bool,
    pub accepts_products: bool,
    pub daily_limit: Decimal,
    pub monthly_limit: Decimal,
    /// Per-transaction cap, stricter than the daily limit.
    pub security_limit: Decimal,
    pub current_daily_total: Decimal,
    pub current_monthly_total: Decimal,
    /// Lower values are preferred.
    pub priority: i32,
    pub last_reset_date: NaiveDate,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl PaymentAccount {
    pub fn accepts(&self, class: TypeClass) -> bool {
        match class {
            TypeClass::Remittance => self.accepts_remittances,
            TypeClass::Product => self.accepts_products,
        }
    }

    pub fn counters(&self) -> AccountCounters {
        AccountCounters {
            current_daily_total: self.current_daily_total,
            current_monthly_total: self.current_monthly_total,
            last_reset_date: self.last_reset_date,
            last_used_at: self.last_used_at,
        }
    }

    pub fn set_counters(&mut self, counters: AccountCounters) {
        self.current_daily_total = counters.current_daily_total;
        self.current_monthly_total = counters.current_monthly_total;
        self.last_reset_date = counters.last_reset_date;
        self.last_used_at = counters.last_used_at;
    }

    /// Zeroes the running totals whose period has ended. Returns whether
    /// anything changed; calling it twice for the same day is a no-op.
    pub fn reset_if_due(&mut self, today: NaiveDate) -> bool {
        if today <= self.last_reset_date {
            return false;
        }
        let same_month = today.year() == self.last_reset_date.year()
            && today.month() == self.last_reset_date.month();
        self.current_daily_total = Decimal::ZERO;
        if !same_month {
            self.current_monthly_total = Decimal::ZERO;
        }
        self.last_reset_date = today;
        true
    }

    /// Checks the selection rules in order: flags, security limit, daily
    /// limit, monthly limit.
    pub fn eligibility(&self, class: TypeClass, amount: Amount) -> Result<(), Ineligibility> {
        let amount = amount.value();
        if !self.is_active {
            return Err(Ineligibility::Inactive);
        }
        if !self.accepts(class) {
            return Err(Ineligibility::ClassNotAccepted);
        }
        if amount > self.security_limit {
            return Err(Ineligibility::SecurityLimit);
        }
        if self.current_daily_total + amount > self.daily_limit {
            return Err(Ineligibility::DailyLimit);
        }
        if self.current_monthly_total + amount > self.monthly_limit {
            return Err(Ineligibility::MonthlyLimit);
        }
        Ok(())
    }

    /// Adds `amount` to both running totals; fails instead of exceeding a limit.
    pub fn register(
        &mut self,
        class: TypeClass,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<(), FulfillmentError> {
        self.eligibility(class, amount).map_err(|reason| {
            FulfillmentError::ServiceUnavailable(format!(
                "Account {} cannot take {}: {:?}",
                self.id, amount, reason
            ))
        })?;
        self.current_daily_total += amount.value();
        self.current_monthly_total += amount.value();
        self.last_used_at = Some(now);
        Ok(())
    }

    /// Reverses a registration made on `registered_on`.
    ///
    /// Only the parts still inside the current counting periods are
    /// subtracted; a reset since then already discarded the rest.
    pub fn rollback(&mut self, amount: Decimal, registered_on: NaiveDate) -> Result<(), FulfillmentError> {
        let in_day = registered_on >= self.last_reset_date;
        let in_month = registered_on.year() == self.last_reset_date.year()
            && registered_on.month() == self.last_reset_date.month();

        let daily = if in_day {
            self.current_daily_total - amount
        } else {
            self.current_daily_total
        };
        let monthly = if in_month {
            self.current_monthly_total - amount
        } else {
            self.current_monthly_total
        };
        if daily < Decimal::ZERO || monthly < Decimal::ZERO {
            return Err(FulfillmentError::invalid_operation(format!(
                "Rolling back {} would make account {} counters negative",
                fmt_amount(amount),
                self.id
            )));
        }
        self.current_daily_total = daily;
        self.current_monthly_total = monthly;
        Ok(())
    }
}

/// Picks the best eligible account for `amount`.
///
/// Counters are evaluated as they would be after today's resets. Ranking is
/// lowest priority value, then least recently used (never used first), then
/// id so that ties are deterministic.
pub fn select_best(
    accounts: &[PaymentAccount],
    class: TypeClass,
    amount: Amount,
    today: NaiveDate,
) -> Option<PaymentAccount> {
    accounts
        .iter()
        .cloned()
        .map(|mut account| {
            account.reset_if_due(today);
            account
        })
        .filter(|account| account.eligibility(class, amount).is_ok())
        .min_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.last_used_at.cmp(&b.last_used_at))
                .then_with(|| a.id.cmp(&b.id))
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountTransactionStatus {
    Pending,
    Validated,
    Rejected,
}

/// What an account transaction settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum AccountReference {
    Order(Uuid),
    Remittance(Uuid),
}

impl AccountReference {
    pub fn class(&self) -> TypeClass {
        match self {
            AccountReference::Order(_) => TypeClass::Product,
            AccountReference::Remittance(_) => TypeClass::Remittance,
        }
    }
}

/// Ledger row of record for money routed to an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub reference: AccountReference,
    pub amount: Decimal,
    pub type_class: TypeClass,
    pub status: AccountTransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn account(daily_limit: Decimal, current: Decimal, priority: i32) -> PaymentAccount {
        PaymentAccount {
            id: Uuid::new_v4(),
            holder_name: "Holder".to_string(),
            bank_name: "Bank".to_string(),
            account_number: "0001".to_string(),
            phone: None,
            is_active: true,
            accepts_remittances: true,
            accepts_products: true,
            daily_limit,
            monthly_limit: dec!(10000),
            security_limit: dec!(500),
            current_daily_total: current,
            current_monthly_total: current,
            priority,
            last_reset_date: day(2026, 10, 14),
            last_used_at: None,
        }
    }

    fn amount(value: Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    #[test]
    fn test_daily_limit_excludes_account() {
        let first = account(dec!(100), dec!(90), 1);
        let second = account(dec!(200), dec!(0), 2);
        let chosen = select_best(
            &[first, second.clone()],
            TypeClass::Remittance,
            amount(dec!(20)),
            day(2026, 10, 14),
        )
        .unwrap();
        assert_eq!(chosen.id, second.id);
    }

    #[test]
    fn test_eligibility_order() {
        let mut acc = account(dec!(100), dec!(0), 1);
        assert_eq!(
            acc.eligibility(TypeClass::Product, amount(dec!(600))),
            Err(Ineligibility::SecurityLimit)
        );
        acc.accepts_products = false;
        assert_eq!(
            acc.eligibility(TypeClass::Product, amount(dec!(600))),
            Err(Ineligibility::ClassNotAccepted)
        );
        acc.is_active = false;
        assert_eq!(
            acc.eligibility(TypeClass::Product, amount(dec!(1))),
            Err(Ineligibility::Inactive)
        );
    }

    #[test]
    fn test_monthly_limit() {
        let mut acc = account(dec!(1000), dec!(0), 1);
        acc.current_monthly_total = dec!(9990);
        assert_eq!(
            acc.eligibility(TypeClass::Remittance, amount(dec!(20))),
            Err(Ineligibility::MonthlyLimit)
        );
    }

    #[test]
    fn test_tie_break_prefers_least_recently_used() {
        let mut used = account(dec!(1000), dec!(0), 1);
        used.last_used_at = Some(Utc::now());
        let fresh = account(dec!(1000), dec!(0), 1);
        let chosen = select_best(
            &[used, fresh.clone()],
            TypeClass::Product,
            amount(dec!(10)),
            day(2026, 10, 14),
        )
        .unwrap();
        assert_eq!(chosen.id, fresh.id);
    }

    #[test]
    fn test_priority_wins_over_recency() {
        let mut preferred = account(dec!(1000), dec!(0), 0);
        preferred.last_used_at = Some(Utc::now());
        let other = account(dec!(1000), dec!(0), 5);
        let chosen = select_best(
            &[other, preferred.clone()],
            TypeClass::Product,
            amount(dec!(10)),
            day(2026, 10, 14),
        )
        .unwrap();
        assert_eq!(chosen.id, preferred.id);
    }

    #[test]
    fn test_selection_sees_reset_counters() {
        let mut full = account(dec!(100), dec!(100), 1);
        full.last_reset_date = day(2026, 10, 13);
        let chosen = select_best(&[full], TypeClass::Remittance, amount(dec!(50)), day(2026, 10, 14));
        assert!(chosen.is_some());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut acc = account(dec!(100), dec!(40), 1);
        acc.last_reset_date = day(2026, 9, 30);
        assert!(acc.reset_if_due(day(2026, 10, 1)));
        assert_eq!(acc.current_daily_total, dec!(0));
        assert_eq!(acc.current_monthly_total, dec!(0));
        assert!(!acc.reset_if_due(day(2026, 10, 1)));

        acc.current_daily_total = dec!(10);
        acc.current_monthly_total = dec!(10);
        assert!(acc.reset_if_due(day(2026, 10, 2)));
        assert_eq!(acc.current_daily_total, dec!(0));
        assert_eq!(acc.current_monthly_total, dec!(10));
    }

    #[test]
    fn test_register_then_rollback_restores_totals() {
        let mut acc = account(dec!(100), dec!(30), 1);
        let before = acc.counters();
        acc.register(TypeClass::Remittance, amount(dec!(25)), Utc::now())
            .unwrap();
        assert_eq!(acc.current_daily_total, dec!(55));
        acc.rollback(dec!(25), day(2026, 10, 14)).unwrap();
        assert_eq!(acc.current_daily_total, before.current_daily_total);
        assert_eq!(acc.current_monthly_total, before.current_monthly_total);
    }

    #[test]
    fn test_rollback_after_daily_reset_keeps_daily_total() {
        let mut acc = account(dec!(100), dec!(0), 1);
        acc.current_monthly_total = dec!(25);
        acc.last_reset_date = day(2026, 10, 15);
        acc.rollback(dec!(25), day(2026, 10, 14)).unwrap();
        assert_eq!(acc.current_daily_total, dec!(0));
        assert_eq!(acc.current_monthly_total, dec!(0));
    }

    #[test]
    fn test_register_refuses_to_exceed_limit() {
        let mut acc = account(dec!(100), dec!(90), 1);
        assert!(matches!(
            acc.register(TypeClass::Remittance, amount(dec!(20)), Utc::now()),
            Err(FulfillmentError::ServiceUnavailable(_))
        ));
        assert_eq!(acc.current_daily_total, dec!(90));
    }
}
