use crate::domain::money::Amount;
use crate::error::{FulfillmentError, fmt_amount};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Admin-managed remittance product: how much is charged for sending money.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemittanceType {
    pub id: Uuid,
    pub name: String,
    pub currency: String,
    /// Flat fee added to every remittance of this type.
    pub commission_fixed: Decimal,
    /// Percentage of the amount, expressed as `5` for 5%.
    pub commission_percentage: Decimal,
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub is_active: bool,
}

/// Result of [`calculate_commission`].
///
/// Callers store and display these fields as-is. Re-deriving the
/// percentage part from `commission_percentage` anywhere else is a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionBreakdown {
    pub fixed: Decimal,
    pub percentage: Decimal,
    pub total: Decimal,
    pub total_charged: Decimal,
}

/// Computes the commission charged for sending `amount` with `kind`.
pub fn calculate_commission(
    kind: &RemittanceType,
    amount: Decimal,
) -> Result<CommissionBreakdown, FulfillmentError> {
    if !kind.is_active {
        return Err(FulfillmentError::validation(format!(
            "Remittance type {} is not active",
            kind.name
        )));
    }
    let amount = Amount::new(amount)?.value();
    if amount < kind.min_amount || amount > kind.max_amount {
        return Err(FulfillmentError::validation(format!(
            "Amount {} is outside the allowed range [{}, {}] for {}",
            fmt_amount(amount),
            fmt_amount(kind.min_amount),
            fmt_amount(kind.max_amount),
            kind.name
        )));
    }

    let fixed = kind.commission_fixed;
    let percentage = amount * kind.commission_percentage / Decimal::ONE_HUNDRED;
    let total = fixed + percentage;

    Ok(CommissionBreakdown {
        fixed,
        percentage,
        total,
        total_charged: amount + total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn standard_type() -> RemittanceType {
        RemittanceType {
            id: Uuid::new_v4(),
            name: "Standard".to_string(),
            currency: "USD".to_string(),
            commission_fixed: dec!(2),
            commission_percentage: dec!(5),
            min_amount: dec!(10),
            max_amount: dec!(1000),
            is_active: true,
        }
    }

    #[test]
    fn test_standard_commission() {
        let breakdown = calculate_commission(&standard_type(), dec!(100)).unwrap();
        assert_eq!(breakdown.fixed, dec!(2));
        assert_eq!(breakdown.percentage, dec!(5));
        assert_eq!(breakdown.total, dec!(7));
        assert_eq!(breakdown.total_charged, dec!(107));
    }

    #[test]
    fn test_repeated_calculation_is_stable() {
        let kind = standard_type();
        let first = calculate_commission(&kind, dec!(250.50)).unwrap();
        for _ in 0..10 {
            assert_eq!(calculate_commission(&kind, dec!(250.50)).unwrap(), first);
        }
        assert_eq!(
            first.total_charged,
            dec!(250.50) + dec!(2) + dec!(250.50) * dec!(5) / dec!(100)
        );
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let kind = standard_type();
        assert!(calculate_commission(&kind, dec!(10)).is_ok());
        assert!(calculate_commission(&kind, dec!(1000)).is_ok());
        assert!(matches!(
            calculate_commission(&kind, dec!(9.99)),
            Err(FulfillmentError::Validation(_))
        ));
        assert!(matches!(
            calculate_commission(&kind, dec!(1000.01)),
            Err(FulfillmentError::Validation(_))
        ));
    }

    #[test]
    fn test_inactive_type_is_rejected() {
        let mut kind = standard_type();
        kind.is_active = false;
        assert!(matches!(
            calculate_commission(&kind, dec!(100)),
            Err(FulfillmentError::Validation(_))
        ));
    }

    #[test]
    fn test_non_positive_amount_is_rejected() {
        let mut kind = standard_type();
        kind.min_amount = dec!(-10);
        assert!(calculate_commission(&kind, dec!(0)).is_err());
    }
}
