use crate::domain::actor::UserId;
use crate::domain::commission::CommissionBreakdown;
use crate::error::FulfillmentError;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemittanceStatus {
    Created,
    ProofUploaded,
    Validated,
    Processing,
    Delivered,
    Completed,
    Cancelled,
    Rejected,
}

impl RemittanceStatus {
    pub const ALL: [RemittanceStatus; 8] = [
        RemittanceStatus::Created,
        RemittanceStatus::ProofUploaded,
        RemittanceStatus::Validated,
        RemittanceStatus::Processing,
        RemittanceStatus::Delivered,
        RemittanceStatus::Completed,
        RemittanceStatus::Cancelled,
        RemittanceStatus::Rejected,
    ];

    pub fn can_transition_to(&self, next: RemittanceStatus) -> bool {
        use RemittanceStatus::*;
        matches!(
            (self, next),
            (Created, ProofUploaded)
                | (ProofUploaded, Validated)
                | (Validated, Processing)
                | (Processing, Delivered)
                | (Delivered, Completed)
                | (Created, Cancelled)
                | (ProofUploaded, Cancelled)
                | (ProofUploaded, Rejected)
                | (Rejected, ProofUploaded)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RemittanceStatus::Completed | RemittanceStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RemittanceStatus::Created => "CREATED",
            RemittanceStatus::ProofUploaded => "PROOF_UPLOADED",
            RemittanceStatus::Validated => "VALIDATED",
            RemittanceStatus::Processing => "PROCESSING",
            RemittanceStatus::Delivered => "DELIVERED",
            RemittanceStatus::Completed => "COMPLETED",
            RemittanceStatus::Cancelled => "CANCELLED",
            RemittanceStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for RemittanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Person collecting the money on the destination side.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemittanceRecipient {
    pub name: String,
    pub phone: String,
    pub id_number: Option<String>,
    pub address: Option<String>,
    pub bank_account: Option<String>,
}

impl RemittanceRecipient {
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

/// Who confirmed that the money reached the recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "lowercase")]
pub enum DeliveryConfirmation {
    Admin { user: UserId },
    Recipient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Remittance {
    pub id: Uuid,
    pub reference: String,
    pub owner: UserId,
    pub remittance_type_id: Uuid,
    pub amount: Decimal,
    pub commission: CommissionBreakdown,
    pub total_amount: Decimal,
    pub currency: String,
    pub recipient: RemittanceRecipient,
    pub status: RemittanceStatus,
    pub payment_proof_url: Option<String>,
    pub payment_account_id: Option<Uuid>,
    pub account_transaction_id: Option<Uuid>,
    pub validated_by: Option<UserId>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub bank_transfer_ref: Option<String>,
    pub delivered_by: Option<DeliveryConfirmation>,
    pub delivery_proof_url: Option<String>,
    /// Secret shared with the recipient for delivery confirmation.
    pub confirmation_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub proof_uploaded_at: Option<DateTime<Utc>>,
    pub validated_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Remittance {
    pub fn stamp_status(&mut self, status: RemittanceStatus, at: DateTime<Utc>) {
        self.status = status;
        self.updated_at = at;
        match status {
            RemittanceStatus::ProofUploaded => self.proof_uploaded_at = Some(at),
            RemittanceStatus::Validated => self.validated_at = Some(at),
            RemittanceStatus::Rejected => self.rejected_at = Some(at),
            RemittanceStatus::Processing => self.processing_started_at = Some(at),
            RemittanceStatus::Delivered => self.delivered_at = Some(at),
            RemittanceStatus::Completed => self.completed_at = Some(at),
            RemittanceStatus::Cancelled => self.cancelled_at = Some(at),
            RemittanceStatus::Created => {}
        }
    }

    /// Time spent in processing at `now`, if processing.
    pub fn time_in_processing(&self, now: DateTime<Utc>) -> Option<Duration> {
        match (self.status, self.processing_started_at) {
            (RemittanceStatus::Processing, Some(started)) => Some(now - started),
            _ => None,
        }
    }
}

/// Remittance request as submitted by the sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRemittance {
    pub owner: UserId,
    pub remittance_type_id: Uuid,
    pub amount: Decimal,
    pub recipient: RemittanceRecipient,
}

/// A remittance stuck in processing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemittanceAlert {
    pub remittance: Remittance,
    pub hours_in_processing: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use RemittanceStatus::*;
        let legal = [
            (Created, ProofUploaded),
            (ProofUploaded, Validated),
            (Validated, Processing),
            (Processing, Delivered),
            (Delivered, Completed),
            (Created, Cancelled),
            (ProofUploaded, Cancelled),
            (ProofUploaded, Rejected),
            (Rejected, ProofUploaded),
        ];
        for from in RemittanceStatus::ALL {
            for to in RemittanceStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_exit() {
        for from in RemittanceStatus::ALL.iter().filter(|s| s.is_terminal()) {
            assert!(RemittanceStatus::ALL.iter().all(|to| !from.can_transition_to(*to)));
        }
    }

    #[test]
    fn test_recipient_validation() {
        let mut recipient = RemittanceRecipient {
            name: "Ana".to_string(),
            phone: "+5350000000".to_string(),
            ..Default::default()
        };
        assert!(recipient.validate().is_ok());
        recipient.phone = "  ".to_string();
        assert!(recipient.validate().is_err());
    }
}
