use crate::domain::actor::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateKind {
    Order,
    Remittance,
}

/// One row of an aggregate's status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub id: Uuid,
    pub aggregate: AggregateKind,
    pub aggregate_id: Uuid,
    /// Which field moved: `status` or `payment_status`.
    pub field: String,
    pub from: String,
    pub to: String,
    pub actor: Option<UserId>,
    pub note: Option<String>,
    pub changed_at: DateTime<Utc>,
}

impl StatusChange {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        aggregate: AggregateKind,
        aggregate_id: Uuid,
        field: &str,
        from: impl ToString,
        to: impl ToString,
        actor: Option<UserId>,
        note: Option<String>,
        changed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate,
            aggregate_id,
            field: field.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            actor,
            note,
            changed_at,
        }
    }
}

/// Event handed to the notification collaborator after a transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub aggregate: AggregateKind,
    pub aggregate_id: Uuid,
    pub owner: UserId,
    /// Human-facing number (`ORD-...` / `REM-...`).
    pub reference: String,
    pub from: String,
    pub to: String,
    pub occurred_at: DateTime<Utc>,
}
