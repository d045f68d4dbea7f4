//! Payment-grant dedup records.

use crate::account::Credits;
use crate::ids::{EventId, PlanId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted proof that a payment event was applied.
///
/// Written by the same atomic store operation that credits the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRecord {
    pub event_id: EventId,
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub credits_granted: Credits,
    pub balance_after: Credits,
    pub applied_at: DateTime<Utc>,
}

/// Result of applying (or replaying) a payment grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantReceipt {
    pub applied: bool,
    pub event_id: EventId,
    pub plan_id: PlanId,
    pub credits_granted: Credits,
    pub balance_after: Credits,
}

impl GrantReceipt {
    pub fn applied(record: &GrantRecord) -> Self {
        Self::from_record(record, true)
    }

    /// Receipt for a redelivered event, echoing the original application.
    pub fn replayed(record: &GrantRecord) -> Self {
        Self::from_record(record, false)
    }

    fn from_record(record: &GrantRecord, applied: bool) -> Self {
        Self {
            applied,
            event_id: record.event_id.clone(),
            plan_id: record.plan_id.clone(),
            credits_granted: record.credits_granted,
            balance_after: record.balance_after,
        }
    }
}
