// src/link.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Denormalized referral record for reporting. Not authoritative — the
/// idempotency signal is `Account::referred_by`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralLink {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub new_account_id: Uuid,
    pub amount_given: i64,
    pub created_at: DateTime<Utc>,
}

impl ReferralLink {
    pub fn new(referrer_id: Uuid, new_account_id: Uuid, amount_given: i64) -> Self {
        Self {
            id: Uuid::now_v7(),
            referrer_id,
            new_account_id,
            amount_given,
            created_at: Utc::now(),
        }
    }
}
