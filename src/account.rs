// src/account.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The mutable balance-holding record for one user.
///
/// Invariants:
/// - `balance` never goes below zero in any reachable state
/// - `referred_by` is write-once; it doubles as the referral idempotency flag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_id: Uuid,
    pub balance: i64,
    pub referral_code: String,
    pub referred_by: Option<Uuid>,
    pub referral_count: u32,
    pub last_claim_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(referral_code: impl Into<String>, opening_balance: i64) -> Self {
        Self {
            account_id: Uuid::now_v7(),
            balance: opening_balance,
            referral_code: referral_code.into(),
            referred_by: None,
            referral_count: 0,
            last_claim_at: None,
            created_at: Utc::now(),
        }
    }
}
