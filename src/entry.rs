// src/entry.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// What a ledger entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Claim,
    Purchase,
    Withdrawal,
    ReferralCredit,
    Other,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Claim => "claim",
            EntryKind::Purchase => "purchase",
            EntryKind::Withdrawal => "withdrawal",
            EntryKind::ReferralCredit => "referral_credit",
            EntryKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<EntryKind> {
        match s {
            "claim" => Some(EntryKind::Claim),
            "purchase" => Some(EntryKind::Purchase),
            "withdrawal" => Some(EntryKind::Withdrawal),
            "referral_credit" => Some(EntryKind::ReferralCredit),
            "other" => Some(EntryKind::Other),
            _ => None,
        }
    }
}

/// An immutable record of one balance-affecting event.
///
/// `balance_after` always equals `balance_before + amount`, and equals the
/// account's stored balance at the instant the entry was committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: EntryKind,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub correlation_id: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        account_id: Uuid,
        kind: EntryKind,
        amount: i64,
        balance_before: i64,
        correlation_id: String,
        metadata: Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            account_id,
            kind,
            amount,
            balance_before,
            balance_after: balance_before + amount,
            correlation_id,
            metadata,
            created_at: Utc::now(),
        }
    }
}
