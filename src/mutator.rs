// src/mutator.rs
use crate::{EntryKind, LedgerEntry, WalletAdapter, WalletError};
use metrics::{counter, histogram};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// One requested balance change: a signed amount plus the caller's
/// deduplication token.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub account_id: Uuid,
    pub kind: EntryKind,
    pub amount: i64,
    pub correlation_id: String,
    pub metadata: Value,
}

/// Applies a signed amount to one account and appends exactly one matching
/// ledger entry. The shared primitive behind claim, purchase, withdrawal and
/// referral credit.
#[derive(Clone)]
pub struct BalanceMutator {
    adapter: Arc<dyn WalletAdapter>,
}

impl BalanceMutator {
    pub fn new(adapter: Arc<dyn WalletAdapter>) -> Self {
        Self { adapter }
    }

    /// Validate and apply. A retry carrying an already-seen correlation id
    /// gets the original entry back instead of a duplicate.
    pub async fn mutate(&self, mutation: Mutation) -> Result<LedgerEntry, WalletError> {
        if mutation.amount == 0 {
            return Err(WalletError::InvalidAmount);
        }
        if mutation.correlation_id.is_empty() {
            return Err(WalletError::InvalidRequest(
                "correlation_id must not be empty".to_string(),
            ));
        }

        // Advisory pre-flight — the real guard runs inside the adapter's
        // atomic unit, against a re-read of the account row.
        if mutation.amount < 0 {
            let account = self.adapter.get_account(mutation.account_id).await?;
            if account.balance + mutation.amount < 0 {
                return Err(WalletError::InsufficientBalance);
            }
        }

        let result = self.adapter.apply_mutation(&mutation).await;

        counter!("wallet.mutations.total",
            "kind" => mutation.kind.as_str(),
            "status" => if result.is_ok() { "success" } else { "failed" }
        )
        .increment(1);

        if let Ok(entry) = &result {
            histogram!("wallet.mutation.amount", "kind" => entry.kind.as_str())
                .record(entry.amount.unsigned_abs() as f64);
        }

        result
    }
}
