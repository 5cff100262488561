// src/lib.rs
pub mod account;
pub mod adapters;
pub mod api;
pub mod config;
pub mod cooldown;
pub mod entry;
pub mod error;
pub mod link;
pub mod mutator;
pub mod referral;

pub use account::Account;
pub use cooldown::{ClaimDecision, CooldownGate};
pub use entry::{EntryKind, LedgerEntry};
pub use error::WalletError;
pub use link::ReferralLink;
pub use mutator::{BalanceMutator, Mutation};
pub use referral::{CreditOutcome, NotCreditedReason, ReferralSaga};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

pub(crate) fn hash_correlation_key(key: &str) -> String {
    blake3::hash(key.as_bytes()).to_hex().to_string()
}

/// Storage contract for accounts and the append-only ledger.
///
/// The account row is the only shared mutable resource; every conditional
/// method below is a single-row compare-and-set (or equivalent), and the
/// ledger enforces `(account_id, correlation_id)` uniqueness at write time.
#[async_trait]
pub trait WalletAdapter: Send + Sync {
    // ACCOUNT STORE
    async fn create_account(&self, account: Account) -> Result<(), WalletError>;
    async fn get_account(&self, account_id: Uuid) -> Result<Account, WalletError>;
    async fn find_by_referral_code(&self, code: &str) -> Result<Option<Account>, WalletError>;

    /// Apply one balance mutation atomically. Implementors MUST:
    /// 1. Open a storage transaction (or equivalent single critical section)
    /// 2. Lock and re-read the account row — `balance_before` comes from this read
    /// 3. Return the original entry if `(account_id, correlation_id)` already exists
    /// 4. Reject with `InsufficientBalance` if `balance_before + amount < 0`
    /// 5. Write the new balance and insert the entry, then commit — or roll back both
    async fn apply_mutation(&self, mutation: &Mutation) -> Result<LedgerEntry, WalletError>;

    // LEDGER STORE
    async fn get_entry(&self, entry_id: Uuid) -> Result<LedgerEntry, WalletError>;
    async fn entry_by_correlation(
        &self,
        account_id: Uuid,
        correlation_id: &str,
    ) -> Result<Option<LedgerEntry>, WalletError>;
    async fn entries_for_account(
        &self,
        account_id: Uuid,
        timespan: &[DateTime<Utc>; 2],
    ) -> Result<Vec<LedgerEntry>, WalletError>;

    // CONDITIONAL UPDATES
    /// Stamp `last_claim_at = now` iff unset or at least `interval` old.
    async fn try_reserve_claim(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
        interval: Duration,
    ) -> Result<ClaimDecision, WalletError>;
    /// Rewind a reservation stamped at `reserved_at` back to `previous`.
    /// No-op when the stamp has moved on since.
    async fn release_claim(
        &self,
        account_id: Uuid,
        reserved_at: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> Result<(), WalletError>;
    /// Set `referred_by = referrer_id` iff currently unset.
    /// Returns false when the compare-and-set lost.
    async fn claim_referred_by(
        &self,
        account_id: Uuid,
        referrer_id: Uuid,
    ) -> Result<bool, WalletError>;
    /// Compensation for `claim_referred_by`: clear iff still `referrer_id`.
    async fn clear_referred_by(
        &self,
        account_id: Uuid,
        referrer_id: Uuid,
    ) -> Result<(), WalletError>;
    /// Returns the new count.
    async fn increment_referral_count(&self, account_id: Uuid) -> Result<u32, WalletError>;

    // REPORTING
    async fn insert_referral_link(&self, link: ReferralLink) -> Result<(), WalletError>;
}

/// Tunable amounts and policies of the wallet core.
#[derive(Debug, Clone)]
pub struct WalletConfig {
    /// Credited by each successful claim, in the smallest currency unit.
    pub claim_amount: i64,
    /// Minimum interval between successful claims for one account.
    pub claim_interval: Duration,
    /// Bonus credited to the referrer per referred signup.
    pub referral_bonus: i64,
    /// Balance a freshly opened account starts with.
    pub opening_balance: i64,
    /// Release the cooldown reservation when the claim's credit fails.
    /// Off by default: a failed claim still consumes the window.
    pub rollback_cooldown_on_failure: bool,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            claim_amount: 30_000,
            claim_interval: Duration::minutes(15),
            referral_bonus: 5_000,
            opening_balance: 160_000,
            rollback_cooldown_on_failure: false,
        }
    }
}

/// Initialize the wallet core with an adapter.
pub struct WalletSystem {
    adapter: Arc<dyn WalletAdapter>,
    config: WalletConfig,
    mutator: BalanceMutator,
    gate: CooldownGate,
    referrals: ReferralSaga,
}

impl WalletSystem {
    pub fn new(adapter: Box<dyn WalletAdapter>, config: WalletConfig) -> Self {
        let adapter: Arc<dyn WalletAdapter> = adapter.into();
        let mutator = BalanceMutator::new(Arc::clone(&adapter));
        let gate = CooldownGate::new(Arc::clone(&adapter), config.claim_interval);
        let referrals = ReferralSaga::new(
            Arc::clone(&adapter),
            mutator.clone(),
            config.referral_bonus,
        );
        Self {
            adapter,
            config,
            mutator,
            gate,
            referrals,
        }
    }

    /// Get adapter reference
    pub fn adapter(&self) -> &dyn WalletAdapter {
        self.adapter.as_ref()
    }

    /// Get adapter Arc (for wiring additional components)
    pub fn adapter_arc(&self) -> Arc<dyn WalletAdapter> {
        Arc::clone(&self.adapter)
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn mutator(&self) -> &BalanceMutator {
        &self.mutator
    }

    pub fn cooldown(&self) -> &CooldownGate {
        &self.gate
    }

    pub fn referrals(&self) -> &ReferralSaga {
        &self.referrals
    }

    /// Open a new account with the configured opening balance. The seam the
    /// (out-of-scope) signup flow calls into.
    pub async fn open_account(
        &self,
        referral_code: impl Into<String>,
    ) -> Result<Account, WalletError> {
        let account = Account::new(referral_code, self.config.opening_balance);
        self.adapter.create_account(account.clone()).await?;
        Ok(account)
    }

    /// Claim the periodic bonus. The cooldown reservation and the credit form
    /// one logical operation; by default the reservation is not released when
    /// the credit fails, so a failed claim still consumes the window.
    pub async fn claim(
        &self,
        account_id: Uuid,
        correlation_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, WalletError> {
        let previous = match self.gate.check_and_reserve(account_id, now).await? {
            ClaimDecision::Allowed { previous } => previous,
            ClaimDecision::Denied { retry_after } => {
                return Err(WalletError::CooldownActive { retry_after });
            }
        };

        let mutation = Mutation {
            account_id,
            kind: EntryKind::Claim,
            amount: self.config.claim_amount,
            correlation_id: correlation_id.into(),
            metadata: serde_json::json!({}),
        };

        match self.mutator.mutate(mutation).await {
            Ok(entry) => Ok(entry),
            Err(err) => {
                if self.config.rollback_cooldown_on_failure {
                    if let Err(release_err) =
                        self.gate.release(account_id, now, previous).await
                    {
                        warn!(%account_id, %release_err, "cooldown release failed");
                    }
                }
                Err(err)
            }
        }
    }

    /// Debit for a purchase. `amount` is the positive price; rejected before
    /// any write when the balance cannot cover it.
    pub async fn purchase(
        &self,
        account_id: Uuid,
        amount: i64,
        correlation_id: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Result<LedgerEntry, WalletError> {
        self.debit(
            account_id,
            EntryKind::Purchase,
            amount,
            correlation_id.into(),
            metadata,
        )
        .await
    }

    /// Debit for a withdrawal. Same contract as `purchase`.
    pub async fn withdraw(
        &self,
        account_id: Uuid,
        amount: i64,
        correlation_id: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Result<LedgerEntry, WalletError> {
        self.debit(
            account_id,
            EntryKind::Withdrawal,
            amount,
            correlation_id.into(),
            metadata,
        )
        .await
    }

    pub async fn credit_referral(
        &self,
        new_account_id: Uuid,
        referral_code: &str,
        reference: Option<String>,
    ) -> Result<CreditOutcome, WalletError> {
        self.referrals
            .credit(new_account_id, referral_code, reference)
            .await
    }

    async fn debit(
        &self,
        account_id: Uuid,
        kind: EntryKind,
        amount: i64,
        correlation_id: String,
        metadata: serde_json::Value,
    ) -> Result<LedgerEntry, WalletError> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount);
        }
        self.mutator
            .mutate(Mutation {
                account_id,
                kind,
                amount: -amount,
                correlation_id,
                metadata,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_key_hashing() {
        let a = hash_correlation_key("referrer:new-user");
        let b = hash_correlation_key("referrer:new-user");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_correlation_key("referrer:other-user"));
    }

    #[test]
    fn test_default_config() {
        let config = WalletConfig::default();
        assert_eq!(config.claim_amount, 30_000);
        assert_eq!(config.claim_interval, Duration::minutes(15));
        assert_eq!(config.referral_bonus, 5_000);
        assert_eq!(config.opening_balance, 160_000);
        assert!(!config.rollback_cooldown_on_failure);
    }
}
