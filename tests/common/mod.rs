// tests/common/mod.rs
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;
use wallet_ledger::adapters::MemoryAdapter;
use wallet_ledger::{
    Account, ClaimDecision, LedgerEntry, Mutation, ReferralLink, WalletAdapter, WalletError,
};

#[derive(Default)]
struct Faults {
    next_mutation: AtomicBool,
    next_count_update: AtomicBool,
    next_link_insert: AtomicBool,
}

/// Wraps the memory adapter and fails a selected operation exactly once, for
/// exercising compensation and partial-failure paths.
#[derive(Clone)]
pub struct FailingAdapter {
    inner: Arc<MemoryAdapter>,
    faults: Arc<Faults>,
}

impl FailingAdapter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryAdapter::new()),
            faults: Arc::new(Faults::default()),
        }
    }

    pub fn inner(&self) -> &MemoryAdapter {
        &self.inner
    }

    pub fn fail_next_mutation(&self) {
        self.faults.next_mutation.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_count_update(&self) {
        self.faults.next_count_update.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_link_insert(&self) {
        self.faults.next_link_insert.store(true, Ordering::SeqCst);
    }

    fn injected() -> WalletError {
        WalletError::Storage("injected failure".to_string())
    }
}

#[async_trait]
impl WalletAdapter for FailingAdapter {
    async fn create_account(&self, account: Account) -> Result<(), WalletError> {
        self.inner.create_account(account).await
    }

    async fn get_account(&self, account_id: Uuid) -> Result<Account, WalletError> {
        self.inner.get_account(account_id).await
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<Account>, WalletError> {
        self.inner.find_by_referral_code(code).await
    }

    async fn apply_mutation(&self, mutation: &Mutation) -> Result<LedgerEntry, WalletError> {
        if self.faults.next_mutation.swap(false, Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.apply_mutation(mutation).await
    }

    async fn get_entry(&self, entry_id: Uuid) -> Result<LedgerEntry, WalletError> {
        self.inner.get_entry(entry_id).await
    }

    async fn entry_by_correlation(
        &self,
        account_id: Uuid,
        correlation_id: &str,
    ) -> Result<Option<LedgerEntry>, WalletError> {
        self.inner.entry_by_correlation(account_id, correlation_id).await
    }

    async fn entries_for_account(
        &self,
        account_id: Uuid,
        timespan: &[DateTime<Utc>; 2],
    ) -> Result<Vec<LedgerEntry>, WalletError> {
        self.inner.entries_for_account(account_id, timespan).await
    }

    async fn try_reserve_claim(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
        interval: Duration,
    ) -> Result<ClaimDecision, WalletError> {
        self.inner.try_reserve_claim(account_id, now, interval).await
    }

    async fn release_claim(
        &self,
        account_id: Uuid,
        reserved_at: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> Result<(), WalletError> {
        self.inner.release_claim(account_id, reserved_at, previous).await
    }

    async fn claim_referred_by(
        &self,
        account_id: Uuid,
        referrer_id: Uuid,
    ) -> Result<bool, WalletError> {
        self.inner.claim_referred_by(account_id, referrer_id).await
    }

    async fn clear_referred_by(
        &self,
        account_id: Uuid,
        referrer_id: Uuid,
    ) -> Result<(), WalletError> {
        self.inner.clear_referred_by(account_id, referrer_id).await
    }

    async fn increment_referral_count(&self, account_id: Uuid) -> Result<u32, WalletError> {
        if self.faults.next_count_update.swap(false, Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.increment_referral_count(account_id).await
    }

    async fn insert_referral_link(&self, link: ReferralLink) -> Result<(), WalletError> {
        if self.faults.next_link_insert.swap(false, Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.insert_referral_link(link).await
    }
}
