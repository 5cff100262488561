// src/adapters/memory.rs
use crate::{
    Account, ClaimDecision, LedgerEntry, Mutation, ReferralLink, WalletAdapter, WalletError,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Default)]
struct MemoryStore {
    accounts: HashMap<Uuid, Account>,
    entries: Vec<LedgerEntry>,
    links: Vec<ReferralLink>,
}

/// In-memory adapter. One critical section per operation stands in for the
/// row lock and the `(account_id, correlation_id)` uniqueness constraint a
/// production store enforces; no lock is held across an await point.
pub struct MemoryAdapter {
    store: Arc<Mutex<MemoryStore>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(MemoryStore::default())),
        }
    }

    /// Snapshot of the reporting rows, for inspection in tests.
    pub fn referral_links(&self) -> Vec<ReferralLink> {
        self.store.lock().unwrap().links.clone()
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletAdapter for MemoryAdapter {
    async fn create_account(&self, account: Account) -> Result<(), WalletError> {
        let mut store = self.store.lock().unwrap();
        if store
            .accounts
            .values()
            .any(|a| a.referral_code == account.referral_code)
        {
            return Err(WalletError::Conflict(format!(
                "referral code taken: {}",
                account.referral_code
            )));
        }
        store.accounts.insert(account.account_id, account);
        Ok(())
    }

    async fn get_account(&self, account_id: Uuid) -> Result<Account, WalletError> {
        let store = self.store.lock().unwrap();
        store
            .accounts
            .get(&account_id)
            .cloned()
            .ok_or(WalletError::AccountNotFound(account_id))
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<Account>, WalletError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .accounts
            .values()
            .find(|a| a.referral_code == code)
            .cloned())
    }

    async fn apply_mutation(&self, mutation: &Mutation) -> Result<LedgerEntry, WalletError> {
        let mut store = self.store.lock().unwrap();

        // Replay check — a retry gets the original entry back.
        if let Some(existing) = store.entries.iter().find(|e| {
            e.account_id == mutation.account_id && e.correlation_id == mutation.correlation_id
        }) {
            return Ok(existing.clone());
        }

        let balance_before = store
            .accounts
            .get(&mutation.account_id)
            .ok_or(WalletError::AccountNotFound(mutation.account_id))?
            .balance;

        // Checked inside the critical section — the caller's pre-flight read
        // may be stale by now.
        if balance_before + mutation.amount < 0 {
            return Err(WalletError::InsufficientBalance);
        }

        let entry = LedgerEntry::new(
            mutation.account_id,
            mutation.kind,
            mutation.amount,
            balance_before,
            mutation.correlation_id.clone(),
            mutation.metadata.clone(),
        );

        store
            .accounts
            .get_mut(&mutation.account_id)
            .expect("account row vanished inside critical section")
            .balance = entry.balance_after;
        store.entries.push(entry.clone());

        Ok(entry)
    }

    async fn get_entry(&self, entry_id: Uuid) -> Result<LedgerEntry, WalletError> {
        let store = self.store.lock().unwrap();
        store
            .entries
            .iter()
            .find(|e| e.id == entry_id)
            .cloned()
            .ok_or(WalletError::EntryNotFound)
    }

    async fn entry_by_correlation(
        &self,
        account_id: Uuid,
        correlation_id: &str,
    ) -> Result<Option<LedgerEntry>, WalletError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .entries
            .iter()
            .find(|e| e.account_id == account_id && e.correlation_id == correlation_id)
            .cloned())
    }

    async fn entries_for_account(
        &self,
        account_id: Uuid,
        timespan: &[DateTime<Utc>; 2],
    ) -> Result<Vec<LedgerEntry>, WalletError> {
        let store = self.store.lock().unwrap();
        // Newest first, matching the production store's ordering.
        let mut entries: Vec<LedgerEntry> = store
            .entries
            .iter()
            .filter(|e| {
                e.account_id == account_id
                    && e.created_at >= timespan[0]
                    && e.created_at <= timespan[1]
            })
            .cloned()
            .collect();
        entries.reverse();
        Ok(entries)
    }

    async fn try_reserve_claim(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
        interval: Duration,
    ) -> Result<ClaimDecision, WalletError> {
        let mut store = self.store.lock().unwrap();
        let account = store
            .accounts
            .get_mut(&account_id)
            .ok_or(WalletError::AccountNotFound(account_id))?;

        match account.last_claim_at {
            Some(last) if now - last < interval => Ok(ClaimDecision::Denied {
                retry_after: interval - (now - last),
            }),
            previous => {
                account.last_claim_at = Some(now);
                Ok(ClaimDecision::Allowed { previous })
            }
        }
    }

    async fn release_claim(
        &self,
        account_id: Uuid,
        reserved_at: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> Result<(), WalletError> {
        let mut store = self.store.lock().unwrap();
        if let Some(account) = store.accounts.get_mut(&account_id) {
            if account.last_claim_at == Some(reserved_at) {
                account.last_claim_at = previous;
            }
        }
        Ok(())
    }

    async fn claim_referred_by(
        &self,
        account_id: Uuid,
        referrer_id: Uuid,
    ) -> Result<bool, WalletError> {
        let mut store = self.store.lock().unwrap();
        let account = store
            .accounts
            .get_mut(&account_id)
            .ok_or(WalletError::AccountNotFound(account_id))?;
        if account.referred_by.is_some() {
            return Ok(false);
        }
        account.referred_by = Some(referrer_id);
        Ok(true)
    }

    async fn clear_referred_by(
        &self,
        account_id: Uuid,
        referrer_id: Uuid,
    ) -> Result<(), WalletError> {
        let mut store = self.store.lock().unwrap();
        if let Some(account) = store.accounts.get_mut(&account_id) {
            if account.referred_by == Some(referrer_id) {
                account.referred_by = None;
            }
        }
        Ok(())
    }

    async fn increment_referral_count(&self, account_id: Uuid) -> Result<u32, WalletError> {
        let mut store = self.store.lock().unwrap();
        let account = store
            .accounts
            .get_mut(&account_id)
            .ok_or(WalletError::AccountNotFound(account_id))?;
        account.referral_count += 1;
        Ok(account.referral_count)
    }

    async fn insert_referral_link(&self, link: ReferralLink) -> Result<(), WalletError> {
        let mut store = self.store.lock().unwrap();
        if store
            .links
            .iter()
            .any(|l| l.new_account_id == link.new_account_id)
        {
            return Err(WalletError::Conflict(format!(
                "referral link exists for {}",
                link.new_account_id
            )));
        }
        store.links.push(link);
        Ok(())
    }
}
