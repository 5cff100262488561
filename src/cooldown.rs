// src/cooldown.rs
use crate::{WalletAdapter, WalletError};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Result of a cooldown reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimDecision {
    /// The window was free and is now stamped. `previous` is the stamp that
    /// was replaced, kept so a configured rollback can restore it.
    Allowed { previous: Option<DateTime<Utc>> },
    Denied { retry_after: Duration },
}

impl ClaimDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ClaimDecision::Allowed { .. })
    }
}

/// Enforces a minimum interval between successful claims for one account.
///
/// The reservation is a compare-and-set on `last_claim_at`, so two concurrent
/// attempts cannot both pass. A reservation whose claim later fails stays
/// consumed unless the system is configured to roll it back.
pub struct CooldownGate {
    adapter: Arc<dyn WalletAdapter>,
    interval: Duration,
}

impl CooldownGate {
    pub fn new(adapter: Arc<dyn WalletAdapter>, interval: Duration) -> Self {
        Self { adapter, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn check_and_reserve(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ClaimDecision, WalletError> {
        self.adapter
            .try_reserve_claim(account_id, now, self.interval)
            .await
    }

    /// Rewind a reservation stamped at `reserved_at`. Only applies if the
    /// stamp is still ours — a newer successful claim wins.
    pub async fn release(
        &self,
        account_id: Uuid,
        reserved_at: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> Result<(), WalletError> {
        self.adapter
            .release_claim(account_id, reserved_at, previous)
            .await
    }
}
