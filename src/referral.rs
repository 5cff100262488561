// src/referral.rs
use crate::{
    BalanceMutator, EntryKind, Mutation, ReferralLink, WalletAdapter, WalletError,
    hash_correlation_key,
};
use metrics::counter;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Machine-readable reason a referral was not credited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotCreditedReason {
    InvalidCode,
    UserNotFound,
    AlreadyCredited,
    TransactionFailed,
    /// The bonus entry exists but the referrer count update failed; the
    /// carried entry id is the reconciliation reference.
    ReferrerUpdateFailed { entry_id: Uuid },
}

impl NotCreditedReason {
    /// Wire token, so callers can branch without string matching.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCode => "invalid_code",
            Self::UserNotFound => "user_not_found",
            Self::AlreadyCredited => "already_credited",
            Self::TransactionFailed => "transaction_failed",
            Self::ReferrerUpdateFailed { .. } => "referrer_update_failed",
        }
    }
}

/// Terminal state of one `credit` invocation.
#[derive(Debug, Clone)]
pub enum CreditOutcome {
    Credited {
        referrer_id: Uuid,
        referral_count: u32,
        referrer_balance: i64,
        entry_id: Uuid,
    },
    NotCredited(NotCreditedReason),
}

/// Orchestrates the cross-account referral bonus.
///
/// Step order puts the reversible write (the `referred_by` flag) before the
/// irreversible one (money movement). Compensation is bounded to clearing
/// that single flag; once the bonus entry is committed the saga never rolls
/// back.
pub struct ReferralSaga {
    adapter: Arc<dyn WalletAdapter>,
    mutator: BalanceMutator,
    bonus: i64,
}

impl ReferralSaga {
    pub fn new(adapter: Arc<dyn WalletAdapter>, mutator: BalanceMutator, bonus: i64) -> Self {
        Self {
            adapter,
            mutator,
            bonus,
        }
    }

    /// Credit the referrer behind `referral_code` for the signup of
    /// `new_account_id`. Safe to invoke any number of times per new account;
    /// at most one invocation credits. `reference` is an opaque caller token
    /// (e.g. the new user's contact) carried into the entry metadata.
    pub async fn credit(
        &self,
        new_account_id: Uuid,
        referral_code: &str,
        reference: Option<String>,
    ) -> Result<CreditOutcome, WalletError> {
        // Lookup
        let Some(referrer) = self.adapter.find_by_referral_code(referral_code).await? else {
            info!(%new_account_id, referral_code, "referral code did not resolve");
            return Ok(self.not_credited(NotCreditedReason::InvalidCode));
        };

        // IdempotencyCheck
        let new_account = match self.adapter.get_account(new_account_id).await {
            Ok(account) => account,
            Err(WalletError::AccountNotFound(_)) => {
                return Ok(self.not_credited(NotCreditedReason::UserNotFound));
            }
            Err(err) => return Err(err),
        };
        if new_account.referred_by.is_some() {
            return Ok(self.not_credited(NotCreditedReason::AlreadyCredited));
        }

        // ClaimLink — CAS null -> referrer. Losing means a concurrent
        // invocation already claimed this signup.
        if !self
            .adapter
            .claim_referred_by(new_account_id, referrer.account_id)
            .await?
        {
            return Ok(self.not_credited(NotCreditedReason::AlreadyCredited));
        }

        // CreditMutation — the correlation id is derived from the account
        // pair, so a retried saga cannot double-credit the referrer.
        let correlation_id = format!(
            "referral-{}",
            hash_correlation_key(&format!("{}:{}", referrer.account_id, new_account_id))
        );
        let mutation = Mutation {
            account_id: referrer.account_id,
            kind: EntryKind::ReferralCredit,
            amount: self.bonus,
            correlation_id,
            metadata: json!({
                "referral_new_account_id": new_account_id,
                "referral_reference": reference,
            }),
        };
        let entry = match self.mutator.mutate(mutation).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(
                    %new_account_id,
                    referrer_id = %referrer.account_id,
                    %err,
                    "bonus credit failed, compensating"
                );
                if let Err(clear_err) = self
                    .adapter
                    .clear_referred_by(new_account_id, referrer.account_id)
                    .await
                {
                    error!(%new_account_id, %clear_err, "compensation failed, referred_by left set");
                }
                return Ok(self.not_credited(NotCreditedReason::TransactionFailed));
            }
        };

        // ReferrerCountUpdate — past the point of no return. The bonus entry
        // is durable; a failure here is reported for reconciliation, never
        // rolled back.
        let referral_count = match self
            .adapter
            .increment_referral_count(referrer.account_id)
            .await
        {
            Ok(count) => count,
            Err(err) => {
                error!(
                    referrer_id = %referrer.account_id,
                    entry_id = %entry.id,
                    %err,
                    "referrer count update failed after credit"
                );
                return Ok(self.not_credited(NotCreditedReason::ReferrerUpdateFailed {
                    entry_id: entry.id,
                }));
            }
        };

        // RecordLink — reporting row only, failure does not demote the outcome.
        let link = ReferralLink::new(referrer.account_id, new_account_id, self.bonus);
        if let Err(err) = self.adapter.insert_referral_link(link).await {
            warn!(
                referrer_id = %referrer.account_id,
                %new_account_id,
                %err,
                "referral link insert failed"
            );
        }

        info!(
            referrer_id = %referrer.account_id,
            %new_account_id,
            entry_id = %entry.id,
            "referral credited"
        );
        counter!("wallet.referrals.total", "status" => "credited").increment(1);

        Ok(CreditOutcome::Credited {
            referrer_id: referrer.account_id,
            referral_count,
            referrer_balance: entry.balance_after,
            entry_id: entry.id,
        })
    }

    fn not_credited(&self, reason: NotCreditedReason) -> CreditOutcome {
        counter!("wallet.referrals.total", "status" => reason.as_str()).increment(1);
        CreditOutcome::NotCredited(reason)
    }
}
