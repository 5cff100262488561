use crate::{
    Account, ClaimDecision, EntryKind, LedgerEntry, Mutation, ReferralLink, WalletAdapter,
    WalletError,
};
use chrono::{DateTime, Duration, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPoolOptions, PgRow};
use uuid::Uuid;

pub trait PostgresWalletAdapter {
    fn get_pool(&self) -> sqlx::PgPool;
}

/// Pool-owning adapter for standalone use.
pub struct PostgresWallet {
    pool: sqlx::PgPool,
}

impl PostgresWallet {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, WalletError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| WalletError::Storage(e.to_string()))?;
        Ok(Self { pool })
    }
}

impl PostgresWalletAdapter for PostgresWallet {
    fn get_pool(&self) -> sqlx::PgPool {
        self.pool.clone()
    }
}

#[async_trait::async_trait]
pub trait PostgresSchemaWalletAdapter {
    /// Create the wallet tables, constraints and indexes if missing.
    async fn init_wallet_schema(&self) -> Result<(), WalletError>;
}

#[async_trait::async_trait]
impl<T> PostgresSchemaWalletAdapter for T
where
    T: PostgresWalletAdapter + Send + Sync,
{
    async fn init_wallet_schema(&self) -> Result<(), WalletError> {
        let mut tx = self
            .get_pool()
            .begin()
            .await
            .map_err(|e| WalletError::Storage(e.to_string()))?;

        // Accounts table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wallet_accounts (
                account_id UUID PRIMARY KEY,
                balance BIGINT NOT NULL CHECK (balance >= 0),
                referral_code TEXT NOT NULL UNIQUE,
                referred_by UUID,
                referral_count INTEGER NOT NULL DEFAULT 0 CHECK (referral_count >= 0),
                last_claim_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| WalletError::Storage(e.to_string()))?;

        // Ledger entries table — the UNIQUE constraint is the idempotency
        // guard, the CHECK is the before/after invariant
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wallet_ledger_entries (
                id UUID PRIMARY KEY,
                account_id UUID NOT NULL REFERENCES wallet_accounts(account_id),
                kind TEXT NOT NULL CHECK (kind IN ('claim', 'purchase', 'withdrawal', 'referral_credit', 'other')),
                amount BIGINT NOT NULL CHECK (amount <> 0),
                balance_before BIGINT NOT NULL,
                balance_after BIGINT NOT NULL CHECK (balance_after = balance_before + amount),
                correlation_id TEXT NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (account_id, correlation_id)
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| WalletError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_ledger_entries_account_created
            ON wallet_ledger_entries(account_id, created_at)
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| WalletError::Storage(e.to_string()))?;

        // Referral links table (reporting only)
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wallet_referral_links (
                id UUID PRIMARY KEY,
                referrer_id UUID NOT NULL REFERENCES wallet_accounts(account_id),
                new_account_id UUID NOT NULL UNIQUE REFERENCES wallet_accounts(account_id),
                amount_given BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| WalletError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_referral_links_referrer
            ON wallet_referral_links(referrer_id)
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| WalletError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| WalletError::Storage(e.to_string()))?;

        Ok(())
    }
}

fn account_from_row(row: &PgRow) -> Result<Account, WalletError> {
    Ok(Account {
        account_id: row
            .try_get("account_id")
            .map_err(|e| WalletError::Storage(e.to_string()))?,
        balance: row
            .try_get("balance")
            .map_err(|e| WalletError::Storage(e.to_string()))?,
        referral_code: row
            .try_get("referral_code")
            .map_err(|e| WalletError::Storage(e.to_string()))?,
        referred_by: row
            .try_get("referred_by")
            .map_err(|e| WalletError::Storage(e.to_string()))?,
        referral_count: row
            .try_get::<i32, _>("referral_count")
            .map_err(|e| WalletError::Storage(e.to_string()))? as u32,
        last_claim_at: row
            .try_get("last_claim_at")
            .map_err(|e| WalletError::Storage(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| WalletError::Storage(e.to_string()))?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry, WalletError> {
    let kind: String = row
        .try_get("kind")
        .map_err(|e| WalletError::Storage(e.to_string()))?;
    Ok(LedgerEntry {
        id: row
            .try_get("id")
            .map_err(|e| WalletError::Storage(e.to_string()))?,
        account_id: row
            .try_get("account_id")
            .map_err(|e| WalletError::Storage(e.to_string()))?,
        kind: EntryKind::parse(&kind)
            .ok_or_else(|| WalletError::Storage(format!("unknown entry kind: {}", kind)))?,
        amount: row
            .try_get("amount")
            .map_err(|e| WalletError::Storage(e.to_string()))?,
        balance_before: row
            .try_get("balance_before")
            .map_err(|e| WalletError::Storage(e.to_string()))?,
        balance_after: row
            .try_get("balance_after")
            .map_err(|e| WalletError::Storage(e.to_string()))?,
        correlation_id: row
            .try_get("correlation_id")
            .map_err(|e| WalletError::Storage(e.to_string()))?,
        metadata: row
            .try_get("metadata")
            .map_err(|e| WalletError::Storage(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| WalletError::Storage(e.to_string()))?,
    })
}

const SELECT_ENTRY: &str = r#"
    SELECT id, account_id, kind, amount, balance_before, balance_after,
           correlation_id, metadata, created_at
    FROM wallet_ledger_entries
"#;

#[async_trait::async_trait]
impl<T> WalletAdapter for T
where
    T: PostgresWalletAdapter + Send + Sync,
{
    async fn create_account(&self, account: Account) -> Result<(), WalletError> {
        sqlx::query(
            r#"
            INSERT INTO wallet_accounts
                (account_id, balance, referral_code, referred_by, referral_count, last_claim_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(account.account_id)
        .bind(account.balance)
        .bind(&account.referral_code)
        .bind(account.referred_by)
        .bind(account.referral_count as i32)
        .bind(account.last_claim_at)
        .bind(account.created_at)
        .execute(&self.get_pool())
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => {
                WalletError::Conflict(format!("referral code taken: {}", account.referral_code))
            }
            _ => WalletError::Storage(e.to_string()),
        })?;

        Ok(())
    }

    async fn get_account(&self, account_id: Uuid) -> Result<Account, WalletError> {
        let row = sqlx::query(
            r#"
            SELECT account_id, balance, referral_code, referred_by, referral_count, last_claim_at, created_at
            FROM wallet_accounts
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.get_pool())
        .await
        .map_err(|e| WalletError::Storage(e.to_string()))?
        .ok_or(WalletError::AccountNotFound(account_id))?;

        account_from_row(&row)
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<Account>, WalletError> {
        let row = sqlx::query(
            r#"
            SELECT account_id, balance, referral_code, referred_by, referral_count, last_claim_at, created_at
            FROM wallet_accounts
            WHERE referral_code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.get_pool())
        .await
        .map_err(|e| WalletError::Storage(e.to_string()))?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn apply_mutation(&self, mutation: &Mutation) -> Result<LedgerEntry, WalletError> {
        let mut tx = self
            .get_pool()
            .begin()
            .await
            .map_err(|e| WalletError::Storage(e.to_string()))?;

        // Lock the account row; mutations against the same account serialize
        // here, different accounts proceed in parallel.
        let row = sqlx::query("SELECT balance FROM wallet_accounts WHERE account_id = $1 FOR UPDATE")
            .bind(mutation.account_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| WalletError::Storage(e.to_string()))?;

        let Some(row) = row else {
            tx.rollback().await.ok();
            return Err(WalletError::AccountNotFound(mutation.account_id));
        };
        let balance_before: i64 = row
            .try_get("balance")
            .map_err(|e| WalletError::Storage(e.to_string()))?;

        // Replay check inside the lock — a retry gets the original entry back.
        let existing = sqlx::query(&format!(
            "{SELECT_ENTRY} WHERE account_id = $1 AND correlation_id = $2"
        ))
        .bind(mutation.account_id)
        .bind(&mutation.correlation_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| WalletError::Storage(e.to_string()))?;

        if let Some(existing) = existing {
            let entry = entry_from_row(&existing)?;
            tx.rollback().await.ok();
            return Ok(entry);
        }

        // Checked inside the lock — this is the authoritative balance guard.
        if balance_before + mutation.amount < 0 {
            tx.rollback().await.ok();
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

        sqlx::query("UPDATE wallet_accounts SET balance = $2 WHERE account_id = $1")
            .bind(mutation.account_id)
            .bind(entry.balance_after)
            .execute(&mut *tx)
            .await
            .map_err(|e| WalletError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO wallet_ledger_entries
                (id, account_id, kind, amount, balance_before, balance_after, correlation_id, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(entry.account_id)
        .bind(entry.kind.as_str())
        .bind(entry.amount)
        .bind(entry.balance_before)
        .bind(entry.balance_after)
        .bind(&entry.correlation_id)
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| WalletError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| WalletError::Storage(e.to_string()))?;

        Ok(entry)
    }

    async fn get_entry(&self, entry_id: Uuid) -> Result<LedgerEntry, WalletError> {
        let row = sqlx::query(&format!("{SELECT_ENTRY} WHERE id = $1"))
            .bind(entry_id)
            .fetch_optional(&self.get_pool())
            .await
            .map_err(|e| WalletError::Storage(e.to_string()))?
            .ok_or(WalletError::EntryNotFound)?;

        entry_from_row(&row)
    }

    async fn entry_by_correlation(
        &self,
        account_id: Uuid,
        correlation_id: &str,
    ) -> Result<Option<LedgerEntry>, WalletError> {
        let row = sqlx::query(&format!(
            "{SELECT_ENTRY} WHERE account_id = $1 AND correlation_id = $2"
        ))
        .bind(account_id)
        .bind(correlation_id)
        .fetch_optional(&self.get_pool())
        .await
        .map_err(|e| WalletError::Storage(e.to_string()))?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn entries_for_account(
        &self,
        account_id: Uuid,
        timespan: &[DateTime<Utc>; 2],
    ) -> Result<Vec<LedgerEntry>, WalletError> {
        let rows = sqlx::query(&format!(
            "{SELECT_ENTRY} WHERE account_id = $1 AND created_at BETWEEN $2 AND $3 ORDER BY created_at DESC"
        ))
        .bind(account_id)
        .bind(timespan[0])
        .bind(timespan[1])
        .fetch_all(&self.get_pool())
        .await
        .map_err(|e| WalletError::Storage(e.to_string()))?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn try_reserve_claim(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
        interval: Duration,
    ) -> Result<ClaimDecision, WalletError> {
        let mut tx = self
            .get_pool()
            .begin()
            .await
            .map_err(|e| WalletError::Storage(e.to_string()))?;

        let row = sqlx::query(
            "SELECT last_claim_at FROM wallet_accounts WHERE account_id = $1 FOR UPDATE",
        )
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| WalletError::Storage(e.to_string()))?;

        let Some(row) = row else {
            tx.rollback().await.ok();
            return Err(WalletError::AccountNotFound(account_id));
        };
        let previous: Option<DateTime<Utc>> = row
            .try_get("last_claim_at")
            .map_err(|e| WalletError::Storage(e.to_string()))?;

        if let Some(last) = previous {
            if now - last < interval {
                tx.rollback().await.ok();
                return Ok(ClaimDecision::Denied {
                    retry_after: interval - (now - last),
                });
            }
        }

        sqlx::query("UPDATE wallet_accounts SET last_claim_at = $2 WHERE account_id = $1")
            .bind(account_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| WalletError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| WalletError::Storage(e.to_string()))?;

        Ok(ClaimDecision::Allowed { previous })
    }

    async fn release_claim(
        &self,
        account_id: Uuid,
        reserved_at: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> Result<(), WalletError> {
        // Conditional rewind: only if the stamp is still the one we wrote.
        sqlx::query(
            "UPDATE wallet_accounts SET last_claim_at = $3 WHERE account_id = $1 AND last_claim_at = $2",
        )
        .bind(account_id)
        .bind(reserved_at)
        .bind(previous)
        .execute(&self.get_pool())
        .await
        .map_err(|e| WalletError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn claim_referred_by(
        &self,
        account_id: Uuid,
        referrer_id: Uuid,
    ) -> Result<bool, WalletError> {
        let result = sqlx::query(
            "UPDATE wallet_accounts SET referred_by = $2 WHERE account_id = $1 AND referred_by IS NULL",
        )
        .bind(account_id)
        .bind(referrer_id)
        .execute(&self.get_pool())
        .await
        .map_err(|e| WalletError::Storage(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn clear_referred_by(
        &self,
        account_id: Uuid,
        referrer_id: Uuid,
    ) -> Result<(), WalletError> {
        sqlx::query(
            "UPDATE wallet_accounts SET referred_by = NULL WHERE account_id = $1 AND referred_by = $2",
        )
        .bind(account_id)
        .bind(referrer_id)
        .execute(&self.get_pool())
        .await
        .map_err(|e| WalletError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn increment_referral_count(&self, account_id: Uuid) -> Result<u32, WalletError> {
        let row = sqlx::query(
            r#"
            UPDATE wallet_accounts
            SET referral_count = referral_count + 1
            WHERE account_id = $1
            RETURNING referral_count
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.get_pool())
        .await
        .map_err(|e| WalletError::Storage(e.to_string()))?
        .ok_or(WalletError::AccountNotFound(account_id))?;

        let count: i32 = row
            .try_get("referral_count")
            .map_err(|e| WalletError::Storage(e.to_string()))?;

        Ok(count as u32)
    }

    async fn insert_referral_link(&self, link: ReferralLink) -> Result<(), WalletError> {
        sqlx::query(
            r#"
            INSERT INTO wallet_referral_links (id, referrer_id, new_account_id, amount_given, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(link.id)
        .bind(link.referrer_id)
        .bind(link.new_account_id)
        .bind(link.amount_given)
        .bind(link.created_at)
        .execute(&self.get_pool())
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => WalletError::Conflict(format!(
                "referral link exists for {}",
                link.new_account_id
            )),
            _ => WalletError::Storage(e.to_string()),
        })?;

        Ok(())
    }
}
