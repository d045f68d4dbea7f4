//! PostgreSQL implementation of LedgerStore.

use crate::db_error;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Row};
use tally_core::ports::{LedgerStore, StoreBackend, Versioned, WriteOutcome};
use tally_core::{Account, Error, EventId, GrantRecord, PlanId, Result, UserId};
use tracing::debug;

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn to_db(value: u64, field: &str) -> Result<i64> {
        i64::try_from(value)
            .map_err(|_| Error::InvalidRequest(format!("{field} {value} exceeds storage range")))
    }

    fn from_db(value: i64, field: &str) -> Result<u64> {
        u64::try_from(value).map_err(|_| Error::CorruptRecord(format!("negative {field}: {value}")))
    }

    fn row_to_account(r: &PgRow) -> Result<Versioned<Account>> {
        let balance: i64 = r.try_get("balance").map_err(db_error)?;
        let last_claim_date: Option<NaiveDate> = r.try_get("last_claim_date").map_err(db_error)?;
        let version: i64 = r.try_get("version").map_err(db_error)?;
        Ok(Versioned {
            value: Account {
                balance: Self::from_db(balance, "balance")?,
                last_claim_date,
            },
            version: Self::from_db(version, "version")?,
        })
    }

    fn row_to_grant(r: &PgRow) -> Result<GrantRecord> {
        let event_id: String = r.try_get("event_id").map_err(db_error)?;
        let user_id: String = r.try_get("user_id").map_err(db_error)?;
        let plan_id: String = r.try_get("plan_id").map_err(db_error)?;
        let credits_granted: i64 = r.try_get("credits_granted").map_err(db_error)?;
        let balance_after: i64 = r.try_get("balance_after").map_err(db_error)?;
        Ok(GrantRecord {
            event_id: EventId::new(event_id).map_err(|e| Error::CorruptRecord(e.to_string()))?,
            user_id: UserId::new(user_id).map_err(|e| Error::CorruptRecord(e.to_string()))?,
            plan_id: PlanId::new(plan_id).map_err(|e| Error::CorruptRecord(e.to_string()))?,
            credits_granted: Self::from_db(credits_granted, "credits_granted")?,
            balance_after: Self::from_db(balance_after, "balance_after")?,
            applied_at: r.try_get("applied_at").map_err(db_error)?,
        })
    }

    async fn put_account<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: &UserId,
        account: &Account,
        expected: Option<u64>,
    ) -> Result<WriteOutcome> {
        let balance = Self::to_db(account.balance, "balance")?;
        let result = match expected {
            None => {
                sqlx::query("INSERT INTO credit_accounts (user_id, balance, last_claim_date, version) VALUES ($1, $2, $3, 1) ON CONFLICT (user_id) DO NOTHING")
                    .bind(user_id.as_str())
                    .bind(balance)
                    .bind(account.last_claim_date)
                    .execute(executor)
                    .await
            }
            Some(version) => {
                sqlx::query("UPDATE credit_accounts SET balance = $2, last_claim_date = $3, version = version + 1, updated_at = NOW() WHERE user_id = $1 AND version = $4")
                    .bind(user_id.as_str())
                    .bind(balance)
                    .bind(account.last_claim_date)
                    .bind(Self::to_db(version, "version")?)
                    .execute(executor)
                    .await
            }
        }
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            debug!(user_id = %user_id, ?expected, "Conditional write lost");
            return Ok(WriteOutcome::Conflict);
        }
        Ok(WriteOutcome::Committed {
            version: expected.map_or(1, |v| v + 1),
        })
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Postgres
    }

    async fn read(&self, user_id: &UserId) -> Result<Option<Versioned<Account>>> {
        let row = sqlx::query(
            "SELECT balance, last_claim_date, version FROM credit_accounts WHERE user_id = $1",
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        row.as_ref().map(Self::row_to_account).transpose()
    }

    async fn write(
        &self,
        user_id: &UserId,
        account: &Account,
        expected: Option<u64>,
    ) -> Result<WriteOutcome> {
        Self::put_account(&self.pool, user_id, account, expected).await
    }

    async fn find_grant(&self, event_id: &EventId) -> Result<Option<GrantRecord>> {
        let row = sqlx::query("SELECT event_id, user_id, plan_id, credits_granted, balance_after, applied_at FROM grant_events WHERE event_id = $1")
            .bind(event_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref().map(Self::row_to_grant).transpose()
    }

    async fn write_with_grant(
        &self,
        user_id: &UserId,
        account: &Account,
        expected: Option<u64>,
        grant: &GrantRecord,
    ) -> Result<WriteOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let inserted = sqlx::query("INSERT INTO grant_events (event_id, user_id, plan_id, credits_granted, balance_after, applied_at) VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (event_id) DO NOTHING")
            .bind(grant.event_id.as_str())
            .bind(grant.user_id.as_str())
            .bind(grant.plan_id.as_str())
            .bind(Self::to_db(grant.credits_granted, "credits_granted")?)
            .bind(Self::to_db(grant.balance_after, "balance_after")?)
            .bind(grant.applied_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?
            .rows_affected();

        if inserted == 0 {
            tx.rollback().await.map_err(db_error)?;
            let existing = self.find_grant(&grant.event_id).await?.ok_or_else(|| {
                Error::Internal(format!("grant {} vanished after conflict", grant.event_id))
            })?;
            return Ok(WriteOutcome::DuplicateGrant(existing));
        }

        let outcome = Self::put_account(&mut *tx, user_id, account, expected).await?;
        match outcome {
            WriteOutcome::Committed { .. } => tx.commit().await.map_err(db_error)?,
            _ => tx.rollback().await.map_err(db_error)?,
        }
        Ok(outcome)
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}
