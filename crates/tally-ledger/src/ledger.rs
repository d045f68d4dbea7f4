//! The credit ledger.

use crate::config::LedgerConfig;
use crate::locks::UserLocks;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tally_core::ports::{LedgerStore, StoreBackend, WriteOutcome};
use tally_core::{
    Account, BalanceView, ClaimReceipt, Credits, DebitReceipt, Error, EventId, GrantReceipt,
    GrantRecord, PlanId, Result, UserId, validate_amount, validate_cost,
};
use tracing::{debug, info, warn};

/// What a read-modify-write decided after seeing the current account.
enum Step<T> {
    /// Leave the account as it is.
    Keep(T),
    /// Commit this account.
    Write(Account, T),
}

/// Enforces balance invariants on top of a [`LedgerStore`].
///
/// Per user, operations are serialized in-process by a striped mutex and
/// committed with a conditional write, so writers in other processes sharing
/// the same remote store are detected and retried instead of overwritten.
pub struct CreditLedger {
    store: Arc<dyn LedgerStore>,
    locks: UserLocks,
    config: LedgerConfig,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_config(store, LedgerConfig::default())
    }

    pub fn with_config(store: Arc<dyn LedgerStore>, config: LedgerConfig) -> Self {
        Self {
            locks: UserLocks::new(config.lock_stripes),
            store,
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Backend the ledger writes to.
    pub fn backend(&self) -> StoreBackend {
        self.store.backend()
    }

    /// Check the backing store.
    pub async fn health_check(&self) -> Result<()> {
        self.store.health_check().await
    }

    /// Deduct `cost` if the balance covers it.
    ///
    /// A refused debit writes nothing and reports the unchanged balance.
    pub async fn try_debit(&self, user_id: &UserId, cost: Credits) -> Result<DebitReceipt> {
        let cost = validate_cost(cost)?;
        let receipt = self
            .update(user_id, "debit", |account| {
                Ok(match account.debited(cost) {
                    Some(next) => {
                        let balance_after = next.balance;
                        Step::Write(
                            next,
                            DebitReceipt {
                                granted: true,
                                balance_after,
                            },
                        )
                    }
                    None => Step::Keep(DebitReceipt {
                        granted: false,
                        balance_after: account.balance,
                    }),
                })
            })
            .await?;

        if receipt.granted {
            info!(user_id = %user_id, cost, balance = receipt.balance_after, "Credits debited");
        } else {
            debug!(user_id = %user_id, cost, balance = receipt.balance_after, "Debit refused, insufficient credits");
        }
        Ok(receipt)
    }

    /// Add `amount`, creating the account if needed. Returns the new balance.
    pub async fn credit(&self, user_id: &UserId, amount: Credits) -> Result<Credits> {
        let amount = validate_amount(amount)?;
        let balance = self
            .update(user_id, "credit", |account| {
                let next = account.credited(amount)?;
                let balance = next.balance;
                Ok(Step::Write(next, balance))
            })
            .await?;

        info!(user_id = %user_id, amount, balance, "Credits added");
        Ok(balance)
    }

    /// Grant the daily credits unless already claimed on `today`.
    pub async fn claim_daily(&self, user_id: &UserId, today: NaiveDate) -> Result<ClaimReceipt> {
        let amount = self.config.daily_claim_credits;
        let receipt = self
            .update(user_id, "claim", |account| {
                if !account.can_claim_on(today) {
                    return Ok(Step::Keep(ClaimReceipt {
                        granted: false,
                        credits_added: 0,
                        balance_after: account.balance,
                        last_claim_date: account.last_claim_date,
                    }));
                }
                let next = account.claimed(today, amount)?;
                let receipt = ClaimReceipt {
                    granted: true,
                    credits_added: amount,
                    balance_after: next.balance,
                    last_claim_date: next.last_claim_date,
                };
                Ok(Step::Write(next, receipt))
            })
            .await?;

        if receipt.granted {
            info!(user_id = %user_id, %today, balance = receipt.balance_after, "Daily credits claimed");
        } else {
            debug!(user_id = %user_id, %today, "Daily credits already claimed");
        }
        Ok(receipt)
    }

    /// Current balance and claim availability on `today`.
    pub async fn balance(&self, user_id: &UserId, today: NaiveDate) -> Result<BalanceView> {
        let (account, _) = self.load(user_id).await?;
        Ok(BalanceView::new(user_id.clone(), &account, today))
    }

    /// Dedup record for a payment event, if it was applied.
    pub async fn find_grant(&self, event_id: &EventId) -> Result<Option<GrantRecord>> {
        self.store.find_grant(event_id).await
    }

    /// Credit `credits` for `event_id` exactly once.
    ///
    /// The credit and its dedup record commit together. If the event was
    /// already applied (including by a concurrent delivery that won the
    /// race) the original record is echoed back with `applied = false`.
    pub async fn credit_once(
        &self,
        event_id: &EventId,
        user_id: &UserId,
        plan_id: &PlanId,
        credits: Credits,
    ) -> Result<GrantReceipt> {
        let credits = validate_amount(credits)?;
        let _guard = self.locks.lock(user_id).await;

        if let Some(existing) = self.store.find_grant(event_id).await? {
            return Ok(self.replay(event_id, user_id, &existing));
        }

        for attempt in 1..=self.config.max_commit_attempts {
            let (account, expected) = self.load(user_id).await?;
            let next = account.credited(credits)?;
            let record = GrantRecord {
                event_id: event_id.clone(),
                user_id: user_id.clone(),
                plan_id: plan_id.clone(),
                credits_granted: credits,
                balance_after: next.balance,
                applied_at: Utc::now(),
            };

            match self
                .store
                .write_with_grant(user_id, &next, expected, &record)
                .await?
            {
                WriteOutcome::Committed { .. } => {
                    info!(
                        event_id = %event_id,
                        user_id = %user_id,
                        plan_id = %plan_id,
                        credits,
                        balance = record.balance_after,
                        "Payment grant applied"
                    );
                    return Ok(GrantReceipt::applied(&record));
                }
                WriteOutcome::DuplicateGrant(existing) => {
                    return Ok(self.replay(event_id, user_id, &existing));
                }
                WriteOutcome::Conflict => {
                    debug!(user_id = %user_id, attempt, op = "grant", "Write conflict, retrying");
                    tokio::task::yield_now().await;
                }
            }
        }
        Err(self.exhausted(user_id, "grant"))
    }

    fn replay(&self, event_id: &EventId, user_id: &UserId, existing: &GrantRecord) -> GrantReceipt {
        if existing.user_id != *user_id {
            warn!(
                event_id = %event_id,
                recorded_user = %existing.user_id,
                requested_user = %user_id,
                "Replayed grant names a different user"
            );
        }
        info!(event_id = %event_id, "Payment grant already applied, replaying");
        GrantReceipt::replayed(existing)
    }

    async fn load(&self, user_id: &UserId) -> Result<(Account, Option<u64>)> {
        Ok(match self.store.read(user_id).await? {
            Some(record) => (record.value, Some(record.version)),
            None => (Account::default(), None),
        })
    }

    async fn update<T, F>(&self, user_id: &UserId, op: &'static str, mut decide: F) -> Result<T>
    where
        F: FnMut(&Account) -> Result<Step<T>> + Send,
        T: Send,
    {
        let _guard = self.locks.lock(user_id).await;

        for attempt in 1..=self.config.max_commit_attempts {
            let (account, expected) = self.load(user_id).await?;
            let (next, output) = match decide(&account)? {
                Step::Keep(output) => return Ok(output),
                Step::Write(next, output) => (next, output),
            };

            match self.store.write(user_id, &next, expected).await? {
                WriteOutcome::Committed { .. } => return Ok(output),
                WriteOutcome::Conflict => {
                    debug!(user_id = %user_id, attempt, op, "Write conflict, retrying");
                    tokio::task::yield_now().await;
                }
                WriteOutcome::DuplicateGrant(record) => {
                    return Err(Error::Internal(format!(
                        "plain write reported duplicate grant {}",
                        record.event_id
                    )));
                }
            }
        }
        Err(self.exhausted(user_id, op))
    }

    fn exhausted(&self, user_id: &UserId, op: &str) -> Error {
        warn!(
            user_id = %user_id,
            op,
            attempts = self.config.max_commit_attempts,
            "Giving up after repeated write conflicts"
        );
        Error::Conflict(format!(
            "{op} for {user_id} lost {} consecutive conditional writes",
            self.config.max_commit_attempts
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tally_core::parse_date;
    use tally_core::ports::Versioned;
    use tally_store::MemoryLedgerStore;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn ledger() -> (Arc<MemoryLedgerStore>, CreditLedger) {
        let store = Arc::new(MemoryLedgerStore::new());
        (store.clone(), CreditLedger::new(store))
    }

    /// Memory store that reports a conflict for the first `conflicts` writes.
    struct ContendedStore {
        inner: MemoryLedgerStore,
        conflicts: AtomicU32,
    }

    impl ContendedStore {
        fn new(conflicts: u32) -> Self {
            Self {
                inner: MemoryLedgerStore::new(),
                conflicts: AtomicU32::new(conflicts),
            }
        }

        fn lose(&self) -> bool {
            self.conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl LedgerStore for ContendedStore {
        fn backend(&self) -> StoreBackend {
            StoreBackend::Memory
        }

        async fn read(&self, user_id: &UserId) -> Result<Option<Versioned<Account>>> {
            self.inner.read(user_id).await
        }

        async fn write(
            &self,
            user_id: &UserId,
            account: &Account,
            expected: Option<u64>,
        ) -> Result<WriteOutcome> {
            if self.lose() {
                return Ok(WriteOutcome::Conflict);
            }
            self.inner.write(user_id, account, expected).await
        }

        async fn find_grant(&self, event_id: &EventId) -> Result<Option<GrantRecord>> {
            self.inner.find_grant(event_id).await
        }

        async fn write_with_grant(
            &self,
            user_id: &UserId,
            account: &Account,
            expected: Option<u64>,
            grant: &GrantRecord,
        ) -> Result<WriteOutcome> {
            if self.lose() {
                return Ok(WriteOutcome::Conflict);
            }
            self.inner
                .write_with_grant(user_id, account, expected, grant)
                .await
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_new_user_cannot_debit() {
        let (store, ledger) = ledger();
        let receipt = ledger.try_debit(&user("u1"), 1).await.unwrap();
        assert_eq!(
            receipt,
            DebitReceipt {
                granted: false,
                balance_after: 0
            }
        );
        // A refused debit writes nothing.
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_debit_and_credit() {
        let (_, ledger) = ledger();
        let u = user("u1");

        assert_eq!(ledger.credit(&u, 10).await.unwrap(), 10);
        let receipt = ledger.try_debit(&u, 1).await.unwrap();
        assert!(receipt.granted);
        assert_eq!(receipt.balance_after, 9);

        let refused = ledger.try_debit(&u, 25).await.unwrap();
        assert!(!refused.granted);
        assert_eq!(refused.balance_after, 9);
        assert_eq!(ledger.balance(&u, day("2024-06-01")).await.unwrap().balance, 9);
    }

    #[tokio::test]
    async fn test_exact_balance_debit_reaches_zero() {
        let (_, ledger) = ledger();
        let u = user("u1");
        ledger.credit(&u, 25).await.unwrap();
        assert_eq!(ledger.try_debit(&u, 25).await.unwrap().balance_after, 0);
        assert!(!ledger.try_debit(&u, 1).await.unwrap().granted);
    }

    #[tokio::test]
    async fn test_zero_amounts_rejected() {
        let (_, ledger) = ledger();
        let u = user("u1");
        assert!(matches!(ledger.try_debit(&u, 0).await, Err(Error::InvalidRequest(_))));
        assert!(matches!(ledger.credit(&u, 0).await, Err(Error::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_daily_claim_once_per_day() {
        let (_, ledger) = ledger();
        let u = user("u1");

        let first = ledger.claim_daily(&u, day("2024-01-01")).await.unwrap();
        assert!(first.granted);
        assert_eq!(first.credits_added, 15);
        assert_eq!(first.balance_after, 15);

        let second = ledger.claim_daily(&u, day("2024-01-01")).await.unwrap();
        assert!(!second.granted);
        assert_eq!(second.balance_after, 15);
        assert_eq!(second.last_claim_date, Some(day("2024-01-01")));

        let next_day = ledger.claim_daily(&u, day("2024-01-02")).await.unwrap();
        assert!(next_day.granted);
        assert_eq!(next_day.balance_after, 30);
    }

    #[tokio::test]
    async fn test_claim_amount_configurable() {
        let store = Arc::new(MemoryLedgerStore::new());
        let ledger = CreditLedger::with_config(
            store,
            LedgerConfig::default().with_daily_claim_credits(50),
        );
        let receipt = ledger.claim_daily(&user("u1"), day("2024-01-01")).await.unwrap();
        assert_eq!(receipt.balance_after, 50);
    }

    #[tokio::test]
    async fn test_balance_view_tracks_claim() {
        let (_, ledger) = ledger();
        let u = user("u1");
        let view = ledger.balance(&u, day("2024-06-01")).await.unwrap();
        assert!(view.can_claim_daily);
        assert_eq!(view.last_claim_date, None);

        ledger.claim_daily(&u, day("2024-06-01")).await.unwrap();
        let view = ledger.balance(&u, day("2024-06-01")).await.unwrap();
        assert!(!view.can_claim_daily);
        assert!(ledger.balance(&u, day("2024-06-02")).await.unwrap().can_claim_daily);
    }

    #[tokio::test]
    async fn test_credit_once_dedups() {
        let (_, ledger) = ledger();
        let u = user("u1");
        let event = EventId::new("evt-1").unwrap();
        let plan = PlanId::new("pro").unwrap();

        let first = ledger.credit_once(&event, &u, &plan, 1000).await.unwrap();
        assert!(first.applied);
        assert_eq!(first.balance_after, 1000);

        let replay = ledger.credit_once(&event, &u, &plan, 1000).await.unwrap();
        assert!(!replay.applied);
        assert_eq!(replay.balance_after, 1000);
        assert_eq!(ledger.balance(&u, day("2024-06-01")).await.unwrap().balance, 1000);
    }

    #[tokio::test]
    async fn test_credit_once_replay_at_balance_ceiling() {
        let (_, ledger) = ledger();
        let u = user("u1");
        let event = EventId::new("evt-max").unwrap();
        let plan = PlanId::new("pro").unwrap();

        ledger.credit_once(&event, &u, &plan, 1000).await.unwrap();
        ledger.credit(&u, Credits::MAX - 1000).await.unwrap();

        let replay = ledger.credit_once(&event, &u, &plan, 1000).await.unwrap();
        assert!(!replay.applied);
        assert_eq!(replay.balance_after, 1000);
        assert_eq!(ledger.balance(&u, day("2024-06-01")).await.unwrap().balance, Credits::MAX);
    }

    #[tokio::test]
    async fn test_retries_through_conflicts() {
        let ledger = CreditLedger::new(Arc::new(ContendedStore::new(3)));
        let u = user("u1");
        assert_eq!(ledger.credit(&u, 10).await.unwrap(), 10);

        let event = EventId::new("evt-9").unwrap();
        let plan = PlanId::new("starter").unwrap();
        assert!(ledger.credit_once(&event, &u, &plan, 200).await.unwrap().applied);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempt_budget() {
        let ledger = CreditLedger::with_config(
            Arc::new(ContendedStore::new(100)),
            LedgerConfig::default().with_max_commit_attempts(3),
        );
        let err = ledger.credit(&user("u1"), 10).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_debits_never_overdraw() {
        let (_, ledger) = ledger();
        let ledger = Arc::new(ledger);
        let u = user("u1");
        ledger.credit(&u, 5).await.unwrap();

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let ledger = ledger.clone();
                let u = u.clone();
                tokio::spawn(async move { ledger.try_debit(&u, 1).await.unwrap().granted })
            })
            .collect();

        let mut granted = 0;
        for result in futures::future::join_all(tasks).await {
            if result.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 5);
        assert_eq!(ledger.balance(&u, day("2024-06-01")).await.unwrap().balance, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_day_claims_grant_once() {
        let (_, ledger) = ledger();
        let ledger = Arc::new(ledger);
        let u = user("u1");

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let ledger = ledger.clone();
                let u = u.clone();
                tokio::spawn(async move {
                    ledger.claim_daily(&u, day("2024-06-01")).await.unwrap().granted
                })
            })
            .collect();

        let granted = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();

        assert_eq!(granted, 1);
        assert_eq!(ledger.balance(&u, day("2024-06-01")).await.unwrap().balance, 15);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_claim_racing_debit_keeps_both() {
        let (_, ledger) = ledger();
        let ledger = Arc::new(ledger);
        let u = user("u1");
        ledger.credit(&u, 1).await.unwrap();

        let debit = {
            let (ledger, u) = (ledger.clone(), u.clone());
            tokio::spawn(async move { ledger.try_debit(&u, 1).await.unwrap() })
        };
        let claim = {
            let (ledger, u) = (ledger.clone(), u.clone());
            tokio::spawn(async move { ledger.claim_daily(&u, day("2024-06-01")).await.unwrap() })
        };

        assert!(debit.await.unwrap().granted);
        assert!(claim.await.unwrap().granted);
        assert_eq!(ledger.balance(&u, day("2024-06-01")).await.unwrap().balance, 15);
    }
}
