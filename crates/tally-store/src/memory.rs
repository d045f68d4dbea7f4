//! In-memory ledger store for tests and embedding.

use crate::state::LedgerState;
use async_trait::async_trait;
use tally_core::ports::{LedgerStore, StoreBackend, Versioned, WriteOutcome};
use tally_core::{Account, EventId, GrantRecord, Result, UserId};
use tokio::sync::RwLock;

/// Ledger store that keeps everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: RwLock<LedgerState>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of materialized accounts.
    pub async fn len(&self) -> usize {
        self.state.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Memory
    }

    async fn read(&self, user_id: &UserId) -> Result<Option<Versioned<Account>>> {
        Ok(self.state.read().await.read(user_id))
    }

    async fn write(
        &self,
        user_id: &UserId,
        account: &Account,
        expected: Option<u64>,
    ) -> Result<WriteOutcome> {
        Ok(self.state.write().await.write(user_id, account, expected))
    }

    async fn find_grant(&self, event_id: &EventId) -> Result<Option<GrantRecord>> {
        Ok(self.state.read().await.find_grant(event_id))
    }

    async fn write_with_grant(
        &self,
        user_id: &UserId,
        account: &Account,
        expected: Option<u64>,
        grant: &GrantRecord,
    ) -> Result<WriteOutcome> {
        Ok(self
            .state
            .write()
            .await
            .write_with_grant(user_id, account, expected, grant))
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tally_core::PlanId;

    fn grant(event: &str, balance_after: u64) -> GrantRecord {
        GrantRecord {
            event_id: EventId::new(event).unwrap(),
            user_id: UserId::new("u1").unwrap(),
            plan_id: PlanId::new("pro").unwrap(),
            credits_granted: 1000,
            balance_after,
            applied_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_grant_is_recorded_with_credit() {
        let store = MemoryLedgerStore::new();
        let user = UserId::new("u1").unwrap();
        let record = grant("evt-1", 1000);

        let outcome = store
            .write_with_grant(&user, &Account::with_balance(1000), None, &record)
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Committed { version: 1 });
        assert_eq!(store.find_grant(&record.event_id).await.unwrap(), Some(record.clone()));

        let again = store
            .write_with_grant(&user, &Account::with_balance(2000), Some(1), &grant("evt-1", 2000))
            .await
            .unwrap();
        assert_eq!(again, WriteOutcome::DuplicateGrant(record));
        assert_eq!(store.read(&user).await.unwrap().unwrap().value.balance, 1000);
    }

    #[tokio::test]
    async fn test_conflicting_grant_records_nothing() {
        let store = MemoryLedgerStore::new();
        let user = UserId::new("u1").unwrap();
        store
            .write(&user, &Account::with_balance(5), None)
            .await
            .unwrap();

        let outcome = store
            .write_with_grant(&user, &Account::with_balance(1000), None, &grant("evt-2", 1000))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Conflict);
        assert!(store
            .find_grant(&EventId::new("evt-2").unwrap())
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.len().await, 1);
    }
}
