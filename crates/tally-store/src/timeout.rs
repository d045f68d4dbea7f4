//! Per-call deadline for ledger store operations.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tally_core::ports::{LedgerStore, StoreBackend, Versioned, WriteOutcome};
use tally_core::{Account, Error, EventId, GrantRecord, Result, UserId};
use tracing::warn;

/// Wraps a store so no call can block longer than `limit`.
///
/// An expired write may still land on the backend. The ledger only ever
/// issues conditional writes, so a retry after a timeout re-reads and cannot
/// double-apply.
pub struct TimeoutStore {
    inner: Arc<dyn LedgerStore>,
    limit: Duration,
}

impl TimeoutStore {
    pub fn new(inner: Arc<dyn LedgerStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    async fn bounded<T>(&self, op: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    op,
                    backend = %self.inner.backend(),
                    limit_ms = self.limit.as_millis() as u64,
                    "Ledger store call timed out"
                );
                Err(Error::StoreUnavailable(format!(
                    "{op} timed out after {}ms",
                    self.limit.as_millis()
                )))
            }
        }
    }
}

#[async_trait]
impl LedgerStore for TimeoutStore {
    fn backend(&self) -> StoreBackend {
        self.inner.backend()
    }

    async fn read(&self, user_id: &UserId) -> Result<Option<Versioned<Account>>> {
        self.bounded("read", self.inner.read(user_id)).await
    }

    async fn write(
        &self,
        user_id: &UserId,
        account: &Account,
        expected: Option<u64>,
    ) -> Result<WriteOutcome> {
        self.bounded("write", self.inner.write(user_id, account, expected))
            .await
    }

    async fn find_grant(&self, event_id: &EventId) -> Result<Option<GrantRecord>> {
        self.bounded("find_grant", self.inner.find_grant(event_id))
            .await
    }

    async fn write_with_grant(
        &self,
        user_id: &UserId,
        account: &Account,
        expected: Option<u64>,
        grant: &GrantRecord,
    ) -> Result<WriteOutcome> {
        self.bounded(
            "write_with_grant",
            self.inner.write_with_grant(user_id, account, expected, grant),
        )
        .await
    }

    async fn health_check(&self) -> Result<()> {
        self.bounded("health_check", self.inner.health_check()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryLedgerStore;

    /// Backend that never answers.
    struct HungStore;

    #[async_trait]
    impl LedgerStore for HungStore {
        fn backend(&self) -> StoreBackend {
            StoreBackend::Postgres
        }

        async fn read(&self, _user_id: &UserId) -> Result<Option<Versioned<Account>>> {
            std::future::pending().await
        }

        async fn write(
            &self,
            _user_id: &UserId,
            _account: &Account,
            _expected: Option<u64>,
        ) -> Result<WriteOutcome> {
            std::future::pending().await
        }

        async fn find_grant(&self, _event_id: &EventId) -> Result<Option<GrantRecord>> {
            std::future::pending().await
        }

        async fn write_with_grant(
            &self,
            _user_id: &UserId,
            _account: &Account,
            _expected: Option<u64>,
            _grant: &GrantRecord,
        ) -> Result<WriteOutcome> {
            std::future::pending().await
        }

        async fn health_check(&self) -> Result<()> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_backend_becomes_unavailable() {
        let store = TimeoutStore::new(Arc::new(HungStore), Duration::from_secs(5));
        let user = UserId::new("u1").unwrap();

        let err = store.read(&user).await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(ref msg) if msg.contains("read timed out")));
        assert!(err.is_retryable());
        assert_eq!(store.backend(), StoreBackend::Postgres);
    }

    #[tokio::test]
    async fn test_fast_backend_passes_through() {
        let store = TimeoutStore::new(Arc::new(MemoryLedgerStore::new()), Duration::from_secs(1));
        let user = UserId::new("u1").unwrap();

        let outcome = store
            .write(&user, &Account::with_balance(3), None)
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Committed { version: 1 });
        assert_eq!(store.read(&user).await.unwrap().unwrap().value.balance, 3);
    }
}
