//! Port traits (hexagonal architecture).
//!
//! These traits define the interface between the ledger and its storage
//! adapters.

use crate::account::Account;
use crate::grant::GrantRecord;
use crate::ids::{EventId, UserId};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A stored value together with its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Outcome of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write landed; the record now has this version.
    Committed { version: u64 },
    /// The record changed since it was read. Nothing was written.
    Conflict,
    /// The grant's event id is already recorded. Nothing was written.
    DuplicateGrant(GrantRecord),
}

/// Which backend a store writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Postgres,
    File,
    Memory,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Postgres => write!(f, "postgres"),
            StoreBackend::File => write!(f, "file"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Durable mapping from user id to [`Account`], plus grant dedup records.
///
/// Writes are conditional on the version observed by the preceding read:
/// `expected = None` only succeeds if no record exists yet, `Some(v)` only if
/// the stored version is still `v`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend kind, for logging and health reporting.
    fn backend(&self) -> StoreBackend;

    /// Read an account.
    async fn read(&self, user_id: &UserId) -> Result<Option<Versioned<Account>>>;

    /// Conditionally write an account.
    async fn write(
        &self,
        user_id: &UserId,
        account: &Account,
        expected: Option<u64>,
    ) -> Result<WriteOutcome>;

    /// Look up the dedup record for a payment event.
    async fn find_grant(&self, event_id: &EventId) -> Result<Option<GrantRecord>>;

    /// Record a grant and write the credited account as one atomic unit.
    async fn write_with_grant(
        &self,
        user_id: &UserId,
        account: &Account,
        expected: Option<u64>,
        grant: &GrantRecord,
    ) -> Result<WriteOutcome>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> Result<()>;
}
