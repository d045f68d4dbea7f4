//! Repository implementations for PostgreSQL.

mod ledger;

pub use ledger::PgLedgerStore;
