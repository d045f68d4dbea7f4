//! Ledger store backends for Tally.
//!
//! Three interchangeable implementations of [`LedgerStore`]: the remote
//! PostgreSQL store (re-exported from `tally-db`), a local snapshot-file
//! store, and an in-memory store. [`open_store`] picks one once, at startup.

pub mod backend;
pub mod config;
pub mod file;
pub mod memory;
mod state;
pub mod timeout;

pub use backend::open_store;
pub use config::StoreConfig;
pub use file::FileLedgerStore;
pub use memory::MemoryLedgerStore;
pub use tally_core::ports::LedgerStore;
pub use tally_db::PgLedgerStore;
pub use timeout::TimeoutStore;
