//! Credit ledger for Tally.
//!
//! [`CreditLedger`] is the only writer path into a [`LedgerStore`]. Every
//! operation on a user is a read-modify-write that behaves as if serialized
//! with every other operation on the same user.
//!
//! [`LedgerStore`]: tally_core::ports::LedgerStore

pub mod config;
pub mod ledger;
mod locks;

pub use config::LedgerConfig;
pub use ledger::CreditLedger;
