//! Tally Core
//!
//! Core domain types, the storage port, and error handling for the Tally
//! credit ledger. This crate has minimal dependencies and defines the shared
//! vocabulary used across all other crates.

pub mod account;
pub mod clock;
pub mod error;
pub mod grant;
pub mod ids;
pub mod ports;

pub use account::{
    Account, BalanceView, ClaimReceipt, Credits, DebitReceipt, positive_credits, validate_amount,
    validate_cost,
};
pub use clock::{Clock, DATE_FORMAT, FixedClock, LocalClock, parse_date};
pub use error::{Error, Result};
pub use grant::{GrantReceipt, GrantRecord};
pub use ids::*;
pub use ports::{LedgerStore, StoreBackend, Versioned, WriteOutcome};
