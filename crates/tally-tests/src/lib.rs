//! Integration test infrastructure for Tally.
//!
//! Wires the full ledger stack over a real backend: a snapshot file in a
//! temp directory, or PostgreSQL in a testcontainer.
//!
//! # Usage
//!
//! ```ignore
//! use tally_tests::LocalContext;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let ctx = LocalContext::new().await.unwrap();
//!     // Use ctx.stack.ledger, ctx.stack.reconciler, ctx.stack.facade
//! }
//! ```

pub mod containers;
pub mod context;
pub mod fixtures;

pub use context::{LedgerStack, LocalContext, PostgresContext};
pub use fixtures::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,tally_tests=debug")),
        )
        .with_test_writer()
        .try_init();
}
