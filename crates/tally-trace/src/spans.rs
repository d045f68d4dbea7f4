//! Spans for ledger operations.

use tracing::{Level, Span, span};

/// Span for a single-user ledger operation.
pub fn ledger_span(operation: &str, user_id: &str) -> Span {
    span!(
        Level::INFO,
        "ledger.op",
        ledger.operation = operation,
        ledger.user_id = user_id,
    )
}

/// Span for reconciling a payment event.
pub fn grant_span(event_id: &str, plan: &str) -> Span {
    span!(
        Level::INFO,
        "ledger.grant",
        ledger.event_id = event_id,
        ledger.plan = plan,
    )
}
