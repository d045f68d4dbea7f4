//! Test fixtures for ledger scenarios.

use chrono::NaiveDate;
use serde_json::json;
use tally_billing::{CHECKOUT_COMPLETED, StripeEvent};
use tally_core::{EventId, UserId};

/// Parse a known-good user id.
pub fn user(id: &str) -> UserId {
    UserId::new(id).expect("valid user id")
}

/// Parse a known-good event id.
pub fn event(id: &str) -> EventId {
    EventId::new(id).expect("valid event id")
}

/// Calendar day from `YYYY-MM-DD`.
pub fn day(value: &str) -> NaiveDate {
    tally_core::parse_date(value).expect("valid date")
}

/// A verified `checkout.session.completed` event.
pub fn checkout_completed(delivery_id: &str, session_id: &str, user_id: &str, plan: &str) -> StripeEvent {
    StripeEvent {
        id: delivery_id.to_string(),
        event_type: CHECKOUT_COMPLETED.to_string(),
        data: json!({
            "object": {
                "id": session_id,
                "object": "checkout.session",
                "payment_status": "paid",
                "metadata": { "user_id": user_id, "plan": plan }
            }
        }),
        created: 1_717_200_000,
        livemode: false,
    }
}
