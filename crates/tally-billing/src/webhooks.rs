//! Checkout webhook adapter.
//!
//! Payloads reaching this module have already been verified by the HTTP
//! layer. Only completed checkout sessions grant credits; everything else is
//! acknowledged and ignored.

use crate::reconciler::EntitlementReconciler;
use serde::{Deserialize, Serialize};
use tally_core::{EventId, GrantReceipt, UserId};
use thiserror::Error;
use tracing::{debug, info};

/// Event type that carries a paid checkout session.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error(transparent)]
    Ledger(#[from] tally_core::Error),
}

/// Provider webhook envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub livemode: bool,
}

impl StripeEvent {
    pub fn from_slice(payload: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(payload).map_err(|e| WebhookError::ParseError(e.to_string()))
    }

    pub fn is_checkout_completed(&self) -> bool {
        self.event_type == CHECKOUT_COMPLETED
    }
}

/// The parts of a completed checkout session needed to grant credits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    /// Session id, used as the grant's idempotency key.
    pub session_id: EventId,
    pub user_id: UserId,
    /// Plan id or price id from the session metadata.
    pub plan: String,
}

impl CheckoutSession {
    pub fn from_event(event: &StripeEvent) -> Result<Self, WebhookError> {
        let obj = event
            .data
            .get("object")
            .ok_or(WebhookError::MissingField("data.object"))?;
        let metadata = obj
            .get("metadata")
            .ok_or(WebhookError::MissingField("data.object.metadata"))?;

        let session_id = text(obj, "id")
            .and_then(|s| EventId::new(s).ok())
            .ok_or(WebhookError::MissingField("data.object.id"))?;
        let user_id = text(metadata, "user_id")
            .and_then(|s| UserId::new(s).ok())
            .ok_or(WebhookError::MissingField("data.object.metadata.user_id"))?;
        let plan = text(metadata, "plan")
            .filter(|s| !s.trim().is_empty())
            .ok_or(WebhookError::MissingField("data.object.metadata.plan"))?;

        Ok(Self {
            session_id,
            user_id,
            plan: plan.to_string(),
        })
    }
}

fn text<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|v| v.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// A checkout session was reconciled; `receipt.applied` is false on replay.
    Granted(GrantReceipt),
    /// Not a checkout completion.
    Ignored { event_type: String },
}

/// Reconcile a verified provider event.
pub async fn process_checkout_event(
    reconciler: &EntitlementReconciler,
    event: &StripeEvent,
) -> Result<WebhookOutcome, WebhookError> {
    if !event.is_checkout_completed() {
        debug!(event_id = %event.id, event_type = %event.event_type, "Ignoring webhook event");
        return Ok(WebhookOutcome::Ignored {
            event_type: event.event_type.clone(),
        });
    }

    let session = CheckoutSession::from_event(event)?;
    info!(
        event_id = %event.id,
        session_id = %session.session_id,
        user_id = %session.user_id,
        plan = %session.plan,
        "Processing checkout completion"
    );

    let receipt = reconciler
        .apply_grant(&session.session_id, &session.user_id, &session.plan)
        .await?;
    Ok(WebhookOutcome::Granted(receipt))
}
