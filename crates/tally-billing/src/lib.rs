//! Payment entitlements and metering for Tally.
//!
//! Maps checkout events to one-time credit grants and wraps the credit
//! ledger for metered operations.

pub mod metered;
pub mod plans;
pub mod reconciler;
pub mod webhooks;

pub use metered::{Authorization, MeterCosts, MeteredAction, MeteredOutcome, MeteringFacade};
pub use plans::{Plan, PlanCatalog};
pub use reconciler::EntitlementReconciler;
pub use webhooks::{
    CHECKOUT_COMPLETED, CheckoutSession, StripeEvent, WebhookError, WebhookOutcome,
    process_checkout_event,
};
