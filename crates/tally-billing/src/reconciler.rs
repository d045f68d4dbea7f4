//! Turns verified payment events into one-time credit grants.

use crate::plans::PlanCatalog;
use std::sync::Arc;
use tally_core::{EventId, GrantReceipt, Result, UserId};
use tally_ledger::CreditLedger;
use tracing::{info, warn};

/// Applies purchased plans to user balances, at most once per event.
///
/// Holds no state of its own. Deduplication lives in the ledger store next
/// to the balance it protects.
pub struct EntitlementReconciler {
    ledger: Arc<CreditLedger>,
    catalog: PlanCatalog,
}

impl EntitlementReconciler {
    pub fn new(ledger: Arc<CreditLedger>, catalog: PlanCatalog) -> Self {
        Self { ledger, catalog }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    /// Credit the plan bought in `event_id` to `user_id`.
    ///
    /// `plan_key` may be a plan id or a provider price id. An unknown plan
    /// fails with `PlanNotFound` and records nothing, so a corrected
    /// redelivery of the same event still applies. A replayed event returns
    /// the original grant with `applied = false`.
    pub async fn apply_grant(
        &self,
        event_id: &EventId,
        user_id: &UserId,
        plan_key: &str,
    ) -> Result<GrantReceipt> {
        let plan = match self.catalog.resolve(plan_key) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(event_id = %event_id, user_id = %user_id, plan = plan_key, "Grant for unknown plan");
                return Err(e);
            }
        };

        if let Some(existing) = self.ledger.find_grant(event_id).await? {
            info!(event_id = %event_id, "Grant already applied");
            return Ok(GrantReceipt::replayed(&existing));
        }

        self.ledger
            .credit_once(event_id, user_id, &plan.id, plan.credits)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use tally_core::Error;
    use tally_store::MemoryLedgerStore;

    fn setup() -> (Arc<CreditLedger>, EntitlementReconciler) {
        let ledger = Arc::new(CreditLedger::new(Arc::new(MemoryLedgerStore::new())));
        let reconciler = EntitlementReconciler::new(ledger.clone(), PlanCatalog::default());
        (ledger, reconciler)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[tokio::test]
    async fn test_grant_applied_once() {
        let (ledger, reconciler) = setup();
        let event = EventId::new("cs_test_1").unwrap();
        let user = UserId::new("u1").unwrap();

        let first = reconciler.apply_grant(&event, &user, "pro").await.unwrap();
        assert!(first.applied);
        assert_eq!(first.credits_granted, 1000);
        assert_eq!(first.balance_after, 1000);

        let replay = reconciler.apply_grant(&event, &user, "pro").await.unwrap();
        assert!(!replay.applied);
        assert_eq!(replay.credits_granted, 1000);
        assert_eq!(replay.balance_after, 1000);

        assert_eq!(ledger.balance(&user, today()).await.unwrap().balance, 1000);
    }

    #[tokio::test]
    async fn test_replay_reports_original_balance() {
        let (ledger, reconciler) = setup();
        let event = EventId::new("cs_test_2").unwrap();
        let user = UserId::new("u1").unwrap();

        reconciler.apply_grant(&event, &user, "starter").await.unwrap();
        ledger.credit(&user, 5).await.unwrap();

        let replay = reconciler.apply_grant(&event, &user, "starter").await.unwrap();
        assert!(!replay.applied);
        assert_eq!(replay.balance_after, 200);
        assert_eq!(ledger.balance(&user, today()).await.unwrap().balance, 205);
    }

    #[tokio::test]
    async fn test_price_id_resolves_plan() {
        let (_, reconciler) = setup();
        let receipt = reconciler
            .apply_grant(&EventId::new("cs_3").unwrap(), &UserId::new("u1").unwrap(), "price_enterprise")
            .await
            .unwrap();
        assert_eq!(receipt.plan_id.as_str(), "enterprise");
        assert_eq!(receipt.credits_granted, 3000);
    }

    #[tokio::test]
    async fn test_unknown_plan_is_not_recorded() {
        let (ledger, reconciler) = setup();
        let event = EventId::new("cs_4").unwrap();
        let user = UserId::new("u1").unwrap();

        let err = reconciler.apply_grant(&event, &user, "gold").await.unwrap_err();
        assert!(matches!(err, Error::PlanNotFound(_)));
        assert!(ledger.find_grant(&event).await.unwrap().is_none());
        assert_eq!(ledger.balance(&user, today()).await.unwrap().balance, 0);

        let retry = reconciler.apply_grant(&event, &user, "starter").await.unwrap();
        assert!(retry.applied);
        assert_eq!(retry.balance_after, 200);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deliveries_credit_once() {
        let (ledger, reconciler) = setup();
        let reconciler = Arc::new(reconciler);
        let user = UserId::new("u1").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reconciler = reconciler.clone();
                let user = user.clone();
                tokio::spawn(async move {
                    let event = EventId::new("cs_dup").unwrap();
                    reconciler.apply_grant(&event, &user, "pro").await.unwrap()
                })
            })
            .collect();

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap().applied {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(ledger.balance(&user, today()).await.unwrap().balance, 1000);
    }
}
