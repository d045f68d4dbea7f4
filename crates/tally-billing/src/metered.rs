//! Metered access to credit-consuming operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tally_core::{
    BalanceView, ClaimReceipt, Clock, Credits, Error, LocalClock, Result, UserId,
};
use tally_ledger::CreditLedger;
use tracing::{error, info, warn};

/// Credit price of each metered action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterCosts {
    #[serde(default = "default_image_cost")]
    pub image: Credits,
    #[serde(default = "default_video_cost")]
    pub video: Credits,
}

fn default_image_cost() -> Credits {
    1
}

fn default_video_cost() -> Credits {
    25
}

impl Default for MeterCosts {
    fn default() -> Self {
        Self {
            image: default_image_cost(),
            video: default_video_cost(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeteredAction {
    Image,
    Video,
    /// Ad hoc price outside the cost table.
    Custom(Credits),
}

impl MeteredAction {
    pub fn cost(&self, costs: &MeterCosts) -> Credits {
        match self {
            MeteredAction::Image => costs.image,
            MeteredAction::Video => costs.video,
            MeteredAction::Custom(cost) => *cost,
        }
    }
}

impl fmt::Display for MeteredAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeteredAction::Image => write!(f, "image"),
            MeteredAction::Video => write!(f, "video"),
            MeteredAction::Custom(cost) => write!(f, "custom({cost})"),
        }
    }
}

/// Result of asking to spend credits on an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Authorization {
    Proceed { charged: Credits, remaining: Credits },
    InsufficientCredits { required: Credits, balance: Credits },
}

impl Authorization {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Authorization::Proceed { .. })
    }

    /// Remaining balance, or `Error::InsufficientCredits`.
    pub fn into_result(self) -> Result<Credits> {
        match self {
            Authorization::Proceed { remaining, .. } => Ok(remaining),
            Authorization::InsufficientCredits { required, balance } => {
                Err(Error::InsufficientCredits {
                    required,
                    available: balance,
                })
            }
        }
    }
}

/// What happened to a metered operation.
#[derive(Debug)]
pub enum MeteredOutcome<T, E> {
    /// Charged and completed.
    Completed {
        value: T,
        charged: Credits,
        remaining: Credits,
    },
    /// Not run; the balance did not cover the cost.
    Denied { required: Credits, balance: Credits },
    /// Charged, ran, and failed. `refunded` is what was credited back.
    Failed { error: E, refunded: Credits },
}

/// Entry point for callers that spend, claim, or grant credits.
pub struct MeteringFacade {
    ledger: Arc<CreditLedger>,
    costs: MeterCosts,
    clock: Arc<dyn Clock>,
    refund_on_failure: bool,
}

impl MeteringFacade {
    pub fn new(ledger: Arc<CreditLedger>) -> Self {
        Self {
            ledger,
            costs: MeterCosts::default(),
            clock: Arc::new(LocalClock),
            refund_on_failure: true,
        }
    }

    pub fn with_costs(mut self, costs: MeterCosts) -> Self {
        self.costs = costs;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_refund_on_failure(mut self, enable: bool) -> Self {
        self.refund_on_failure = enable;
        self
    }

    pub fn costs(&self) -> &MeterCosts {
        &self.costs
    }

    pub fn ledger(&self) -> &Arc<CreditLedger> {
        &self.ledger
    }

    /// Charge the action's cost up front.
    pub async fn authorize(&self, user_id: &UserId, action: MeteredAction) -> Result<Authorization> {
        let cost = action.cost(&self.costs);
        let receipt = self.ledger.try_debit(user_id, cost).await?;

        if receipt.granted {
            Ok(Authorization::Proceed {
                charged: cost,
                remaining: receipt.balance_after,
            })
        } else {
            info!(user_id = %user_id, %action, cost, balance = receipt.balance_after, "Metered action denied");
            Ok(Authorization::InsufficientCredits {
                required: cost,
                balance: receipt.balance_after,
            })
        }
    }

    /// Charge for `action`, then run `op`.
    ///
    /// `op` only runs after the debit committed. When it fails and refunds
    /// are enabled the charge is credited back.
    pub async fn run_metered<T, E, F, Fut>(
        &self,
        user_id: &UserId,
        action: MeteredAction,
        op: F,
    ) -> Result<MeteredOutcome<T, E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: fmt::Display,
    {
        let (charged, remaining) = match self.authorize(user_id, action).await? {
            Authorization::Proceed { charged, remaining } => (charged, remaining),
            Authorization::InsufficientCredits { required, balance } => {
                return Ok(MeteredOutcome::Denied { required, balance });
            }
        };

        match op().await {
            Ok(value) => Ok(MeteredOutcome::Completed {
                value,
                charged,
                remaining,
            }),
            Err(err) => {
                warn!(user_id = %user_id, %action, error = %err, "Metered operation failed");
                let refunded = if self.refund_on_failure {
                    self.refund(user_id, charged).await
                } else {
                    0
                };
                Ok(MeteredOutcome::Failed {
                    error: err,
                    refunded,
                })
            }
        }
    }

    async fn refund(&self, user_id: &UserId, amount: Credits) -> Credits {
        match self.ledger.credit(user_id, amount).await {
            Ok(balance) => {
                info!(user_id = %user_id, amount, balance, "Refunded failed operation");
                amount
            }
            Err(e) => {
                error!(user_id = %user_id, amount, error = %e, "Refund failed");
                0
            }
        }
    }

    /// Claim today's free credits.
    pub async fn claim_daily(&self, user_id: &UserId) -> Result<ClaimReceipt> {
        self.ledger.claim_daily(user_id, self.clock.today()).await
    }

    /// Operator-issued credit.
    pub async fn grant_admin(&self, user_id: &UserId, amount: Credits) -> Result<Credits> {
        info!(user_id = %user_id, amount, "Admin credit grant");
        self.ledger.credit(user_id, amount).await
    }

    pub async fn balance(&self, user_id: &UserId) -> Result<BalanceView> {
        self.ledger.balance(user_id, self.clock.today()).await
    }
}
