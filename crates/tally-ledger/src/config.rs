//! Ledger configuration.

use serde::{Deserialize, Serialize};
use tally_core::Credits;

/// Tunables for [`crate::CreditLedger`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Credits added by a daily claim.
    #[serde(default = "default_daily_claim_credits")]
    pub daily_claim_credits: Credits,
    /// Conditional-write attempts before giving up with a conflict.
    #[serde(default = "default_max_commit_attempts")]
    pub max_commit_attempts: u32,
    /// Number of per-user lock stripes.
    #[serde(default = "default_lock_stripes")]
    pub lock_stripes: usize,
}

fn default_daily_claim_credits() -> Credits {
    15
}

fn default_max_commit_attempts() -> u32 {
    8
}

fn default_lock_stripes() -> usize {
    64
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            daily_claim_credits: default_daily_claim_credits(),
            max_commit_attempts: default_max_commit_attempts(),
            lock_stripes: default_lock_stripes(),
        }
    }
}

impl LedgerConfig {
    /// Set the daily claim amount.
    pub fn with_daily_claim_credits(mut self, credits: Credits) -> Self {
        self.daily_claim_credits = credits;
        self
    }

    /// Set the conditional-write attempt budget.
    pub fn with_max_commit_attempts(mut self, attempts: u32) -> Self {
        self.max_commit_attempts = attempts.max(1);
        self
    }
}
