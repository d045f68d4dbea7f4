//! Account records and the receipts ledger operations return.

use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Credit amounts are whole, non-negative units.
pub type Credits = u64;

/// Per-user balance and claim metadata, read and written as one record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(default)]
    pub balance: Credits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_claim_date: Option<NaiveDate>,
}

impl Account {
    pub fn with_balance(balance: Credits) -> Self {
        Self {
            balance,
            last_claim_date: None,
        }
    }

    /// Whether a daily claim is still available on `today`.
    pub fn can_claim_on(&self, today: NaiveDate) -> bool {
        self.last_claim_date != Some(today)
    }

    /// The account after deducting `cost`, or `None` if the balance is too low.
    pub fn debited(&self, cost: Credits) -> Option<Account> {
        self.balance.checked_sub(cost).map(|balance| Account {
            balance,
            last_claim_date: self.last_claim_date,
        })
    }

    /// The account after adding `amount`.
    pub fn credited(&self, amount: Credits) -> Result<Account> {
        let balance = self.balance.checked_add(amount).ok_or_else(|| {
            Error::InvalidRequest(format!("crediting {amount} would overflow the balance"))
        })?;
        Ok(Account {
            balance,
            last_claim_date: self.last_claim_date,
        })
    }

    /// The account after a daily claim of `amount` on `today`.
    pub fn claimed(&self, today: NaiveDate, amount: Credits) -> Result<Account> {
        let mut next = self.credited(amount)?;
        next.last_claim_date = Some(today);
        Ok(next)
    }
}

/// Validate a signed amount coming from an outer layer (JSON, CLI).
pub fn positive_credits(value: i64) -> Result<Credits> {
    if value <= 0 {
        return Err(Error::InvalidRequest(format!(
            "credit amount must be a positive integer, got {value}"
        )));
    }
    Ok(value as Credits)
}

pub(crate) fn require_positive(value: Credits, what: &str) -> Result<Credits> {
    if value == 0 {
        return Err(Error::InvalidRequest(format!("{what} must be a positive integer")));
    }
    Ok(value)
}

/// Result of a debit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebitReceipt {
    pub granted: bool,
    pub balance_after: Credits,
}

/// Result of a daily claim attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimReceipt {
    pub granted: bool,
    pub credits_added: Credits,
    pub balance_after: Credits,
    pub last_claim_date: Option<NaiveDate>,
}

impl ClaimReceipt {
    /// Turn a refused claim into [`Error::AlreadyClaimedToday`].
    pub fn ensure_granted(self) -> Result<Self> {
        if self.granted {
            Ok(self)
        } else {
            Err(Error::AlreadyClaimedToday {
                balance: self.balance_after,
            })
        }
    }
}

/// Read-only view of an account as of a given day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceView {
    pub user_id: crate::UserId,
    pub balance: Credits,
    pub last_claim_date: Option<NaiveDate>,
    pub can_claim_daily: bool,
}

impl BalanceView {
    pub fn new(user_id: crate::UserId, account: &Account, today: NaiveDate) -> Self {
        Self {
            user_id,
            balance: account.balance,
            last_claim_date: account.last_claim_date,
            can_claim_daily: account.can_claim_on(today),
        }
    }
}

/// Check a debit cost.
pub fn validate_cost(cost: Credits) -> Result<Credits> {
    require_positive(cost, "cost")
}

/// Check a credit amount.
pub fn validate_amount(amount: Credits) -> Result<Credits> {
    require_positive(amount, "amount")
}
